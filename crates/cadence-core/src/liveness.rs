//! Liveness results for generation-checked references

/// Outcome of resolving a handle that may have outlived its target.
///
/// Queues are allowed to hold references to objects destroyed after the
/// reference was enqueued; consumers check once and skip `Stale` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Ok,
    Stale,
}

impl Liveness {
    pub fn from_alive(alive: bool) -> Self {
        if alive {
            Liveness::Ok
        } else {
            Liveness::Stale
        }
    }

    pub fn is_ok(self) -> bool {
        self == Liveness::Ok
    }

    pub fn is_stale(self) -> bool {
        self == Liveness::Stale
    }
}
