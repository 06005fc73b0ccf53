//! Per-node playback state

/// Which clip a node plays and where it is in it
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAnimator {
    pub clip: String,
    /// Current playback time in seconds
    pub time: f64,
    /// Speed multiplier (negative plays backwards)
    pub speed: f64,
    pub looping: bool,
    pub playing: bool,
}

impl NodeAnimator {
    /// Looping playback at normal speed
    pub fn new(clip: impl Into<String>) -> Self {
        Self {
            clip: clip.into(),
            time: 0.0,
            speed: 1.0,
            looping: true,
            playing: true,
        }
    }

    /// Play once and stop on the last frame
    pub fn once(clip: impl Into<String>) -> Self {
        Self {
            looping: false,
            ..Self::new(clip)
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Move playback forward by `dt` seconds of a clip lasting `duration`.
    ///
    /// Returns true on the advance where a non-looping clip reaches its end.
    pub fn advance(&mut self, duration: f64, dt: f64) -> bool {
        if !self.playing {
            return false;
        }

        self.time += dt * self.speed;

        if self.looping {
            if duration > 0.0 {
                if self.time >= duration {
                    self.time %= duration;
                } else if self.time < 0.0 {
                    self.time = duration - (-self.time % duration);
                }
            }
            false
        } else if self.time >= duration {
            self.time = duration;
            self.playing = false;
            true
        } else if self.time < 0.0 {
            self.time = 0.0;
            self.playing = false;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looping_wraps_forward_and_backward() {
        let mut anim = NodeAnimator::new("walk");
        assert!(!anim.advance(2.0, 2.5));
        assert!((anim.time - 0.5).abs() < 1e-9);

        let mut reverse = NodeAnimator::new("walk").with_speed(-1.0);
        assert!(!reverse.advance(2.0, 0.5));
        assert!((reverse.time - 1.5).abs() < 1e-9);
        assert!(reverse.playing);
    }

    #[test]
    fn test_once_stops_at_end_and_reports_it_once() {
        let mut anim = NodeAnimator::once("wave");
        assert!(!anim.advance(1.0, 0.75));
        assert!(anim.advance(1.0, 0.75));
        assert_eq!(anim.time, 1.0);
        assert!(!anim.playing);
        assert!(!anim.advance(1.0, 0.75));
    }

    #[test]
    fn test_paused_does_not_move() {
        let mut anim = NodeAnimator::new("idle");
        anim.playing = false;
        anim.advance(1.0, 0.3);
        assert_eq!(anim.time, 0.0);
    }
}
