//! Fan-out over independent subtrees on a worker pool, fan-in through a
//! multi-producer queue drained on the main thread

use crate::fault::guard;
use cadence_core::{CadenceError, Result};
use crossbeam::channel::{self, Receiver, Sender};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Multi-producer, single-consumer queue of worker side effects.
///
/// Workers only push; the owning thread drains once the parallel phase is
/// over and nothing else reads the records.
pub struct PendingQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> Sender<T> {
        self.sender.clone()
    }

    pub fn push(&self, item: T) {
        // The receiver lives as long as `self`, so sending cannot fail
        let _ = self.sender.send(item);
    }

    /// Take everything queued so far, in arrival order
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// A unit of parallel work: one root and everything below it
pub trait SubtreeRoot {
    /// Used in fault logs
    fn label(&self) -> &str;
}

/// Outcome of one parallel phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub processed: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn merge(self, other: DispatchReport) -> DispatchReport {
        DispatchReport {
            processed: self.processed + other.processed,
            failed: self.failed + other.failed,
        }
    }
}

/// Bounded worker pool running one task per independent subtree root
pub struct ParallelDispatcher {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl ParallelDispatcher {
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("cadence-worker-{i}"))
            .build()
            .map_err(|e| CadenceError::RuntimeError(format!("worker pool: {e}")))?;
        log::debug!("parallel dispatcher started with {} worker(s)", threads);
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `process` once per root across the pool and wait for all of them.
    ///
    /// Each task gets its own output buffer. The buffer is published to
    /// `queue` only when the task succeeds; a failing or panicking root is
    /// logged and its output dropped while its siblings carry on. `process`
    /// must leave its root untouched until it is certain to succeed.
    pub fn dispatch<R, T, F>(
        &self,
        phase: &str,
        roots: &mut [R],
        queue: &PendingQueue<T>,
        process: F,
    ) -> DispatchReport
    where
        R: SubtreeRoot + Send,
        T: Send,
        F: Fn(&mut R, &mut Vec<T>) -> anyhow::Result<()> + Sync,
    {
        let failed = AtomicUsize::new(0);

        self.pool.install(|| {
            roots
                .par_iter_mut()
                .for_each_with(queue.sender(), |sender, root| {
                    let mut output = Vec::new();
                    match guard(|| process(&mut *root, &mut output)) {
                        Ok(()) => {
                            for item in output {
                                let _ = sender.send(item);
                            }
                        }
                        Err(fault) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            log::error!(
                                "[{}] root '{}' failed, results discarded: {}",
                                phase,
                                root.label(),
                                fault
                            );
                        }
                    }
                });
        });

        let report = DispatchReport {
            processed: roots.len(),
            failed: failed.into_inner(),
        };
        log::trace!("[{}] dispatched {:?}", phase, report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Chain {
        name: String,
        values: Vec<u32>,
        fail: bool,
    }

    impl SubtreeRoot for Chain {
        fn label(&self) -> &str {
            &self.name
        }
    }

    fn chains() -> Vec<Chain> {
        (0..16)
            .map(|i| Chain {
                name: format!("chain{i}"),
                values: (0..10).map(|v| v + i * 100).collect(),
                fail: i == 3,
            })
            .collect()
    }

    fn double_all(dispatcher: &ParallelDispatcher) -> (Vec<u32>, DispatchReport, Vec<Chain>) {
        let mut roots = chains();
        let queue: PendingQueue<u32> = PendingQueue::new();
        let report = dispatcher.dispatch("test", &mut roots, &queue, |chain, out| {
            let doubled: Vec<u32> = chain.values.iter().map(|v| v * 2).collect();
            out.extend(doubled.iter().copied());
            if chain.fail {
                anyhow::bail!("{} refused", chain.name);
            }
            chain.values = doubled;
            Ok(())
        });
        let mut drained = queue.drain();
        drained.sort_unstable();
        (drained, report, roots)
    }

    #[test]
    fn test_failed_root_output_is_discarded() {
        let dispatcher = ParallelDispatcher::new(4).unwrap();
        let (drained, report, roots) = double_all(&dispatcher);

        assert_eq!(report, DispatchReport { processed: 16, failed: 1 });
        assert_eq!(drained.len(), 150);
        assert!(!drained.contains(&(300 * 2)));
        assert_eq!(roots[3].values[0], 300);
        assert_eq!(roots[4].values[0], 800);
    }

    #[test]
    fn test_panicking_root_is_isolated() {
        let dispatcher = ParallelDispatcher::new(2).unwrap();
        let mut roots = chains();
        let queue: PendingQueue<u32> = PendingQueue::new();
        let report = dispatcher.dispatch("panic", &mut roots, &queue, |chain, out| {
            if chain.name == "chain7" {
                panic!("worker blew up");
            }
            out.push(chain.values[0]);
            Ok(())
        });
        assert_eq!(report.failed, 1);
        assert_eq!(queue.len(), 15);
    }

    #[test]
    fn test_results_do_not_depend_on_worker_count() {
        let one = double_all(&ParallelDispatcher::new(1).unwrap());
        let eight = double_all(&ParallelDispatcher::new(8).unwrap());
        assert_eq!(one.0, eight.0);
        assert_eq!(one.1, eight.1);
        let values = |roots: &[Chain]| roots.iter().map(|c| c.values.clone()).collect::<Vec<_>>();
        assert_eq!(values(&one.2), values(&eight.2));
    }

    #[test]
    fn test_queue_drains_in_arrival_order() {
        let queue = PendingQueue::new();
        queue.push(1);
        let sender = queue.sender();
        sender.send(2).unwrap();
        queue.push(3);
        assert_eq!(queue.drain(), vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_threads_means_one() {
        assert_eq!(ParallelDispatcher::new(0).unwrap().threads(), 1);
    }
}
