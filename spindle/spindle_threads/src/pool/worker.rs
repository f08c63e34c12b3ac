//! The runner specialization driving one pool worker.
//!
//! A [`WorkerRunner`] loops over an input [`Fifo`], hands each workload
//! to the user's [`Worker::do_work`], and forwards the workload to the
//! output FIFO when asked to.

use spindle_core::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::fifo::Fifo;
use crate::thread::{Runner, RunnerState};

/// The work a pool performs on each item.
///
/// `do_work` receives the workload by mutable reference; returning
/// `true` forwards the (possibly modified) workload to the pool's output
/// FIFO, returning `false` drops it.
pub trait Worker: Send + Sync + 'static {
    /// The type of the items flowing through the pool.
    type Workload: Send + 'static;

    /// Process one workload.
    fn do_work(&self, workload: &mut Self::Workload) -> bool;
}

/// One worker of a pool: a [`Runner`] pulling from the shared input
/// FIFO.
///
/// Constructed by [`Pool`](super::Pool); the accessors are available
/// through [`Pool::worker`](super::Pool::worker) to inspect a running
/// pool.
pub struct WorkerRunner<W: Worker> {
    state: RunnerState,
    worker: W,
    position: usize,
    in_fifo: Arc<Fifo<W::Workload>>,
    out_fifo: Option<Arc<Fifo<W::Workload>>>,
    working: AtomicBool,
    runs: AtomicUsize,
}

impl<W: Worker> WorkerRunner<W> {
    pub(crate) fn new(
        name: impl Into<String>,
        position: usize,
        in_fifo: Arc<Fifo<W::Workload>>,
        out_fifo: Option<Arc<Fifo<W::Workload>>>,
        worker: W,
    ) -> Self {
        Self {
            state: RunnerState::new(name),
            worker,
            position,
            in_fifo,
            out_fifo,
            working: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
        }
    }

    /// This worker's index in its pool.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether this worker currently processes a workload.
    ///
    /// There is a small window between a workload being picked up and
    /// the flag being raised, so a `false` answer can be momentarily
    /// stale.
    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }

    /// How many workloads this worker has processed.
    ///
    /// Zero is normal for a pool larger than its backlog.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// The user worker driven by this runner.
    pub fn worker(&self) -> &W {
        &self.worker
    }
}

impl<W: Worker> Runner for WorkerRunner<W> {
    fn state(&self) -> &RunnerState {
        &self.state
    }

    fn run(&self) -> Result<()> {
        // on a re-run the flag may have been left raised
        self.working.store(false, Ordering::SeqCst);

        while self.continue_running() {
            match self.in_fifo.pop_front(-1) {
                Some(mut workload) => {
                    if !self.continue_running() {
                        break;
                    }

                    self.working.store(true, Ordering::SeqCst);
                    self.runs.fetch_add(1, Ordering::SeqCst);

                    // if do_work panics the flag stays raised, which is
                    // the honest answer
                    let forward = self.worker.do_work(&mut workload);

                    self.working.store(false, Ordering::SeqCst);

                    if forward {
                        if let Some(out_fifo) = &self.out_fifo {
                            out_fifo.push_back(workload);
                        }
                    }
                }
                None => {
                    // an empty FIFO marked done means we are finished
                    if self.in_fifo.is_done() {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Thread;

    struct Doubler;

    impl Worker for Doubler {
        type Workload = i32;

        fn do_work(&self, workload: &mut i32) -> bool {
            *workload *= 2;
            true
        }
    }

    #[test]
    fn test_worker_forwards_processed_items() {
        let in_fifo = Arc::new(Fifo::new());
        let out_fifo = Arc::new(Fifo::new());

        let runner = Arc::new(WorkerRunner::new(
            "doubler",
            0,
            Arc::clone(&in_fifo),
            Some(Arc::clone(&out_fifo)),
            Doubler,
        ));
        assert_eq!(runner.position(), 0);

        let thread = Thread::new("doubler", Arc::clone(&runner)).unwrap();
        assert!(thread.start());

        for value in [1, 2, 3] {
            in_fifo.push_back(value);
        }
        in_fifo.done(false);

        thread.stop().unwrap();

        assert_eq!(runner.runs(), 3);
        assert!(!runner.is_working());

        let mut results = vec![];
        while let Some(value) = out_fifo.pop_front(0) {
            results.push(value);
        }
        assert_eq!(results, vec![2, 4, 6]);
    }

    struct Sieve;

    impl Worker for Sieve {
        type Workload = i32;

        fn do_work(&self, workload: &mut i32) -> bool {
            *workload % 2 == 0
        }
    }

    #[test]
    fn test_worker_drops_rejected_items() {
        let in_fifo = Arc::new(Fifo::new());
        let out_fifo = Arc::new(Fifo::new());

        let runner = Arc::new(WorkerRunner::new(
            "sieve",
            0,
            Arc::clone(&in_fifo),
            Some(Arc::clone(&out_fifo)),
            Sieve,
        ));
        let thread = Thread::new("sieve", runner).unwrap();
        assert!(thread.start());

        for value in 1..=6 {
            in_fifo.push_back(value);
        }
        in_fifo.done(false);
        thread.stop().unwrap();

        let mut results = vec![];
        while let Some(value) = out_fifo.pop_front(0) {
            results.push(value);
        }
        assert_eq!(results, vec![2, 4, 6]);
    }
}
