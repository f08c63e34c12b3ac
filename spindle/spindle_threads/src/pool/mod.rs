//! Fixed-size worker pools over a shared input FIFO.
//!
//! A [`Pool`] owns N worker threads consuming one input [`Fifo`] and
//! optionally forwarding results to an output [`Fifo`]. The output of
//! one pool can be the input of another, forming a pipeline.

pub mod worker;

// Re-export key types for easier access
pub use worker::{Worker, WorkerRunner};

use log::warn;
use spindle_core::{Error, Result};
use std::sync::Arc;

use crate::fifo::Fifo;
use crate::thread::Thread;

/// Largest accepted pool size.
pub const MAX_POOL_SIZE: usize = 1000;

/// A worker runner paired with the thread driving it.
///
/// The thread is only held for its drop side, which stops and joins it.
#[allow(dead_code)]
struct PoolWorker<W: Worker> {
    thread: Thread<WorkerRunner<W>>,
    runner: Arc<WorkerRunner<W>>,
}

/// A fixed-size pool of worker threads.
///
/// All workers are created and started eagerly when the pool is built.
/// Producers feed the input FIFO (directly or through
/// [`push_back`](Pool::push_back)); consumers read the output FIFO. To
/// shut down, [`stop`](Pool::stop) marks the input as done so the
/// workers drain and exit, and [`wait`](Pool::wait) joins them; dropping
/// the pool does both.
///
/// ```no_run
/// use std::sync::Arc;
/// use spindle_threads::fifo::Fifo;
/// use spindle_threads::pool::{Pool, Worker};
///
/// struct Double;
///
/// impl Worker for Double {
///     type Workload = u32;
///
///     fn do_work(&self, workload: &mut u32) -> bool {
///         *workload *= 2;
///         true
///     }
/// }
///
/// let input = Arc::new(Fifo::new());
/// let output = Arc::new(Fifo::new());
/// let pool = Pool::new("double", 4, input, Some(output), |_| Double).unwrap();
/// pool.push_back(21);
/// assert_eq!(pool.pop_front(-1).unwrap(), Some(42));
/// ```
pub struct Pool<W: Worker> {
    name: String,
    in_fifo: Arc<Fifo<W::Workload>>,
    out_fifo: Option<Arc<Fifo<W::Workload>>>,
    workers: Vec<PoolWorker<W>>,
}

impl<W: Worker> Pool<W> {
    /// Build a pool of `pool_size` workers and start them all.
    ///
    /// `factory` is called once per worker with its position index and
    /// returns the [`Worker`] instance for that slot. Sizes outside
    /// `1..=`[`MAX_POOL_SIZE`] fail with [`Error::Invalid`].
    pub fn new(
        name: impl Into<String>,
        pool_size: usize,
        in_fifo: Arc<Fifo<W::Workload>>,
        out_fifo: Option<Arc<Fifo<W::Workload>>>,
        mut factory: impl FnMut(usize) -> W,
    ) -> Result<Self> {
        let name = name.into();

        if pool_size == 0 {
            return Err(Error::invalid(
                "the pool size must be a positive number (1 or more)",
            ));
        }
        if pool_size > MAX_POOL_SIZE {
            return Err(Error::invalid(format!(
                "pool size too large ({} accepted at most, which is already very large)",
                MAX_POOL_SIZE
            )));
        }

        let mut workers = Vec::with_capacity(pool_size);
        for position in 0..pool_size {
            let runner = Arc::new(WorkerRunner::new(
                format!("{} (worker #{})", name, position),
                position,
                Arc::clone(&in_fifo),
                out_fifo.as_ref().map(Arc::clone),
                factory(position),
            ));
            let thread = Thread::new(name.clone(), Arc::clone(&runner))?;
            if !thread.start() {
                warn!("pool \"{}\" worker #{} did not start", name, position);
            }
            workers.push(PoolWorker { thread, runner });
        }

        Ok(Self {
            name,
            in_fifo,
            out_fifo,
            workers,
        })
    }

    /// The pool's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool has no workers left; only true after
    /// [`wait`](Pool::wait).
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// The worker runner at `position`.
    ///
    /// Fails with [`Error::Logic`] when the index is out of bounds.
    pub fn worker(&self, position: usize) -> Result<&WorkerRunner<W>> {
        self.workers
            .get(position)
            .map(|worker| worker.runner.as_ref())
            .ok_or_else(|| {
                Error::logic(format!(
                    "worker index {} out of bounds in pool \"{}\"",
                    position, self.name
                ))
            })
    }

    /// Feed a workload to the input FIFO.
    ///
    /// Returns `false` once the pool was stopped.
    pub fn push_back(&self, workload: W::Workload) -> bool {
        self.in_fifo.push_back(workload)
    }

    /// Pop one result from the output FIFO.
    ///
    /// The timeout follows [`Fifo::pop_front`]; once the input FIFO is
    /// done the wait degrades to a try, so a consumer draining a stopped
    /// pool does not hang. Fails with [`Error::Invalid`] when the pool
    /// was built without an output FIFO.
    pub fn pop_front(&self, usecs: i64) -> Result<Option<W::Workload>> {
        let out_fifo = self.out_fifo.as_ref().ok_or_else(|| {
            Error::invalid(format!("pool \"{}\" has no output FIFO to pop from", self.name))
        })?;

        let usecs = if self.in_fifo.is_done() { 0 } else { usecs };
        Ok(out_fifo.pop_front(usecs))
    }

    /// Ask the workers to finish.
    ///
    /// Marks the input FIFO done; with `immediate` the remaining backlog
    /// is discarded, otherwise the workers drain it. Does not join; see
    /// [`wait`](Pool::wait).
    pub fn stop(&self, immediate: bool) {
        if !self.in_fifo.is_done() {
            self.in_fifo.done(immediate);
        }
    }

    /// Join all worker threads, in construction order.
    pub fn wait(&mut self) {
        self.workers.clear();
    }
}

impl<W: Worker> Drop for Pool<W> {
    fn drop(&mut self) {
        self.stop(false);
        self.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double;

    impl Worker for Double {
        type Workload = i32;

        fn do_work(&self, workload: &mut i32) -> bool {
            *workload *= 2;
            true
        }
    }

    fn fifo_pair() -> (Arc<Fifo<i32>>, Arc<Fifo<i32>>) {
        (Arc::new(Fifo::new()), Arc::new(Fifo::new()))
    }

    #[test]
    fn test_pool_size_bounds() {
        let (input, output) = fifo_pair();

        let empty = Pool::new("bad", 0, Arc::clone(&input), Some(Arc::clone(&output)), |_| {
            Double
        });
        assert!(matches!(empty, Err(Error::Invalid(_))));

        let oversized = Pool::new("bad", MAX_POOL_SIZE + 1, input, Some(output), |_| Double);
        assert!(matches!(oversized, Err(Error::Invalid(_))));
    }

    #[test]
    fn test_pool_round_trip() {
        let (input, output) = fifo_pair();
        let pool = Pool::new("double", 2, input, Some(output), |_| Double).unwrap();

        assert_eq!(pool.len(), 2);
        assert!(pool.push_back(5));
        assert_eq!(pool.pop_front(-1).unwrap(), Some(10));
    }

    #[test]
    fn test_pool_without_output_cannot_pop() {
        let (input, _) = fifo_pair();
        let pool = Pool::new("sink", 1, input, None, |_| Double).unwrap();

        assert!(matches!(pool.pop_front(0), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_worker_accessor_bounds() {
        let (input, output) = fifo_pair();
        let pool = Pool::new("double", 2, input, Some(output), |_| Double).unwrap();

        assert_eq!(pool.worker(0).unwrap().position(), 0);
        assert_eq!(pool.worker(1).unwrap().position(), 1);
        assert!(matches!(pool.worker(2), Err(Error::Logic(_))));
    }

    #[test]
    fn test_stop_then_push_is_rejected() {
        let (input, output) = fifo_pair();
        let mut pool = Pool::new("double", 2, input, Some(output), |_| Double).unwrap();

        pool.stop(false);
        assert!(!pool.push_back(1));
        pool.wait();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_workers_share_the_backlog() {
        let (input, output) = fifo_pair();
        let mut pool =
            Pool::new("double", 4, Arc::clone(&input), Some(Arc::clone(&output)), |_| {
                Double
            })
            .unwrap();

        for value in 0..100 {
            assert!(pool.push_back(value));
        }

        let mut results = vec![];
        while results.len() < 100 {
            if let Some(value) = pool.pop_front(-1).unwrap() {
                results.push(value);
            }
        }

        // every run is accounted for across the workers
        let total_runs: usize = (0..4).map(|i| pool.worker(i).unwrap().runs()).sum();
        assert_eq!(total_runs, 100);

        pool.stop(false);
        pool.wait();

        results.sort_unstable();
        let expected: Vec<i32> = (0..100).map(|value| value * 2).collect();
        assert_eq!(results, expected);
    }
}
