//! Thread-safe FIFO with shutdown signalling and per-item readiness.
//!
//! The [`Fifo`] hands items out in insertion order, except that a queue
//! built with a readiness predicate dispatches the *first ready* item in
//! insertion order. Producers signal the end of the stream with
//! [`done`](Fifo::done); consumers drain and then observe the shutdown.
//!
//! The readiness capability itself is the [`ValidWorkload`] trait,
//! implemented by [`ItemWithPredicate`](item::ItemWithPredicate) for
//! dependency-aware work items.

pub mod item;

// Re-export key types for easier access
pub use item::ItemWithPredicate;

use parking_lot::{Condvar, Mutex as RawMutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Capability of queue items that may not be ready to dispatch yet.
///
/// A [`Fifo`] created with [`Fifo::for_workloads`] consults this before
/// handing an item out; items whose `valid_workload` returns `false`
/// stay queued and later items are considered instead.
pub trait ValidWorkload {
    /// Whether this item may be dispatched now.
    fn valid_workload(&self) -> bool;
}

impl<T: ValidWorkload + ?Sized> ValidWorkload for Arc<T> {
    fn valid_workload(&self) -> bool {
        (**self).valid_workload()
    }
}

impl<T: ValidWorkload + ?Sized> ValidWorkload for Box<T> {
    fn valid_workload(&self) -> bool {
        (**self).valid_workload()
    }
}

/// Capability of queue items with a measurable byte size.
///
/// Only needed to call [`Fifo::byte_size`].
pub trait ByteSized {
    /// Size of this item in bytes.
    fn byte_size(&self) -> usize;
}

impl ByteSized for String {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSized for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl<T: ByteSized + ?Sized> ByteSized for Arc<T> {
    fn byte_size(&self) -> usize {
        (**self).byte_size()
    }
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Queue state, all under one lock.
struct Inner<T> {
    queue: VecDeque<T>,
    done: bool,
    broadcast_sent: bool,
}

/// A thread-safe FIFO shared between producers and consumers.
///
/// Pushing wakes one waiting consumer. [`pop_front`](Fifo::pop_front)
/// takes a timeout in microseconds: `0` never suspends, a positive value
/// bounds the wait, and a negative value waits indefinitely. Once the
/// queue is marked [`done`](Fifo::done) and drains empty, every waiting
/// consumer is woken exactly once so it can observe the shutdown.
pub struct Fifo<T> {
    inner: RawMutex<Inner<T>>,
    condition: Condvar,
    predicate: Option<Predicate<T>>,
}

impl<T> Fifo<T> {
    /// Create a FIFO where every item is always ready.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a FIFO with an explicit readiness predicate.
    ///
    /// `pop_front` dispatches the first queued item for which the
    /// predicate returns `true`.
    pub fn with_predicate(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self::build(Some(Box::new(predicate)))
    }

    fn build(predicate: Option<Predicate<T>>) -> Self {
        Self {
            inner: RawMutex::new(Inner {
                queue: VecDeque::new(),
                done: false,
                broadcast_sent: false,
            }),
            condition: Condvar::new(),
            predicate,
        }
    }

    /// Append an item.
    ///
    /// Returns `false`, dropping the item, when the queue was already
    /// marked done.
    pub fn push_back(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.done {
            return false;
        }
        inner.queue.push_back(item);
        self.condition.notify_one();
        true
    }

    /// Remove and return the first ready item.
    ///
    /// `usecs` selects the wait mode: `0` returns immediately, a positive
    /// count waits up to that many microseconds, and a negative count
    /// waits until an item becomes ready or the queue is done. Returns
    /// `None` when no ready item could be obtained; once the queue is
    /// done and empty that answer is immediate.
    pub fn pop_front(&self, usecs: i64) -> Option<T> {
        let deadline = if usecs > 0 {
            Some(Instant::now() + Duration::from_micros(usecs as u64))
        } else {
            None
        };

        let mut inner = self.inner.lock();
        loop {
            // first ready item in insertion order
            let ready = match &self.predicate {
                Some(predicate) => inner.queue.iter().position(|item| predicate(item)),
                None => {
                    if inner.queue.is_empty() {
                        None
                    } else {
                        Some(0)
                    }
                }
            };
            if let Some(index) = ready {
                let item = inner.queue.remove(index);
                self.wake_if_drained(&mut inner);
                return item;
            }

            if inner.done {
                break;
            }

            if usecs < 0 {
                self.condition.wait(&mut inner);
            } else if let Some(deadline) = deadline {
                if self.condition.wait_until(&mut inner, deadline).timed_out() {
                    break;
                }
            } else {
                // usecs == 0: do not suspend
                break;
            }
        }
        self.wake_if_drained(&mut inner);
        None
    }

    /// Discard all queued items.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Refuse further pushes; consumers drain what remains.
    ///
    /// The transition is monotonic. With `also_clear` the remaining items
    /// are discarded instead of drained. When the queue is (or becomes)
    /// empty, the waiting consumers are woken; that wake-up happens at
    /// most once over the life of the queue.
    pub fn done(&self, also_clear: bool) {
        let mut inner = self.inner.lock();
        inner.done = true;
        if also_clear {
            inner.queue.clear();
        }
        self.wake_if_drained(&mut inner);
    }

    /// Whether [`done`](Fifo::done) was called.
    pub fn is_done(&self) -> bool {
        self.inner.lock().done
    }

    fn wake_if_drained(&self, inner: &mut Inner<T>) {
        if inner.done && !inner.broadcast_sent && inner.queue.is_empty() {
            self.condition.notify_all();
            inner.broadcast_sent = true;
        }
    }
}

impl<T: ValidWorkload + 'static> Fifo<T> {
    /// Create a FIFO whose readiness predicate is the items' own
    /// [`ValidWorkload`] capability.
    pub fn for_workloads() -> Self {
        Self::with_predicate(T::valid_workload)
    }
}

impl<T: ByteSized> Fifo<T> {
    /// Total size in bytes of the queued items.
    pub fn byte_size(&self) -> usize {
        let inner = self.inner.lock();
        inner.queue.iter().map(ByteSized::byte_size).sum()
    }
}

impl<T> Default for Fifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_insertion_order() {
        let fifo = Fifo::new();
        assert!(fifo.push_back(1));
        assert!(fifo.push_back(2));
        assert!(fifo.push_back(3));

        assert_eq!(fifo.len(), 3);
        assert_eq!(fifo.pop_front(0), Some(1));
        assert_eq!(fifo.pop_front(0), Some(2));
        assert_eq!(fifo.pop_front(0), Some(3));
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_pop_empty_does_not_suspend() {
        let fifo: Fifo<i32> = Fifo::new();
        let before = Instant::now();
        assert_eq!(fifo.pop_front(0), None);
        assert!(before.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_pop_timeout_expires() {
        let fifo: Fifo<i32> = Fifo::new();
        let before = Instant::now();
        assert_eq!(fifo.pop_front(30_000), None);
        assert!(before.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_push_rejected_after_done() {
        let fifo = Fifo::new();
        assert!(fifo.push_back(1));
        fifo.done(false);
        assert!(!fifo.push_back(2));

        // the remaining item still drains
        assert_eq!(fifo.pop_front(0), Some(1));
        assert_eq!(fifo.pop_front(0), None);
    }

    #[test]
    fn test_done_clear_discards() {
        let fifo = Fifo::new();
        fifo.push_back(1);
        fifo.push_back(2);
        fifo.done(true);

        assert!(fifo.is_done());
        assert!(fifo.is_empty());
        assert_eq!(fifo.pop_front(0), None);
    }

    #[test]
    fn test_done_is_idempotent() {
        let fifo: Fifo<i32> = Fifo::new();
        fifo.done(false);
        fifo.done(false);
        assert!(fifo.is_done());
    }

    #[test]
    fn test_done_unblocks_waiting_consumer() {
        let fifo: Arc<Fifo<i32>> = Arc::new(Fifo::new());

        let consumer = {
            let fifo = Arc::clone(&fifo);
            thread::spawn(move || fifo.pop_front(-1))
        };

        thread::sleep(Duration::from_millis(50));
        fifo.done(false);

        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_push_unblocks_waiting_consumer() {
        let fifo: Arc<Fifo<i32>> = Arc::new(Fifo::new());

        let consumer = {
            let fifo = Arc::clone(&fifo);
            thread::spawn(move || fifo.pop_front(-1))
        };

        thread::sleep(Duration::from_millis(50));
        fifo.push_back(7);

        assert_eq!(consumer.join().unwrap(), Some(7));
    }

    #[test]
    fn test_predicate_dispatch_order() {
        struct Flagged {
            data: i32,
            ready: Arc<AtomicBool>,
        }

        let fifo = Fifo::with_predicate(|item: &Flagged| item.ready.load(Ordering::SeqCst));

        let first_ready = Arc::new(AtomicBool::new(false));
        fifo.push_back(Flagged {
            data: 1,
            ready: Arc::clone(&first_ready),
        });
        fifo.push_back(Flagged {
            data: 2,
            ready: Arc::new(AtomicBool::new(true)),
        });

        // the second item is the first ready one
        assert_eq!(fifo.pop_front(0).map(|item| item.data), Some(2));
        assert!(fifo.pop_front(0).is_none());

        first_ready.store(true, Ordering::SeqCst);
        assert_eq!(fifo.pop_front(0).map(|item| item.data), Some(1));
    }

    #[test]
    fn test_byte_size() {
        let fifo: Fifo<String> = Fifo::new();
        fifo.push_back("abc".to_string());
        fifo.push_back("defgh".to_string());
        assert_eq!(fifo.byte_size(), 8);

        fifo.clear();
        assert_eq!(fifo.byte_size(), 0);
    }
}
