//! RAII scoped acquisition of a [`Mutex`].
//!
//! A [`Guard`] locks the mutex on construction and guarantees the
//! matching unlock on every exit path, including unwinding. The lock can
//! be dropped and re-taken in the middle of the scope.

use spindle_core::logging::{LogLevel, LogRecord};
use spindle_core::Result;

use super::Mutex;

/// Scoped acquisition of a [`Mutex`].
///
/// ```
/// use spindle_threads::sync::{Guard, Mutex};
///
/// let mutex = Mutex::new();
/// {
///     let _lock = Guard::new(&mutex);
///     // protected section
/// }
/// assert_eq!(mutex.lock_depth(), 0);
/// ```
///
/// The guard borrows the mutex, so it cannot outlive it and cannot be
/// detached from it; releasing early is done with
/// [`unlock`](Guard::unlock) or [`unlock_done`](Guard::unlock_done).
pub struct Guard<'a> {
    /// The guarded mutex; cleared once the guard is marked done
    mutex: Option<&'a Mutex>,

    /// Whether this guard currently holds an acquisition level
    locked: bool,
}

impl<'a> Guard<'a> {
    /// Lock `mutex` and build the guard that will release it.
    pub fn new(mutex: &'a Mutex) -> Self {
        mutex.lock();
        Self {
            mutex: Some(mutex),
            locked: true,
        }
    }

    /// Release the held lock and mark the guard as done.
    ///
    /// After this call [`relock`](Guard::relock) is a no-op; the guard
    /// has given up its reference to the mutex.
    pub fn unlock(&mut self) -> Result<()> {
        self.unlock_done(true)
    }

    /// Release the held lock.
    ///
    /// With `done` set to `false` the guard keeps its reference so the
    /// scope can [`relock`](Guard::relock) later. Releasing an already
    /// released guard does nothing.
    pub fn unlock_done(&mut self, done: bool) -> Result<()> {
        if let Some(mutex) = self.mutex {
            if self.locked {
                self.locked = false;
                mutex.unlock()?;
            }
        }
        if done {
            self.mutex = None;
        }
        Ok(())
    }

    /// Re-acquire the mutex after an [`unlock_done(false)`](Guard::unlock_done).
    ///
    /// Does nothing when the guard still holds the lock or was marked
    /// done.
    pub fn relock(&mut self) {
        if let Some(mutex) = self.mutex {
            if !self.locked {
                mutex.lock();
                self.locked = true;
            }
        }
    }

    /// Synonym of [`relock`](Guard::relock).
    pub fn lock(&mut self) {
        self.relock();
    }

    /// Whether this guard currently holds the lock.
    ///
    /// Only meaningful on the thread owning the guard; any other reader
    /// races with that thread's unlock/relock calls.
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        if let Some(mutex) = self.mutex {
            if self.locked {
                if let Err(err) = mutex.unlock() {
                    // a destructor must not unwind; an unlock failure here
                    // means the locking discipline is already broken
                    LogRecord::new(
                        LogLevel::Fatal,
                        format!("guard failed to unlock its mutex: {}", err),
                    )
                    .emit();
                    std::process::abort();
                }
            }
        }
    }
}
