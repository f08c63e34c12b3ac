//! Recursive mutex with an attached condition variable.
//!
//! The [`Mutex`] can be acquired any number of times by the thread that
//! already holds it; an explicit depth counter tracks the recursion. The
//! attached condition supports indefinite, relative and absolute-deadline
//! waits, plus one-waiter and all-waiter notification.
//!
//! In most cases the mutex is acquired through a [`Guard`](super::Guard)
//! so it is released on every exit path.

use log::{error, warn};
use parking_lot::{Condvar, Mutex as RawMutex};
use spindle_core::logging::{LogLevel, LogRecord};
use spindle_core::{Error, Result};
use std::thread::ThreadId;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Ownership record for the recursive lock.
#[derive(Debug, Default)]
struct LockState {
    /// The thread currently holding the lock, if any
    owner: Option<ThreadId>,

    /// How many times the owner acquired the lock
    depth: usize,
}

/// A recursive mutex with an attached condition variable.
///
/// The same thread may call [`lock`](Mutex::lock) repeatedly; each
/// acquisition must be matched by one [`unlock`](Mutex::unlock). The
/// condition is bound to this mutex: the wait family releases one
/// acquisition level, suspends the caller, and re-acquires that level
/// before returning.
///
/// Dropping a mutex whose depth is not zero is a fault: the state of the
/// program is undefined at that point, so the process is aborted after a
/// fatal record is emitted.
pub struct Mutex {
    /// Owner and depth, serialized by the raw lock
    state: RawMutex<LockState>,

    /// Woken when ownership is surrendered
    handoff: Condvar,

    /// The user-visible condition attached to this mutex
    condition: Condvar,
}

impl Mutex {
    /// Create a new, unlocked mutex.
    pub fn new() -> Self {
        Self {
            state: RawMutex::new(LockState::default()),
            handoff: Condvar::new(),
            condition: Condvar::new(),
        }
    }

    /// Acquire the mutex, blocking until it is available.
    ///
    /// If the calling thread already holds the mutex the depth is simply
    /// incremented; re-entry never deadlocks.
    pub fn lock(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => self.handoff.wait(&mut state),
            }
        }
    }

    /// Try to acquire the mutex without blocking.
    ///
    /// Returns `true` when the lock was acquired (or re-entered), `false`
    /// when another thread holds it.
    pub fn try_lock(&self) -> bool {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(me);
                state.depth = 1;
                true
            }
            Some(owner) if owner == me => {
                state.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Release one acquisition level.
    ///
    /// Fails with [`Error::NotLocked`] when the mutex is not locked and
    /// with [`Error::Invalid`] when it is held by another thread.
    pub fn unlock(&self) -> Result<()> {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        match state.owner {
            None => {
                error!("attempting to unlock a mutex which is not locked");
                Err(Error::NotLocked(
                    "unlock was called too many times".to_string(),
                ))
            }
            Some(owner) if owner != me => {
                error!("attempting to unlock a mutex held by another thread");
                Err(Error::invalid("mutex is held by another thread"))
            }
            Some(_) => {
                state.depth -= 1;
                if state.depth == 0 {
                    state.owner = None;
                    self.handoff.notify_one();
                }
                Ok(())
            }
        }
    }

    /// Suspend the caller until [`signal`](Mutex::signal) or
    /// [`broadcast`](Mutex::broadcast) is emitted.
    ///
    /// One acquisition level is released atomically with the suspension
    /// and re-acquired before the function returns. The caller must hold
    /// the mutex at least once; with a depth greater than one the mutex
    /// stays effectively held while waiting, which starves any signaler
    /// that needs to acquire it first.
    ///
    /// Spurious wakeups are possible; callers re-check their predicate.
    pub fn wait(&self) -> Result<()> {
        self.wait_with_deadline(None).map(|_| ())
    }

    /// As [`wait`](Mutex::wait), giving up after `usecs` microseconds.
    ///
    /// Returns `true` when a notification was received, `false` when the
    /// timeout elapsed. The deadline is computed against the monotonic
    /// clock. The released level is re-acquired before returning either
    /// way.
    pub fn timed_wait(&self, usecs: u64) -> Result<bool> {
        self.wait_with_deadline(Some(Instant::now() + Duration::from_micros(usecs)))
    }

    /// As [`timed_wait`](Mutex::timed_wait), with an absolute wall-clock
    /// deadline expressed in microseconds since the Unix epoch.
    pub fn dated_wait(&self, usec_deadline: u64) -> Result<bool> {
        let deadline = UNIX_EPOCH + Duration::from_micros(usec_deadline);
        match deadline.duration_since(SystemTime::now()) {
            Ok(remaining) => self.wait_with_deadline(Some(Instant::now() + remaining)),
            // the date is already past: an immediate timeout
            Err(_) => Ok(false),
        }
    }

    fn wait_with_deadline(&self, deadline: Option<Instant>) -> Result<bool> {
        let me = std::thread::current().id();
        let mut state = self.state.lock();

        match state.owner {
            Some(owner) if owner == me && state.depth >= 1 => {}
            _ => {
                warn!("attempting to wait on a mutex which is not locked by this thread");
                return Err(Error::NotLockedOnce(
                    "wait requires the mutex to be locked at least once".to_string(),
                ));
            }
        }

        // release one level; surrender ownership if it was the last
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.handoff.notify_one();
        }

        let notified = match deadline {
            None => {
                self.condition.wait(&mut state);
                true
            }
            Some(deadline) => !self
                .condition
                .wait_until(&mut state, deadline)
                .timed_out(),
        };

        // re-acquire the released level, even on a timeout
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth += 1;
                    return Ok(notified);
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return Ok(notified);
                }
                Some(_) => self.handoff.wait(&mut state),
            }
        }
    }

    /// Wake at most one thread waiting on the condition.
    ///
    /// May be called whether or not the mutex is held.
    pub fn signal(&self) {
        let _state = self.state.lock();
        self.condition.notify_one();
    }

    /// Wake all threads waiting on the condition.
    ///
    /// May be called whether or not the mutex is held.
    pub fn broadcast(&self) {
        let _state = self.state.lock();
        self.condition.notify_all();
    }

    /// Acquire the mutex around a [`signal`](Mutex::signal).
    pub fn safe_signal(&self) {
        let _guard = super::Guard::new(self);
        self.signal();
    }

    /// Acquire the mutex around a [`broadcast`](Mutex::broadcast).
    pub fn safe_broadcast(&self) {
        let _guard = super::Guard::new(self);
        self.broadcast();
    }

    /// Current recursion depth.
    ///
    /// Racy unless called by the owning thread; mainly useful to verify
    /// balanced lock/unlock pairs.
    pub fn lock_depth(&self) -> usize {
        self.state.lock().depth
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.depth != 0 {
            // the program is in an undefined state; a destructor must not
            // unwind, so this is the end of the road
            LogRecord::new(
                LogLevel::Fatal,
                format!(
                    "a mutex is being destroyed while locked {} time(s)",
                    state.depth
                ),
            )
            .emit();
            std::process::abort();
        }
    }
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Mutex").field("depth", &state.depth).finish()
    }
}
