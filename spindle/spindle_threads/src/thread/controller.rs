//! The thread controller.
//!
//! A [`Thread`] wraps one OS thread running a [`Runner`]. It owns the
//! start handshake, cooperative stopping, joining, signal delivery, and
//! the bridging of runner failures back to the joining caller.

use log::{error, warn};
use spindle_core::logging::{LogLevel, LogRecord};
use spindle_core::{Error, Result};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::runner::{LeaveStatus, Runner};
use crate::sync::{Guard, Mutex};
use crate::sys;

/// State shared between a controller and the OS thread it manages.
///
/// The mutex carries the start/exit handshake; the flags are atomics so
/// the frequent queries stay constant-time.
pub(crate) struct ThreadControl {
    mutex: Mutex,
    running: AtomicBool,
    started: AtomicBool,
    stopping: AtomicBool,
    tid: AtomicI32,
    pthread: AtomicU64,
    error: parking_lot::Mutex<Option<Error>>,
    log_all_errors: AtomicBool,
}

impl ThreadControl {
    pub(crate) fn new() -> Self {
        Self {
            mutex: Mutex::new(),
            running: AtomicBool::new(false),
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            tid: AtomicI32::new(sys::PID_UNDEFINED),
            pthread: AtomicU64::new(0),
            error: parking_lot::Mutex::new(None),
            log_all_errors: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub(crate) fn tid(&self) -> Option<i32> {
        match self.tid.load(Ordering::SeqCst) {
            sys::PID_UNDEFINED => None,
            tid => Some(tid),
        }
    }

    /// Record `err` if no earlier failure was captured this cycle.
    fn capture(&self, err: Error, hook: &str) -> bool {
        if self.log_all_errors.load(Ordering::SeqCst) {
            LogRecord::new(
                LogLevel::Fatal,
                format!("thread {} hook failed: {}, exiting thread now", hook, err),
            )
            .emit();
        }
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(err);
            true
        } else {
            false
        }
    }
}

/// Controller for one managed OS thread.
///
/// The runner must outlive the controller; both sides of that contract
/// are enforced: construction attaches the runner (a runner can be
/// attached to only one controller at a time) and dropping the
/// controller stops the thread and detaches it.
///
/// ```no_run
/// use std::sync::Arc;
/// use spindle_core::Result;
/// use spindle_threads::thread::{Runner, RunnerState, Thread};
///
/// struct Ticker {
///     state: RunnerState,
/// }
///
/// impl Runner for Ticker {
///     fn state(&self) -> &RunnerState {
///         &self.state
///     }
///
///     fn run(&self) -> Result<()> {
///         while self.continue_running() {
///             std::thread::sleep(std::time::Duration::from_millis(10));
///         }
///         Ok(())
///     }
/// }
///
/// let ticker = Arc::new(Ticker { state: RunnerState::new("ticker") });
/// let thread = Thread::new("ticker", ticker).unwrap();
/// assert!(thread.start());
/// thread.stop().unwrap();
/// ```
pub struct Thread<R: Runner> {
    name: String,
    runner: Arc<R>,
    control: Arc<ThreadControl>,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<R: Runner> Thread<R> {
    /// Bind `runner` to a new controller.
    ///
    /// Fails with [`Error::InUse`] when the runner is already attached
    /// to another controller.
    pub fn new(name: impl Into<String>, runner: Arc<R>) -> Result<Self> {
        let name = name.into();
        let control = Arc::new(ThreadControl::new());
        runner.state().attach(Arc::clone(&control))?;
        Ok(Self {
            name,
            runner,
            control,
            handle: parking_lot::Mutex::new(None),
        })
    }

    /// The controller's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The managed runner.
    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    /// Whether the thread is considered running.
    ///
    /// The flag is raised just before the OS thread is spawned and
    /// lowered just before it exits.
    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::SeqCst)
    }

    /// Whether [`stop`](Thread::stop) was called and the join is still
    /// pending.
    pub fn is_stopping(&self) -> bool {
        self.control.is_stopping()
    }

    /// OS thread id of the managed thread, while it is running.
    pub fn tid(&self) -> Option<i32> {
        self.control.tid()
    }

    /// The controller's mutex, shared with the managed thread.
    ///
    /// Useful to wait on or signal the thread from outside; the
    /// controller itself uses it for the start/exit handshake.
    pub fn mutex(&self) -> &Mutex {
        &self.control.mutex
    }

    /// The failure captured during the current or last run cycle, if
    /// any. [`stop`](Thread::stop) consumes it.
    pub fn error(&self) -> Option<Error> {
        self.control.error.lock().clone()
    }

    /// Whether captured failures are logged at capture time.
    pub fn log_all_errors(&self) -> bool {
        self.control.log_all_errors.load(Ordering::SeqCst)
    }

    /// Choose whether captured failures are logged at capture time, in
    /// addition to being returned on join. Defaults to `true`: threads
    /// that are joined only at shutdown would otherwise hide their
    /// failure for their whole lifetime.
    pub fn set_log_all_errors(&self, log_all: bool) {
        self.control.log_all_errors.store(log_all, Ordering::SeqCst);
    }

    /// Start the managed thread.
    ///
    /// Returns `false`, with a warning logged, when the thread is
    /// already running, when the runner reports it is not ready, or when
    /// the OS refuses to spawn. Does not return before the new thread
    /// reported in.
    pub fn start(&self) -> bool {
        let _lock = Guard::new(&self.control.mutex);

        if self.control.running.load(Ordering::SeqCst) || self.control.started.load(Ordering::SeqCst)
        {
            warn!("thread \"{}\" is already running", self.name);
            return false;
        }

        if !self.runner.is_ready() {
            warn!("the runner of thread \"{}\" is not ready", self.name);
            return false;
        }

        self.control.running.store(true, Ordering::SeqCst);
        self.control.started.store(false, Ordering::SeqCst);
        self.control.stopping.store(false, Ordering::SeqCst);
        *self.control.error.lock() = None;

        let runner = Arc::clone(&self.runner);
        let control = Arc::clone(&self.control);
        let spawned = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || trampoline(runner, control));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.control.running.store(false, Ordering::SeqCst);
                error!("thread \"{}\" could not be created: {}", self.name, err);
                return false;
            }
        };

        {
            use std::os::unix::thread::JoinHandleExt;
            self.control
                .pthread
                .store(handle.as_pthread_t() as u64, Ordering::SeqCst);
        }
        *self.handle.lock() = Some(handle);

        // wait for the child to report in
        while !self.control.started.load(Ordering::SeqCst) {
            if self.control.mutex.wait().is_err() {
                break;
            }
        }

        true
    }

    /// Ask the thread to stop and join it.
    ///
    /// Cooperative: the stopping flag is raised and the join waits for
    /// the runner to notice. A failure captured during the cycle is
    /// returned here (and cleared). Stopping a thread that never
    /// started, or stopping twice, does nothing.
    pub fn stop(&self) -> Result<()> {
        self.stop_with(|_| {})
    }

    /// As [`stop`](Thread::stop), invoking `callback` after the stopping
    /// flag is raised but before the join.
    ///
    /// The callback typically wakes the runner out of a blocking call,
    /// for example by marking the FIFO it pops from as done or by
    /// sending it a signal through [`kill`](Thread::kill).
    pub fn stop_with(&self, callback: impl FnOnce(&Self)) -> Result<()> {
        {
            let _lock = Guard::new(&self.control.mutex);
            if !self.control.running.load(Ordering::SeqCst)
                && !self.control.started.load(Ordering::SeqCst)
            {
                // nothing to join: the thread never started
                return Ok(());
            }
            self.control.stopping.store(true, Ordering::SeqCst);
        }

        callback(self);

        self.join(true)
    }

    fn join(&self, propagate_panic: bool) -> Result<()> {
        let handle = self.handle.lock().take();
        let panicked = match handle {
            Some(handle) => handle.join().err(),
            None => None,
        };

        self.control.running.store(false, Ordering::SeqCst);
        self.control.started.store(false, Ordering::SeqCst);
        self.control.stopping.store(false, Ordering::SeqCst);

        if let Some(payload) = panicked {
            if propagate_panic {
                resume_unwind(payload);
            }
            error!("thread \"{}\" panicked; the panic is discarded", self.name);
        }

        match self.control.error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Deliver a Unix signal to the managed thread.
    ///
    /// Returns `true` when the signal was sent. The runner is in charge
    /// of handling it, typically through `signalfd` or a handler
    /// installed by the application; the substrate installs none.
    pub fn kill(&self, signal: i32) -> bool {
        let _lock = Guard::new(&self.control.mutex);
        if !self.control.running.load(Ordering::SeqCst) {
            return false;
        }
        let pthread = self.control.pthread.load(Ordering::SeqCst);
        if pthread == 0 {
            return false;
        }
        unsafe { libc::pthread_kill(pthread as libc::pthread_t, signal) == 0 }
    }
}

impl<R: Runner> Drop for Thread<R> {
    fn drop(&mut self) {
        {
            let _lock = Guard::new(&self.control.mutex);
            self.control.stopping.store(true, Ordering::SeqCst);
        }
        // a panic must not escape a destructor and a captured failure
        // has nobody left to hand it to
        if let Err(err) = self.join(false) {
            error!(
                "thread \"{}\" reported an error while being dropped: {}",
                self.name, err
            );
        }
        self.runner.state().detach();
    }
}

/// Body of the spawned OS thread.
fn trampoline<R: Runner>(runner: Arc<R>, control: Arc<ThreadControl>) {
    {
        let _lock = Guard::new(&control.mutex);
        control.tid.store(sys::gettid(), Ordering::SeqCst);
        control.started.store(true, Ordering::SeqCst);
        control.mutex.signal();
    }

    // publish the runner name where process inspectors can see it
    let name = runner.name();
    if !name.is_empty() {
        if let Err(err) = sys::set_current_thread_name(sys::truncated_thread_name(name)) {
            // best effort only
            log::debug!("could not publish thread name \"{}\": {}", name, err);
        }
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let status = if capture_hook(&control, runner.enter(), "enter") {
            if capture_hook(&control, runner.run(), "run") {
                LeaveStatus::Normal
            } else {
                LeaveStatus::ThreadFailed
            }
        } else {
            LeaveStatus::InitializationFailed
        };

        if let Err(err) = runner.leave(status) {
            // enter and run have priority over a leave failure
            if !control.capture(err.clone(), "leave") {
                error!("thread leave hook failed after an earlier capture: {}", err);
            }
        }
    }));

    {
        let _lock = Guard::new(&control.mutex);
        control.running.store(false, Ordering::SeqCst);
        control.tid.store(sys::PID_UNDEFINED, Ordering::SeqCst);
        control.mutex.signal();
    }

    if let Err(payload) = outcome {
        // a panic plays the role of an unrecognized failure: it was
        // already reported by the panic hook, re-raise it for the joiner
        resume_unwind(payload);
    }
}

fn capture_hook(control: &ThreadControl, result: Result<()>, hook: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            control.capture(err, hook);
            false
        }
    }
}
