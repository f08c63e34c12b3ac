//! The user-supplied work body of a managed thread.
//!
//! Implementations embed a [`RunnerState`] and hand it out through
//! [`Runner::state`]; the provided methods build on it. The controller
//! calls [`enter`](Runner::enter) once, then [`run`](Runner::run), then
//! [`leave`](Runner::leave) with a status describing how the cycle went.

use parking_lot::Mutex as RawMutex;
use spindle_core::{Error, Result};
use std::sync::Arc;

use super::controller::ThreadControl;
use crate::sync::{Guard, Mutex};

/// How a run cycle ended, as reported to [`Runner::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveStatus {
    /// `run` returned without error.
    Normal,

    /// `enter` failed; `run` was never called.
    InitializationFailed,

    /// `run` failed.
    ThreadFailed,

    /// A failure outside the enter/run pair was captured. This
    /// controller does not produce it; reimplementations that instrument
    /// the hooks may.
    Instrumentation,
}

/// A thread work body.
///
/// The only required method is [`run`](Runner::run). A typical
/// implementation loops on [`continue_running`](Runner::continue_running)
/// so that [`Thread::stop`](super::Thread::stop) can end it
/// cooperatively:
///
/// ```ignore
/// fn run(&self) -> Result<()> {
///     while self.continue_running() {
///         // one unit of work
///     }
///     Ok(())
/// }
/// ```
///
/// Errors returned from `enter`, `run` or `leave` are captured by the
/// controller and handed to whoever joins the thread.
pub trait Runner: Send + Sync + 'static {
    /// The state record embedded in this runner.
    fn state(&self) -> &RunnerState;

    /// The runner's name.
    fn name(&self) -> &str {
        self.state().name()
    }

    /// Consulted by the controller before starting; a `false` answer
    /// makes the start fail.
    fn is_ready(&self) -> bool {
        true
    }

    /// Whether the run loop should keep going.
    ///
    /// The default answer is `true` until the controlling thread starts
    /// stopping. Refinements should combine their own condition with
    /// this one.
    fn continue_running(&self) -> bool {
        self.state().continue_running()
    }

    /// Called once on the new thread before [`run`](Runner::run).
    fn enter(&self) -> Result<()> {
        Ok(())
    }

    /// The work body.
    fn run(&self) -> Result<()>;

    /// Called once on the new thread after the cycle ends.
    fn leave(&self, status: LeaveStatus) -> Result<()> {
        let _ = status;
        Ok(())
    }

    /// OS thread id of the thread currently running this runner.
    ///
    /// Meaningful only while the thread is running; `None` otherwise.
    fn tid(&self) -> Option<i32> {
        self.state().thread_tid()
    }
}

/// The state every runner embeds.
///
/// Carries the runner's name, its own mutex, and the attachment slot
/// tying it to at most one controller at a time.
pub struct RunnerState {
    /// The runner's name; also published as the OS thread name
    name: String,

    /// The runner's own mutex, for the implementation's protection
    mutex: Mutex,

    /// The controller this runner is attached to, if any
    control: RawMutex<Option<Arc<ThreadControl>>>,
}

impl RunnerState {
    /// Create the state for a runner called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mutex: Mutex::new(),
            control: RawMutex::new(None),
        }
    }

    /// The runner's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The runner's own mutex.
    ///
    /// Guards whatever state the runner implementation shares with other
    /// threads; the substrate itself only takes it in
    /// [`continue_running`](RunnerState::continue_running).
    pub fn mutex(&self) -> &Mutex {
        &self.mutex
    }

    /// Whether the attached controller has been asked to stop.
    ///
    /// `true` when no controller is attached.
    pub fn continue_running(&self) -> bool {
        let _lock = Guard::new(&self.mutex);
        match self.control.lock().as_ref() {
            None => true,
            Some(control) => !control.is_stopping(),
        }
    }

    /// OS thread id recorded by the attached controller.
    pub fn thread_tid(&self) -> Option<i32> {
        self.control.lock().as_ref().and_then(|control| control.tid())
    }

    /// Whether a controller is currently attached.
    pub fn is_attached(&self) -> bool {
        self.control.lock().is_some()
    }

    pub(crate) fn attach(&self, control: Arc<ThreadControl>) -> Result<()> {
        let mut slot = self.control.lock();
        if slot.is_some() {
            return Err(Error::in_use(format!(
                "runner \"{}\" is already attached to a thread",
                self.name
            )));
        }
        *slot = Some(control);
        Ok(())
    }

    pub(crate) fn detach(&self) {
        *self.control.lock() = None;
    }
}
