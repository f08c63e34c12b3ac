//! RAII scope for a thread's whole lifetime.
//!
//! A [`Life`] starts a [`Thread`] when it is created and stops it when
//! it goes out of scope, so the thread cannot outlive the block that
//! owns it.

use log::error;
use spindle_core::{Error, Result};

use super::controller::Thread;
use super::runner::Runner;

/// Starts a thread on construction, stops and joins it on drop.
///
/// ```ignore
/// {
///     let _life = Life::new(&thread)?;
///     // the thread runs for the rest of this block
/// }
/// // stopped and joined here
/// ```
///
/// A failure captured by the thread cannot be returned from a
/// destructor; it is logged instead. Call [`stop`](Life::stop) before
/// the end of the scope to receive it.
pub struct Life<'t, R: Runner> {
    thread: &'t Thread<R>,
}

impl<'t, R: Runner> Life<'t, R> {
    /// Start `thread` and build the scope that will stop it.
    ///
    /// Fails with [`Error::NotStarted`] when the thread refuses to
    /// start; the refusal reason was logged by the thread.
    pub fn new(thread: &'t Thread<R>) -> Result<Self> {
        if !thread.start() {
            return Err(Error::NotStarted(format!(
                "thread \"{}\" did not start",
                thread.name()
            )));
        }
        Ok(Self { thread })
    }

    /// Stop the thread now, consuming the scope.
    ///
    /// Returns the failure captured during the run cycle, which the
    /// drop-side stop could only log.
    pub fn stop(self) -> Result<()> {
        let thread = self.thread;
        std::mem::forget(self);
        thread.stop()
    }
}

impl<R: Runner> Drop for Life<'_, R> {
    fn drop(&mut self) {
        if let Err(err) = self.thread.stop() {
            error!(
                "thread \"{}\" reported an error at the end of its life: {}",
                self.thread.name(),
                err
            );
        }
    }
}
