//! Managed threads: runner contract, controller, and RAII lifetime.
//!
//! A [`Runner`] is the user-supplied work body; a [`Thread`] is the
//! controller that starts it on an OS thread, bridges its failures back
//! to the joining caller, and joins it on [`stop`](Thread::stop). A
//! [`Life`] scopes the whole start/stop cycle to a block.

pub mod controller;
pub mod life;
pub mod runner;
pub mod sigmask;

// Re-export key types for easier access
pub use controller::Thread;
pub use life::Life;
pub use runner::{LeaveStatus, Runner, RunnerState};
