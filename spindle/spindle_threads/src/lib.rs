#![deny(warnings)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Spindle Threads
//!
//! Thread primitives and worker-pool machinery for the spindle daemons.
//!
//! The crate is a low-level toolkit of four tightly coupled facilities:
//!
//! - A recursive [`Mutex`](sync::Mutex) with an attached condition
//!   variable and an RAII [`Guard`](sync::Guard).
//! - A thread-safe [`Fifo`](fifo::Fifo) with blocking, timed and
//!   non-blocking dequeue, producer shutdown signalling, and an optional
//!   per-item readiness predicate for dependency-aware dispatch.
//! - A managed thread, split into the [`Runner`](thread::Runner) work
//!   body and the [`Thread`](thread::Thread) controller, with failure
//!   capture across the thread boundary and an RAII
//!   [`Life`](thread::Life) scope.
//! - A [`Pool`](pool::Pool) of N workers consuming a shared input FIFO
//!   and optionally feeding an output FIFO.
//!
//! Shutdown is cooperative throughout: FIFOs are marked done, runners
//! poll [`continue_running`](thread::Runner::continue_running), and the
//! controllers join.
//!
//! The [`sys`] module adds the OS inspection helpers the spindle command
//! line tools are built on.

pub mod fifo;
pub mod pool;
pub mod sync;
pub mod sys;
pub mod thread;

// Re-export key types for easier access
pub use fifo::{Fifo, ItemWithPredicate, ValidWorkload};
pub use pool::{Pool, Worker};
pub use sync::{Guard, Mutex};
pub use thread::{Life, Runner, RunnerState, Thread};
