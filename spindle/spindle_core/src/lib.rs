#![deny(warnings)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Spindle Core
//!
//! Shared error and logging types for the spindle concurrency substrate.
//!
//! This crate defines the error taxonomy used across the spindle crates
//! and the process-wide logging sink the substrate reports through. It is
//! deliberately small: the thread primitives live in `spindle_threads`,
//! and the command line tools in `spindle_cli`.

pub mod error;
pub mod logging;

// Re-export key types for easier access
pub use error::{Error, Result};
pub use logging::{LogLevel, LogRecord};
