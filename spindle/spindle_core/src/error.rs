//! Error types for the spindle substrate.
//!
//! This module defines the error taxonomy shared by the spindle crates.
//! The contract-violation kinds (`Logic`, `InUse`, `Invalid`) are raised
//! by constructors and attachment points; the lock kinds (`NotLocked`,
//! `NotLockedOnce`, `MutexFailed`) by the mutex operations; `NotStarted`
//! by the thread-life scope; `System` when an underlying syscall fails.

use thiserror::Error;

/// Result alias used throughout the spindle crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the spindle substrate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A programmer contract was violated at an API boundary
    #[error("logic error: {0}")]
    Logic(String),

    /// A resource that supports only one owner is already attached
    #[error("already in use: {0}")]
    InUse(String),

    /// A parameter was out of range or an underlying primitive misbehaved
    #[error("invalid: {0}")]
    Invalid(String),

    /// Unlock was called more times than lock
    #[error("not locked: {0}")]
    NotLocked(String),

    /// A wait was attempted without holding the mutex
    #[error("not locked once: {0}")]
    NotLockedOnce(String),

    /// A condition wait reported a fault other than a timeout
    #[error("mutex failed: {0}")]
    MutexFailed(String),

    /// A managed thread could not be started
    #[error("not started: {0}")]
    NotStarted(String),

    /// An underlying system call failed
    #[error("system error: {0}")]
    System(String),

    /// A runner body failed while executing on its thread
    #[error("runner failed: {0}")]
    Runner(String),
}

impl Error {
    /// Shorthand for a [`Error::Logic`] with a formatted message.
    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    /// Shorthand for a [`Error::Invalid`] with a formatted message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Shorthand for a [`Error::InUse`] with a formatted message.
    pub fn in_use(message: impl Into<String>) -> Self {
        Self::InUse(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid("pool size must be between 1 and 1000");
        assert_eq!(
            err.to_string(),
            "invalid: pool size must be between 1 and 1000"
        );

        let err = Error::InUse("runner \"worker\"".to_string());
        assert_eq!(err.to_string(), "already in use: runner \"worker\"");
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(Error::logic("x"), Error::Logic("x".to_string()));
        assert_ne!(Error::logic("x"), Error::invalid("x"));
    }
}
