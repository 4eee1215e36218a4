//! Quarantine errors.

use resident_session::SessionError;
use thiserror::Error;

/// Failure of a single reset step. Logged, never fatal.
#[derive(Error, Debug)]
pub enum ResetError {
    /// A registered reset action returned an error.
    #[error("reset of '{subsystem}' failed: {source:#}")]
    Action {
        subsystem: String,
        #[source]
        source: anyhow::Error,
    },

    /// A registered reset action panicked.
    #[error("reset of '{subsystem}' panicked")]
    Panicked { subsystem: String },

    /// The active session could not be written back.
    #[error("closing the session failed: {0}")]
    Session(#[from] SessionError),
}

/// Registry misuse. Only possible while the worker boots.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Resets may only be registered before the first request.
    #[error("reset registry is sealed; cannot register '{0}'")]
    Sealed(String),

    /// Each subsystem is registered once.
    #[error("a reset for '{0}' is already registered")]
    Duplicate(String),
}
