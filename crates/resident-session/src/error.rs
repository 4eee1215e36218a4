//! Session errors.

use thiserror::Error;

/// Session error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The operation needs a started session.
    #[error("no session has been started for this request")]
    NotStarted,

    /// The backing store failed.
    #[error("session store error: {0}")]
    Store(String),

    /// Session data could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session cookie could not be serialized.
    #[error("session cookie error: {0}")]
    Cookie(#[from] resident_core::CookieError),
}
