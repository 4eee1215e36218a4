//! Error types for bootstrapping and request handling.

use resident_quarantine::RegistryError;

/// Failure while turning a bootstrap identifier into a running application.
///
/// Bootstrap failures are fatal for the worker: the caller logs them and
/// leaves the bridge unconfigured.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Bootstrap not found: tried {}", .tried.join(", "))]
    NotFound { identifier: String, tried: Vec<String> },

    #[error("Bootstrap '{name}' failed to initialize: {source}")]
    Initialization {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Bootstrap '{0}' does not support rebuilding")]
    RebuildUnsupported(String),

    #[error("Bridge has not been bootstrapped")]
    NotBootstrapped,

    #[error("Reset registration failed: {0}")]
    Registry(#[from] RegistryError),
}

/// Failure while serving one request. Every variant becomes a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Request mapping failed: {0}")]
    Mapping(#[from] std::io::Error),

    #[error("Hook '{hook}' failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Application failed: {0}")]
    Handler(#[source] anyhow::Error),

    #[error("Application panicked: {0}")]
    Panicked(String),

    #[error("Streaming failed: {0}")]
    Stream(#[from] StreamError),
}

/// Failure while pushing frames to the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Head not sent before data")]
    HeadNotSent,

    #[error("Head already sent")]
    HeadAlreadySent,

    #[error("Stream already completed")]
    Completed,

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Render a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
