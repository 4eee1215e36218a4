//! Transport-neutral outgoing response.

use http::StatusCode;

use crate::headers::Headers;

/// Body sent when a request reaches a worker whose bootstrap never completed.
pub const NOT_CONFIGURED_BODY: &str = "Application not configured during bootstrap";

/// Body sent for every mapping or handler failure. Details only go to the log.
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// A frame pushed to the transport while a streamed response is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Status and headers. Always the first frame.
    Head {
        /// Status code.
        status: StatusCode,
        /// Response headers.
        headers: Headers,
    },
    /// One produced chunk.
    Data(Vec<u8>),
    /// No more data follows.
    End,
}

/// Body of an outgoing response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingBody {
    /// Complete body for the transport to write.
    Buffered(Vec<u8>),
    /// The body was already forwarded to the transport sink frame by frame.
    Streamed {
        /// Number of data frames delivered.
        chunks: usize,
        /// Total bytes delivered.
        bytes: usize,
        /// Whether the end frame was delivered. A transport seeing `false`
        /// must abort the connection rather than finish the body normally.
        complete: bool,
    },
}

/// A response as handed back to the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    /// Status code.
    pub status: StatusCode,
    /// Merged response headers.
    pub headers: Headers,
    /// Body.
    pub body: OutgoingBody,
}

impl OutgoingResponse {
    /// A buffered response.
    pub fn buffered(status: StatusCode, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body: OutgoingBody::Buffered(body),
        }
    }

    /// The generic failure response.
    pub fn internal_error() -> Self {
        Self::buffered(
            StatusCode::INTERNAL_SERVER_ERROR,
            Headers::new(),
            INTERNAL_ERROR_BODY.as_bytes().to_vec(),
        )
    }

    /// The response for a worker that was never bootstrapped.
    pub fn not_configured() -> Self {
        Self::buffered(
            StatusCode::INTERNAL_SERVER_ERROR,
            Headers::new(),
            NOT_CONFIGURED_BODY.as_bytes().to_vec(),
        )
    }

    /// Buffered body bytes, if the body is buffered.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            OutgoingBody::Buffered(bytes) => Some(bytes),
            OutgoingBody::Streamed { .. } => None,
        }
    }

    /// Buffered body as text, lossy. Empty for streamed bodies.
    pub fn body_text(&self) -> String {
        self.body_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    /// Whether the body went out as a stream.
    pub fn is_streamed(&self) -> bool {
        matches!(self.body, OutgoingBody::Streamed { .. })
    }
}
