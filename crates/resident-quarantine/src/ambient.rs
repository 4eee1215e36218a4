//! Ambient per-worker state lent to the application on every request.
//!
//! Hosted applications expect some state to be reachable without being passed
//! around: headers emitted directly rather than attached to a response, stray
//! output, and the current session. The bridge owns one [`Ambient`] per worker
//! and hands it to the application by `&mut` for the duration of a request;
//! the quarantine engine wipes it afterwards.

use resident_core::{header_names, Headers};
use resident_session::{SessionContext, SessionError};
use tracing::debug;

/// Output written by the application outside of a response body.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    buffer: Vec<u8>,
    open: bool,
    dropped: usize,
}

impl OutputBuffer {
    /// Create a closed, empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin capturing output.
    pub fn start(&mut self) {
        self.open = true;
    }

    /// Whether output is currently being captured.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Capture `bytes`. Writes while closed are counted and dropped.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.open {
            self.buffer.extend_from_slice(bytes);
        } else {
            self.dropped += bytes.len();
        }
    }

    /// Captured bytes so far.
    pub fn contents(&self) -> &[u8] {
        &self.buffer
    }

    /// Stop capturing and discard the contents. Returns the discarded length.
    pub fn end_clean(&mut self) -> usize {
        self.open = false;
        let discarded = self.buffer.len();
        self.buffer.clear();
        discarded
    }

    /// Bytes written while the buffer was closed.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Return to the closed, empty baseline.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.open = false;
        self.dropped = 0;
    }

    /// Whether the buffer is at its baseline.
    pub fn is_clean(&self) -> bool {
        !self.open && self.buffer.is_empty() && self.dropped == 0
    }
}

/// Ambient state: side-channel headers, stray output, and the session.
#[derive(Debug)]
pub struct Ambient {
    headers: Headers,
    output: OutputBuffer,
    session: SessionContext,
}

impl Ambient {
    /// Create ambient state around a session context.
    pub fn new(session: SessionContext) -> Self {
        Self {
            headers: Headers::new(),
            output: OutputBuffer::new(),
            session,
        }
    }

    /// Emit a header through the side channel, keeping earlier values.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.append(name, value);
    }

    /// Emit a header through the side channel, replacing earlier values.
    pub fn replace_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Emit a raw `Name: value` line.
    pub fn raw_header(&mut self, line: &str) {
        if !self.headers.append_raw(line) {
            debug!(line, "ignoring malformed side-channel header");
        }
    }

    /// Withdraw a side-channel header.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    /// Headers emitted so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Take every side-channel header, leaving none behind.
    pub fn take_headers(&mut self) -> Headers {
        std::mem::take(&mut self.headers)
    }

    /// Write stray output.
    pub fn echo(&mut self, text: &str) {
        self.output.write(text.as_bytes());
    }

    /// The output buffer.
    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// The output buffer, mutably.
    pub fn output_mut(&mut self) -> &mut OutputBuffer {
        &mut self.output
    }

    /// The session context.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// The session context, mutably.
    pub fn session_mut(&mut self) -> &mut SessionContext {
        &mut self.session
    }

    /// Start the session, emitting its cookie when the client lacks it.
    pub fn start_session(&mut self) -> Result<(), SessionError> {
        if let Some(cookie) = self.session.start()? {
            self.headers
                .append(header_names::SET_COOKIE, cookie.to_header_value()?);
        }
        Ok(())
    }

    /// Move the session to a fresh id and emit the new cookie.
    pub fn regenerate_session(&mut self, destroy_old: bool) -> Result<(), SessionError> {
        let cookie = self.session.regenerate(destroy_old)?;
        self.headers
            .append(header_names::SET_COOKIE, cookie.to_header_value()?);
        Ok(())
    }

    /// Whether nothing from a previous request is observable.
    pub fn is_pristine(&self) -> bool {
        self.headers.is_empty()
            && self.output.is_clean()
            && !self.session.is_active()
            && !self.session.has_identity()
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Headers, &mut OutputBuffer, &mut SessionContext) {
        (&mut self.headers, &mut self.output, &mut self.session)
    }
}
