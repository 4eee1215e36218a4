//! Request lifecycle tracking.

use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle phases for a request passing through the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Request received from the transport.
    Received,
    /// Native request built.
    Mapped,
    /// Pre-handle hook ran.
    PreHandled,
    /// Application returned a native response.
    Invoked,
    /// Outgoing response assembled (and streamed, if applicable).
    ResponseMapped,
    /// Application terminate capability ran.
    Terminated,
    /// Post-handle hook ran.
    PostHandled,
    /// Quarantine reset finished; the worker is clean again.
    Quarantined,
    /// An error occurred.
    Error(String),
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Mapped => write!(f, "mapped"),
            Self::PreHandled => write!(f, "pre_handled"),
            Self::Invoked => write!(f, "invoked"),
            Self::ResponseMapped => write!(f, "response_mapped"),
            Self::Terminated => write!(f, "terminated"),
            Self::PostHandled => write!(f, "post_handled"),
            Self::Quarantined => write!(f, "quarantined"),
            Self::Error(_) => write!(f, "error"),
        }
    }
}

/// Timing context for one request.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: Vec<(LifecyclePhase, Instant)>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: Vec::new(),
        }
    }

    /// Record that `phase` was reached.
    pub fn mark(&mut self, phase: LifecyclePhase) {
        self.marks.push((phase, Instant::now()));
    }

    /// Phases reached so far, in order.
    pub fn phases(&self) -> impl Iterator<Item = &LifecyclePhase> {
        self.marks.iter().map(|(p, _)| p)
    }

    /// The most recent phase.
    pub fn current(&self) -> Option<&LifecyclePhase> {
        self.marks.last().map(|(p, _)| p)
    }

    /// Time from start until `phase` was first reached.
    pub fn time_to(&self, phase: &LifecyclePhase) -> Option<Duration> {
        self.marks
            .iter()
            .find(|(p, _)| p == phase)
            .map(|(_, t)| t.duration_since(self.start))
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}
