//! Stateful diagnostic subsystems with a public reset contract.
//!
//! Applications share these with the bootstrap through `Arc`; the bootstrap
//! registers the same handles in the reset registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::registry::Resettable;

/// Accumulates records during a request: log lines, executed queries, sent
/// mail, collected events.
#[derive(Debug, Default)]
pub struct RecordLog<T> {
    records: Mutex<Vec<T>>,
}

impl<T: Clone + Send> RecordLog<T> {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Append a record.
    pub fn push(&self, record: T) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    /// Copy of every record.
    pub fn records(&self) -> Vec<T> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send> Resettable for RecordLog<T> {
    fn reset(&self) -> anyhow::Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("record log lock poisoned"))?
            .clear();
        Ok(())
    }
}

/// A profiler the application may switch off for a single request.
///
/// Disabling is meant to last one request only; reset turns it back on.
#[derive(Debug)]
pub struct Profiler {
    enabled: AtomicBool,
}

impl Profiler {
    /// Create an enabled profiler.
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    /// Turn profiling on.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Turn profiling off.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Whether profiling is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resettable for Profiler {
    fn reset(&self) -> anyhow::Result<()> {
        self.enable();
        Ok(())
    }
}

/// Measures elapsed time from the start of the current request.
#[derive(Debug)]
pub struct Stopwatch {
    started: Mutex<Instant>,
}

impl Stopwatch {
    /// Create a running stopwatch.
    pub fn new() -> Self {
        Self {
            started: Mutex::new(Instant::now()),
        }
    }

    /// Restart from now.
    pub fn restart(&self) {
        if let Ok(mut started) = self.started.lock() {
            *started = Instant::now();
        }
    }

    /// Time since the last restart.
    pub fn elapsed(&self) -> Duration {
        self.started
            .lock()
            .map(|s| s.elapsed())
            .unwrap_or_default()
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Resettable for Stopwatch {
    fn reset(&self) -> anyhow::Result<()> {
        self.restart();
        Ok(())
    }
}
