//! The quarantine engine.

use tracing::{debug, warn};

use crate::ambient::Ambient;
use crate::error::ResetError;
use crate::janitor::{SweepReport, UploadJanitor};
use crate::registry::StateResetRegistry;

/// What a quarantine pass did.
#[derive(Debug, Default)]
pub struct QuarantineReport {
    /// Registered actions executed (successful or not).
    pub actions_run: usize,
    /// Every step that failed. None of them stopped the pass.
    pub failures: Vec<ResetError>,
    /// Whether an open session was closed.
    pub session_closed: bool,
    /// Upload cleanup outcome.
    pub uploads: SweepReport,
    /// Stray output bytes discarded.
    pub output_discarded: usize,
    /// Side-channel headers discarded (left behind by a failed request).
    pub headers_discarded: usize,
}

impl QuarantineReport {
    /// Whether every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.uploads.failed == 0
    }
}

/// Returns the worker to its between-requests baseline.
///
/// Runs after every request whatever its outcome. Registered actions run
/// first, in registration order, then the built-in resets: session close and
/// detach, session identity back to the placeholder, temporary upload
/// deletion, ambient output and header wipe. No failing step stops the
/// steps after it.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuarantineEngine;

impl QuarantineEngine {
    /// Create an engine.
    pub fn new() -> Self {
        Self
    }

    /// Run every reset.
    pub async fn reset_all(
        &self,
        registry: &mut StateResetRegistry,
        ambient: &mut Ambient,
        uploads: &mut UploadJanitor,
    ) -> QuarantineReport {
        let mut report = QuarantineReport::default();

        for action in registry.actions_mut() {
            report.actions_run += 1;
            if let Err(e) = action.run() {
                warn!(subsystem = action.subsystem(), error = %e, "reset action failed");
                report.failures.push(e);
            }
        }

        let (headers, output, session) = ambient.parts_mut();

        match session.close() {
            Ok(closed) => report.session_closed = closed,
            Err(e) => {
                warn!(error = %e, "closing session during quarantine failed");
                report.failures.push(ResetError::Session(e));
            }
        }
        session.invalidate();

        report.uploads = uploads.sweep().await;

        report.output_discarded = output.contents().len();
        output.clear();

        report.headers_discarded = headers.len();
        headers.clear();

        debug!(
            actions = report.actions_run,
            failures = report.failures.len(),
            uploads = report.uploads.total(),
            "quarantine complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resident_session::{MemorySessionStore, SessionContext, SessionId, SessionSettings, SessionStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn ambient_with(store: Arc<MemorySessionStore>) -> Ambient {
        Ambient::new(SessionContext::new(SessionSettings::default(), store))
    }

    #[tokio::test]
    async fn test_actions_run_in_order_despite_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = StateResetRegistry::new();
        for name in ["first", "broken", "third"] {
            let log = log.clone();
            registry
                .register(name, move || {
                    log.lock().unwrap().push(name);
                    if name == "broken" {
                        anyhow::bail!("subsystem missing");
                    }
                    Ok(())
                })
                .unwrap();
        }

        let mut ambient = ambient_with(Arc::new(MemorySessionStore::new()));
        let mut uploads = UploadJanitor::new();
        let report = QuarantineEngine::new()
            .reset_all(&mut registry, &mut ambient, &mut uploads)
            .await;

        assert_eq!(*log.lock().unwrap(), vec!["first", "broken", "third"]);
        assert_eq!(report.actions_run, 3);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_builtin_resets() {
        let store = Arc::new(MemorySessionStore::new());
        let mut ambient = ambient_with(store.clone());
        ambient.session_mut().prime(Some("abc"));
        ambient.start_session().unwrap();
        ambient
            .session_mut()
            .active_mut()
            .unwrap()
            .insert("cart", 3);
        ambient.output_mut().start();
        ambient.echo("stray");
        ambient.header("X-Leak", "1");

        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("upload");
        std::fs::write(&upload, b"data").unwrap();
        let mut uploads = UploadJanitor::new();
        uploads.track(&upload);

        let mut registry = StateResetRegistry::new();
        let report = QuarantineEngine::new()
            .reset_all(&mut registry, &mut ambient, &mut uploads)
            .await;

        assert!(report.session_closed);
        assert_eq!(report.uploads.removed, 1);
        assert_eq!(report.output_discarded, 5);
        assert_eq!(report.headers_discarded, 1);
        assert!(ambient.is_pristine());
        assert!(!upload.exists());

        let saved = store.load(&SessionId::new("abc")).unwrap().unwrap();
        assert_eq!(saved.get("cart"), Some(&serde_json::Value::from(3)));
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let resets = Arc::new(AtomicUsize::new(0));
        let mut registry = StateResetRegistry::new();
        let counter = resets.clone();
        registry
            .register("accumulator", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        registry.seal();

        let mut ambient = ambient_with(Arc::new(MemorySessionStore::new()));
        ambient.session_mut().prime(Some("abc"));
        ambient.header("X", "1");
        let mut uploads = UploadJanitor::new();
        let engine = QuarantineEngine::new();

        engine.reset_all(&mut registry, &mut ambient, &mut uploads).await;
        assert!(ambient.is_pristine());

        let second = engine.reset_all(&mut registry, &mut ambient, &mut uploads).await;
        assert!(ambient.is_pristine());
        assert!(second.is_clean());
        assert!(!second.session_closed);
        assert_eq!(second.uploads.total(), 0);
        assert_eq!(second.headers_discarded, 0);
        assert_eq!(registry.subsystems(), vec!["accumulator"]);
    }
}
