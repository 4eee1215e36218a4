//! Calls into the application with panics and errors contained.

use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::FutureExt;
use resident_core::{NativeRequest, NativeResponse, OutgoingResponse};
use resident_quarantine::Ambient;
use tracing::{debug, warn};

use crate::bootstrap::{Application, Hooks};
use crate::error::{panic_message, RequestError};

/// Invokes the application for one request.
#[derive(Debug, Default, Clone, Copy)]
pub struct Invoker;

impl Invoker {
    /// Create an invoker.
    pub fn new() -> Self {
        Self
    }

    /// Run the pre-handle hook.
    pub fn pre_handle(
        &self,
        hooks: &mut dyn Hooks,
        app: &mut dyn Application,
        request: &NativeRequest,
    ) -> Result<(), RequestError> {
        contain("pre_handle", || hooks.pre_handle(app, request))
    }

    /// Call the application.
    ///
    /// Stray output is captured for the duration of the call and discarded
    /// afterwards, whether the call succeeded or not.
    pub async fn invoke(
        &self,
        app: &mut dyn Application,
        request: &NativeRequest,
        ambient: &mut Ambient,
    ) -> Result<NativeResponse, RequestError> {
        ambient.output_mut().start();
        let outcome = AssertUnwindSafe(app.handle(request, ambient))
            .catch_unwind()
            .await;

        let discarded = ambient.output_mut().end_clean();
        if discarded > 0 {
            debug!(bytes = discarded, "discarded output written outside the response");
        }

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(RequestError::Handler(e)),
            Err(payload) => Err(RequestError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Run post-response work. Failures are logged only.
    pub fn terminate(
        &self,
        app: &mut dyn Application,
        request: &NativeRequest,
        response: &OutgoingResponse,
    ) {
        if let Some(terminable) = app.terminable() {
            if let Err(e) = contain("terminate", || terminable.terminate(request, response)) {
                warn!(error = %e, "terminate failed");
            }
        }
    }

    /// Run the post-handle hook. Failures are logged only.
    pub fn post_handle(
        &self,
        hooks: &mut dyn Hooks,
        app: &mut dyn Application,
        request: &NativeRequest,
        response: &OutgoingResponse,
    ) {
        if let Err(e) = contain("post_handle", || hooks.post_handle(app, request, response)) {
            warn!(error = %e, "post-handle hook failed");
        }
    }
}

fn contain<F>(hook: &'static str, f: F) -> Result<(), RequestError>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(RequestError::Hook { hook, source }),
        Err(payload) => Err(RequestError::Hook {
            hook,
            source: anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use resident_core::StatusCode;
    use resident_session::{MemorySessionStore, SessionContext, SessionSettings};
    use std::sync::Arc;

    enum Behavior {
        Respond,
        Fail,
        Panic,
    }

    struct Scripted(Behavior);

    #[async_trait]
    impl Application for Scripted {
        async fn handle(
            &mut self,
            _request: &NativeRequest,
            ambient: &mut Ambient,
        ) -> anyhow::Result<NativeResponse> {
            ambient.echo("debug dump");
            match self.0 {
                Behavior::Respond => Ok(NativeResponse::ok("done")),
                Behavior::Fail => anyhow::bail!("database unavailable"),
                Behavior::Panic => panic!("index out of range"),
            }
        }
    }

    fn ambient() -> Ambient {
        Ambient::new(SessionContext::new(
            SessionSettings::default(),
            Arc::new(MemorySessionStore::new()),
        ))
    }

    fn request() -> NativeRequest {
        NativeRequest::from_parts(Default::default())
    }

    #[tokio::test]
    async fn test_success_discards_stray_output() {
        let mut ambient = ambient();
        let response = Invoker::new()
            .invoke(&mut Scripted(Behavior::Respond), &request(), &mut ambient)
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert!(!ambient.output().is_open());
        assert!(ambient.output().contents().is_empty());
    }

    #[tokio::test]
    async fn test_error_is_contained() {
        let mut ambient = ambient();
        let err = Invoker::new()
            .invoke(&mut Scripted(Behavior::Fail), &request(), &mut ambient)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Handler(_)));
        assert!(!ambient.output().is_open());
        assert!(ambient.output().contents().is_empty());
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let mut ambient = ambient();
        let err = Invoker::new()
            .invoke(&mut Scripted(Behavior::Panic), &request(), &mut ambient)
            .await
            .unwrap_err();
        match err {
            RequestError::Panicked(message) => assert_eq!(message, "index out of range"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ambient.output().is_open());
    }

    #[test]
    fn test_contain_reports_hook_name() {
        let err = contain("pre_handle", || anyhow::bail!("denied")).unwrap_err();
        assert_eq!(err.to_string(), "Hook 'pre_handle' failed: denied");
    }
}
