//! The request bridge.
//!
//! One [`Bridge`] per worker. It owns the application instance, the ambient
//! state lent to it, and the quarantine machinery that wipes that state
//! between requests. Every request goes through the same sequence:
//!
//! ```text
//! map -> pre_handle -> invoke -> map response -> terminate -> post_handle -> quarantine
//! ```
//!
//! Quarantine runs whatever happened before it, including when mapping or
//! the application failed.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

use futures::Sink;
use resident_core::{
    IncomingRequest, LifecyclePhase, NativeRequest, OutgoingResponse, RequestId, StreamFrame,
    TimingContext,
};
use resident_quarantine::{Ambient, QuarantineEngine, QuarantineReport, UploadJanitor};
use resident_session::{SessionContext, SessionSettings, SessionStore};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{UploadConfig, WorkerConfig};
use crate::error::{BootstrapError, RequestError};
use crate::factory::{ApplicationFactory, BootedApplication};
use crate::invoker::Invoker;
use crate::mapper::RequestMapper;
use crate::response::ResponseMapper;
use crate::sink::StreamingSink;

struct Configured {
    app: BootedApplication,
    mapper: RequestMapper,
}

/// Serves requests against one resident application instance.
pub struct Bridge {
    configured: Option<Configured>,
    ambient: Ambient,
    uploads: UploadJanitor,
    upload_config: UploadConfig,
    quarantine: QuarantineEngine,
    last_quarantine: Option<QuarantineReport>,
    served: u64,
}

impl Bridge {
    /// Create an unconfigured bridge.
    pub fn new(session: SessionSettings, uploads: UploadConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            configured: None,
            ambient: Ambient::new(SessionContext::new(session, store)),
            uploads: UploadJanitor::new(),
            upload_config: uploads,
            quarantine: QuarantineEngine::new(),
            last_quarantine: None,
            served: 0,
        }
    }

    /// Create an unconfigured bridge from worker configuration.
    pub fn from_config(config: &WorkerConfig, store: Arc<dyn SessionStore>) -> Self {
        Self::new(config.session.clone(), config.uploads.clone(), store)
    }

    /// Bootstrap the application named by `identifier`.
    ///
    /// On failure the bridge stays unconfigured and answers every request
    /// with a 500.
    pub fn bootstrap(
        &mut self,
        factory: &ApplicationFactory,
        identifier: &str,
        environment: &str,
        debug: bool,
    ) -> Result<(), BootstrapError> {
        match factory.create(identifier, environment, debug) {
            Ok(app) => {
                let mapper = RequestMapper::new(
                    app.request_constructor,
                    self.upload_config.clone(),
                    app.context.settings.trust.clone(),
                );
                self.configured = Some(Configured { app, mapper });
                Ok(())
            }
            Err(e) => {
                error!(identifier, error = %e, "bootstrap failed");
                self.configured = None;
                Err(e)
            }
        }
    }

    /// Rebuild the application in place. Only between requests.
    pub fn rebuild(&mut self, factory: &ApplicationFactory) -> Result<(), BootstrapError> {
        let configured = self
            .configured
            .as_mut()
            .ok_or(BootstrapError::NotBootstrapped)?;
        factory.rebuild(&mut configured.app)
    }

    /// Whether a bootstrap completed.
    pub fn is_configured(&self) -> bool {
        self.configured.is_some()
    }

    /// The bootstrapped application.
    pub fn application(&self) -> Option<&BootedApplication> {
        self.configured.as_ref().map(|c| &c.app)
    }

    /// Directory static assets are served from.
    pub fn static_directory(&self) -> Option<&str> {
        self.application().map(BootedApplication::static_directory)
    }

    /// Ambient state, as left by the last quarantine.
    pub fn ambient(&self) -> &Ambient {
        &self.ambient
    }

    /// Temporary uploads awaiting deletion.
    pub fn pending_uploads(&self) -> &[PathBuf] {
        self.uploads.pending()
    }

    /// Report of the most recent quarantine pass.
    pub fn last_quarantine(&self) -> Option<&QuarantineReport> {
        self.last_quarantine.as_ref()
    }

    /// Requests handled so far, failed ones included.
    pub fn requests_served(&self) -> u64 {
        self.served
    }

    /// Handle one request.
    ///
    /// Streamed bodies are pushed into `sink` frame by frame before this
    /// returns; buffered bodies are only in the returned response. Mapping
    /// and application failures become a generic 500.
    pub async fn handle<S, E>(&mut self, request: IncomingRequest, sink: S) -> OutgoingResponse
    where
        S: Sink<StreamFrame, Error = E> + Unpin,
        E: Display,
    {
        let request_id = RequestId::generate();
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
        );
        self.process(request, sink).instrument(span).await
    }

    async fn process<S, E>(&mut self, request: IncomingRequest, sink: S) -> OutgoingResponse
    where
        S: Sink<StreamFrame, Error = E> + Unpin,
        E: Display,
    {
        self.served += 1;
        let Some(configured) = self.configured.as_mut() else {
            warn!("request received before bootstrap completed");
            return OutgoingResponse::not_configured();
        };

        let mut timing = TimingContext::new();
        mark(&mut timing, LifecyclePhase::Received);

        let mut sink = StreamingSink::new(sink);
        let response = match serve(
            request,
            configured,
            &mut self.ambient,
            &mut self.uploads,
            &mut sink,
            &mut timing,
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "request failed");
                mark(&mut timing, LifecyclePhase::Error(e.to_string()));
                OutgoingResponse::internal_error()
            }
        };

        let report = self
            .quarantine
            .reset_all(&mut configured.app.resets, &mut self.ambient, &mut self.uploads)
            .await;
        if !report.is_clean() {
            warn!(failures = report.failures.len(), "quarantine finished with failures");
        }
        self.last_quarantine = Some(report);
        mark(&mut timing, LifecyclePhase::Quarantined);

        info!(
            status = response.status.as_u16(),
            streamed = response.is_streamed(),
            elapsed_ms = timing.elapsed().as_millis() as u64,
            "request complete"
        );
        response
    }
}

async fn serve<S, E>(
    request: IncomingRequest,
    configured: &mut Configured,
    ambient: &mut Ambient,
    uploads: &mut UploadJanitor,
    sink: &mut StreamingSink<S, E>,
    timing: &mut TimingContext,
) -> Result<OutgoingResponse, RequestError>
where
    S: Sink<StreamFrame, Error = E> + Unpin,
    E: Display,
{
    let Configured { app, mapper } = configured;
    let invoker = Invoker::new();

    let request: NativeRequest = mapper.map(request, ambient.session_mut(), uploads).await?;
    mark(timing, LifecyclePhase::Mapped);

    if let Some(hooks) = app.bootstrap.hooks() {
        invoker.pre_handle(hooks, app.application.as_mut(), &request)?;
    }
    mark(timing, LifecyclePhase::PreHandled);

    let native = invoker
        .invoke(app.application.as_mut(), &request, ambient)
        .await?;
    mark(timing, LifecyclePhase::Invoked);

    let response = ResponseMapper::new().map(native, ambient, sink).await;
    mark(timing, LifecyclePhase::ResponseMapped);

    invoker.terminate(app.application.as_mut(), &request, &response);
    mark(timing, LifecyclePhase::Terminated);

    if let Some(hooks) = app.bootstrap.hooks() {
        invoker.post_handle(hooks, app.application.as_mut(), &request, &response);
    }
    mark(timing, LifecyclePhase::PostHandled);

    Ok(response)
}

fn mark(timing: &mut TimingContext, phase: LifecyclePhase) {
    debug!(phase = %phase, "lifecycle");
    timing.mark(phase);
}
