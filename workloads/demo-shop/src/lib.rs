//! Reference application served through the resident request bridge.
//!
//! This workload shows:
//! - A bootstrap using every optional capability except rebuilding
//! - Diagnostic subsystems shared with the reset registry
//! - Uploads, JSON bodies, sessions and streamed responses
//! - Side-channel headers merged with response headers
//!
//! Routes:
//! - `GET /get` - plain success
//! - `POST /upload` - lists uploaded filenames, `NULL` for empty fields
//! - `POST /json` - echoes the JSON body
//! - `GET /stream?chunks=N` - streams N chunks
//! - `GET /session` - counts visits in the session
//! - `GET /headers` - emits the same header through both channels
//! - `GET /profile/off` - disables the profiler for this request
//! - `GET /diagnostics` - reports diagnostic state
//! - `GET /fail`, `GET /panic` - application failures

use std::sync::Arc;

use resident_kernel::resident_core::{
    NativeRequest, NativeResponse, OutgoingResponse, RequestConstructor, RequestParts, StatusCode,
};
use resident_kernel::resident_quarantine::{
    Ambient, Profiler, RecordLog, RegistryError, StateResetRegistry, Stopwatch,
};
use resident_kernel::{
    async_trait, Application, Bootstrap, BootstrapContext, BootstrapRegistry, EnvironmentAware,
    Hooks, RequestClassProvider, ResetProvider, Terminable,
};
use tracing::{debug, info};

/// Registered name of the demo bootstrap.
pub const BOOTSTRAP_NAME: &str = "bootstraps::Demo";

/// Request flavour built for the demo application.
pub const REQUEST_CLASS: &str = "demo";

/// Default number of chunks for `/stream`.
const DEFAULT_CHUNKS: usize = 3;

/// Register the demo bootstrap.
pub fn register(registry: &mut BootstrapRegistry) {
    registry.register(BOOTSTRAP_NAME, || Box::new(DemoBootstrap::new()));
}

/// A registry holding only the demo bootstrap.
pub fn registry() -> BootstrapRegistry {
    let mut registry = BootstrapRegistry::new();
    register(&mut registry);
    registry
}

/// Diagnostic subsystems shared by the bootstrap and the application.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// Every route hit during the current request.
    pub queries: Arc<RecordLog<String>>,
    /// Request profiler.
    pub profiler: Arc<Profiler>,
    /// Time since the current request started.
    pub stopwatch: Arc<Stopwatch>,
}

/// Bootstrap for the demo application.
#[derive(Debug, Default)]
pub struct DemoBootstrap {
    diagnostics: Diagnostics,
    environment: Option<String>,
}

impl DemoBootstrap {
    /// Create a bootstrap with fresh diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared diagnostics.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

impl Bootstrap for DemoBootstrap {
    fn application(&mut self, _ctx: &BootstrapContext) -> anyhow::Result<Box<dyn Application>> {
        let Some(environment) = self.environment.clone() else {
            anyhow::bail!("demo bootstrap used before initialization");
        };
        Ok(Box::new(DemoApp {
            diagnostics: self.diagnostics.clone(),
            environment,
            terminated: 0,
        }))
    }

    fn static_directory(&self) -> &str {
        "public/"
    }

    fn environment_aware(&mut self) -> Option<&mut dyn EnvironmentAware> {
        Some(self)
    }

    fn hooks(&mut self) -> Option<&mut dyn Hooks> {
        Some(self)
    }

    fn request_class(&self) -> Option<&dyn RequestClassProvider> {
        Some(self)
    }

    fn reset_provider(&self) -> Option<&dyn ResetProvider> {
        Some(self)
    }
}

impl EnvironmentAware for DemoBootstrap {
    fn initialize(&mut self, ctx: &BootstrapContext) -> anyhow::Result<()> {
        info!(
            environment = %ctx.environment,
            debug = ctx.debug,
            kernel = ctx.settings.kernel_type().as_deref().unwrap_or("-"),
            "demo bootstrap initializing"
        );
        self.environment = Some(ctx.environment.clone());
        Ok(())
    }
}

impl Hooks for DemoBootstrap {
    fn pre_handle(
        &mut self,
        _app: &mut dyn Application,
        _request: &NativeRequest,
    ) -> anyhow::Result<()> {
        self.diagnostics.stopwatch.restart();
        Ok(())
    }

    fn post_handle(
        &mut self,
        _app: &mut dyn Application,
        request: &NativeRequest,
        response: &OutgoingResponse,
    ) -> anyhow::Result<()> {
        debug!(
            path = request.path(),
            status = response.status.as_u16(),
            elapsed_us = self.diagnostics.stopwatch.elapsed().as_micros() as u64,
            "demo request handled"
        );
        Ok(())
    }
}

fn demo_request(parts: RequestParts) -> NativeRequest {
    NativeRequest::with_class(REQUEST_CLASS, parts)
}

impl RequestClassProvider for DemoBootstrap {
    fn request_constructor(&self) -> RequestConstructor {
        demo_request
    }
}

impl ResetProvider for DemoBootstrap {
    fn register_resets(&self, registry: &mut StateResetRegistry) -> Result<(), RegistryError> {
        registry.register_resettable("queries", self.diagnostics.queries.clone())?;
        registry.register_resettable("profiler", self.diagnostics.profiler.clone())?;
        registry.register_resettable("stopwatch", self.diagnostics.stopwatch.clone())
    }
}

/// The demo application.
#[derive(Debug)]
pub struct DemoApp {
    diagnostics: Diagnostics,
    environment: String,
    terminated: u64,
}

#[async_trait]
impl Application for DemoApp {
    async fn handle(
        &mut self,
        request: &NativeRequest,
        ambient: &mut Ambient,
    ) -> anyhow::Result<NativeResponse> {
        self.diagnostics
            .queries
            .push(format!("{} {}", request.method(), request.path()));

        let response = match (request.method().as_str(), request.path()) {
            ("GET", "/get") => NativeResponse::ok("Success"),
            ("POST", "/upload") => {
                let names: Vec<&str> = request
                    .files()
                    .iter()
                    .map(|(_, file)| {
                        file.as_ref()
                            .map(|f| f.client_filename.as_str())
                            .unwrap_or("NULL")
                    })
                    .collect();
                NativeResponse::new(
                    StatusCode::CREATED,
                    format!("Uploaded files: {}", names.join(",")),
                )
            }
            ("POST", "/json") => {
                request.json()?;
                NativeResponse::new(
                    StatusCode::CREATED,
                    format!("Received JSON: {}", request.body_text()),
                )
            }
            ("GET", "/stream") => {
                let total = request
                    .query("chunks")
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(DEFAULT_CHUNKS);
                let mut next = 0;
                NativeResponse::streamed(StatusCode::OK, move || {
                    next += 1;
                    (next <= total).then(|| format!("chunk {}\n", next).into_bytes())
                })
                .with_header("Content-Type", "text/plain")
            }
            ("GET", "/session") => {
                ambient.start_session()?;
                let session = ambient.session_mut().active_mut()?;
                let visits = session.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
                session.insert("visits", visits);
                NativeResponse::ok(format!("Visits: {}", visits))
            }
            ("GET", "/headers") => {
                ambient.header("X-Demo", "ambient");
                NativeResponse::ok("Headers").with_header("X-Demo", "response")
            }
            ("GET", "/profile/off") => {
                self.diagnostics.profiler.disable();
                NativeResponse::ok("Profiler disabled")
            }
            ("GET", "/diagnostics") => {
                let report = serde_json::json!({
                    "environment": self.environment,
                    "class": request.class,
                    "queries": self.diagnostics.queries.len(),
                    "profiler": self.diagnostics.profiler.is_enabled(),
                    "terminated": self.terminated,
                });
                NativeResponse::ok(report.to_string()).with_header("Content-Type", "application/json")
            }
            ("GET", "/fail") => anyhow::bail!("demo failure requested"),
            ("GET", "/panic") => panic!("demo panic requested"),
            _ => NativeResponse::new(StatusCode::NOT_FOUND, "Not Found"),
        };

        ambient.echo("rendered by demo-shop");
        Ok(response)
    }

    fn terminable(&mut self) -> Option<&mut dyn Terminable> {
        Some(self)
    }
}

impl Terminable for DemoApp {
    fn terminate(
        &mut self,
        _request: &NativeRequest,
        _response: &OutgoingResponse,
    ) -> anyhow::Result<()> {
        self.terminated += 1;
        Ok(())
    }
}
