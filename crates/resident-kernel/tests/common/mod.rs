//! Shared fixture application for bridge integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use resident_kernel::resident_core::{
    IncomingRequest, NativeRequest, NativeResponse, OutgoingResponse, ResponseCookie, SameSite,
    StatusCode, StreamFrame,
};
use resident_kernel::resident_quarantine::{Ambient, RecordLog, RegistryError, StateResetRegistry};
use resident_kernel::resident_session::{MemorySessionStore, SessionSettings};
use resident_kernel::{
    async_trait, Application, ApplicationFactory, Bootstrap, BootstrapContext, BootstrapRegistry,
    Bridge, EnvSettings, Hooks, Rebuildable, ResetProvider, Stackable, Terminable, UploadConfig,
};

/// Knobs for the fixture bootstrap.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub fail_pre_handle: bool,
    pub fail_terminate: bool,
    pub broken_reset: bool,
    pub stacked: bool,
}

/// Observations shared between a test and the fixture.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    pub events: Arc<Mutex<Vec<String>>>,
    pub records: Arc<RecordLog<String>>,
    pub resets: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn resets(&self) -> Vec<String> {
        self.resets.lock().unwrap().clone()
    }

    fn event(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

pub struct FixtureBootstrap {
    options: Options,
    probe: Probe,
    builds: usize,
}

impl Bootstrap for FixtureBootstrap {
    fn application(&mut self, _ctx: &BootstrapContext) -> anyhow::Result<Box<dyn Application>> {
        self.builds += 1;
        Ok(Box::new(FixtureApp {
            options: self.options.clone(),
            probe: self.probe.clone(),
            build: self.builds,
        }))
    }

    fn hooks(&mut self) -> Option<&mut dyn Hooks> {
        Some(self)
    }

    fn stackable(&self) -> Option<&dyn Stackable> {
        self.options.stacked.then_some(self as &dyn Stackable)
    }

    fn reset_provider(&self) -> Option<&dyn ResetProvider> {
        Some(self)
    }

    fn rebuildable(&mut self) -> Option<&mut dyn Rebuildable> {
        Some(self)
    }
}

impl Hooks for FixtureBootstrap {
    fn pre_handle(
        &mut self,
        _app: &mut dyn Application,
        request: &NativeRequest,
    ) -> anyhow::Result<()> {
        self.probe.event(format!("pre {}", request.path()));
        anyhow::ensure!(!self.options.fail_pre_handle, "pre-handle refused");
        Ok(())
    }

    fn post_handle(
        &mut self,
        _app: &mut dyn Application,
        request: &NativeRequest,
        response: &OutgoingResponse,
    ) -> anyhow::Result<()> {
        self.probe
            .event(format!("post {} {}", request.path(), response.status.as_u16()));
        Ok(())
    }
}

impl Stackable for FixtureBootstrap {
    fn stack(&self, app: Box<dyn Application>) -> Box<dyn Application> {
        Box::new(PoweredBy { inner: app })
    }
}

impl ResetProvider for FixtureBootstrap {
    fn register_resets(&self, registry: &mut StateResetRegistry) -> Result<(), RegistryError> {
        let resets = self.probe.resets.clone();
        registry.register("first", move || {
            resets.lock().unwrap().push("first".to_string());
            Ok(())
        })?;
        if self.options.broken_reset {
            registry.register("broken", || anyhow::bail!("reset exploded"))?;
        }
        registry.register_resettable("records", self.probe.records.clone())?;
        let resets = self.probe.resets.clone();
        registry.register("last", move || {
            resets.lock().unwrap().push("last".to_string());
            Ok(())
        })
    }
}

impl Rebuildable for FixtureBootstrap {
    fn release(&mut self, _previous: Box<dyn Application>) -> anyhow::Result<()> {
        self.probe.event("released");
        Ok(())
    }
}

/// Middleware adding a header to every response.
struct PoweredBy {
    inner: Box<dyn Application>,
}

#[async_trait]
impl Application for PoweredBy {
    async fn handle(
        &mut self,
        request: &NativeRequest,
        ambient: &mut Ambient,
    ) -> anyhow::Result<NativeResponse> {
        let response = self.inner.handle(request, ambient).await?;
        Ok(response.with_header("X-Powered-By", "fixture"))
    }

    fn terminable(&mut self) -> Option<&mut dyn Terminable> {
        self.inner.terminable()
    }
}

pub struct FixtureApp {
    options: Options,
    probe: Probe,
    build: usize,
}

#[async_trait]
impl Application for FixtureApp {
    async fn handle(
        &mut self,
        request: &NativeRequest,
        ambient: &mut Ambient,
    ) -> anyhow::Result<NativeResponse> {
        self.probe.records.push(request.path().to_string());
        self.probe.event(format!("handle {}", request.path()));

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
            ("POST", "/keep") => {
                let destination = request.query("to").unwrap_or_default();
                for (_, file) in request.files() {
                    if let Some(file) = file {
                        file.move_to(Path::new(destination).join(&file.client_filename))
                            .await?;
                    }
                }
                NativeResponse::new(StatusCode::CREATED, "Kept")
            }
            ("POST", "/json") => NativeResponse::new(
                StatusCode::CREATED,
                format!("Received JSON: {}", request.body_text()),
            ),
            ("POST", "/form") => NativeResponse::ok(format!(
                "user={}",
                request.form("user").unwrap_or("-")
            )),
            ("GET", "/headers") => {
                ambient.header("X", "1");
                NativeResponse::ok("merged").with_header("X", "2")
            }
            ("GET", "/stream") => {
                let n: usize = request.query("n").and_then(|n| n.parse().ok()).unwrap_or(0);
                let chunks = (1..=n).map(|i| format!("part{}", i).into_bytes()).collect();
                NativeResponse::streamed_chunks(StatusCode::OK, chunks)
            }
            ("GET", "/session") => {
                ambient.start_session()?;
                let session = ambient.session_mut().active_mut()?;
                let visits = session.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
                session.insert("visits", visits);
                NativeResponse::ok(format!("{} {}", session.id().as_str(), visits))
            }
            ("GET", "/leak") => {
                ambient.header("X-Leak", "yes");
                ambient.start_session()?;
                ambient.echo("half-rendered page");
                anyhow::bail!("failed after touching ambient state")
            }
            ("GET", "/whoami") => {
                let identity = ambient
                    .session()
                    .current_id()
                    .map(|id| id.as_str().to_string())
                    .unwrap_or_else(|| "none".to_string());
                NativeResponse::ok(format!(
                    "identity={} active={} headers={} records={} build={}",
                    identity,
                    ambient.session().is_active(),
                    ambient.headers().len(),
                    self.probe.records.len(),
                    self.build,
                ))
            }
            ("GET", "/cookie") => NativeResponse::ok("cookie").with_cookie(
                ResponseCookie::new("pref", "compact")
                    .with_path("/")
                    .with_domain("shop.example")
                    .http_only()
                    .with_same_site(SameSite::Lax),
            ),
            ("GET", "/fail") => anyhow::bail!("handler failed"),
            ("GET", "/panic") => panic!("handler panicked"),
            _ => NativeResponse::new(StatusCode::NOT_FOUND, "Not Found"),
        };
        Ok(response)
    }

    fn terminable(&mut self) -> Option<&mut dyn Terminable> {
        Some(self)
    }
}

impl Terminable for FixtureApp {
    fn terminate(
        &mut self,
        request: &NativeRequest,
        _response: &OutgoingResponse,
    ) -> anyhow::Result<()> {
        self.probe.event(format!("terminate {}", request.path()));
        anyhow::ensure!(!self.options.fail_terminate, "terminate failed");
        Ok(())
    }
}

pub const FIXTURE: &str = "bootstraps::Fixture";

pub fn factory(options: Options, probe: Probe) -> ApplicationFactory {
    let registry = BootstrapRegistry::new().with(FIXTURE, move || {
        Box::new(FixtureBootstrap {
            options: options.clone(),
            probe: probe.clone(),
            builds: 0,
        })
    });
    ApplicationFactory::new(registry).with_settings(EnvSettings::default())
}

pub fn unconfigured(upload_dir: &Path) -> Bridge {
    let uploads = UploadConfig {
        temp_dir: Some(upload_dir.to_path_buf()),
        ..Default::default()
    };
    Bridge::new(
        SessionSettings::default(),
        uploads,
        Arc::new(MemorySessionStore::new()),
    )
}

pub fn bridge_with(upload_dir: &Path, options: Options) -> (Bridge, Probe) {
    let probe = Probe::default();
    let mut bridge = unconfigured(upload_dir);
    bridge
        .bootstrap(&factory(options, probe.clone()), "fixture", "test", false)
        .unwrap();
    (bridge, probe)
}

pub fn bridge(upload_dir: &Path) -> (Bridge, Probe) {
    bridge_with(upload_dir, Options::default())
}

/// Send a request, collecting any streamed frames.
pub async fn send(bridge: &mut Bridge, request: IncomingRequest) -> (OutgoingResponse, Vec<StreamFrame>) {
    let mut frames = Vec::new();
    let response = bridge.handle(request, &mut frames).await;
    (response, frames)
}

/// Send a request that is expected to produce a buffered response.
pub async fn get(bridge: &mut Bridge, request: IncomingRequest) -> OutgoingResponse {
    send(bridge, request).await.0
}

pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
