//! Bootstrap contract and optional bootstrap capabilities.
//!
//! A bootstrap builds the application instance a worker keeps for its whole
//! life. Beyond that single required operation, a bootstrap opts into extra
//! behavior by returning `Some` from the matching capability accessor. The
//! bridge queries each capability on its own, so any combination is valid.

use async_trait::async_trait;
use resident_core::{NativeRequest, NativeResponse, OutgoingResponse, RequestConstructor};
use resident_quarantine::{Ambient, RegistryError, StateResetRegistry};

use crate::env::EnvSettings;

/// Static directory reported when a bootstrap names none.
pub const DEFAULT_STATIC_DIRECTORY: &str = "./";

/// The resident application instance.
#[async_trait]
pub trait Application: Send {
    /// Handle one request.
    ///
    /// `ambient` carries side-channel headers, stray output and the session
    /// for this request only; the worker wipes it afterwards.
    async fn handle(
        &mut self,
        request: &NativeRequest,
        ambient: &mut Ambient,
    ) -> anyhow::Result<NativeResponse>;

    /// Post-response work capability.
    fn terminable(&mut self) -> Option<&mut dyn Terminable> {
        None
    }
}

/// Work an application runs after its response has been delivered.
pub trait Terminable {
    /// Called with the request and the response that went out.
    fn terminate(
        &mut self,
        request: &NativeRequest,
        response: &OutgoingResponse,
    ) -> anyhow::Result<()>;
}

/// What a bootstrap is told about the worker it runs in.
#[derive(Debug, Clone, Default)]
pub struct BootstrapContext {
    /// Application environment name, such as `prod` or `dev`.
    pub environment: String,
    /// Whether debug mode is on.
    pub debug: bool,
    /// Process settings read once at boot.
    pub settings: EnvSettings,
}

impl BootstrapContext {
    /// Create a context.
    pub fn new(environment: impl Into<String>, debug: bool, settings: EnvSettings) -> Self {
        Self {
            environment: environment.into(),
            debug,
            settings,
        }
    }
}

/// A bootstrap for one kind of hosted application.
pub trait Bootstrap: Send {
    /// Build the application instance.
    fn application(&mut self, ctx: &BootstrapContext) -> anyhow::Result<Box<dyn Application>>;

    /// Directory static assets are served from.
    fn static_directory(&self) -> &str {
        DEFAULT_STATIC_DIRECTORY
    }

    /// Environment-aware initialization capability.
    fn environment_aware(&mut self) -> Option<&mut dyn EnvironmentAware> {
        None
    }

    /// Request hooks capability.
    fn hooks(&mut self) -> Option<&mut dyn Hooks> {
        None
    }

    /// Custom request type capability.
    fn request_class(&self) -> Option<&dyn RequestClassProvider> {
        None
    }

    /// Middleware stacking capability.
    fn stackable(&self) -> Option<&dyn Stackable> {
        None
    }

    /// Subsystem reset registration capability.
    fn reset_provider(&self) -> Option<&dyn ResetProvider> {
        None
    }

    /// In-place rebuild capability.
    fn rebuildable(&mut self) -> Option<&mut dyn Rebuildable> {
        None
    }
}

/// Receives environment, debug flag and settings before the application is
/// built.
pub trait EnvironmentAware {
    /// Initialize from the boot context.
    fn initialize(&mut self, ctx: &BootstrapContext) -> anyhow::Result<()>;
}

/// Runs around every application invocation.
pub trait Hooks {
    /// Before the application handles `request`. An error fails the request.
    fn pre_handle(
        &mut self,
        app: &mut dyn Application,
        request: &NativeRequest,
    ) -> anyhow::Result<()>;

    /// After the response went out. An error is logged only.
    fn post_handle(
        &mut self,
        app: &mut dyn Application,
        request: &NativeRequest,
        response: &OutgoingResponse,
    ) -> anyhow::Result<()>;
}

/// Names the request type the application expects.
pub trait RequestClassProvider {
    /// Constructor used by the request mapper.
    fn request_constructor(&self) -> RequestConstructor;
}

/// Wraps the application in middleware.
pub trait Stackable {
    /// Return the wrapped application.
    fn stack(&self, app: Box<dyn Application>) -> Box<dyn Application>;
}

/// Registers reset actions for the application's stateful subsystems.
pub trait ResetProvider {
    /// Register every reset this application needs. Called once per build,
    /// after the application exists and before the registry is sealed.
    fn register_resets(&self, registry: &mut StateResetRegistry) -> Result<(), RegistryError>;
}

/// Lets a worker replace its application without restarting.
pub trait Rebuildable {
    /// Release the outgoing instance before a new one is built.
    fn release(&mut self, previous: Box<dyn Application>) -> anyhow::Result<()>;
}
