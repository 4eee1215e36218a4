//! Turns a bootstrap identifier into a ready application instance.

use std::fmt;

use resident_core::{NativeRequest, RequestConstructor};
use resident_quarantine::StateResetRegistry;
use tracing::{debug, info};

use crate::bootstrap::{Application, Bootstrap, BootstrapContext};
use crate::env::EnvSettings;
use crate::error::BootstrapError;
use crate::registry::BootstrapRegistry;

/// A bootstrapped application with everything the bridge needs to serve it.
pub struct BootedApplication {
    /// Registered bootstrap name.
    pub name: String,
    /// Context the bootstrap was initialized with.
    pub context: BootstrapContext,
    pub(crate) bootstrap: Box<dyn Bootstrap>,
    pub(crate) application: Box<dyn Application>,
    pub(crate) resets: StateResetRegistry,
    pub(crate) request_constructor: RequestConstructor,
}

impl BootedApplication {
    /// Directory static assets are served from.
    pub fn static_directory(&self) -> &str {
        self.bootstrap.static_directory()
    }

    /// Subsystems with a registered reset, in order.
    pub fn reset_subsystems(&self) -> Vec<&str> {
        self.resets.subsystems()
    }
}

impl fmt::Debug for BootedApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootedApplication")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("resets", &self.resets)
            .finish()
    }
}

/// Builds applications from registered bootstraps.
#[derive(Debug, Default)]
pub struct ApplicationFactory {
    registry: BootstrapRegistry,
    settings: Option<EnvSettings>,
}

impl ApplicationFactory {
    /// Create a factory over `registry`. Settings come from the environment.
    pub fn new(registry: BootstrapRegistry) -> Self {
        Self {
            registry,
            settings: None,
        }
    }

    /// Use fixed settings instead of reading the environment.
    pub fn with_settings(mut self, settings: EnvSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// The bootstrap registry.
    pub fn registry(&self) -> &BootstrapRegistry {
        &self.registry
    }

    /// Resolve, initialize and build.
    ///
    /// Environment-aware bootstraps are initialized first. The application
    /// is then built, wrapped in middleware when the bootstrap stacks, and
    /// its reset actions are registered into a registry that is sealed
    /// before the application is returned.
    pub fn create(
        &self,
        identifier: &str,
        environment: &str,
        debug: bool,
    ) -> Result<BootedApplication, BootstrapError> {
        let (name, mut bootstrap) = self.registry.create(identifier)?;
        let settings = self.settings.clone().unwrap_or_else(EnvSettings::from_env);
        let context = BootstrapContext::new(environment, debug, settings);

        if let Some(aware) = bootstrap.environment_aware() {
            debug!(bootstrap = %name, "initializing environment-aware bootstrap");
            aware
                .initialize(&context)
                .map_err(|source| BootstrapError::Initialization {
                    name: name.clone(),
                    source,
                })?;
        }

        let (application, resets) = build(&name, bootstrap.as_mut(), &context)?;
        let request_constructor = bootstrap
            .request_class()
            .map(|provider| provider.request_constructor())
            .unwrap_or(NativeRequest::from_parts);

        info!(
            bootstrap = %name,
            environment = %context.environment,
            debug = context.debug,
            resets = resets.len(),
            "application bootstrapped"
        );

        Ok(BootedApplication {
            name,
            context,
            bootstrap,
            application,
            resets,
            request_constructor,
        })
    }

    /// Replace the application of `booted` with a freshly built one.
    ///
    /// The bootstrap releases the old instance first. Reset actions are
    /// registered anew against the new instance.
    pub fn rebuild(&self, booted: &mut BootedApplication) -> Result<(), BootstrapError> {
        let name = booted.name.clone();
        let Some(rebuildable) = booted.bootstrap.rebuildable() else {
            return Err(BootstrapError::RebuildUnsupported(name));
        };

        let previous = std::mem::replace(&mut booted.application, Box::new(Released));
        rebuildable
            .release(previous)
            .map_err(|source| BootstrapError::Initialization {
                name: name.clone(),
                source,
            })?;

        let (application, resets) = build(&name, booted.bootstrap.as_mut(), &booted.context)?;
        booted.application = application;
        booted.resets = resets;

        info!(bootstrap = %name, "application rebuilt");
        Ok(())
    }
}

fn build(
    name: &str,
    bootstrap: &mut dyn Bootstrap,
    context: &BootstrapContext,
) -> Result<(Box<dyn Application>, StateResetRegistry), BootstrapError> {
    let mut application =
        bootstrap
            .application(context)
            .map_err(|source| BootstrapError::Initialization {
                name: name.to_string(),
                source,
            })?;

    if let Some(stackable) = bootstrap.stackable() {
        application = stackable.stack(application);
    }

    let mut resets = StateResetRegistry::new();
    if let Some(provider) = bootstrap.reset_provider() {
        provider.register_resets(&mut resets)?;
    }
    resets.seal();

    Ok((application, resets))
}

/// Placeholder held while a rebuild is in progress.
struct Released;

#[async_trait::async_trait]
impl Application for Released {
    async fn handle(
        &mut self,
        _request: &NativeRequest,
        _ambient: &mut resident_quarantine::Ambient,
    ) -> anyhow::Result<resident_core::NativeResponse> {
        anyhow::bail!("application released for rebuild")
    }
}
