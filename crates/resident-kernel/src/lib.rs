//! Request bridge for resident applications.
//!
//! A long-running worker boots one application instance and serves every
//! request against it. This crate provides:
//! - Bootstrap contract with optional capabilities, and a registry of named
//!   bootstrap factories
//! - `ApplicationFactory` - resolves, initializes and builds applications
//! - `RequestMapper` / `ResponseMapper` - transport to native and back
//! - `Invoker` - calls the application with failures contained
//! - `StreamingSink` - head-first frame delivery to the transport
//! - `Bridge` - the per-worker request loop, quarantine included
//! - `WorkerConfig` - worker configuration file

mod bootstrap;
mod bridge;
mod config;
mod env;
mod error;
mod factory;
mod invoker;
mod mapper;
mod registry;
mod response;
mod sink;

pub use bootstrap::{
    Application, Bootstrap, BootstrapContext, EnvironmentAware, Hooks, Rebuildable,
    RequestClassProvider, ResetProvider, Stackable, Terminable, DEFAULT_STATIC_DIRECTORY,
};
pub use bridge::Bridge;
pub use config::{
    BootstrapConfig, ConfigError, LogFormat, LoggingConfig, UploadConfig, WorkerConfig,
    APP_DEBUG_VAR, APP_ENV_VAR,
};
pub use env::{
    EnvSettings, KERNEL_CLASS_VAR, KERNEL_NAMESPACE_VAR, TRUSTED_HOSTS_VAR, TRUSTED_PROXIES_VAR,
    VENDOR_DIR_VAR,
};
pub use error::{BootstrapError, RequestError, StreamError};
pub use factory::{ApplicationFactory, BootedApplication};
pub use invoker::Invoker;
pub use mapper::RequestMapper;
pub use registry::{BootstrapRegistry, BUILTIN_NAMESPACE};
pub use response::ResponseMapper;
pub use sink::StreamingSink;

// Re-export the crates applications are written against.
pub use async_trait::async_trait;
pub use resident_core;
pub use resident_quarantine;
pub use resident_session;
