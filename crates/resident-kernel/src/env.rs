//! Process environment read once at bootstrap.

use std::path::PathBuf;

use resident_core::TrustPolicy;
use tracing::warn;

/// Kernel namespace override.
pub const KERNEL_NAMESPACE_VAR: &str = "APP_KERNEL_NAMESPACE";
/// Kernel type name override.
pub const KERNEL_CLASS_VAR: &str = "APP_KERNEL_CLASS_NAME";
/// Comma-separated trusted proxy addresses.
pub const TRUSTED_PROXIES_VAR: &str = "TRUSTED_PROXIES";
/// Comma-separated trusted host names.
pub const TRUSTED_HOSTS_VAR: &str = "TRUSTED_HOSTS";
/// Location of the application's dependency directory.
pub const VENDOR_DIR_VAR: &str = "VENDOR_DIR";

/// Settings a bootstrap may consult while initializing.
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    /// Namespace the application kernel lives under.
    pub kernel_namespace: Option<String>,
    /// Name of the application kernel type.
    pub kernel_class: Option<String>,
    /// Proxy and host trust.
    pub trust: TrustPolicy,
    /// Dependency directory.
    pub vendor_dir: Option<PathBuf>,
}

impl EnvSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let (trust, rejected) = TrustPolicy::from_lists(
            get(TRUSTED_PROXIES_VAR).as_deref().unwrap_or(""),
            get(TRUSTED_HOSTS_VAR).as_deref().unwrap_or(""),
        );
        for entry in rejected {
            warn!(entry, "ignoring unparseable trusted proxy");
        }

        Self {
            kernel_namespace: get(KERNEL_NAMESPACE_VAR),
            kernel_class: get(KERNEL_CLASS_VAR),
            trust,
            vendor_dir: get(VENDOR_DIR_VAR).map(PathBuf::from),
        }
    }

    /// Kernel type name qualified with the namespace, if both are known.
    pub fn kernel_type(&self) -> Option<String> {
        let class = self.kernel_class.as_deref()?;
        Some(match self.kernel_namespace.as_deref() {
            Some(ns) => format!("{}::{}", ns.trim_end_matches("::"), class),
            None => class.to_string(),
        })
    }
}
