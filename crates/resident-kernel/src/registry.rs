//! Named bootstrap factories and identifier resolution.

use std::collections::BTreeMap;
use std::fmt;

use crate::bootstrap::Bootstrap;
use crate::error::BootstrapError;

/// Namespace searched for short bootstrap names.
pub const BUILTIN_NAMESPACE: &str = "bootstraps";

type FactoryFn = Box<dyn Fn() -> Box<dyn Bootstrap> + Send + Sync>;

/// Bootstrap factories by fully qualified name.
#[derive(Default)]
pub struct BootstrapRegistry {
    factories: BTreeMap<String, FactoryFn>,
}

impl BootstrapRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any earlier registration.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Bootstrap> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    /// Builder form of [`BootstrapRegistry::register`].
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Bootstrap> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Names tried for `identifier`, in order.
    ///
    /// 1. the identifier as given
    /// 2. without leading separators, with doubled separators collapsed
    /// 3. under [`BUILTIN_NAMESPACE`] with the first letter uppercased
    pub fn candidates(identifier: &str) -> Vec<String> {
        let normalized = normalize(identifier);
        let builtin = format!("{}::{}", BUILTIN_NAMESPACE, capitalize(&normalized));

        let mut candidates = vec![identifier.to_string()];
        for candidate in [normalized, builtin] {
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    /// Resolve `identifier` to its registered name.
    pub fn resolve(&self, identifier: &str) -> Result<&str, BootstrapError> {
        let tried = Self::candidates(identifier);
        tried
            .iter()
            .find_map(|name| self.factories.get_key_value(name).map(|(k, _)| k.as_str()))
            .ok_or_else(|| BootstrapError::NotFound {
                identifier: identifier.to_string(),
                tried: tried.clone(),
            })
    }

    /// Resolve `identifier` and build a fresh bootstrap.
    pub fn create(&self, identifier: &str) -> Result<(String, Box<dyn Bootstrap>), BootstrapError> {
        let name = self.resolve(identifier)?;
        let factory = &self.factories[name];
        Ok((name.to_string(), factory()))
    }
}

impl fmt::Debug for BootstrapRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Accept `\` as a separator, drop leading separators and collapse runs.
fn normalize(identifier: &str) -> String {
    identifier
        .replace('\\', "::")
        .split("::")
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("::")
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
