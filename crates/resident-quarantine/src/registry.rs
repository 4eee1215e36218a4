//! Ordered registry of subsystem reset actions.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{RegistryError, ResetError};

/// Public reset contract for a stateful subsystem shared with the application.
///
/// Implementations use interior mutability: the application keeps its own
/// handle and the registry holds another.
pub trait Resettable: Send + Sync {
    /// Return the subsystem to its clean baseline.
    fn reset(&self) -> anyhow::Result<()>;
}

type ResetFn = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// One named reset action.
pub struct ResetAction {
    subsystem: String,
    action: ResetFn,
}

impl ResetAction {
    /// Name of the subsystem this action targets.
    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    /// Run the action, turning errors and panics into [`ResetError`].
    pub fn run(&mut self) -> Result<(), ResetError> {
        match catch_unwind(AssertUnwindSafe(|| (self.action)())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ResetError::Action {
                subsystem: self.subsystem.clone(),
                source,
            }),
            Err(_) => Err(ResetError::Panicked {
                subsystem: self.subsystem.clone(),
            }),
        }
    }
}

impl fmt::Debug for ResetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetAction")
            .field("subsystem", &self.subsystem)
            .finish()
    }
}

/// Reset actions, in registration order.
///
/// Populated while the worker boots, then sealed: the set and order of
/// resets never changes once requests are being served.
#[derive(Debug, Default)]
pub struct StateResetRegistry {
    actions: Vec<ResetAction>,
    sealed: bool,
}

impl StateResetRegistry {
    /// Create an empty, unsealed registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reset closure for `subsystem`.
    pub fn register<F>(&mut self, subsystem: impl Into<String>, action: F) -> Result<(), RegistryError>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let subsystem = subsystem.into();
        if self.sealed {
            return Err(RegistryError::Sealed(subsystem));
        }
        if self.contains(&subsystem) {
            return Err(RegistryError::Duplicate(subsystem));
        }
        self.actions.push(ResetAction {
            subsystem,
            action: Box::new(action),
        });
        Ok(())
    }

    /// Register a shared [`Resettable`] handle for `subsystem`.
    pub fn register_resettable(
        &mut self,
        subsystem: impl Into<String>,
        target: Arc<dyn Resettable>,
    ) -> Result<(), RegistryError> {
        self.register(subsystem, move || target.reset())
    }

    /// Freeze the registry.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether the registry is frozen.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Whether `subsystem` has a registered reset.
    pub fn contains(&self, subsystem: &str) -> bool {
        self.actions.iter().any(|a| a.subsystem == subsystem)
    }

    /// Subsystem names in execution order.
    pub fn subsystems(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.subsystem.as_str()).collect()
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub(crate) fn actions_mut(&mut self) -> impl Iterator<Item = &mut ResetAction> {
        self.actions.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl Resettable for Counter {
        fn reset(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_registration_order_is_kept() {
        let mut registry = StateResetRegistry::new();
        registry.register("logger", || Ok(())).unwrap();
        registry.register("profiler", || Ok(())).unwrap();
        registry.register("query_log", || Ok(())).unwrap();
        assert_eq!(registry.subsystems(), vec!["logger", "profiler", "query_log"]);
    }

    #[test]
    fn test_sealed_registry_rejects_new_actions() {
        let mut registry = StateResetRegistry::new();
        registry.seal();
        assert_eq!(
            registry.register("late", || Ok(())),
            Err(RegistryError::Sealed("late".to_string()))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_subsystem_rejected() {
        let mut registry = StateResetRegistry::new();
        registry.register("logger", || Ok(())).unwrap();
        assert_eq!(
            registry.register("logger", || Ok(())),
            Err(RegistryError::Duplicate("logger".to_string()))
        );
    }

    #[test]
    fn test_resettable_handle() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut registry = StateResetRegistry::new();
        registry
            .register_resettable("counter", counter.clone())
            .unwrap();
        for action in registry.actions_mut() {
            action.run().unwrap();
        }
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_converts_errors_and_panics() {
        let mut registry = StateResetRegistry::new();
        registry
            .register("failing", || Err(anyhow::anyhow!("boom")))
            .unwrap();
        registry
            .register("panicking", || panic!("reset exploded"))
            .unwrap();
        let results: Vec<_> = registry.actions_mut().map(|a| a.run()).collect();
        assert!(matches!(&results[0], Err(ResetError::Action { subsystem, .. }) if subsystem == "failing"));
        assert!(matches!(&results[1], Err(ResetError::Panicked { subsystem }) if subsystem == "panicking"));
    }
}
