//! Entry-point factory registry.
//!
//! Manifests name their entry point as `module:Type`; the host resolves it
//! here instead of loading code from strings at runtime. Factories are
//! registered at startup (by the host binary or an embedding application),
//! so the set of constructible plugins is explicit and known before any
//! profile is read.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::context::{Plugin, PluginContext};
use super::PluginResult;

/// Builds plugin instances for one entry point.
pub trait PluginFactory: Send + Sync {
    /// Construct the plugin with its context.
    fn create(&self, context: PluginContext) -> PluginResult<Box<dyn Plugin>>;

    /// Capability identifiers the produced plugin exercises at runtime,
    /// screened against the host deny-list together with the manifest's
    /// declarations.
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Closure-backed [`PluginFactory`].
struct FnFactory<F> {
    capabilities: Vec<String>,
    build: F,
}

impl<F> PluginFactory for FnFactory<F>
where
    F: Fn(PluginContext) -> PluginResult<Box<dyn Plugin>> + Send + Sync,
{
    fn create(&self, context: PluginContext) -> PluginResult<Box<dyn Plugin>> {
        (self.build)(context)
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }
}

/// Registry mapping entry-point strings to plugin factories.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: Mutex<HashMap<String, Arc<dyn PluginFactory>>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under an entry point. The first registration
    /// wins; a duplicate is ignored with a warning.
    pub fn register(&self, entry_point: &str, factory: Arc<dyn PluginFactory>) {
        let mut factories = self.factories.lock();
        if factories.contains_key(entry_point) {
            warn!(entry_point, "factory already registered, keeping the first");
            return;
        }
        debug!(entry_point, "factory registered");
        factories.insert(entry_point.to_string(), factory);
    }

    /// Register a closure as a factory.
    pub fn register_fn<F>(&self, entry_point: &str, capabilities: &[&str], build: F)
    where
        F: Fn(PluginContext) -> PluginResult<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        self.register(
            entry_point,
            Arc::new(FnFactory {
                capabilities: capabilities.iter().map(ToString::to_string).collect(),
                build,
            }),
        );
    }

    /// Look up the factory for an entry point.
    pub fn resolve(&self, entry_point: &str) -> Option<Arc<dyn PluginFactory>> {
        self.factories.lock().get(entry_point).cloned()
    }

    /// Whether an entry point is registered.
    pub fn contains(&self, entry_point: &str) -> bool {
        self.factories.lock().contains_key(entry_point)
    }

    /// Number of registered entry points.
    pub fn len(&self) -> usize {
        self.factories.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.lock().is_empty()
    }
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRegistry").field("entries", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopPlugin;

    impl Plugin for NoopPlugin {
        fn on_load(&mut self) -> PluginResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = FactoryRegistry::new();
        registry.register_fn("noop:Noop", &[], |_| Ok(Box::new(NoopPlugin)));

        assert!(registry.contains("noop:Noop"));
        assert!(registry.resolve("noop:Noop").is_some());
        assert!(registry.resolve("missing:Type").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = FactoryRegistry::new();
        registry.register_fn("p:T", &["state.read"], |_| Ok(Box::new(NoopPlugin)));
        registry.register_fn("p:T", &["code.eval"], |_| Ok(Box::new(NoopPlugin)));

        let factory = registry.resolve("p:T").unwrap();
        assert_eq!(factory.capabilities(), vec!["state.read"]);
    }

    #[test]
    fn test_declared_capabilities() {
        let registry = FactoryRegistry::new();
        registry.register_fn("p:T", &["state.write", "events.publish"], |_| {
            Ok(Box::new(NoopPlugin))
        });

        let factory = registry.resolve("p:T").unwrap();
        assert_eq!(factory.capabilities(), vec!["state.write", "events.publish"]);
    }
}
