//! Plugin isolation boundary.
//!
//! Factory construction and the lifecycle hooks run inside this boundary:
//! a panicking plugin is reported as a [`PluginError::Panicked`] for that
//! plugin only and can never unwind into the manager. Capability
//! enforcement happens separately, at the [`super::PluginContext`] surface.
//!
//! This is in-process containment, not a security sandbox; running plugins
//! in a separate process or a WASM runtime would be the next isolation
//! level up.

use tracing::{debug, error};

use super::{PluginError, PluginResult};
use crate::fault::trap;

/// Containment wrapper for one plugin's hook invocations.
#[derive(Debug, Clone)]
pub struct IsolationBoundary {
    plugin: String,
}

impl IsolationBoundary {
    pub fn new(plugin: &str) -> Self {
        Self { plugin: plugin.to_string() }
    }

    /// Run `f` for the named lifecycle `phase`, converting a panic into a
    /// per-plugin error.
    pub fn run<T>(&self, phase: &str, f: impl FnOnce() -> PluginResult<T>) -> PluginResult<T> {
        debug!(plugin = self.plugin, phase, "entering isolation boundary");
        match trap(f) {
            Ok(result) => result,
            Err(message) => {
                error!(plugin = self.plugin, phase, panic = message, "plugin panicked");
                Err(PluginError::Panicked {
                    plugin: self.plugin.clone(),
                    phase: phase.to_string(),
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_through_success() {
        let boundary = IsolationBoundary::new("p");
        assert_eq!(boundary.run("on_load", || Ok(3)).unwrap(), 3);
    }

    #[test]
    fn test_passes_through_error() {
        let boundary = IsolationBoundary::new("p");
        let result: PluginResult<()> =
            boundary.run("on_load", || Err(PluginError::DuplicateName("p".to_string())));
        assert!(matches!(result, Err(PluginError::DuplicateName(_))));
    }

    #[test]
    fn test_contains_panic() {
        let boundary = IsolationBoundary::new("p");
        let result: PluginResult<()> = boundary.run("on_load", || panic!("plugin fault"));
        match result {
            Err(PluginError::Panicked { plugin, phase, message }) => {
                assert_eq!(plugin, "p");
                assert_eq!(phase, "on_load");
                assert_eq!(message, "plugin fault");
            }
            other => panic!("expected Panicked, got {other:?}"),
        }
    }
}
