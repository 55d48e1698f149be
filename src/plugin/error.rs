//! Plugin system error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that can occur during plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Plugin directory or manifest not found.
    #[error("Plugin not found: {0}")]
    NotFound(PathBuf),

    /// A plugin with this name is already loaded.
    #[error("Plugin '{0}' is already loaded")]
    DuplicateName(String),

    /// Invalid plugin manifest.
    #[error("Invalid plugin manifest: {0}")]
    InvalidManifest(String),

    /// A declared dependency is not installed and not provided.
    #[error("Plugin '{plugin}' requires '{dependency}' ({required}), which is not available")]
    MissingDependency { plugin: String, dependency: String, required: String },

    /// A declared dependency is present at an incompatible version.
    #[error(
        "Plugin '{plugin}' requires '{dependency}' {required}, but {installed} is installed"
    )]
    IncompatibleDependency {
        plugin: String,
        dependency: String,
        required: String,
        installed: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Dependency cycle involving plugins: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// The manifest's entry point is not `module:Type`.
    #[error("Plugin '{plugin}' has a malformed entry point '{entry_point}'")]
    InvalidEntryPoint { plugin: String, entry_point: String },

    /// No factory is registered for the manifest's entry point.
    #[error("Plugin '{plugin}' names entry point '{entry_point}', which is not registered")]
    UnknownEntryPoint { plugin: String, entry_point: String },

    /// The plugin declares capabilities on the deny-list.
    #[error("Plugin '{plugin}' declares denied capabilities: {}", .capabilities.join(", "))]
    CapabilityDenied { plugin: String, capabilities: Vec<String> },

    /// A context operation was attempted without the matching grant.
    #[error("Plugin '{plugin}' requires permission '{permission}' which is not granted")]
    PermissionDenied { plugin: String, permission: String },

    /// A lifecycle hook reported an error.
    #[error("Plugin '{plugin}' failed in {phase}: {message}")]
    Lifecycle { plugin: String, phase: String, message: String },

    /// A plugin panicked inside the isolation boundary.
    #[error("Plugin '{plugin}' panicked during {phase}: {message}")]
    Panicked { plugin: String, phase: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
