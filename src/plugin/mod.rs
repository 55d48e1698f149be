//! Plugin system for Gantry.
//!
//! Plugins are declared in a profile, described by a TOML manifest, and
//! constructed through factories registered at startup — the host never
//! loads code from strings at runtime.
//!
//! # Load pipeline
//!
//! 1. Discovery: each local source's `plugin.toml` is read and validated.
//! 2. Dependency resolution: requirements are semver-matched against
//!    loaded plugins and host-provided packages; plugin-to-plugin
//!    dependencies are topologically ordered, cycles are load errors.
//! 3. Entry-point resolution: `module:Type` is looked up in the
//!    [`FactoryRegistry`].
//! 4. Capability screening: declared capabilities are checked against the
//!    host deny-list.
//! 5. Instantiation and `on_load`, inside the [`IsolationBoundary`].
//!
//! A failure at any step aborts that plugin only.
//!
//! # Example manifest
//!
//! ```toml
//! [metadata]
//! name = "counter"
//! entry_point = "counter:Counter"
//! version = "0.1.0"
//!
//! [dependencies]
//! gantry-api = ">=0.3, <0.4"
//!
//! [permissions]
//! ui = true
//! state = { read = true, write = true, paths = ["counter.*"] }
//! ```

mod builtin;
mod context;
mod error;
mod manager;
mod manifest;
mod registry;
mod sandbox;

pub use builtin::register_builtin_factories;
pub use context::{Plugin, PluginContext};
pub use error::{PluginError, PluginResult};
pub use manager::{LoadReport, LoadedPlugin, PluginInfo, PluginManager, HOST_PACKAGE};
pub use manifest::{PluginManifest, PluginMetadata, MANIFEST_FILE};
pub use registry::{FactoryRegistry, PluginFactory};
pub use sandbox::IsolationBoundary;
