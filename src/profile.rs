//! Application profile document.
//!
//! A profile is a TOML file declaring which plugins a shell instance loads
//! and how they are configured:
//!
//! ```toml
//! [profile]
//! title = "Demo bench"
//!
//! [config]
//! log_level = "info"
//!
//! [plugins]
//! local = ["plugins/counter", "plugins/listener"]
//!
//! [[plugins.git]]
//! url = "https://example.com/plugin.git"
//! reference = "main"
//!
//! [plugins.dependencies]
//! gantry-api = "^0.3"
//!
//! [plugin_configs.counter]
//! initial = 10
//! step = 2
//! ```
//!
//! Git sources are part of the schema but rejected at load time; fetching
//! remote plugins is outside this crate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Errors raised while reading a profile document.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Profile file not found.
    #[error("Profile not found: {0}")]
    NotFound(PathBuf),

    /// Malformed TOML.
    #[error("Failed to parse profile {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Profile metadata section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A version-controlled plugin source. Declared in the schema, rejected at
/// load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSource {
    pub url: String,
    #[serde(default = "default_reference")]
    pub reference: String,
}

fn default_reference() -> String {
    "main".to_string()
}

/// The `[plugins]` section: where plugins come from and which dependency
/// versions the profile pins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSources {
    /// Directories containing a `plugin.toml`.
    pub local: Vec<PathBuf>,
    /// Remote sources (schema only).
    pub git: Vec<GitSource>,
    /// Package name -> requirement override, taking precedence over the
    /// plugin's own declaration.
    pub dependencies: BTreeMap<String, String>,
}

/// A parsed application profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub profile: ProfileMetadata,
    /// Host configuration table (log level etc.).
    pub config: toml::Table,
    pub plugins: PluginSources,
    /// Per-plugin configuration tables, keyed by plugin name.
    pub plugin_configs: BTreeMap<String, toml::Table>,
}

impl Profile {
    /// Parse a profile from TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load a profile from disk, resolving relative local plugin paths
    /// against the profile's directory.
    pub fn load(path: &Path) -> ProfileResult<Self> {
        if !path.is_file() {
            return Err(ProfileError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut profile = Self::from_toml(&content).map_err(|e| ProfileError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if let Some(base) = path.parent() {
            for local in &mut profile.plugins.local {
                if local.is_relative() {
                    *local = base.join(&*local);
                }
            }
        }
        Ok(profile)
    }

    /// The configuration table for one plugin, empty if absent.
    pub fn plugin_config(&self, plugin: &str) -> toml::Table {
        self.plugin_configs.get(plugin).cloned().unwrap_or_default()
    }
}
