//! Plugin manifest parsing and validation.
//!
//! A plugin manifest is a TOML file (`plugin.toml`) in the plugin's source
//! directory describing its identity, entry point, dependencies,
//! permissions, and declared capabilities.

use std::collections::BTreeMap;
use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};

use super::{PluginError, PluginResult};
use crate::security::PermissionSet;

/// Plugin manifest file name.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Plugin manifest containing metadata, dependencies, and grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Identity and entry point.
    pub metadata: PluginMetadata,
    /// Package or plugin name -> semver requirement string.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Permission grants; absent means deny everything.
    #[serde(default)]
    pub permissions: PermissionSet,
}

/// Plugin metadata section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Plugin name (unique identifier).
    pub name: String,
    /// Entry point of the form `module:Type`, resolved against the host's
    /// factory registry.
    pub entry_point: String,
    /// Plugin version (semver).
    #[serde(default = "default_version")]
    pub version: String,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Plugin author.
    #[serde(default)]
    pub author: Option<String>,
    /// Plugin description.
    #[serde(default)]
    pub description: Option<String>,
    /// Capability identifiers the plugin's code exercises, screened against
    /// the host deny-list before instantiation.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl PluginManifest {
    /// Parse a manifest from TOML string.
    pub fn from_toml(content: &str) -> PluginResult<Self> {
        toml::from_str(content).map_err(|e| PluginError::InvalidManifest(e.to_string()))
    }

    /// Parse a manifest from a file.
    pub fn from_file(path: &Path) -> PluginResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> PluginResult<String> {
        toml::to_string_pretty(self).map_err(|e| PluginError::InvalidManifest(e.to_string()))
    }

    /// Validate the manifest.
    pub fn validate(&self) -> PluginResult<()> {
        if self.metadata.name.is_empty() {
            return Err(PluginError::InvalidManifest("plugin name is required".to_string()));
        }

        if !self
            .metadata
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PluginError::InvalidManifest(
                "plugin name must contain only alphanumeric characters, hyphens, and underscores"
                    .to_string(),
            ));
        }

        if self.metadata.entry_point.is_empty() {
            return Err(PluginError::InvalidManifest(
                "plugin entry point is required".to_string(),
            ));
        }
        self.entry_point_parts()?;
        self.version()?;

        Ok(())
    }

    /// The manifest version parsed as semver.
    pub fn version(&self) -> PluginResult<Version> {
        Version::parse(&self.metadata.version).map_err(|e| {
            PluginError::InvalidManifest(format!(
                "version '{}' is not semver: {e}",
                self.metadata.version
            ))
        })
    }

    /// Split the entry point into its `(module, type)` parts.
    pub fn entry_point_parts(&self) -> PluginResult<(&str, &str)> {
        match self.metadata.entry_point.split_once(':') {
            Some((module, type_name)) if !module.is_empty() && !type_name.is_empty() => {
                Ok((module, type_name))
            }
            _ => Err(PluginError::InvalidEntryPoint {
                plugin: self.metadata.name.clone(),
                entry_point: self.metadata.entry_point.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_MANIFEST: &str = r#"
[metadata]
name = "counter"
entry_point = "counter:Counter"
version = "0.1.0"
title = "Counter"
author = "community"
description = "A shared counter with undo support"
capabilities = ["state.write", "events.publish"]

[dependencies]
gantry-api = ">=0.3, <0.4"

[permissions]
ui = true
state = { read = true, write = true, paths = ["counter.*"] }
events = { publish = true, topics = ["counter.*"] }
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = PluginManifest::from_toml(SAMPLE_MANIFEST).unwrap();

        assert_eq!(manifest.metadata.name, "counter");
        assert_eq!(manifest.metadata.entry_point, "counter:Counter");
        assert_eq!(manifest.dependencies["gantry-api"], ">=0.3, <0.4");
        assert!(manifest.permissions.ui);
        assert!(manifest.permissions.state.write);
        assert!(!manifest.permissions.events.subscribe);
        assert_eq!(manifest.metadata.capabilities, vec!["state.write", "events.publish"]);
    }

    #[test]
    fn test_validate_manifest() {
        let manifest = PluginManifest::from_toml(SAMPLE_MANIFEST).unwrap();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.version().unwrap(), Version::new(0, 1, 0));
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let toml = r#"
[metadata]
entry_point = "counter:Counter"
"#;
        assert!(matches!(
            PluginManifest::from_toml(toml),
            Err(PluginError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_missing_entry_point_is_rejected() {
        let toml = r#"
[metadata]
name = "counter"
"#;
        assert!(matches!(
            PluginManifest::from_toml(toml),
            Err(PluginError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_invalid_name_charset() {
        let toml = r#"
[metadata]
name = "bad name!"
entry_point = "m:T"
version = "1.0.0"
"#;
        let manifest = PluginManifest::from_toml(toml).unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_malformed_entry_point() {
        let toml = r#"
[metadata]
name = "p"
entry_point = "no-colon"
version = "1.0.0"
"#;
        let manifest = PluginManifest::from_toml(toml).unwrap();
        assert!(matches!(
            manifest.validate(),
            Err(PluginError::InvalidEntryPoint { .. })
        ));
    }

    #[test]
    fn test_non_semver_version() {
        let toml = r#"
[metadata]
name = "p"
entry_point = "m:T"
version = "not-a-version"
"#;
        let manifest = PluginManifest::from_toml(toml).unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_version_defaults_to_zero() {
        let toml = r#"
[metadata]
name = "p"
entry_point = "m:T"
"#;
        let manifest = PluginManifest::from_toml(toml).unwrap();
        assert_eq!(manifest.version().unwrap(), Version::new(0, 0, 0));
    }

    #[test]
    fn test_entry_point_parts() {
        let manifest = PluginManifest::from_toml(SAMPLE_MANIFEST).unwrap();
        assert_eq!(manifest.entry_point_parts().unwrap(), ("counter", "Counter"));
    }

    #[test]
    fn test_serialize_round_trip() {
        let manifest = PluginManifest::from_toml(SAMPLE_MANIFEST).unwrap();
        let serialized = manifest.to_toml().unwrap();
        assert!(serialized.contains("counter"));
        let reparsed = PluginManifest::from_toml(&serialized).unwrap();
        assert_eq!(reparsed.metadata.name, manifest.metadata.name);
    }
}
