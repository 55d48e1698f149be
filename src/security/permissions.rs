//! Plugin permission model.
//!
//! Permissions are declared in the manifest's `[permissions]` table and
//! evaluated synchronously before a sensitive context operation proceeds.
//! Everything is deny-by-default: an absent table grants nothing.
//!
//! ```toml
//! [permissions]
//! ui = true
//! state = { read = true, write = true, paths = ["counter.*"] }
//! events = { publish = true, subscribe = true, topics = ["counter.*"] }
//! fs = { read = true, paths = ["data/*"] }
//! net = { hosts = ["api.example.com"] }
//! ```
//!
//! A grant with an empty scope list applies to every key/topic/path; a
//! non-empty list restricts the grant to the listed glob patterns.

use serde::{Deserialize, Serialize};

use crate::state::glob_match;

/// A concrete capability a plugin requests at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Read a state key (or subscribe to a key pattern).
    StateRead(String),
    /// Write a state key.
    StateWrite(String),
    /// Publish on an event topic.
    EventPublish(String),
    /// Subscribe to an event topic (or topic pattern).
    EventSubscribe(String),
    /// Register views, menu actions, toolbar items, or status messages.
    Ui,
    /// Read a filesystem path.
    FsRead(String),
    /// Write a filesystem path.
    FsWrite(String),
    /// Open a network connection to a host.
    Net(String),
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StateRead(key) => write!(f, "state.read:{key}"),
            Self::StateWrite(key) => write!(f, "state.write:{key}"),
            Self::EventPublish(topic) => write!(f, "events.publish:{topic}"),
            Self::EventSubscribe(topic) => write!(f, "events.subscribe:{topic}"),
            Self::Ui => f.write_str("ui"),
            Self::FsRead(path) => write!(f, "fs.read:{path}"),
            Self::FsWrite(path) => write!(f, "fs.write:{path}"),
            Self::Net(host) => write!(f, "net:{host}"),
        }
    }
}

/// State store access grants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatePermissions {
    pub read: bool,
    pub write: bool,
    /// Key patterns the grant is scoped to; empty means all keys.
    pub paths: Vec<String>,
}

/// Event bus access grants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventPermissions {
    pub publish: bool,
    pub subscribe: bool,
    /// Topic patterns the grant is scoped to; empty means all topics.
    pub topics: Vec<String>,
}

/// Filesystem access grants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FsPermissions {
    pub read: bool,
    pub write: bool,
    /// Path patterns the grant is scoped to; empty means all paths.
    pub paths: Vec<String>,
}

/// Network access grants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetPermissions {
    /// Hosts the plugin may connect to; empty means no network at all.
    pub hosts: Vec<String>,
}

/// The full permission grant parsed from a plugin manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionSet {
    pub ui: bool,
    pub state: StatePermissions,
    pub events: EventPermissions,
    pub fs: FsPermissions,
    pub net: NetPermissions,
}

impl PermissionSet {
    /// Evaluate a requested capability against this grant.
    pub fn allows(&self, capability: &Capability) -> bool {
        match capability {
            Capability::StateRead(key) => self.state.read && in_scope(&self.state.paths, key),
            Capability::StateWrite(key) => {
                self.state.write && in_scope(&self.state.paths, key)
            }
            Capability::EventPublish(topic) => {
                self.events.publish && in_scope(&self.events.topics, topic)
            }
            Capability::EventSubscribe(topic) => {
                self.events.subscribe && in_scope(&self.events.topics, topic)
            }
            Capability::Ui => self.ui,
            Capability::FsRead(path) => self.fs.read && in_scope(&self.fs.paths, path),
            Capability::FsWrite(path) => self.fs.write && in_scope(&self.fs.paths, path),
            Capability::Net(host) => {
                self.net.hosts.iter().any(|pattern| glob_match(pattern, host))
            }
        }
    }
}

/// An empty scope list leaves the grant unrestricted.
fn in_scope(scopes: &[String], requested: &str) -> bool {
    scopes.is_empty() || scopes.iter().any(|pattern| glob_match(pattern, requested))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_denies_everything() {
        let perms = PermissionSet::default();
        assert!(!perms.allows(&Capability::Ui));
        assert!(!perms.allows(&Capability::StateRead("any".to_string())));
        assert!(!perms.allows(&Capability::EventPublish("any".to_string())));
        assert!(!perms.allows(&Capability::FsRead("any".to_string())));
        assert!(!perms.allows(&Capability::Net("example.com".to_string())));
    }

    #[test]
    fn test_unscoped_grant_covers_all_keys() {
        let perms: PermissionSet =
            toml::from_str("state = { read = true, write = true }").unwrap();
        assert!(perms.allows(&Capability::StateRead("a.b".to_string())));
        assert!(perms.allows(&Capability::StateWrite("anything".to_string())));
    }

    #[test]
    fn test_scoped_state_grant() {
        let perms: PermissionSet = toml::from_str(
            r#"state = { read = true, write = true, paths = ["counter.*"] }"#,
        )
        .unwrap();
        assert!(perms.allows(&Capability::StateWrite("counter.value".to_string())));
        assert!(!perms.allows(&Capability::StateWrite("other.value".to_string())));
        // Read and write share the scope list.
        assert!(perms.allows(&Capability::StateRead("counter.step".to_string())));
    }

    #[test]
    fn test_event_grants_are_independent() {
        let perms: PermissionSet = toml::from_str("events = { subscribe = true }").unwrap();
        assert!(perms.allows(&Capability::EventSubscribe("counter.*".to_string())));
        assert!(!perms.allows(&Capability::EventPublish("counter.changed".to_string())));
    }

    #[test]
    fn test_net_requires_listed_host() {
        let perms: PermissionSet =
            toml::from_str(r#"net = { hosts = ["*.example.com"] }"#).unwrap();
        assert!(perms.allows(&Capability::Net("api.example.com".to_string())));
        assert!(!perms.allows(&Capability::Net("evil.org".to_string())));

        // An empty host list means no network, not unrestricted network.
        let none: PermissionSet = toml::from_str("net = { hosts = [] }").unwrap();
        assert!(!none.allows(&Capability::Net("api.example.com".to_string())));
    }

    #[test]
    fn test_unknown_permission_key_is_rejected() {
        let parsed = toml::from_str::<PermissionSet>("telepathy = true");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(
            Capability::StateWrite("counter.value".to_string()).to_string(),
            "state.write:counter.value"
        );
        assert_eq!(Capability::Ui.to_string(), "ui");
    }
}
