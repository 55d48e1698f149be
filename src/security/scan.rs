//! Pre-instantiation capability screening.
//!
//! Before a plugin is instantiated, the manager checks its declared
//! capability surface — the manifest's `capabilities` list plus whatever
//! the registered factory declares — against a configurable deny-list of
//! dangerous capabilities. A plugin that declares a denied capability
//! never runs.

use std::collections::BTreeSet;

use tracing::warn;

/// Capabilities denied to plugins unless the host explicitly removes them.
pub const DEFAULT_DENIED: &[&str] = &["process.spawn", "fs.delete", "code.eval"];

/// A configurable deny-list screened against every plugin's declared
/// capability identifiers.
#[derive(Debug, Clone)]
pub struct DenyList {
    denied: BTreeSet<String>,
}

impl Default for DenyList {
    fn default() -> Self {
        Self { denied: DEFAULT_DENIED.iter().map(ToString::to_string).collect() }
    }
}

impl DenyList {
    /// An empty deny-list (screens nothing).
    pub fn permissive() -> Self {
        Self { denied: BTreeSet::new() }
    }

    /// Add a capability identifier to the deny-list.
    pub fn deny(&mut self, capability: &str) {
        self.denied.insert(capability.to_string());
    }

    /// Remove a capability identifier from the deny-list.
    pub fn allow(&mut self, capability: &str) {
        self.denied.remove(capability);
    }

    /// Screen a plugin's declared capabilities.
    ///
    /// Returns the denied identifiers that were declared, empty on pass.
    pub fn screen<'a>(
        &self,
        plugin: &str,
        declared: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        let offending: Vec<String> = declared
            .into_iter()
            .filter(|capability| self.denied.contains(*capability))
            .map(ToString::to_string)
            .collect();
        if !offending.is_empty() {
            warn!(plugin, capabilities = ?offending, "denied capabilities declared");
        }
        offending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_denies_dangerous_capabilities() {
        let deny = DenyList::default();
        let offending =
            deny.screen("p", ["state.read", "process.spawn", "code.eval"]);
        assert_eq!(offending, vec!["process.spawn", "code.eval"]);
    }

    #[test]
    fn test_clean_declaration_passes() {
        let deny = DenyList::default();
        assert!(deny.screen("p", ["state.read", "events.publish"]).is_empty());
    }

    #[test]
    fn test_host_can_adjust_list() {
        let mut deny = DenyList::default();
        deny.allow("process.spawn");
        deny.deny("net");

        assert!(deny.screen("p", ["process.spawn"]).is_empty());
        assert_eq!(deny.screen("p", ["net"]), vec!["net"]);
    }

    #[test]
    fn test_permissive_screens_nothing() {
        let deny = DenyList::permissive();
        assert!(deny.screen("p", ["code.eval"]).is_empty());
    }
}
