//! The application shell: owns the shared runtime and wires profile
//! loading, plugin lifecycles, and the host surface together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::bus::EventBus;
use crate::host::HeadlessHost;
use crate::plugin::{FactoryRegistry, LoadReport, PluginManager};
use crate::profile::ProfileResult;
use crate::state::StateManager;

/// Derive the view-state file path for a profile: `<stem>.view.json` next
/// to the profile document.
pub fn view_state_path(profile_path: &Path) -> PathBuf {
    let stem = profile_path.file_stem().and_then(|s| s.to_str()).unwrap_or("profile");
    profile_path.with_file_name(format!("{stem}.view.json"))
}

/// A headless shell instance: one state store, one event bus, one host
/// surface, and the plugin manager tying them together.
pub struct Shell {
    state: Arc<StateManager>,
    bus: Arc<EventBus>,
    host: Arc<HeadlessHost>,
    factories: Arc<FactoryRegistry>,
    plugins: PluginManager,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    /// Shell with an empty factory registry.
    pub fn new() -> Self {
        Self::with_factories(Arc::new(FactoryRegistry::new()))
    }

    /// Shell using an already-populated factory registry.
    pub fn with_factories(factories: Arc<FactoryRegistry>) -> Self {
        let state = Arc::new(StateManager::new());
        let bus = Arc::new(EventBus::new());
        let host = Arc::new(HeadlessHost::new());
        let plugins =
            PluginManager::new(state.clone(), bus.clone(), host.clone(), factories.clone());
        info!("shell initialized");
        Self { state, bus, host, factories, plugins }
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn host(&self) -> &Arc<HeadlessHost> {
        &self.host
    }

    pub fn factories(&self) -> &Arc<FactoryRegistry> {
        &self.factories
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    /// Load every plugin the profile declares.
    pub fn load_profile(&self, path: &Path) -> ProfileResult<LoadReport> {
        self.plugins.load_profile(path)
    }

    /// Restore the saved view set for `profile_path`, falling back to
    /// opening every declared view.
    pub fn restore_views(&self, profile_path: &Path) {
        if !self.host.load_view_state(&view_state_path(profile_path)) {
            info!("no saved view state, opening all declared views");
            self.host.open_all_views();
        }
    }

    /// Persist the open-view set for `profile_path`.
    pub fn save_views(&self, profile_path: &Path) -> std::io::Result<()> {
        self.host.save_view_state(&view_state_path(profile_path))
    }

    /// Unload every plugin, in reverse load order.
    pub fn shutdown(&self) {
        info!("shell shutting down");
        self.plugins.unload_all();
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("plugins", &self.plugins)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_state_path() {
        assert_eq!(
            view_state_path(Path::new("/tmp/bench.toml")),
            PathBuf::from("/tmp/bench.view.json")
        );
    }

    #[test]
    fn test_shell_wiring() {
        let shell = Shell::new();
        assert_eq!(shell.plugins().count(), 0);
        assert!(shell.factories().is_empty());

        shell.state().set("app.ready", serde_json::json!(true), None);
        assert_eq!(shell.state().get("app.ready"), Some(serde_json::json!(true)));
    }
}
