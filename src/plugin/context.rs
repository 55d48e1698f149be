//! The plugin contract and the capability bundle each plugin receives.
//!
//! A plugin never touches the shared runtime directly: every state, event,
//! and UI operation goes through its [`PluginContext`], which evaluates the
//! manifest's permission grant before delegating. The context is built once
//! per plugin at load time and lives exactly as long as the instance.

use std::sync::Arc;
use std::time::Duration;

use semver::Version;
use serde_json::Value;
use tracing::debug;

use super::{PluginError, PluginResult};
use crate::bus::{EventBus, Handler};
use crate::host::{HostShell, MenuAction, ToolbarItem, ViewDeclaration};
use crate::security::{Capability, PermissionSet};
use crate::state::{ChangeHandler, StateManager};

/// The lifecycle interface every plugin implements.
///
/// `on_load` performs all of a plugin's subscriptions and registrations.
/// `on_unload` reverses the global (non-widget-bound) subscriptions;
/// widget-bound ones are torn down by the host when the view closes.
pub trait Plugin: Send {
    /// Called once after instantiation. An error (or panic) here aborts the
    /// plugin's registration.
    fn on_load(&mut self) -> PluginResult<()>;

    /// Called once before the plugin is discarded, in reverse load order.
    fn on_unload(&mut self) {}
}

/// Immutable capability bundle handed to a plugin at construction.
pub struct PluginContext {
    name: String,
    version: Version,
    config: toml::Table,
    permissions: PermissionSet,
    state: Arc<StateManager>,
    bus: Arc<EventBus>,
    host: Arc<dyn HostShell>,
}

impl PluginContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        version: Version,
        config: toml::Table,
        permissions: PermissionSet,
        state: Arc<StateManager>,
        bus: Arc<EventBus>,
        host: Arc<dyn HostShell>,
    ) -> Self {
        Self { name: name.to_string(), version, config, permissions, state, bus, host }
    }

    /// The plugin's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The plugin's manifest version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Look up a value in the plugin's profile configuration by dotted key.
    pub fn config(&self, key: &str) -> Option<toml::Value> {
        let mut segments = key.split('.');
        let first = segments.next()?;
        let mut current = self.config.get(first)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }
        Some(current.clone())
    }

    /// Typed configuration lookup with a fallback.
    pub fn config_or<T: serde::de::DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.config(key) {
            Some(value) => value.try_into().unwrap_or(default),
            None => default,
        }
    }

    /// Whether the plugin's grant covers `capability`.
    pub fn has_permission(&self, capability: &Capability) -> bool {
        self.permissions.allows(capability)
    }

    /// Evaluate `capability` against the grant, erroring on denial.
    pub fn check(&self, capability: &Capability) -> PluginResult<()> {
        if self.permissions.allows(capability) {
            Ok(())
        } else {
            debug!(plugin = self.name, capability = %capability, "permission denied");
            Err(PluginError::PermissionDenied {
                plugin: self.name.clone(),
                permission: capability.to_string(),
            })
        }
    }

    /// Read a state value. Requires `state.read` for the key.
    pub fn get_state(&self, key: &str) -> PluginResult<Option<Value>> {
        self.check(&Capability::StateRead(key.to_string()))?;
        Ok(self.state.get(key))
    }

    /// Read a state value with a fallback. Requires `state.read`.
    pub fn get_state_or(&self, key: &str, default: Value) -> PluginResult<Value> {
        Ok(self.get_state(key)?.unwrap_or(default))
    }

    /// Write a state value, recorded in history. Requires `state.write`.
    pub fn set_state(
        &self,
        key: &str,
        value: Value,
        description: Option<&str>,
    ) -> PluginResult<()> {
        self.check(&Capability::StateWrite(key.to_string()))?;
        self.state.set(key, value, description);
        Ok(())
    }

    /// Subscribe to state changes by key or glob pattern. Requires
    /// `state.read` for the pattern.
    pub fn subscribe_state(&self, pattern: &str, handler: ChangeHandler) -> PluginResult<()> {
        self.check(&Capability::StateRead(pattern.to_string()))?;
        self.state.subscribe(pattern, handler);
        Ok(())
    }

    /// Remove a state subscription made through this context.
    pub fn unsubscribe_state(&self, pattern: &str, handler: &ChangeHandler) {
        self.state.unsubscribe(pattern, handler);
    }

    /// Publish an event. Requires `events.publish` for the topic. Suspends
    /// until every subscribed handler has run.
    pub async fn publish(&self, topic: &str, payload: Value) -> PluginResult<()> {
        self.check(&Capability::EventPublish(topic.to_string()))?;
        self.bus.publish(topic, payload).await;
        Ok(())
    }

    /// Subscribe to an event topic or prefix pattern. Requires
    /// `events.subscribe` for the topic.
    pub fn subscribe_event(&self, topic: &str, handler: Handler) -> PluginResult<()> {
        self.check(&Capability::EventSubscribe(topic.to_string()))?;
        self.bus.subscribe(topic, handler);
        Ok(())
    }

    /// Remove an event subscription made through this context.
    pub fn unsubscribe_event(&self, topic: &str, handler: &Handler) {
        self.bus.unsubscribe(topic, handler);
    }

    /// Offer a view to the host. Requires the `ui` grant.
    pub fn declare_view(&self, view: ViewDeclaration) -> PluginResult<()> {
        self.check(&Capability::Ui)?;
        self.host.declare_view(&self.name, view);
        Ok(())
    }

    /// Register a menu action. Requires the `ui` grant.
    pub fn register_menu_action(&self, action: MenuAction) -> PluginResult<()> {
        self.check(&Capability::Ui)?;
        self.host.register_menu_action(&self.name, action);
        Ok(())
    }

    /// Register a toolbar item. Requires the `ui` grant.
    pub fn register_toolbar_item(&self, item: ToolbarItem) -> PluginResult<()> {
        self.check(&Capability::Ui)?;
        self.host.register_toolbar_item(&self.name, item);
        Ok(())
    }

    /// Post a status message, prefixed with the plugin's name. Requires the
    /// `ui` grant.
    pub fn update_status(&self, message: &str, timeout: Option<Duration>) -> PluginResult<()> {
        self.check(&Capability::Ui)?;
        self.host.update_status(&format!("[{}] {message}", self.name), timeout);
        Ok(())
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeadlessHost;
    use serde_json::json;

    fn context_with(permissions: &str, config: &str) -> (PluginContext, Arc<HeadlessHost>) {
        let host = Arc::new(HeadlessHost::new());
        let context = PluginContext::new(
            "test-plugin",
            Version::new(1, 0, 0),
            toml::from_str(config).unwrap(),
            toml::from_str(permissions).unwrap(),
            Arc::new(StateManager::new()),
            Arc::new(EventBus::new()),
            host.clone(),
        );
        (context, host)
    }

    #[test]
    fn test_config_dotted_lookup() {
        let (context, _) = context_with("", "initial = 10\n[nested]\nstep = 2");

        assert_eq!(context.config_or("initial", 0_i64), 10);
        assert_eq!(context.config_or("nested.step", 0_i64), 2);
        assert_eq!(context.config_or("nested.absent", 7_i64), 7);
        assert!(context.config("absent.path").is_none());
    }

    #[test]
    fn test_state_access_requires_grant() {
        let (context, _) = context_with("", "");
        assert!(matches!(
            context.set_state("k", json!(1), None),
            Err(PluginError::PermissionDenied { .. })
        ));
        assert!(context.get_state("k").is_err());
    }

    #[test]
    fn test_scoped_state_grant() {
        let (context, _) = context_with(
            r#"state = { read = true, write = true, paths = ["counter.*"] }"#,
            "",
        );

        context.set_state("counter.value", json!(5), None).unwrap();
        assert_eq!(context.get_state("counter.value").unwrap(), Some(json!(5)));
        assert!(context.set_state("other.value", json!(1), None).is_err());
    }

    #[tokio::test]
    async fn test_publish_requires_grant() {
        let (context, _) = context_with("events = { subscribe = true }", "");
        assert!(context.publish("topic", json!({})).await.is_err());
        assert!(context.subscribe_event("topic", Handler::sync(|_| ())).is_ok());
    }

    #[test]
    fn test_ui_registrations_reach_host() {
        let (context, host) = context_with("ui = true", "");

        context
            .declare_view(ViewDeclaration::new("main", "Main", crate::host::ViewInstance::new))
            .unwrap();
        context.register_menu_action(MenuAction::new("Tools/Test", "Run", || ())).unwrap();
        context
            .register_toolbar_item(ToolbarItem::new("Info", "Log"))
            .unwrap();
        context.update_status("ready", None).unwrap();

        assert_eq!(host.declared_views().len(), 1);
        assert_eq!(host.menu_actions().len(), 1);
        assert_eq!(host.toolbar_items().len(), 1);
        assert_eq!(host.status().unwrap().message, "[test-plugin] ready");
    }

    #[test]
    fn test_ui_denied_without_grant() {
        let (context, host) = context_with("", "");
        assert!(context.update_status("nope", None).is_err());
        assert!(host.status().is_none());
    }
}
