//! The host registration surface plugins contribute UI through.
//!
//! The concrete windowing layer lives outside this crate; the core only
//! defines the contract ([`HostShell`]) and ships a headless implementation
//! ([`HeadlessHost`]) that records contributions, drives view lifecycles,
//! and persists which views are open.

mod headless;
mod view;

use std::sync::Arc;
use std::time::Duration;

pub use headless::{HeadlessHost, StatusMessage};
pub use view::{CloseCallback, ViewDeclaration, ViewFactory, ViewInstance, ViewRef, ViewState};

/// Callback run when a menu action or toolbar item is activated.
pub type ActionCallback = Arc<dyn Fn() + Send + Sync>;

/// A menu contribution registered under a slash-delimited path, e.g.
/// `"Tools/Counter"`.
#[derive(Clone)]
pub struct MenuAction {
    pub path: String,
    pub label: String,
    pub on_activate: ActionCallback,
}

impl MenuAction {
    pub fn new(path: &str, label: &str, on_activate: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            path: path.to_string(),
            label: label.to_string(),
            on_activate: Arc::new(on_activate),
        }
    }
}

impl std::fmt::Debug for MenuAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuAction")
            .field("path", &self.path)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// A toolbar contribution registered under a named section.
#[derive(Clone)]
pub struct ToolbarItem {
    pub section: String,
    pub label: String,
    pub on_activate: Option<ActionCallback>,
}

impl ToolbarItem {
    pub fn new(section: &str, label: &str) -> Self {
        Self { section: section.to_string(), label: label.to_string(), on_activate: None }
    }

    pub fn on_activate(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_activate = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for ToolbarItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolbarItem")
            .field("section", &self.section)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// The registration API the host exposes to plugins.
///
/// All methods are infallible from the plugin's point of view; permission
/// checks happen in the plugin context before delegation.
pub trait HostShell: Send + Sync {
    /// Record a view offered by `plugin`, instantiable on demand.
    fn declare_view(&self, plugin: &str, view: ViewDeclaration);

    /// Register a menu action contributed by `plugin`.
    fn register_menu_action(&self, plugin: &str, action: MenuAction);

    /// Register a toolbar item contributed by `plugin`.
    fn register_toolbar_item(&self, plugin: &str, item: ToolbarItem);

    /// Show a transient status message, optionally auto-cleared after
    /// `timeout`.
    fn update_status(&self, message: &str, timeout: Option<Duration>);
}
