//! Headless host shell.
//!
//! Records every contribution plugins register, drives view open/close
//! lifecycles, and persists the open-view set. A GUI host would implement
//! [`HostShell`] against a real widget toolkit; this one keeps the core
//! fully exercisable without any.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::view::{ViewDeclaration, ViewRef, ViewState};
use super::{HostShell, MenuAction, ToolbarItem};

/// A status-bar message with an optional auto-clear timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub timeout: Option<Duration>,
}

struct OpenView {
    plugin: String,
    view_id: String,
    instance: super::ViewInstance,
}

#[derive(Default)]
struct Surfaces {
    declared_views: Vec<(String, ViewDeclaration)>,
    open_views: Vec<OpenView>,
    active: Option<usize>,
    menu_actions: Vec<(String, MenuAction)>,
    toolbar_items: Vec<(String, ToolbarItem)>,
    status: Option<StatusMessage>,
}

/// Headless implementation of [`HostShell`].
#[derive(Default)]
pub struct HeadlessHost {
    surfaces: Mutex<Surfaces>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate and open a declared view. Returns `false` when the view
    /// is unknown or already open.
    pub fn open_view(&self, plugin: &str, view_id: &str) -> bool {
        let factory = {
            let surfaces = self.surfaces.lock();
            if surfaces
                .open_views
                .iter()
                .any(|open| open.plugin == plugin && open.view_id == view_id)
            {
                debug!(plugin, view = view_id, "view already open");
                return false;
            }
            match surfaces
                .declared_views
                .iter()
                .find(|(owner, view)| owner == plugin && view.id == view_id)
            {
                Some((_, view)) => view.factory.clone(),
                None => {
                    warn!(plugin, view = view_id, "cannot open undeclared view");
                    return false;
                }
            }
        };

        // The factory may call back into the host (e.g. a status update),
        // so it runs with the surfaces lock released.
        let instance = factory();

        let mut surfaces = self.surfaces.lock();
        surfaces.open_views.push(OpenView {
            plugin: plugin.to_string(),
            view_id: view_id.to_string(),
            instance,
        });
        if surfaces.active.is_none() {
            surfaces.active = Some(surfaces.open_views.len() - 1);
        }
        info!(plugin, view = view_id, "view opened");
        true
    }

    /// Close an open view, invoking its unsubscribe callback if present.
    /// Returns `false` when the view is not open.
    pub fn close_view(&self, plugin: &str, view_id: &str) -> bool {
        let open = {
            let mut surfaces = self.surfaces.lock();
            let index = match surfaces
                .open_views
                .iter()
                .position(|open| open.plugin == plugin && open.view_id == view_id)
            {
                Some(index) => index,
                None => {
                    warn!(plugin, view = view_id, "cannot close view that is not open");
                    return false;
                }
            };
            let open = surfaces.open_views.remove(index);
            surfaces.active = match surfaces.active {
                Some(active) if active == index => {
                    if surfaces.open_views.is_empty() {
                        None
                    } else {
                        Some(active.min(surfaces.open_views.len() - 1))
                    }
                }
                Some(active) if active > index => Some(active - 1),
                other => other,
            };
            open
        };

        open.instance.close(plugin, view_id);
        info!(plugin, view = view_id, "view closed");
        true
    }

    /// Open every declared view that is not already open.
    pub fn open_all_views(&self) -> usize {
        let declared: Vec<(String, String)> = {
            let surfaces = self.surfaces.lock();
            surfaces
                .declared_views
                .iter()
                .map(|(plugin, view)| (plugin.clone(), view.id.clone()))
                .collect()
        };
        declared
            .into_iter()
            .filter(|(plugin, view_id)| self.open_view(plugin, view_id))
            .count()
    }

    /// Close every open view, newest first.
    pub fn close_all_views(&self) {
        loop {
            let next = {
                let surfaces = self.surfaces.lock();
                surfaces
                    .open_views
                    .last()
                    .map(|open| (open.plugin.clone(), open.view_id.clone()))
            };
            match next {
                Some((plugin, view_id)) => {
                    self.close_view(&plugin, &view_id);
                }
                None => break,
            }
        }
    }

    /// Mark an open view as the active one.
    pub fn activate_view(&self, plugin: &str, view_id: &str) -> bool {
        let mut surfaces = self.surfaces.lock();
        match surfaces
            .open_views
            .iter()
            .position(|open| open.plugin == plugin && open.view_id == view_id)
        {
            Some(index) => {
                surfaces.active = Some(index);
                true
            }
            None => false,
        }
    }

    /// Snapshot of declared views as `(plugin, view_id, name)`.
    pub fn declared_views(&self) -> Vec<(String, String, String)> {
        self.surfaces
            .lock()
            .declared_views
            .iter()
            .map(|(plugin, view)| (plugin.clone(), view.id.clone(), view.name.clone()))
            .collect()
    }

    /// Snapshot of open views in tab order.
    pub fn open_views(&self) -> Vec<ViewRef> {
        self.surfaces
            .lock()
            .open_views
            .iter()
            .map(|open| ViewRef { plugin: open.plugin.clone(), view_id: open.view_id.clone() })
            .collect()
    }

    /// The currently active view, if any.
    pub fn active_view(&self) -> Option<ViewRef> {
        let surfaces = self.surfaces.lock();
        surfaces.active.and_then(|index| {
            surfaces
                .open_views
                .get(index)
                .map(|open| ViewRef { plugin: open.plugin.clone(), view_id: open.view_id.clone() })
        })
    }

    /// Snapshot of registered menu actions as `(plugin, path, label)`.
    pub fn menu_actions(&self) -> Vec<(String, String, String)> {
        self.surfaces
            .lock()
            .menu_actions
            .iter()
            .map(|(plugin, action)| (plugin.clone(), action.path.clone(), action.label.clone()))
            .collect()
    }

    /// Activate a registered menu action by its path. Returns `false` when
    /// no action is registered under the path.
    pub fn activate_menu_action(&self, path: &str) -> bool {
        let callback = {
            let surfaces = self.surfaces.lock();
            surfaces
                .menu_actions
                .iter()
                .find(|(_, action)| action.path == path)
                .map(|(_, action)| action.on_activate.clone())
        };
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Snapshot of registered toolbar items as `(plugin, section, label)`.
    pub fn toolbar_items(&self) -> Vec<(String, String, String)> {
        self.surfaces
            .lock()
            .toolbar_items
            .iter()
            .map(|(plugin, item)| (plugin.clone(), item.section.clone(), item.label.clone()))
            .collect()
    }

    /// The most recent status message.
    pub fn status(&self) -> Option<StatusMessage> {
        self.surfaces.lock().status.clone()
    }

    /// Persist which views are open (and which is active) to `path`.
    pub fn save_view_state(&self, path: &Path) -> std::io::Result<()> {
        let state = {
            let surfaces = self.surfaces.lock();
            ViewState {
                open_views: surfaces
                    .open_views
                    .iter()
                    .map(|open| ViewRef {
                        plugin: open.plugin.clone(),
                        view_id: open.view_id.clone(),
                    })
                    .collect(),
                active: surfaces.active,
            }
        };
        state.save(path)?;
        info!(path = %path.display(), views = state.open_views.len(), "view state saved");
        Ok(())
    }

    /// Restore the open-view set from `path`.
    ///
    /// Returns `true` when a non-empty saved view was applied. References
    /// to views that are no longer declared are skipped with a warning.
    pub fn load_view_state(&self, path: &Path) -> bool {
        let state = match ViewState::load(path) {
            Some(state) if !state.open_views.is_empty() => state,
            _ => return false,
        };

        self.close_all_views();
        let mut opened = 0;
        for view in &state.open_views {
            if self.open_view(&view.plugin, &view.view_id) {
                opened += 1;
            } else {
                warn!(plugin = view.plugin, view = view.view_id, "saved view is not declared");
            }
        }
        if let Some(active) = state.active {
            if let Some(view) = state.open_views.get(active) {
                self.activate_view(&view.plugin, &view.view_id);
            }
        }
        info!(opened, "view state restored");
        opened > 0
    }
}

impl HostShell for HeadlessHost {
    fn declare_view(&self, plugin: &str, view: ViewDeclaration) {
        let mut surfaces = self.surfaces.lock();
        if let Some(slot) = surfaces
            .declared_views
            .iter_mut()
            .find(|(owner, declared)| owner == plugin && declared.id == view.id)
        {
            debug!(plugin, view = view.id, "view re-declared, replacing");
            slot.1 = view;
        } else {
            debug!(plugin, view = view.id, "view declared");
            surfaces.declared_views.push((plugin.to_string(), view));
        }
    }

    fn register_menu_action(&self, plugin: &str, action: MenuAction) {
        debug!(plugin, path = action.path, "menu action registered");
        self.surfaces.lock().menu_actions.push((plugin.to_string(), action));
    }

    fn register_toolbar_item(&self, plugin: &str, item: ToolbarItem) {
        debug!(plugin, section = item.section, "toolbar item registered");
        self.surfaces.lock().toolbar_items.push((plugin.to_string(), item));
    }

    fn update_status(&self, message: &str, timeout: Option<Duration>) {
        debug!(status = message, "status updated");
        self.surfaces.lock().status =
            Some(StatusMessage { message: message.to_string(), timeout });
    }
}

impl std::fmt::Debug for HeadlessHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let surfaces = self.surfaces.lock();
        f.debug_struct("HeadlessHost")
            .field("declared_views", &surfaces.declared_views.len())
            .field("open_views", &surfaces.open_views.len())
            .field("menu_actions", &surfaces.menu_actions.len())
            .field("toolbar_items", &surfaces.toolbar_items.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ViewInstance;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn declare(host: &HeadlessHost, plugin: &str, id: &str) {
        host.declare_view(plugin, ViewDeclaration::new(id, id, ViewInstance::new));
    }

    #[test]
    fn test_open_and_close_view() {
        let host = HeadlessHost::new();
        declare(&host, "counter", "main");

        assert!(host.open_view("counter", "main"));
        assert_eq!(host.open_views().len(), 1);

        // Opening twice is refused.
        assert!(!host.open_view("counter", "main"));

        assert!(host.close_view("counter", "main"));
        assert!(host.open_views().is_empty());
        assert!(!host.close_view("counter", "main"));
    }

    #[test]
    fn test_open_unknown_view_is_refused() {
        let host = HeadlessHost::new();
        assert!(!host.open_view("nobody", "nothing"));
    }

    #[test]
    fn test_close_invokes_unsubscribe_callback() {
        let host = HeadlessHost::new();
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = closes.clone();
        host.declare_view(
            "p",
            ViewDeclaration::new("v", "View", move || {
                let counter = counter.clone();
                ViewInstance::new().on_close(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        host.open_view("p", "v");
        host.close_view("p", "v");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_active_view_tracking() {
        let host = HeadlessHost::new();
        declare(&host, "p", "a");
        declare(&host, "p", "b");

        host.open_view("p", "a");
        host.open_view("p", "b");
        assert_eq!(host.active_view().unwrap().view_id, "a");

        assert!(host.activate_view("p", "b"));
        assert_eq!(host.active_view().unwrap().view_id, "b");

        host.close_view("p", "b");
        assert_eq!(host.active_view().unwrap().view_id, "a");
    }

    #[test]
    fn test_open_all_views() {
        let host = HeadlessHost::new();
        declare(&host, "p", "a");
        declare(&host, "q", "b");

        assert_eq!(host.open_all_views(), 2);
        assert_eq!(host.open_all_views(), 0);
    }

    #[test]
    fn test_menu_action_activation() {
        let host = HeadlessHost::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        host.register_menu_action(
            "p",
            MenuAction::new("Tools/Counter", "Reset", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(host.activate_menu_action("Tools/Counter"));
        assert!(!host.activate_menu_action("Tools/Absent"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_message() {
        let host = HeadlessHost::new();
        host.update_status("Ready", Some(Duration::from_secs(3)));

        let status = host.status().unwrap();
        assert_eq!(status.message, "Ready");
        assert_eq!(status.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_view_state_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("view_state.json");

        let host = HeadlessHost::new();
        declare(&host, "p", "a");
        declare(&host, "p", "b");
        host.open_view("p", "a");
        host.open_view("p", "b");
        host.activate_view("p", "b");
        host.save_view_state(&path).unwrap();

        let restored = HeadlessHost::new();
        declare(&restored, "p", "a");
        declare(&restored, "p", "b");
        assert!(restored.load_view_state(&path));
        assert_eq!(restored.open_views().len(), 2);
        assert_eq!(restored.active_view().unwrap().view_id, "b");
    }

    #[test]
    fn test_load_view_state_skips_undeclared() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("view_state.json");

        let host = HeadlessHost::new();
        declare(&host, "p", "a");
        declare(&host, "gone", "b");
        host.open_view("p", "a");
        host.open_view("gone", "b");
        host.save_view_state(&path).unwrap();

        // The second plugin's view is no longer declared on restore.
        let restored = HeadlessHost::new();
        declare(&restored, "p", "a");
        assert!(restored.load_view_state(&path));
        assert_eq!(restored.open_views().len(), 1);
    }
}
