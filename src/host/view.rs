//! View contributions and persisted view state.
//!
//! A plugin declares a view as an id/name/factory triple; the host
//! instantiates the factory when the user opens the view. A view instance
//! may carry an unsubscribe callback which the host invokes when the view
//! closes, so widget-bound subscriptions are torn down with their surface.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::fault::trap;

/// Factory producing a fresh view instance each time the view opens.
pub type ViewFactory = Arc<dyn Fn() -> ViewInstance + Send + Sync>;

/// Teardown callback attached to an open view.
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// A view a plugin offers to the host.
#[derive(Clone)]
pub struct ViewDeclaration {
    /// Identifier unique within the declaring plugin.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Called on open.
    pub factory: ViewFactory,
}

impl ViewDeclaration {
    pub fn new(
        id: &str,
        name: &str,
        factory: impl Fn() -> ViewInstance + Send + Sync + 'static,
    ) -> Self {
        Self { id: id.to_string(), name: name.to_string(), factory: Arc::new(factory) }
    }
}

impl std::fmt::Debug for ViewDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewDeclaration")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A live, open view.
///
/// The concrete widget lives in the UI layer; the core only tracks the
/// instance's lifecycle and its teardown callback.
#[derive(Default)]
pub struct ViewInstance {
    on_close: Option<CloseCallback>,
}

impl ViewInstance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a callback invoked exactly once when the view closes.
    /// Plugins use this to unsubscribe widget-bound handlers.
    pub fn on_close(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(callback));
        self
    }

    /// Run the teardown callback, containing any panic it raises.
    pub(crate) fn close(mut self, plugin: &str, view_id: &str) {
        if let Some(callback) = self.on_close.take() {
            debug!(plugin, view = view_id, "running view unsubscribe callback");
            if let Err(panic) = trap(callback) {
                error!(plugin, view = view_id, panic, "view unsubscribe callback panicked");
            }
        }
    }
}

impl std::fmt::Debug for ViewInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewInstance")
            .field("has_on_close", &self.on_close.is_some())
            .finish()
    }
}

/// Reference to a declared view, used in the persisted view state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRef {
    pub plugin: String,
    pub view_id: String,
}

/// Persisted record of which views were open and which was active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewState {
    #[serde(default)]
    pub open_views: Vec<ViewRef>,
    #[serde(default)]
    pub active: Option<usize>,
}

impl ViewState {
    /// Read the view state from a JSON file. `None` when the file is
    /// missing or unreadable (the caller falls back to defaults).
    pub fn load(path: &Path) -> Option<Self> {
        if !path.is_file() {
            info!(path = %path.display(), "view state file not found");
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed view state file");
                    None
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read view state file");
                None
            }
        }
    }

    /// Write the view state as pretty JSON.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
