//! Path-addressed reactive state store.
//!
//! The store is a single JSON tree addressed by dotted keys (`"a.b.c"`).
//! Writes go through [`StateManager::set`], which records a reversible
//! command in the [`HistoryManager`] and notifies subscribers. Subscribers
//! register for an exact key or a glob pattern matched against the full
//! dotted key of every change.
//!
//! Locking: the tree lock is released before subscribers run. Handlers are
//! invoked on a snapshot of the subscriber list and may freely call back
//! into `set`/`subscribe` without deadlocking; they observe the post-write
//! tree.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::history::{Command, HistoryManager, StateError};
use super::pattern::{glob_match, is_pattern};
use crate::fault::trap;

/// Synchronous state-change subscriber. Receives the new value.
pub type ChangeHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    /// Exact key -> handlers, in subscription order.
    exact: HashMap<String, Vec<ChangeHandler>>,
    /// Glob patterns in first-registration order.
    patterns: Vec<(String, Vec<ChangeHandler>)>,
}

/// Shared, undo-integrated application state.
///
/// Constructed once per shell and handed to plugins by `Arc`; several
/// operations therefore take `self: &Arc<Self>` so that recorded commands
/// can refer back to the store without owning it.
pub struct StateManager {
    tree: Mutex<Map<String, Value>>,
    subscribers: Mutex<Subscribers>,
    history: HistoryManager,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    /// Empty store with a fresh default-bounded history.
    pub fn new() -> Self {
        Self::with_history(HistoryManager::new())
    }

    /// Empty store recording into the given history.
    pub fn with_history(history: HistoryManager) -> Self {
        Self {
            tree: Mutex::new(Map::new()),
            subscribers: Mutex::new(Subscribers::default()),
            history,
        }
    }

    /// The undo/redo history this store records into.
    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Read the value at a dotted `key`.
    ///
    /// Returns `None` when any path segment is missing or an intermediate
    /// node is not a map; never coerces.
    pub fn get(&self, key: &str) -> Option<Value> {
        let tree = self.tree.lock();
        lookup(&tree, key).cloned()
    }

    /// Read the value at `key`, falling back to `default`.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Write `value` at a dotted `key`, recording history and notifying
    /// subscribers.
    ///
    /// Intermediate maps are created as needed; a non-map intermediate is
    /// replaced by a map. Writing a value equal to the current one is a
    /// complete no-op: no history entry, no notification.
    pub fn set(self: &Arc<Self>, key: &str, value: Value, description: Option<&str>) {
        self.set_value(key, value, true, description);
    }

    /// Undo the latest recorded change (or group). Returns `false` when
    /// there is nothing to undo.
    pub fn undo(&self) -> bool {
        self.history.undo()
    }

    /// Redo the latest undone change (or group). Returns `false` when
    /// there is nothing to redo.
    pub fn redo(&self) -> bool {
        self.history.redo()
    }

    /// Subscribe `handler` to changes of an exact key, or of every key
    /// matching a glob pattern (`*`, `?`).
    pub fn subscribe(&self, key_pattern: &str, handler: ChangeHandler) {
        let mut subscribers = self.subscribers.lock();
        if is_pattern(key_pattern) {
            if let Some((_, handlers)) =
                subscribers.patterns.iter_mut().find(|(p, _)| p == key_pattern)
            {
                handlers.push(handler);
            } else {
                subscribers.patterns.push((key_pattern.to_string(), vec![handler]));
            }
            debug!(pattern = key_pattern, "handler subscribed to key pattern");
        } else {
            subscribers.exact.entry(key_pattern.to_string()).or_default().push(handler);
            debug!(key = key_pattern, "handler subscribed to key");
        }
    }

    /// Remove the first subscription of `handler` under `key_pattern`.
    ///
    /// Logs and does nothing if the handler was not subscribed.
    pub fn unsubscribe(&self, key_pattern: &str, handler: &ChangeHandler) {
        let mut subscribers = self.subscribers.lock();
        let removed = if is_pattern(key_pattern) {
            let mut removed = false;
            if let Some(index) =
                subscribers.patterns.iter().position(|(p, _)| p == key_pattern)
            {
                let handlers = &mut subscribers.patterns[index].1;
                if let Some(at) = handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
                    handlers.remove(at);
                    removed = true;
                }
                if handlers.is_empty() {
                    subscribers.patterns.remove(index);
                }
            }
            removed
        } else if let Some(handlers) = subscribers.exact.get_mut(key_pattern) {
            let removed = handlers
                .iter()
                .position(|h| Arc::ptr_eq(h, handler))
                .map(|at| handlers.remove(at))
                .is_some();
            if handlers.is_empty() {
                subscribers.exact.remove(key_pattern);
            }
            removed
        } else {
            false
        };

        if removed {
            debug!(pattern = key_pattern, "handler unsubscribed");
        } else {
            warn!(pattern = key_pattern, "unsubscribe: handler not found");
        }
    }

    /// Write path shared by `set` and command execute/undo. Command replay
    /// passes `record_history = false` so undoing is never itself recorded.
    fn set_value(
        self: &Arc<Self>,
        key: &str,
        value: Value,
        record_history: bool,
        description: Option<&str>,
    ) {
        let old = {
            let mut tree = self.tree.lock();
            let old = lookup(&tree, key).cloned().unwrap_or(Value::Null);
            if old == value {
                return;
            }
            write(&mut tree, key, value.clone());
            old
        };
        debug!(key, "state changed");

        if record_history {
            let description =
                description.map_or_else(|| format!("set {key}"), ToString::to_string);
            self.history.add_command(Box::new(StateChange {
                state: Arc::downgrade(self),
                key: key.to_string(),
                old,
                new: value.clone(),
                description,
            }));
        }

        self.notify(key, &value);
    }

    /// Invoke every subscriber matching `key` with the new value.
    ///
    /// Exact-key handlers run first in subscription order, then each
    /// matching pattern's handlers in pattern-registration order. The
    /// subscriber list is snapshotted and the registry lock released before
    /// any handler runs. A panicking handler is logged and skipped.
    fn notify(&self, key: &str, value: &Value) {
        let matched: Vec<ChangeHandler> = {
            let subscribers = self.subscribers.lock();
            let mut matched = subscribers.exact.get(key).cloned().unwrap_or_default();
            for (pattern, handlers) in &subscribers.patterns {
                if glob_match(pattern, key) {
                    matched.extend(handlers.iter().cloned());
                }
            }
            matched
        };

        debug!(key, subscribers = matched.len(), "notifying state subscribers");
        for handler in matched {
            if let Err(panic) = trap(|| handler(value)) {
                error!(key, panic, "state subscriber panicked");
            }
        }
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("keys", &self.tree.lock().len())
            .field("history", &self.history)
            .finish()
    }
}

/// Reversible state write recorded by [`StateManager::set`].
///
/// Holds a weak reference back to the store so that history entries never
/// keep it alive; a command replayed after the store is gone reports
/// [`StateError::Detached`].
struct StateChange {
    state: Weak<StateManager>,
    key: String,
    old: Value,
    new: Value,
    description: String,
}

impl StateChange {
    fn apply(&self, value: &Value) -> Result<(), StateError> {
        let state = self.state.upgrade().ok_or(StateError::Detached)?;
        state.set_value(&self.key, value.clone(), false, None);
        Ok(())
    }
}

impl Command for StateChange {
    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&mut self) -> Result<(), StateError> {
        let value = self.new.clone();
        self.apply(&value)
    }

    fn undo(&mut self) -> Result<(), StateError> {
        let value = self.old.clone();
        self.apply(&value)
    }
}

/// Walk `root` along the dotted `key`. `None` when a segment is missing or
/// an intermediate node is not a map.
fn lookup<'a>(root: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut segments = key.split('.');
    let first = segments.next()?;
    let mut current = root.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write `value` at the dotted `key`, creating intermediate maps and
/// replacing non-map intermediates.
fn write(root: &mut Map<String, Value>, key: &str, value: Value) {
    let segments: Vec<&str> = key.split('.').collect();
    let (last, intermediate) = match segments.split_last() {
        Some(parts) => parts,
        None => return,
    };

    let mut current = root;
    for segment in intermediate {
        let slot = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot.as_object_mut() {
            Some(map) => current = map,
            None => return,
        }
    }
    current.insert((*last).to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> Arc<StateManager> {
        Arc::new(StateManager::new())
    }

    fn counting(counter: &Arc<AtomicUsize>) -> ChangeHandler {
        let counter = counter.clone();
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_dotted_path_round_trip() {
        let state = manager();
        state.set("a.b.c", json!(5), None);

        assert_eq!(state.get("a.b.c"), Some(json!(5)));
        assert_eq!(state.get_or("a.b.d", json!(99)), json!(99));
        assert_eq!(state.get("a.b"), Some(json!({"c": 5})));
    }

    #[test]
    fn test_read_through_non_map_fails() {
        let state = manager();
        state.set("a.b", json!(1), None);

        assert_eq!(state.get("a.b.c"), None);
        assert_eq!(state.get_or("a.b.c", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn test_write_replaces_non_map_intermediate() {
        let state = manager();
        state.set("a.b", json!(1), None);
        state.set("a.b.c", json!(2), None);

        assert_eq!(state.get("a.b.c"), Some(json!(2)));
    }

    #[test]
    fn test_equal_value_write_is_noop() {
        let state = manager();
        let hits = Arc::new(AtomicUsize::new(0));
        state.subscribe("k", counting(&hits));

        state.set("k", json!("v1"), None);
        state.set("k", json!("v1"), None);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(state.history().undo_depth(), 1);
    }

    #[test]
    fn test_exact_and_pattern_notification() {
        let state = manager();
        let exact_hits = Arc::new(AtomicUsize::new(0));
        let pattern_hits = Arc::new(AtomicUsize::new(0));
        state.subscribe("counter.value", counting(&exact_hits));
        state.subscribe("counter.*", counting(&pattern_hits));

        state.set("counter.value", json!(1), None);
        state.set("counter.step", json!(2), None);
        state.set("other.value", json!(3), None);

        assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
        assert_eq!(pattern_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let state = manager();
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = counting(&hits);
        state.subscribe("k", handler.clone());

        state.set("k", json!(1), None);
        state.unsubscribe("k", &handler);
        state.set("k", json!(2), None);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        // Unsubscribing an unknown handler must not panic.
        state.unsubscribe("k", &handler);
    }

    #[test]
    fn test_undo_redo_inverse_law() {
        let state = manager();
        state.set("a", json!(1), None);
        state.set("b.c", json!(2), None);
        state.set("a", json!(3), None);

        state.undo();
        state.undo();
        state.undo();
        assert_eq!(state.get("a"), Some(Value::Null));
        assert_eq!(state.get("b.c"), Some(Value::Null));

        state.redo();
        state.redo();
        state.redo();
        assert_eq!(state.get("a"), Some(json!(3)));
        assert_eq!(state.get("b.c"), Some(json!(2)));
    }

    #[test]
    fn test_undo_notifies_subscribers() {
        let state = manager();
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        state.subscribe(
            "k",
            Arc::new(move |value| {
                log.lock().push(value.clone());
            }),
        );

        state.set("k", json!(1), None);
        state.set("k", json!(2), None);
        state.undo();

        assert_eq!(*seen.lock(), vec![json!(1), json!(2), json!(1)]);
    }

    #[test]
    fn test_grouped_sets_undo_atomically() {
        let state = manager();
        state.set("x", json!(0), None);
        {
            let _group = state.history().group("batch");
            state.set("x", json!(1), None);
            state.set("y", json!(2), None);
        }

        state.undo();
        assert_eq!(state.get("x"), Some(json!(0)));
        assert_eq!(state.get("y"), Some(Value::Null));

        state.redo();
        assert_eq!(state.get("x"), Some(json!(1)));
        assert_eq!(state.get("y"), Some(json!(2)));
    }

    #[test]
    fn test_reentrant_set_from_subscriber_does_not_deadlock() {
        let state = manager();
        let reentrant = state.clone();
        state.subscribe(
            "source",
            Arc::new(move |value| {
                reentrant.set("derived", value.clone(), None);
            }),
        );

        state.set("source", json!(7), None);
        assert_eq!(state.get("derived"), Some(json!(7)));
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let state = manager();
        let hits = Arc::new(AtomicUsize::new(0));
        state.subscribe("k", Arc::new(|_| panic!("subscriber fault")));
        state.subscribe("k", counting(&hits));

        state.set("k", json!(1), None);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_receives_new_value() {
        let state = manager();
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        state.subscribe(
            "cfg.depth",
            Arc::new(move |value| {
                *slot.lock() = Some(value.clone());
            }),
        );

        state.set("cfg.depth", json!(3), Some("set depth"));
        assert_eq!(*seen.lock(), Some(json!(3)));
    }
}
