//! Topic-based publish/subscribe event bus.
//!
//! Plugins and the host communicate through named string topics. A topic
//! ending in `*` subscribes to every topic starting with the prefix before
//! the marker (`"counter.*"` matches `"counter.changed"`).
//!
//! Handlers come in two flavors: synchronous closures invoked inline during
//! [`EventBus::publish`], and asynchronous closures spawned as concurrent
//! tasks that `publish` joins before returning. A faulty handler is logged
//! and never stops delivery to its siblings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::fault::trap;

/// Synchronous event handler.
pub type SyncHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Asynchronous event handler. Receives an owned copy of the payload and
/// returns a future run as its own task.
pub type TaskHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// A subscription callback, either inline or task-based.
///
/// `Handler` is cheap to clone; unsubscription matches on the identity of
/// the inner closure, so keep a clone of the handler you subscribed with.
#[derive(Clone)]
pub enum Handler {
    /// Invoked inline during `publish`, before any task handler runs.
    Sync(SyncHandler),
    /// Spawned as a concurrent task; `publish` waits for it to finish.
    Task(TaskHandler),
}

impl Handler {
    /// Wrap a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wrap an asynchronous closure.
    pub fn task<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        Self::Task(Arc::new(move |payload| Box::pin(f(payload))))
    }

    /// Whether two handlers refer to the same underlying closure.
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Sync(a), Self::Sync(b)) => Arc::ptr_eq(a, b),
            (Self::Task(a), Self::Task(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Handler::Sync"),
            Self::Task(_) => f.write_str("Handler::Task"),
        }
    }
}

/// The wildcard marker recognized at the end of a subscription topic.
const WILDCARD: char = '*';

#[derive(Default)]
struct Registry {
    /// Exact topic -> handlers, in subscription order.
    exact: HashMap<String, Vec<Handler>>,
    /// Prefix patterns in first-registration order, each with its handlers
    /// in subscription order.
    prefixes: Vec<(String, Vec<Handler>)>,
}

/// Topic-based publish/subscribe dispatcher shared by the host and every
/// plugin.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `topic`.
    ///
    /// A trailing `*` registers a prefix pattern (marker stripped).
    /// Subscribing the same handler twice to the same topic produces two
    /// invocations per publish; duplicates are not collapsed.
    pub fn subscribe(&self, topic: &str, handler: Handler) {
        let mut registry = self.registry.lock();
        if let Some(prefix) = topic.strip_suffix(WILDCARD) {
            if let Some((_, handlers)) =
                registry.prefixes.iter_mut().find(|(p, _)| p == prefix)
            {
                handlers.push(handler);
            } else {
                registry.prefixes.push((prefix.to_string(), vec![handler]));
            }
            debug!(pattern = prefix, "handler subscribed to topic pattern");
        } else {
            registry.exact.entry(topic.to_string()).or_default().push(handler);
            debug!(topic, "handler subscribed to topic");
        }
    }

    /// Remove the first subscription of `handler` under `topic`.
    ///
    /// Logs and does nothing if the handler was not subscribed.
    pub fn unsubscribe(&self, topic: &str, handler: &Handler) {
        let mut registry = self.registry.lock();
        let removed = if let Some(prefix) = topic.strip_suffix(WILDCARD) {
            let mut removed = false;
            if let Some(index) = registry.prefixes.iter().position(|(p, _)| p == prefix) {
                let handlers = &mut registry.prefixes[index].1;
                if let Some(at) = handlers.iter().position(|h| h.same(handler)) {
                    handlers.remove(at);
                    removed = true;
                }
                if handlers.is_empty() {
                    registry.prefixes.remove(index);
                }
            }
            removed
        } else if let Some(handlers) = registry.exact.get_mut(topic) {
            let removed = handlers
                .iter()
                .position(|h| h.same(handler))
                .map(|at| handlers.remove(at))
                .is_some();
            if handlers.is_empty() {
                registry.exact.remove(topic);
            }
            removed
        } else {
            false
        };

        if removed {
            debug!(topic, "handler unsubscribed");
        } else {
            warn!(topic, "unsubscribe: handler not found");
        }
    }

    /// Publish `payload` on `topic` and wait for every handler to finish.
    ///
    /// Delivery order: handlers subscribed to the exact topic first, then
    /// each matching prefix pattern in registration order. All synchronous
    /// handlers run inline, in that order, before any task handler is
    /// spawned; the spawned tasks then run concurrently and are all joined
    /// before `publish` returns. A panicking handler is logged and does not
    /// affect its siblings or the publisher.
    pub async fn publish(&self, topic: &str, payload: Value) {
        let matched = self.matching_handlers(topic);
        debug!(topic, handlers = matched.len(), "publishing event");

        let mut pending = Vec::new();
        for handler in matched {
            match handler {
                Handler::Sync(f) => {
                    if let Err(panic) = trap(|| f(&payload)) {
                        error!(topic, panic, "sync event handler panicked");
                    }
                }
                Handler::Task(f) => pending.push(f(payload.clone())),
            }
        }

        let handles: Vec<_> = pending.into_iter().map(tokio::spawn).collect();
        for joined in future::join_all(handles).await {
            if let Err(join_error) = joined {
                error!(topic, error = %join_error, "async event handler failed");
            }
        }
    }

    /// [`EventBus::publish`] with an upper bound on the fan-in wait.
    ///
    /// Synchronous handlers are not bounded (they run inline); the timeout
    /// covers the join of the spawned task handlers. Returns `false` when
    /// the deadline elapsed first, in which case the remaining tasks keep
    /// running detached.
    pub async fn publish_with_timeout(
        &self,
        topic: &str,
        payload: Value,
        timeout: Duration,
    ) -> bool {
        match tokio::time::timeout(timeout, self.publish(topic, payload)).await {
            Ok(()) => true,
            Err(_) => {
                warn!(topic, ?timeout, "publish timed out waiting for async handlers");
                false
            }
        }
    }

    /// Number of handlers that would currently receive `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.matching_handlers(topic).len()
    }

    /// Snapshot of the handlers matching `topic`, in delivery order.
    fn matching_handlers(&self, topic: &str) -> Vec<Handler> {
        let registry = self.registry.lock();
        let mut matched = registry.exact.get(topic).cloned().unwrap_or_default();
        for (prefix, handlers) in &registry.prefixes {
            if topic.starts_with(prefix.as_str()) {
                matched.extend(handlers.iter().cloned());
            }
        }
        matched
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("EventBus")
            .field("topics", &registry.exact.len())
            .field("patterns", &registry.prefixes.len())
            .finish()
    }
}
