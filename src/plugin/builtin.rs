//! Built-in plugins shipped with the host binary.
//!
//! These double as reference implementations of the plugin contract: the
//! counter drives state writes, undo-recorded mutations, and view-bound
//! subscriptions; the event logger consumes wildcard event subscriptions
//! and the status surface.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::context::{Plugin, PluginContext};
use super::registry::FactoryRegistry;
use super::PluginResult;
use crate::bus::Handler;
use crate::host::{MenuAction, ToolbarItem, ViewDeclaration, ViewInstance};
use crate::state::ChangeHandler;

/// State key the counter lives under.
const COUNTER_KEY: &str = "counter.value";
/// Topic counter changes are announced on.
const COUNTER_TOPIC: &str = "counter.changed";

/// Register the factories for the plugins compiled into this crate.
pub fn register_builtin_factories(registry: &FactoryRegistry) {
    registry.register_fn(
        "counter:Counter",
        &["state.read", "state.write", "events.publish", "ui"],
        |context| Ok(Box::new(CounterPlugin { context: Arc::new(context), step: 1 })),
    );
    registry.register_fn(
        "listener:EventLogger",
        &["state.read", "events.subscribe", "ui"],
        |context| {
            Ok(Box::new(EventLoggerPlugin { context: Arc::new(context), handler: None }))
        },
    );
}

/// Publish the counter-changed event without blocking the caller.
///
/// Menu callbacks are synchronous; when a tokio runtime is available the
/// publish runs as a task, otherwise it is skipped with a note.
fn announce_change(context: &Arc<PluginContext>, value: i64) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let context = context.clone();
            handle.spawn(async move {
                if let Err(e) = context.publish(COUNTER_TOPIC, json!({ "value": value })).await
                {
                    warn!(error = %e, "failed to publish counter change");
                }
            });
        }
        Err(_) => debug!("no async runtime, counter change not announced"),
    }
}

/// A shared counter with undo support, a view, and menu actions.
struct CounterPlugin {
    context: Arc<PluginContext>,
    step: i64,
}

impl CounterPlugin {
    fn current(context: &Arc<PluginContext>) -> i64 {
        context
            .get_state_or(COUNTER_KEY, json!(0))
            .ok()
            .and_then(|value| value.as_i64())
            .unwrap_or(0)
    }
}

impl Plugin for CounterPlugin {
    fn on_load(&mut self) -> PluginResult<()> {
        let initial = self.context.config_or("initial", 0_i64);
        self.step = self.context.config_or("step", 1_i64);
        info!(plugin = self.context.name(), initial, step = self.step, "counter loading");

        if matches!(self.context.get_state(COUNTER_KEY)?, None | Some(Value::Null)) {
            self.context.set_state(COUNTER_KEY, json!(initial), Some("Initialize counter"))?;
        }

        // The view subscribes its display model on open and unsubscribes
        // on close, so the subscription lives exactly as long as the
        // surface.
        let view_context = self.context.clone();
        self.context.declare_view(ViewDeclaration::new("counter", "Counter", move || {
            let display: Arc<Mutex<Value>> = Arc::new(Mutex::new(Value::Null));
            let slot = display.clone();
            let handler: ChangeHandler = Arc::new(move |value| {
                *slot.lock() = value.clone();
            });
            if let Err(e) = view_context.subscribe_state(COUNTER_KEY, handler.clone()) {
                warn!(error = %e, "counter view could not subscribe");
                return ViewInstance::new();
            }
            *display.lock() =
                view_context.get_state_or(COUNTER_KEY, Value::Null).unwrap_or(Value::Null);

            let close_context = view_context.clone();
            ViewInstance::new()
                .on_close(move || close_context.unsubscribe_state(COUNTER_KEY, &handler))
        }))?;

        let step = self.step;
        let increment_context = self.context.clone();
        self.context.register_menu_action(MenuAction::new(
            "Tools/Counter/Increment",
            "Increment counter",
            move || {
                let next = Self::current(&increment_context) + step;
                let result = increment_context.set_state(
                    COUNTER_KEY,
                    json!(next),
                    Some("Increment counter"),
                );
                match result {
                    Ok(()) => announce_change(&increment_context, next),
                    Err(e) => warn!(error = %e, "increment rejected"),
                }
            },
        ))?;

        let reset_context = self.context.clone();
        self.context.register_menu_action(MenuAction::new(
            "Tools/Counter/Reset",
            "Reset counter",
            move || {
                let initial = reset_context.config_or("initial", 0_i64);
                let result =
                    reset_context.set_state(COUNTER_KEY, json!(initial), Some("Reset counter"));
                match result {
                    Ok(()) => announce_change(&reset_context, initial),
                    Err(e) => warn!(error = %e, "reset rejected"),
                }
            },
        ))?;

        self.context.update_status("counter ready", Some(Duration::from_secs(3)))?;
        Ok(())
    }

    fn on_unload(&mut self) {
        info!(plugin = self.context.name(), "counter unloading");
    }
}

/// Listens to counter events and mirrors them into the status bar.
struct EventLoggerPlugin {
    context: Arc<PluginContext>,
    handler: Option<Handler>,
}

impl Plugin for EventLoggerPlugin {
    fn on_load(&mut self) -> PluginResult<()> {
        let status_context = self.context.clone();
        let handler = Handler::task(move |payload| {
            let context = status_context.clone();
            async move {
                let value = payload.get("value").cloned().unwrap_or(Value::Null);
                if let Err(e) = context.update_status(
                    &format!("counter changed to {value}"),
                    Some(Duration::from_secs(5)),
                ) {
                    warn!(error = %e, "listener could not update status");
                }
            }
        });
        self.context.subscribe_event("counter.*", handler.clone())?;
        self.handler = Some(handler);

        let log_context = self.context.clone();
        self.context.register_toolbar_item(
            ToolbarItem::new("Info", "Log counter").on_activate(move || {
                match log_context.get_state_or(COUNTER_KEY, Value::Null) {
                    Ok(value) => info!(value = %value, "current counter value"),
                    Err(e) => warn!(error = %e, "listener could not read counter"),
                }
            }),
        )?;
        Ok(())
    }

    fn on_unload(&mut self) {
        // The event subscription is global, so it is torn down here rather
        // than by a view close.
        if let Some(handler) = self.handler.take() {
            self.context.unsubscribe_event("counter.*", &handler);
        }
    }
}
