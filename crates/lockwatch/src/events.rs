use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lockwatch_core::LockKey;

/// Events the watchdog notifies external code about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchdogEvent {
    /// A stale lock and its bookkeeping entries were fully deleted.
    RemoveStaled,
}

type EventHandler = Arc<dyn Fn(&LockKey) + Send + Sync>;

/// Handler slots for watchdog events.
///
/// At most one handler per event; registering again replaces the previous
/// handler. Emitting an event with no handler is a no-op. Handlers run
/// synchronously inside the check cycle, so they should be quick. A
/// panicking handler aborts the rest of that cycle; the scheduler contains
/// the panic and stays on schedule.
pub struct EventSink {
    handlers: RwLock<HashMap<WatchdogEvent, EventHandler>>,
}

impl EventSink {
    /// Create a sink with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for an event, replacing any previous one.
    pub fn listen<F>(&self, event: WatchdogEvent, handler: F)
    where
        F: Fn(&LockKey) + Send + Sync + 'static,
    {
        let previous = self
            .handlers
            .write()
            .unwrap()
            .insert(event, Arc::new(handler));
        if previous.is_some() {
            tracing::debug!(event = ?event, "Replaced event handler");
        }
    }

    /// Invoke the handler registered for an event, if any.
    pub fn emit(&self, event: WatchdogEvent, key: &LockKey) {
        // Clone the handler out so a handler re-registering itself
        // cannot deadlock against the slot lock.
        let handler = self.handlers.read().unwrap().get(&event).cloned();
        if let Some(handler) = handler {
            handler(key);
        }
    }

    /// Whether a handler is registered for an event.
    pub fn has_handler(&self, event: WatchdogEvent) -> bool {
        self.handlers.read().unwrap().contains_key(&event)
    }

    /// Drop all registered handlers.
    pub fn clear(&self) {
        self.handlers.write().unwrap().clear();
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}
