//! Event fan-out for inbound channel messages.
//!
//! Every message fires the generic `"message"` event plus the event named
//! after its wire `type`. Handlers for an event run in registration order,
//! and a panicking handler never interrupts delivery to the handlers after
//! it.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::error;

use pulsedeck_types::{ServerMessage, EVENT_MESSAGE};

type Handler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

/// Opaque handle returned by [`Dispatcher::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

/// Subscriber registry keyed by event name.
#[derive(Default)]
pub struct Dispatcher {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<(u64, Handler)>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an exact event name.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .unwrap()
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        HandlerId(id)
    }

    /// Remove a previously registered handler. Returns whether it existed.
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id.0);
        let removed = list.len() < before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Number of handlers registered for an event.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .read()
            .unwrap()
            .get(event)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Drop every handler.
    pub fn clear(&self) {
        self.handlers.write().unwrap().clear();
    }

    /// Fan an inbound message out to the generic and type-named events.
    pub fn dispatch(&self, msg: &ServerMessage) {
        self.emit(EVENT_MESSAGE, msg);
        let name = msg.event_name().to_string();
        if !name.is_empty() && name != EVENT_MESSAGE {
            self.emit(&name, msg);
        }
    }

    fn emit(&self, event: &str, msg: &ServerMessage) {
        // Snapshot under the read lock so handlers can (un)subscribe freely.
        let snapshot: Vec<(u64, Handler)> = match self.handlers.read().unwrap().get(event) {
            Some(list) => list.clone(),
            None => return,
        };
        for (id, handler) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(msg))).is_err() {
                error!(event, handler = id, "subscriber panicked during dispatch");
            }
        }
    }
}
