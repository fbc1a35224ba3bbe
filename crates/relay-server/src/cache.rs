//! Last-seen event per connection and kind, with one-shot waiters.

use std::collections::HashMap;

use parking_lot::Mutex;
use relay_core::{ConnectionId, EventKind};
use serde_json::Value;
use tokio::sync::oneshot;

/// Result of asking the cache for an event.
#[derive(Debug)]
pub enum Lookup {
    /// A cached payload, now removed from the cache.
    Ready(Value),
    /// Nothing cached; resolves with the next event. Errors if the connection is forgotten first.
    Pending(oneshot::Receiver<Value>),
}

#[derive(Default)]
struct Slot {
    last: Option<Value>,
    waiters: Vec<oneshot::Sender<Value>>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.last.is_none() && self.waiters.is_empty()
    }
}

/// Single-slot event buffers keyed by `(connection, kind)`.
#[derive(Default)]
pub struct EventCache {
    slots: Mutex<HashMap<(ConnectionId, EventKind), Slot>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event from a client.
    ///
    /// Pending waiters receive it and it is not cached; otherwise it replaces
    /// the cached payload. Returns the number of waiters that received it.
    pub fn record(&self, id: &ConnectionId, kind: EventKind, data: Value) -> usize {
        let mut slots = self.slots.lock();
        let slot = slots.entry((id.clone(), kind)).or_default();

        let delivered = std::mem::take(&mut slot.waiters)
            .into_iter()
            .filter_map(|waiter| waiter.send(data.clone()).ok())
            .count();

        slot.last = if delivered == 0 { Some(data) } else { None };
        delivered
    }

    /// Take the cached payload, or register for the next one.
    pub fn take_or_wait(&self, id: &ConnectionId, kind: EventKind) -> Lookup {
        let mut slots = self.slots.lock();
        let key = (id.clone(), kind);

        if let Some(data) = slots.get_mut(&key).and_then(|slot| slot.last.take()) {
            if slots.get(&key).is_some_and(Slot::is_empty) {
                let _ = slots.remove(&key);
            }
            return Lookup::Ready(data);
        }

        let (tx, rx) = oneshot::channel();
        let slot = slots.entry(key).or_default();
        slot.waiters.retain(|waiter| !waiter.is_closed());
        slot.waiters.push(tx);
        Lookup::Pending(rx)
    }

    /// Drop everything held for a connection. Pending waiters see their sender dropped.
    pub fn forget(&self, id: &ConnectionId) {
        self.slots.lock().retain(|(conn, _), _| conn != id);
    }

    pub fn peek(&self, id: &ConnectionId, kind: EventKind) -> Option<Value> {
        self.slots
            .lock()
            .get(&(id.clone(), kind))
            .and_then(|slot| slot.last.clone())
    }

    pub fn pending_waiters(&self, id: &ConnectionId, kind: EventKind) -> usize {
        self.slots
            .lock()
            .get(&(id.clone(), kind))
            .map_or(0, |slot| slot.waiters.iter().filter(|w| !w.is_closed()).count())
    }
}
