use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ConnectionId;

/// Sent once to every client right after it attaches.
pub const CONNECTED_EVENT: &str = "connected";

pub const CLIENT_POINTER_EVENT: &str = "client_pointer_event";
pub const SERVER_POINTER_EVENT: &str = "server_pointer_event";
pub const CLIENT_DRAW_EVENT: &str = "client_draw_event";
pub const SERVER_DRAW_EVENT: &str = "server_draw_event";

/// The two kinds of event the harness relays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    PointerLocation,
    DrawEvent,
}

impl EventKind {
    /// Event name used by clients when reporting to the server.
    pub fn client_event_name(self) -> &'static str {
        match self {
            Self::PointerLocation => CLIENT_POINTER_EVENT,
            Self::DrawEvent => CLIENT_DRAW_EVENT,
        }
    }

    /// Event name used by the server when pushing to clients.
    pub fn server_event_name(self) -> &'static str {
        match self {
            Self::PointerLocation => SERVER_POINTER_EVENT,
            Self::DrawEvent => SERVER_DRAW_EVENT,
        }
    }

    pub fn from_client_event(name: &str) -> Option<Self> {
        match name {
            CLIENT_POINTER_EVENT => Some(Self::PointerLocation),
            CLIENT_DRAW_EVENT => Some(Self::DrawEvent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PointerLocation => "pointer_location",
            Self::DrawEvent => "draw_event",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single WebSocket frame: `{"event": ..., "data": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn connected(id: &ConnectionId) -> Self {
        Self::new(CONNECTED_EVENT, serde_json::json!({ "id": id }))
    }

    /// Frame relaying `data` from the server to a client.
    pub fn server_event(kind: EventKind, data: Value) -> Self {
        Self::new(kind.server_event_name(), data)
    }

    /// Frame a client sends to report `data` to the server.
    pub fn client_event(kind: EventKind, data: Value) -> Self {
        Self::new(kind.client_event_name(), data)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
