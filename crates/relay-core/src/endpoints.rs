//! HTTP endpoint paths shared with the browser-side test harness.

/// Port the harness listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5030;

/// The fixed set of harness endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    WaitForServerDisconnect,
    IsConnected,
    WaitForPointerLocation,
    SendPointerLocation,
    WaitForDrawEvent,
    SendDrawEvent,
}

impl Endpoint {
    pub const ALL: [Endpoint; 6] = [
        Endpoint::WaitForServerDisconnect,
        Endpoint::IsConnected,
        Endpoint::WaitForPointerLocation,
        Endpoint::SendPointerLocation,
        Endpoint::WaitForDrawEvent,
        Endpoint::SendDrawEvent,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Self::WaitForServerDisconnect => "/wait-for-server-disconnect",
            Self::IsConnected => "/is-connected",
            Self::WaitForPointerLocation => "/wait-for-pointer-location",
            Self::SendPointerLocation => "/send-pointer-location",
            Self::WaitForDrawEvent => "/wait-for-draw-event",
            Self::SendDrawEvent => "/send-draw-event",
        }
    }
}
