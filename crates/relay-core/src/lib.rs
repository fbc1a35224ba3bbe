pub mod endpoints;
pub mod errors;
pub mod events;
pub mod ids;

pub use endpoints::{Endpoint, DEFAULT_PORT};
pub use errors::HarnessError;
pub use events::{Envelope, EventKind};
pub use ids::ConnectionId;
