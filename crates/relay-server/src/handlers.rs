//! The six harness endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, MethodRouter};
use relay_core::{ConnectionId, Endpoint, Envelope, EventKind, HarnessError};
use serde::Deserialize;
use serde_json::Value;

use crate::cache::Lookup;
use crate::connection::Connection;
use crate::server::AppState;

/// Query parameters every endpoint accepts.
#[derive(Debug, Default, Deserialize)]
pub struct HarnessQuery {
    #[serde(rename = "socketId")]
    pub socket_id: Option<String>,
    /// JSON-encoded payload.
    pub data: Option<String>,
}

impl HarnessQuery {
    pub fn decode_data(&self) -> Result<Option<Value>, HarnessError> {
        self.data
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()
            .map_err(HarnessError::from)
    }
}

/// A resolved request: the addressed connection, if live, and the decoded payload.
struct HarnessRequest {
    socket_id: String,
    connection: Option<Arc<Connection>>,
    data: Option<Value>,
}

impl HarnessRequest {
    fn resolve(state: &AppState, query: &HarnessQuery) -> Result<Self, HarnessError> {
        let data = query.decode_data()?;
        let socket_id = query.socket_id.clone().unwrap_or_default();
        let connection = state.registry.get(&socket_id);
        Ok(Self {
            socket_id,
            connection,
            data,
        })
    }

    fn require_connection(self) -> Result<Arc<Connection>, HarnessError> {
        self.connection
            .ok_or(HarnessError::UnknownConnection(self.socket_id))
    }
}

/// Error response wrapper.
pub struct ApiError(HarnessError);

impl From<HarnessError> for ApiError {
    fn from(err: HarnessError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::warn!(kind = self.0.error_kind(), error = %self.0, "Harness request failed");
        (status, self.0.to_string()).into_response()
    }
}

type HarnessResult<T> = Result<T, ApiError>;

/// Route for one entry of the endpoint table. Endpoints dispatch on path alone, any method.
pub fn endpoint_route(endpoint: Endpoint) -> MethodRouter<AppState> {
    match endpoint {
        Endpoint::WaitForServerDisconnect => any(wait_for_server_disconnect),
        Endpoint::IsConnected => any(is_connected),
        Endpoint::WaitForPointerLocation => any(wait_for_pointer_location),
        Endpoint::SendPointerLocation => any(send_pointer_location),
        Endpoint::WaitForDrawEvent => any(wait_for_draw_event),
        Endpoint::SendDrawEvent => any(send_draw_event),
    }
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

pub async fn wait_for_pointer_location(
    State(state): State<AppState>,
    Query(query): Query<HarnessQuery>,
) -> HarnessResult<String> {
    wait_for_event(&state, &query, EventKind::PointerLocation).await
}

pub async fn wait_for_draw_event(
    State(state): State<AppState>,
    Query(query): Query<HarnessQuery>,
) -> HarnessResult<String> {
    wait_for_event(&state, &query, EventKind::DrawEvent).await
}

/// Return the cached event for the connection, or wait for the next one.
async fn wait_for_event(
    state: &AppState,
    query: &HarnessQuery,
    kind: EventKind,
) -> HarnessResult<String> {
    let connection = HarnessRequest::resolve(state, query)?.require_connection()?;
    let id = connection.id();

    let payload = match state.cache.take_or_wait(id, kind) {
        Lookup::Ready(data) => data,
        Lookup::Pending(rx) => {
            tracing::debug!(connection_id = %id, kind = %kind, "Waiting for next event");
            // Stopping the server also closes every connection; report the stop, not the close.
            tokio::select! {
                biased;
                () = state.shutdown.cancelled() => return Err(HarnessError::ShuttingDown.into()),
                received = rx => received.map_err(|_| closed_reason(state))?,
                () = connection.disconnected() => {
                    // The socket task may have purged the cache before this waiter registered.
                    state.cache.forget(id);
                    return Err(closed_reason(state).into());
                }
            }
        }
    };

    Ok(payload.to_string())
}

fn closed_reason(state: &AppState) -> HarnessError {
    if state.shutdown.is_cancelled() {
        HarnessError::ShuttingDown
    } else {
        HarnessError::ConnectionClosed
    }
}

pub async fn is_connected(State(state): State<AppState>) -> Json<Vec<ConnectionId>> {
    Json(state.registry.ids())
}

pub async fn wait_for_server_disconnect(
    State(state): State<AppState>,
    Query(query): Query<HarnessQuery>,
) -> HarnessResult<&'static str> {
    let request = HarnessRequest::resolve(&state, &query)?;
    if let Some(connection) = request.connection.filter(|c| c.is_connected()) {
        tracing::debug!(connection_id = %connection.id(), "Waiting for disconnect");
        connection.disconnected().await;
    }
    Ok("disconnected")
}

pub async fn send_pointer_location(
    State(state): State<AppState>,
    Query(query): Query<HarnessQuery>,
) -> HarnessResult<&'static str> {
    send_event(&state, &query, EventKind::PointerLocation)
}

pub async fn send_draw_event(
    State(state): State<AppState>,
    Query(query): Query<HarnessQuery>,
) -> HarnessResult<&'static str> {
    send_event(&state, &query, EventKind::DrawEvent)
}

/// Push the payload to the connection. Absent connections are a no-op.
fn send_event(state: &AppState, query: &HarnessQuery, kind: EventKind) -> HarnessResult<&'static str> {
    let request = HarnessRequest::resolve(state, query)?;
    let envelope = Envelope::server_event(kind, request.data.unwrap_or(Value::Null));

    match request.connection {
        Some(connection) => {
            let _ = connection.emit(&envelope);
        }
        None => {
            tracing::warn!(socket_id = %request.socket_id, kind = %kind, "Send to unknown socket ignored");
        }
    }
    Ok("ok")
}
