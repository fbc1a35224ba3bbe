use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use relay_core::{ConnectionId, Envelope, EventKind};

use crate::cache::EventCache;
use crate::connection::ConnectionRegistry;

/// Route one inbound text frame into the event cache.
///
/// Returns the event kind that was recorded, if any.
pub fn route_frame(cache: &EventCache, id: &ConnectionId, raw: &str) -> Option<EventKind> {
    let envelope = match Envelope::from_json(raw) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "Ignoring undecodable frame");
            return None;
        }
    };

    let Some(kind) = EventKind::from_client_event(&envelope.event) else {
        tracing::debug!(connection_id = %id, event = %envelope.event, "Ignoring unknown event");
        return None;
    };

    let delivered = cache.record(id, kind, envelope.data);
    tracing::debug!(connection_id = %id, kind = %kind, delivered, "Client event recorded");
    Some(kind)
}

/// Drive a WebSocket connection from attach to teardown.
///
/// Registers the connection, announces its id, pumps frames in both
/// directions with a periodic ping, and on exit unregisters it and purges its
/// cached events.
pub async fn run_connection(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    cache: Arc<EventCache>,
    heartbeat_interval: Duration,
) {
    let (connection, mut rx) = registry.register();
    let connection_id = connection.id().clone();
    tracing::info!(connection_id = %connection_id, "WebSocket client connected");

    let _ = connection.emit(&Envelope::connected(&connection_id));

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: queued frames out, plus ping
    let writer_closed = connection.closed_token();
    let writer_cid = connection_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        ping_interval.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(connection_id = %writer_cid, "Sent ping");
                }
                () = writer_closed.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader: client events into the cache
    let reader_closed = connection.closed_token();
    let reader_cid = connection_id.clone();
    let reader_cache = Arc::clone(&cache);
    let mut reader = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            let _ = route_frame(&reader_cache, &reader_cid, text.as_str());
                        }
                        Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {} // ping/pong handled by axum
                    }
                }
                () = reader_closed.cancelled() => break,
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    let _ = registry.unregister(&connection_id);
    cache.forget(&connection_id);
    tracing::info!(connection_id = %connection_id, "WebSocket client disconnected");
}
