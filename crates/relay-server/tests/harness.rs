//! End-to-end tests driving the harness over real HTTP and WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_core::{ConnectionId, Endpoint, Envelope, EventKind};
use relay_server::{start, ServerConfig, ServerHandle};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot_server() -> ServerHandle {
    let config = ServerConfig {
        port: 0,
        shutdown_timeout_secs: 1,
        ..Default::default()
    };
    start(config).await.unwrap()
}

/// Attach a client and return it with the id the server announced.
async fn connect_client(addr: SocketAddr) -> (WsStream, String) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let hello = next_envelope(&mut ws).await.expect("connected frame");
    assert_eq!(hello.event, "connected");
    let id = hello.data["id"].as_str().unwrap().to_owned();
    (ws, id)
}

async fn next_envelope(ws: &mut WsStream) -> Option<Envelope> {
    loop {
        match timeout(TIMEOUT, ws.next()).await.ok()?? {
            Ok(Message::Text(text)) => return Some(Envelope::from_json(text.as_str()).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

async fn send_client_event(ws: &mut WsStream, kind: EventKind, data: Value) {
    let frame = Envelope::client_event(kind, data).to_json().unwrap();
    ws.send(Message::Text(frame.into())).await.unwrap();
}

fn endpoint_url(addr: SocketAddr, endpoint: Endpoint, params: &[(&str, &str)]) -> reqwest::Url {
    let base = format!("http://{addr}{}", endpoint.path());
    reqwest::Url::parse_with_params(&base, params).unwrap()
}

async fn get(url: reqwest::Url) -> (u16, String) {
    let resp = timeout(TIMEOUT, reqwest::get(url)).await.unwrap().unwrap();
    let status = resp.status().as_u16();
    (status, resp.text().await.unwrap())
}

async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn unknown_path_is_not_found_with_cors() {
    let handle = boot_server().await;
    let resp = reqwest::Client::new()
        .get(format!("http://{}/no-such-endpoint", handle.addr()))
        .header("Origin", "http://localhost:8080")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert_eq!(resp.text().await.unwrap(), "Not Found");
    handle.stop().await;
}

#[tokio::test]
async fn endpoints_carry_cors_header() {
    let handle = boot_server().await;
    let resp = reqwest::Client::new()
        .get(endpoint_url(handle.addr(), Endpoint::IsConnected, &[]))
        .header("Origin", "http://localhost:8080")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    handle.stop().await;
}

#[tokio::test]
async fn is_connected_tracks_attached_clients() {
    let handle = boot_server().await;
    let addr = handle.addr();

    let (_, body) = get(endpoint_url(addr, Endpoint::IsConnected, &[])).await;
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!([]));

    let (mut ws1, id1) = connect_client(addr).await;
    let (_ws2, id2) = connect_client(addr).await;

    let (_, body) = get(endpoint_url(addr, Endpoint::IsConnected, &[])).await;
    let mut ids: Vec<String> = serde_json::from_str(&body).unwrap();
    ids.sort();
    let mut expected = vec![id1.clone(), id2.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    ws1.close(None).await.unwrap();
    let (status, body) = get(endpoint_url(
        addr,
        Endpoint::WaitForServerDisconnect,
        &[("socketId", id1.as_str())],
    ))
    .await;
    assert_eq!((status, body.as_str()), (200, "disconnected"));

    let registry = handle.registry().clone();
    eventually(|| registry.get(&id1).is_none()).await;
    let (_, body) = get(endpoint_url(addr, Endpoint::IsConnected, &[])).await;
    let ids: Vec<String> = serde_json::from_str(&body).unwrap();
    assert_eq!(ids, vec![id2]);

    handle.stop().await;
}

#[tokio::test]
async fn cached_pointer_location_is_returned_and_cleared() {
    let handle = boot_server().await;
    let addr = handle.addr();
    let (mut ws, id) = connect_client(addr).await;
    let payload = json!({"x": 42, "y": 17});

    send_client_event(&mut ws, EventKind::PointerLocation, payload.clone()).await;
    let cache = handle.cache().clone();
    let conn = ConnectionId::from_raw(id.clone());
    eventually(|| cache.peek(&conn, EventKind::PointerLocation).is_some()).await;

    let (status, body) = get(endpoint_url(
        addr,
        Endpoint::WaitForPointerLocation,
        &[("socketId", id.as_str())],
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), payload);
    assert!(cache.peek(&conn, EventKind::PointerLocation).is_none());

    handle.stop().await;
}

#[tokio::test]
async fn wait_for_draw_event_resolves_with_next_event() {
    let handle = boot_server().await;
    let addr = handle.addr();
    let (mut ws, id) = connect_client(addr).await;
    let payload = json!({"fromX": 1, "fromY": 2, "toX": 3, "toY": 4});

    let url = endpoint_url(addr, Endpoint::WaitForDrawEvent, &[("socketId", id.as_str())]);
    let pending = tokio::spawn(get(url));

    let cache = handle.cache().clone();
    let conn = ConnectionId::from_raw(id.clone());
    eventually(|| cache.pending_waiters(&conn, EventKind::DrawEvent) == 1).await;

    send_client_event(&mut ws, EventKind::DrawEvent, payload.clone()).await;

    let (status, body) = pending.await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), payload);
    assert!(cache.peek(&conn, EventKind::DrawEvent).is_none());

    handle.stop().await;
}

#[tokio::test]
async fn event_kinds_do_not_satisfy_each_other() {
    let handle = boot_server().await;
    let addr = handle.addr();
    let (mut ws, id) = connect_client(addr).await;

    send_client_event(&mut ws, EventKind::DrawEvent, json!("draw")).await;
    send_client_event(&mut ws, EventKind::PointerLocation, json!("pointer")).await;

    let (_, body) = get(endpoint_url(
        addr,
        Endpoint::WaitForPointerLocation,
        &[("socketId", id.as_str())],
    ))
    .await;
    assert_eq!(body, "\"pointer\"");

    let cache = handle.cache().clone();
    let conn = ConnectionId::from_raw(id);
    eventually(|| cache.peek(&conn, EventKind::DrawEvent).is_some()).await;

    handle.stop().await;
}

#[tokio::test]
async fn send_endpoints_relay_to_client() {
    let handle = boot_server().await;
    let addr = handle.addr();
    let (mut ws, id) = connect_client(addr).await;

    let data = r#"{"x":5,"y":6}"#;
    let (status, body) = get(endpoint_url(
        addr,
        Endpoint::SendPointerLocation,
        &[("socketId", id.as_str()), ("data", data)],
    ))
    .await;
    assert_eq!((status, body.as_str()), (200, "ok"));

    let frame = next_envelope(&mut ws).await.unwrap();
    assert_eq!(frame.event, "server_pointer_event");
    assert_eq!(frame.data, json!({"x": 5, "y": 6}));

    let data = r#"{"fromX":0,"fromY":0,"toX":9,"toY":9}"#;
    let (status, body) = get(endpoint_url(
        addr,
        Endpoint::SendDrawEvent,
        &[("socketId", id.as_str()), ("data", data)],
    ))
    .await;
    assert_eq!((status, body.as_str()), (200, "ok"));

    let frame = next_envelope(&mut ws).await.unwrap();
    assert_eq!(frame.event, "server_draw_event");
    assert_eq!(frame.data["toX"], 9);

    handle.stop().await;
}

#[tokio::test]
async fn send_to_unknown_socket_still_replies_ok() {
    let handle = boot_server().await;
    let (status, body) = get(endpoint_url(
        handle.addr(),
        Endpoint::SendDrawEvent,
        &[("socketId", "conn_nobody"), ("data", "{}")],
    ))
    .await;
    assert_eq!((status, body.as_str()), (200, "ok"));
    handle.stop().await;
}

#[tokio::test]
async fn wait_for_disconnect_on_absent_socket_is_immediate() {
    let handle = boot_server().await;
    let (status, body) = get(endpoint_url(
        handle.addr(),
        Endpoint::WaitForServerDisconnect,
        &[("socketId", "conn_gone")],
    ))
    .await;
    assert_eq!((status, body.as_str()), (200, "disconnected"));

    let (status, body) = get(endpoint_url(handle.addr(), Endpoint::WaitForServerDisconnect, &[])).await;
    assert_eq!((status, body.as_str()), (200, "disconnected"));
    handle.stop().await;
}

#[tokio::test]
async fn malformed_data_is_bad_request() {
    let handle = boot_server().await;
    let (_ws, id) = connect_client(handle.addr()).await;

    let (status, body) = get(endpoint_url(
        handle.addr(),
        Endpoint::SendPointerLocation,
        &[("socketId", id.as_str()), ("data", "{not json")],
    ))
    .await;
    assert_eq!(status, 400);
    assert!(body.starts_with("invalid data parameter"), "got: {body}");
    handle.stop().await;
}

#[tokio::test]
async fn wait_for_event_on_unknown_socket_is_bad_request() {
    let handle = boot_server().await;
    let (status, body) = get(endpoint_url(
        handle.addr(),
        Endpoint::WaitForPointerLocation,
        &[("socketId", "conn_missing")],
    ))
    .await;
    assert_eq!(status, 400);
    assert_eq!(body, "unknown socket: conn_missing");
    handle.stop().await;
}

#[tokio::test]
async fn waiter_is_released_when_client_disconnects() {
    let handle = boot_server().await;
    let addr = handle.addr();
    let (mut ws, id) = connect_client(addr).await;

    let url = endpoint_url(addr, Endpoint::WaitForDrawEvent, &[("socketId", id.as_str())]);
    let pending = tokio::spawn(get(url));

    let cache = handle.cache().clone();
    let conn = ConnectionId::from_raw(id);
    eventually(|| cache.pending_waiters(&conn, EventKind::DrawEvent) == 1).await;

    ws.close(None).await.unwrap();

    let (status, body) = pending.await.unwrap();
    assert_eq!((status, body.as_str()), (410, "connection closed"));
    handle.stop().await;
}

#[tokio::test]
async fn stop_releases_waiters_and_closes_clients() {
    let handle = boot_server().await;
    let addr = handle.addr();
    let (mut ws, id) = connect_client(addr).await;

    let url = endpoint_url(addr, Endpoint::WaitForPointerLocation, &[("socketId", id.as_str())]);
    let pending = tokio::spawn(get(url));

    let cache = handle.cache().clone();
    let conn = ConnectionId::from_raw(id);
    eventually(|| cache.pending_waiters(&conn, EventKind::PointerLocation) == 1).await;

    handle.stop().await;

    let (status, body) = pending.await.unwrap();
    assert_eq!((status, body.as_str()), (503, "shutting down"));
    assert!(next_envelope(&mut ws).await.is_none());
}

#[tokio::test]
async fn endpoints_answer_any_method() {
    let handle = boot_server().await;
    let client = reqwest::Client::new();
    let (_ws, id) = connect_client(handle.addr()).await;

    let resp = client
        .post(endpoint_url(handle.addr(), Endpoint::IsConnected, &[]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let ids: Vec<String> = resp.json().await.unwrap();
    assert_eq!(ids, vec![id.clone()]);

    let resp = client
        .put(endpoint_url(
            handle.addr(),
            Endpoint::SendDrawEvent,
            &[("socketId", id.as_str()), ("data", "1")],
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
    handle.stop().await;
}
