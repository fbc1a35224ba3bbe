use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use relay_core::{Endpoint, HarnessError};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache::EventCache;
use crate::config::ServerConfig;
use crate::connection::ConnectionRegistry;
use crate::handlers;
use crate::socket;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub cache: Arc<EventCache>,
    pub shutdown: CancellationToken,
    pub heartbeat_interval: Duration,
}

impl AppState {
    pub fn new(config: &ServerConfig, shutdown: CancellationToken) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(config.max_send_queue)),
            cache: Arc::new(EventCache::new()),
            shutdown,
            heartbeat_interval: config.heartbeat_interval(),
        }
    }
}

/// Build the Axum router: the endpoint table, the WebSocket gateway and health.
pub fn build_router(state: AppState) -> Router {
    let router = Endpoint::ALL
        .into_iter()
        .fold(Router::new(), |router, endpoint| {
            router.route(endpoint.path(), handlers::endpoint_route(endpoint))
        });

    router
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle used to stop the server.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, HarnessError> {
    let shutdown = CancellationToken::new();
    let state = AppState::new(&config, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    let router = build_router(state.clone());
    let token = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "HTTP server exited with error");
        }
    });

    tracing::info!(addr = %local_addr, "Relay harness started");

    Ok(ServerHandle {
        addr: local_addr,
        state,
        shutdown_timeout: config.shutdown_timeout(),
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    addr: SocketAddr,
    state: AppState,
    shutdown_timeout: Duration,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    pub fn cache(&self) -> &Arc<EventCache> {
        &self.state.cache
    }

    /// Stop serving.
    ///
    /// Pending event waiters answer 503 and every WebSocket is sent a Close frame.
    /// The listener then has `shutdown_timeout` to drain in-flight requests; past
    /// that the serve task is aborted. Aborting only stops accepting: connections
    /// axum already spawned run on their own tasks and end when their handlers
    /// return, which every harness handler does once the token is cancelled.
    pub async fn stop(mut self) {
        tracing::info!(addr = %self.addr, "Stopping relay harness");
        self.state.shutdown.cancel();

        let closed = self.state.registry.close_all();
        tracing::info!(closed, "Closed WebSocket connections");

        if tokio::time::timeout(self.shutdown_timeout, &mut self.server)
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "HTTP drain timed out, aborting listener"
            );
            self.server.abort();
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        socket::run_connection(socket, state.registry, state.cache, state.heartbeat_interval)
    })
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.registry.count(),
    }))
}
