//! `PairlineServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use pairline_session::{CodeGenerator, EventRouter, RandomCodes};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::hub::ConnectionHub;
use crate::websocket::session::{Heartbeat, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Open connections.
    pub hub: Arc<ConnectionHub>,
    /// Session core.
    pub router: EventRouter,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// The Pairline relay server.
pub struct PairlineServer {
    config: Arc<ServerConfig>,
    hub: Arc<ConnectionHub>,
    router: EventRouter,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl PairlineServer {
    /// Create a server with random session codes.
    pub fn new(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Self {
        Self::with_code_generator(config, metrics, Box::new(RandomCodes::new()))
    }

    /// Create a server drawing session codes from `codes`.
    pub fn with_code_generator(
        config: ServerConfig,
        metrics: Option<PrometheusHandle>,
        codes: Box<dyn CodeGenerator>,
    ) -> Self {
        let hub = Arc::new(ConnectionHub::new(config.send_queue_capacity));
        let router = EventRouter::with_code_generator(hub.clone(), config.router_config(), codes);
        Self {
            config: Arc::new(config),
            hub,
            router,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            router: self.router.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        let app = match &self.config.static_dir {
            Some(dir) => app.fallback_service(ServeDir::new(dir)),
            None => app,
        };

        app.layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in the background until shutdown.
    ///
    /// Returns the bound address and the serving task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        info!(%addr, static_dir = ?self.config.static_dir, "pairline server listening");

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = served {
                error!(error = %err, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Destroy every session, notifying participants.
    pub fn close_sessions(&self) -> usize {
        let closed = self.router.shutdown();
        info!(closed, "closed all sessions");
        closed
    }

    /// Open connections.
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Session core.
    pub fn event_router(&self) -> &EventRouter {
        &self.router
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let limit = state.config.max_message_size();
    let heartbeat = Heartbeat {
        interval: state.config.heartbeat_interval(),
        timeout: state.config.heartbeat_timeout(),
    };
    let shutdown = state.shutdown.child_token();
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| run_ws_session(socket, state.hub, state.router, heartbeat, shutdown))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.count(),
        state.router.registry().len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
