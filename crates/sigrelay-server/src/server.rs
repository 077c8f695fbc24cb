//! Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::RelayConfig;
use crate::health::health_check;
use crate::metrics::{self as relay_metrics, WS_CONNECTIONS_REJECTED_TOTAL};
use crate::relay::{self, Relay, RelayHandle};
use crate::session::{run_ws_session, SessionSettings};
use crate::shutdown::Shutdown;

/// Counts live WebSocket sessions against `max_connections`.
#[derive(Debug)]
pub struct ConnectionSlots {
    active: AtomicUsize,
    max: usize,
}

/// Frees its slot on drop.
#[derive(Debug)]
pub struct SlotGuard {
    slots: Arc<ConnectionSlots>,
}

impl ConnectionSlots {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            max,
        })
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotGuard {
                slots: Arc::clone(self),
            })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let _ = self.slots.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Shared state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
    pub settings: SessionSettings,
    pub slots: Arc<ConnectionSlots>,
    pub max_message_size: usize,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
    pub shutdown: CancellationToken,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Handle returned by [`start`]. Keeps background tasks alive until
/// [`ServerHandle::shutdown`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections, close every session and stop the relay.
    pub async fn shutdown(self, timeout: Option<Duration>) {
        info!("shutting down relay server");
        self.shutdown.drain(self.tasks, timeout).await;
    }
}

/// Bind the listener, spawn the relay actor and serve until shutdown.
pub async fn start(
    config: &RelayConfig,
    metrics: Option<PrometheusHandle>,
) -> Result<ServerHandle, std::io::Error> {
    let shutdown = Shutdown::new();
    let (relay, relay_task) = Relay::spawn(config.event_queue, shutdown.token());
    let mut tasks = vec![relay_task];

    if let Some(interval) = config.snapshot_interval() {
        tasks.push(relay::start_snapshot_task(
            relay.clone(),
            interval,
            shutdown.token(),
        ));
    }

    let state = AppState {
        relay,
        settings: SessionSettings {
            outbound_queue: config.outbound_queue,
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
        },
        slots: ConnectionSlots::new(config.max_connections),
        max_message_size: config.max_message_size,
        start_time: Instant::now(),
        metrics,
        shutdown: shutdown.token(),
    };
    let router = build_router(state, config.static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, static_dir = ?config.static_dir, "relay server started");

    let token = shutdown.token();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
        {
            error!(error = %e, "http server failed");
        }
    }));

    Ok(ServerHandle {
        local_addr,
        shutdown,
        tasks,
    })
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(slot) = state.slots.try_acquire() else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(max = state.slots.max, "connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            run_ws_session(socket, state.relay, state.settings, state.shutdown).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = if state.relay.is_running() {
        state.relay.snapshot().await.ok()
    } else {
        None
    };
    let resp = health_check(state.start_time, snapshot);
    let status = if resp.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(resp))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    relay_metrics::render(state.metrics.as_ref())
}
