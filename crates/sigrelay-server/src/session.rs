//! WebSocket session: one connected peer from upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::connection::Connection;
use crate::lifecycle::CloseReason;
use crate::relay::RelayHandle;

/// Per-session transport settings.
#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    pub outbound_queue: usize,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

/// When the peer last showed signs of life (any frame, including pongs).
#[derive(Debug)]
struct Liveness {
    last_seen: Mutex<Instant>,
}

impl Liveness {
    fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn mark(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    fn silent_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

/// Extract text from a frame. Binary frames are accepted when valid UTF-8.
fn frame_text(msg: WsMessage) -> Option<String> {
    match msg {
        WsMessage::Text(text) => Some(text.to_string()),
        WsMessage::Binary(data) => match std::str::from_utf8(&data) {
            Ok(s) => Some(s.to_owned()),
            Err(_) => {
                debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                None
            }
        },
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) => None,
    }
}

/// Run one peer's session against the relay.
///
/// The reader forwards frames to the relay in arrival order; the writer
/// drains the connection's outbound queue and sends heartbeat pings. When
/// either side ends, the relay is told the connection closed.
#[instrument(skip_all, fields(conn = tracing::field::Empty))]
pub async fn run_ws_session(
    socket: WebSocket,
    relay: RelayHandle,
    settings: SessionSettings,
    cancel: CancellationToken,
) {
    let (connection, mut outbound_rx) = Connection::channel(settings.outbound_queue);
    let key = connection.key().clone();
    let _ = tracing::Span::current().record("conn", tracing::field::display(&key));

    if relay.open(connection).await.is_err() {
        warn!("relay not running, dropping connection");
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let liveness = Arc::new(Liveness::new());

    // Writer task: forward queued frames + periodic ping
    let writer_liveness = Arc::clone(&liveness);
    let writer_cancel = cancel.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(settings.heartbeat_interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { return CloseReason::Closed };
                    if let Err(e) = ws_tx.send(WsMessage::Text(frame)).await {
                        return CloseReason::Error(e.to_string());
                    }
                }
                _ = ping_interval.tick() => {
                    if writer_liveness.silent_for() > settings.heartbeat_timeout {
                        warn!(timeout = ?settings.heartbeat_timeout, "peer unresponsive, disconnecting");
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        return CloseReason::TimedOut;
                    }
                    if let Err(e) = ws_tx.send(WsMessage::Ping(vec![].into())).await {
                        return CloseReason::Error(e.to_string());
                    }
                    trace!("sent ping");
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    return CloseReason::Shutdown;
                }
            }
        }
    });

    // Reader task: forward frames to the relay, track liveness
    let reader_relay = relay.clone();
    let reader_key = key.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => return CloseReason::Error(e.to_string()),
            };
            liveness.mark();
            if matches!(msg, WsMessage::Close(_)) {
                debug!("peer sent close frame");
                return CloseReason::Closed;
            }
            let Some(text) = frame_text(msg) else { continue };
            if reader_relay.message(reader_key.clone(), text).await.is_err() {
                return CloseReason::Shutdown;
            }
        }
        CloseReason::Closed
    });

    // Whichever side finishes first decides the close reason.
    let reason = tokio::select! {
        result = &mut writer => {
            reader.abort();
            result.unwrap_or(CloseReason::Closed)
        }
        result = &mut reader => {
            writer.abort();
            result.unwrap_or(CloseReason::Closed)
        }
    };

    info!(%reason, "session ended");
    if relay.close(key, reason).await.is_err() {
        debug!("relay already stopped");
    }
}
