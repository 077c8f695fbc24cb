//! The relay actor: the single task that owns the [`Registry`].
//!
//! Connection tasks never touch the registry. They send [`RelayEvent`]s
//! through a [`RelayHandle`], and the actor applies them one at a time, so
//! every lookup-then-fan-out sees a consistent registry. Sends to peers are
//! `try_send` into per-connection queues and never block the actor.

use std::time::Duration;

use sigrelay_core::ConnectionKey;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::lifecycle::{self, CloseReason};
use crate::registry::{Registry, RegistrySnapshot};
use crate::router;

/// Transport events delivered to the actor.
#[derive(Debug)]
pub enum RelayEvent {
    Opened(Connection),
    Message {
        key: ConnectionKey,
        text: String,
    },
    Closed {
        key: ConnectionKey,
        reason: CloseReason,
    },
    Snapshot(oneshot::Sender<RegistrySnapshot>),
}

/// The actor has stopped and no longer accepts events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("relay is not running")]
pub struct RelayStopped;

/// Owner of the registry. Drive it with [`Relay::run`] or feed it events
/// directly with [`Relay::handle_event`].
pub struct Relay {
    registry: Registry,
}

impl Relay {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Opened(connection) => {
                let _ = lifecycle::on_open(&mut self.registry, connection);
            }
            RelayEvent::Message { key, text } => {
                let outcome = router::route(&mut self.registry, &key, &text);
                debug!(conn = %key, ?outcome, "routed message");
            }
            RelayEvent::Closed { key, reason } => {
                let _ = lifecycle::on_close(&mut self.registry, &key, &reason);
            }
            RelayEvent::Snapshot(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
        }
    }

    /// Process events until every handle is dropped or `cancel` fires.
    pub async fn run(mut self, mut events: mpsc::Receiver<RelayEvent>, cancel: CancellationToken) {
        info!("relay started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                () = cancel.cancelled() => break,
            }
        }
        info!(remaining = self.registry.len(), "relay stopped");
    }

    /// Spawn the actor and return a handle to it.
    pub fn spawn(queue: usize, cancel: CancellationToken) -> (RelayHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let task = tokio::spawn(Self::new().run(rx, cancel));
        (RelayHandle { tx }, task)
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable sender side of the relay actor.
#[derive(Clone, Debug)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayEvent>,
}

impl RelayHandle {
    async fn send(&self, event: RelayEvent) -> Result<(), RelayStopped> {
        self.tx.send(event).await.map_err(|_| RelayStopped)
    }

    pub async fn open(&self, connection: Connection) -> Result<(), RelayStopped> {
        self.send(RelayEvent::Opened(connection)).await
    }

    pub async fn message(&self, key: ConnectionKey, text: String) -> Result<(), RelayStopped> {
        self.send(RelayEvent::Message { key, text }).await
    }

    pub async fn close(&self, key: ConnectionKey, reason: CloseReason) -> Result<(), RelayStopped> {
        self.send(RelayEvent::Closed { key, reason }).await
    }

    pub async fn snapshot(&self) -> Result<RegistrySnapshot, RelayStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayEvent::Snapshot(reply)).await?;
        rx.await.map_err(|_| RelayStopped)
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Periodically log registry counts. Diagnostic only.
pub fn start_snapshot_task(
    relay: RelayHandle,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick
        let _ = ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = cancel.cancelled() => break,
            }
            match relay.snapshot().await {
                Ok(s) => info!(
                    connections = s.connections,
                    hosts = s.hosts,
                    clients = s.clients,
                    unregistered = s.unregistered,
                    "registry snapshot"
                ),
                Err(_) => break,
            }
        }
    })
}
