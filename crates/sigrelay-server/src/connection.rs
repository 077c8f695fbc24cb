//! Send handle for one WebSocket connection.

use axum::extract::ws::Utf8Bytes;
use sigrelay_core::{ConnectionKey, Outbound};
use tokio::sync::mpsc;

/// A frame queued for a connection's writer task.
///
/// Reference-counted UTF-8 bytes: a fan-out clones a pointer, and the
/// writer hands the same buffer to the socket without copying.
pub type Frame = Utf8Bytes;

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue full")]
    Full,
    #[error("connection closed")]
    Closed,
    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl SendError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Closed => "closed",
            Self::Encode(_) => "encode",
        }
    }
}

/// Handle the relay holds for a connection it does not own.
///
/// The transport's writer task owns the receiving half; once it exits,
/// every send fails with [`SendError::Closed`].
#[derive(Clone, Debug)]
pub struct Connection {
    key: ConnectionKey,
    tx: mpsc::Sender<Frame>,
}

impl Connection {
    pub fn new(key: ConnectionKey, tx: mpsc::Sender<Frame>) -> Self {
        Self { key, tx }
    }

    /// Create a connection with a fresh key and a bounded outbound queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(ConnectionKey::new(), tx), rx)
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Whether the writer side is still draining the queue.
    pub fn is_writable(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a frame without waiting. Never blocks the caller.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Serialize a relay-originated message and queue it.
    pub fn send_outbound(&self, message: &Outbound) -> Result<(), SendError> {
        let json = message
            .to_json()
            .map_err(|e| SendError::Encode(e.to_string()))?;
        self.send(Frame::from(json))
    }
}
