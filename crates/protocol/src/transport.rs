use async_trait::async_trait;

use crate::{Payload, TransportKind};

/// Lifecycle of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, handshake not yet acknowledged by [`Transport::accept`].
    Connecting,
    Open,
    /// Terminal. Reached by an explicit close, a failed send/receive or a
    /// peer disconnect.
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("transport I/O: {0}")]
    Io(String),
    #[error("encoding payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A bidirectional channel carrying [`Payload`]s.
///
/// All methods take `&self` so a single `Arc<dyn Transport>` can be held by
/// the connection's read loop and by the bot session that sends replies.
/// Methods may suspend the calling task but never block other connections.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn state(&self) -> TransportState;

    fn is_closed(&self) -> bool {
        self.state() == TransportState::Closed
    }

    /// Mark the handshake complete and start accepting frames.
    async fn accept(&self) -> Result<(), TransportError>;

    /// Next structured payload.
    ///
    /// `None` means either the frame failed validation (keep listening) or
    /// the peer went away, in which case the state is now `Closed`.
    async fn receive(&self) -> Option<Payload>;

    /// Serialize and write `payload`. Fails with [`TransportError::Closed`]
    /// once the transport is closed.
    async fn send(&self, payload: &Payload) -> Result<(), TransportError>;

    /// Close with a WebSocket close code. Idempotent: later calls are no-ops
    /// and the state stays `Closed`.
    async fn close(&self, code: u16, reason: &str);
}
