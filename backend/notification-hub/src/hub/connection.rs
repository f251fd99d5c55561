//! Connection handles held by the registry
//!
//! The registry never owns a socket. It holds a shared handle implementing
//! [`Connection`]; the transport (a WebSocket session actor in production)
//! owns the socket and drains whatever the handle enqueues.

use crate::error::{HubError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// User identifier as issued by the bank's user service
pub type UserId = i64;

/// Unique identifier for one open connection
///
/// Assigned when the handle is created, used to remove exactly that handle
/// from a user's collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One open client session that can receive serialized notifications
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Push one JSON text frame. May suspend on backpressure.
    async fn send_text(&self, text: Arc<str>) -> Result<()>;

    /// Ask the transport to close the session. Best effort.
    async fn close(&self);
}

pub type ConnectionHandle = Arc<dyn Connection>;

/// Frames queued for a session actor
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(Arc<str>),
    Close,
}

/// Connection backed by a bounded queue drained by the transport
pub struct ChannelConnection {
    id: ConnectionId,
    sender: mpsc::Sender<OutboundFrame>,
}

impl ChannelConnection {
    /// Create a handle plus the receiving end the transport must drain
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                sender,
            },
            receiver,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_text(&self, text: Arc<str>) -> Result<()> {
        self.sender
            .send(OutboundFrame::Text(text))
            .await
            .map_err(|_| HubError::ConnectionClosed)
    }

    async fn close(&self) {
        // A full queue means the session is already stuck; dropping the
        // registry's handle is all that is left to do.
        let _ = self.sender.try_send(OutboundFrame::Close);
    }
}
