//! Real-time sync over a WebSocket relay.
//!
//! The [`SyncChannel`] speaks the relay protocol in [`protocol`], tracks the
//! connection lifecycle with bounded reconnects, and filters out echoes of
//! frames this session sent itself.

mod channel;
mod connection;
mod presence;
pub mod protocol;
mod transport;

pub use channel::{SyncChannel, SyncEvent};
pub use connection::{Connection, ConnectionState, ReconnectPolicy};
pub use presence::Presence;
pub use protocol::{ClientMessage, CursorPosition, Originator, OutboundFrame, RoomUser, ServerMessage};
pub use transport::{NativeWebSocket, Transport, TransportEvent};

use thiserror::Error;

/// Errors surfaced by the sync layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("element operation failed: {0}")]
    ElementOperation(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}
