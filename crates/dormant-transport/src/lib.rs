//! Transport abstraction layer for Dormant.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the network protocol carrying frames between clients and the relay.
//!
//! A connection must support sending while a receive is pending: the relay
//! pushes broadcasts to a connection at any time, independently of what
//! that connection is sending.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use dormant_protocol::ConnectionId;
pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingWebSocket, WebSocketConnection, WebSocketTransport};

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// An accepted peer still waiting for its handshake.
    type Pending: PendingConnection<Connection = Self::Connection, Error = Self::Error>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next peer.
    ///
    /// Returns as soon as the peer is accepted, before any handshake, so the
    /// caller can run [`PendingConnection::complete`] off the accept loop.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// A peer accepted by a [`Transport`] whose handshake has not run.
pub trait PendingConnection: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Runs the handshake and yields the usable connection.
    async fn complete(self) -> Result<Self::Connection, Self::Error>;
}

/// A single connection that can send and receive bytes.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends data to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the request path the peer connected with, e.g. `/r1`.
    fn path(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_names_connection() {
        let err = TransportError::SendFailed(
            ConnectionId::new(4),
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
        );
        assert_eq!(err.to_string(), "send on conn-4 failed: gone");
    }

    #[test]
    fn test_bind_error_names_address() {
        let err = TransportError::Bind {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
