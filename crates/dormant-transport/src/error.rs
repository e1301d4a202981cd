use dormant_protocol::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening socket failed.
    #[error("bind to {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The peer connected but the WebSocket upgrade did not complete.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// Sending data failed.
    #[error("send on {0} failed: {1}")]
    SendFailed(ConnectionId, #[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive on {0} failed: {1}")]
    ReceiveFailed(ConnectionId, #[source] std::io::Error),
}
