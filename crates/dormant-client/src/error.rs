use dormant_doc::ReplicaError;
use dormant_protocol::ProtocolError;

/// Errors returned by [`Provider`](crate::Provider) methods.
///
/// Transport failures are not errors here: they surface as a
/// [`ConnectionStatus::Disconnected`](crate::ConnectionStatus) event
/// followed by a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Replica(#[from] ReplicaError),

    /// The message was not sent because no connection is open.
    #[error("not connected")]
    NotConnected,

    /// The provider was destroyed and will not connect again.
    #[error("provider destroyed")]
    Destroyed,
}
