//! Error types for the room layer.

use dormant_protocol::RoomName;

/// Errors from reading or writing durable blobs.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage failed.
    #[error("store i/o on {key:?} failed: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The key cannot be mapped onto the store's namespace.
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),
}

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room's command channel is full or closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomName),

    /// Setting up durable storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
