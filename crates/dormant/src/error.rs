//! Unified error type for Dormant.

use dormant_doc::ReplicaError;
use dormant_protocol::ProtocolError;
use dormant_room::{RoomError, StoreError};
use dormant_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DormantError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid room name).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A document error.
    #[error(transparent)]
    Replica(#[from] ReplicaError),

    /// A room-level error (room task unavailable).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A durable store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The status listener could not be set up.
    #[error("status listener on {addr} failed: {source}")]
    Status {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
