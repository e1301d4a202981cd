//! Error types for the protocol layer.
//!
//! Every variant here describes a frame that could not be produced or
//! understood. None of them is fatal to a connection: the relay logs the
//! error and drops the frame.

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A JSON payload could not be serialized.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A JSON payload was malformed or had the wrong shape.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The binary envelope was truncated or had an invalid varint.
    #[error("malformed frame: {0}")]
    Malformed(#[from] yrs::encoding::read::Error),

    /// The leading tag names a message kind this version does not know.
    ///
    /// Kept distinct from [`ProtocolError::Malformed`] because future
    /// versions may add kinds; receivers must drop these quietly.
    #[error("unknown message tag {0}")]
    UnknownTag(u32),

    /// A SYNC frame carried an unknown sub-message tag.
    #[error("unknown sync message tag {0}")]
    UnknownSyncTag(u32),

    /// A room name failed validation.
    #[error("invalid room name: {0:?}")]
    InvalidRoomName(String),

    /// The message decoded but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
