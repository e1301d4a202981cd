/// Errors from decoding or merging replicated state.
#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    /// The bytes are not a valid update or state vector.
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    /// The update decoded but could not be integrated.
    #[error("failed to apply update: {0}")]
    Apply(String),

    /// Registering an update observer failed.
    #[error("failed to observe document: {0}")]
    Observe(String),
}
