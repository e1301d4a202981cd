use dormant_protocol::ConnectionId;

/// The host's view of which connections are open.
///
/// Implemented by whatever owns the transport connections. Every call is
/// answered from the host's live state, so the result is authoritative at
/// the moment of the call and must not be cached across events.
pub trait ConnectionRegistry {
    /// Live connections, ordered by the host.
    fn live_connections(&self) -> Vec<ConnectionId>;

    /// Opaque bytes the host keeps alongside a live connection.
    ///
    /// Attachments outlive the actor that wrote them for as long as the
    /// connection stays open.
    fn attachment(&self, id: ConnectionId) -> Option<Vec<u8>>;

    /// Replaces a connection's attachment. Ignored for unknown connections.
    fn set_attachment(&mut self, id: ConnectionId, data: Vec<u8>);
}
