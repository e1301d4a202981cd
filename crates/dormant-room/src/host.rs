use dormant_protocol::ConnectionId;
use dormant_session::ConnectionRegistry;

/// Capabilities the hosting runtime lends to a room actor.
///
/// Beyond enumeration and attachments ([`ConnectionRegistry`]), the host
/// delivers bytes. Delivery is best effort: a connection that has gone away
/// simply does not receive.
pub trait RoomHost: ConnectionRegistry {
    fn send_to(&self, id: ConnectionId, data: &[u8]);

    /// Sends to every live connection not listed in `exclude`.
    fn broadcast(&self, data: &[u8], exclude: &[ConnectionId]);
}
