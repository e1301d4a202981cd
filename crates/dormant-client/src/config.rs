use std::time::Duration;

use dormant_protocol::RoomName;

/// Configuration for a [`Provider`](crate::Provider).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the relay, e.g. `ws://127.0.0.1:8080`.
    pub server_url: String,
    /// Room to join. Appended to `server_url` as the request path.
    pub room: RoomName,
    /// Pause before reconnecting after an unexpected close.
    pub reconnect_delay: Duration,
    /// Whether the provider connects as soon as it is created.
    pub connect_on_start: bool,
}

impl ProviderConfig {
    pub fn new(server_url: impl Into<String>, room: RoomName) -> Self {
        Self {
            server_url: server_url.into(),
            room,
            reconnect_delay: Duration::from_secs(1),
            connect_on_start: true,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_connect_on_start(mut self, connect: bool) -> Self {
        self.connect_on_start = connect;
        self
    }

    /// The full WebSocket URL for the room.
    pub fn url(&self) -> String {
        format!("{}/{}", self.server_url.trim_end_matches('/'), self.room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ProviderConfig::new("ws://localhost:8080", RoomName::new("r1").unwrap());
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert!(config.connect_on_start);
    }

    #[test]
    fn test_url_joins_room_without_double_slash() {
        let room = RoomName::new("notes").unwrap();
        assert_eq!(
            ProviderConfig::new("ws://h:1/", room.clone()).url(),
            "ws://h:1/notes"
        );
        assert_eq!(ProviderConfig::new("ws://h:1", room).url(), "ws://h:1/notes");
    }
}
