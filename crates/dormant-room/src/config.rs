//! Room configuration.

use dormant_session::{IdentityPalette, PaletteEntry, default_entries};
use serde::{Deserialize, Serialize};

/// When the host shell discards the in-memory room actor.
///
/// The actor is always discarded once a room has no connections left.
/// `AfterEachEvent` additionally drops it after every event, which is what
/// an aggressively suspending host would do; the room must behave the
/// same either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HibernationPolicy {
    #[default]
    Never,
    AfterEachEvent,
}

/// Configuration shared by every room a manager spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Names and colors identities are drawn from, by join ordinal.
    pub palette: Vec<PaletteEntry>,

    /// Prefix for avatar URLs (`{avatar_base_url}/{name}.svg`).
    pub avatar_base_url: String,

    pub hibernation: HibernationPolicy,

    /// Capacity of each room's command channel.
    pub mailbox_size: usize,
}

impl RoomConfig {
    pub fn identity_palette(&self) -> IdentityPalette {
        IdentityPalette::new(self.palette.clone(), self.avatar_base_url.clone())
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            palette: default_entries(),
            avatar_base_url: "/avatars".to_string(),
            hibernation: HibernationPolicy::Never,
            mailbox_size: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.palette.len(), 8);
        assert_eq!(config.avatar_base_url, "/avatars");
        assert_eq!(config.hibernation, HibernationPolicy::Never);
        assert_eq!(config.mailbox_size, 64);
    }

    #[test]
    fn test_room_config_partial_json_uses_defaults() {
        let config: RoomConfig =
            serde_json::from_str(r#"{"hibernation":"after_each_event"}"#).unwrap();
        assert_eq!(config.hibernation, HibernationPolicy::AfterEachEvent);
        assert_eq!(config.mailbox_size, 64);
        assert_eq!(config.identity_palette().identity_for(0).name, "Fox");
    }
}
