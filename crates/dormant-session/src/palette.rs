use dormant_protocol::Identity;
use serde::{Deserialize, Serialize};

/// One name/color pair an identity can be drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub name: String,
    pub color: String,
}

impl PaletteEntry {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// A fixed palette of identities indexed by join ordinal.
///
/// Ordinal `n` maps to entry `n % len`. Once the palette wraps, names get a
/// numeric suffix so two live connections never share a display name
/// (`Fox`, then `Fox 2` eight joins later).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPalette {
    entries: Vec<PaletteEntry>,
    avatar_base_url: String,
}

impl IdentityPalette {
    /// Builds a palette. An empty entry list falls back to the default one.
    pub fn new(entries: Vec<PaletteEntry>, avatar_base_url: impl Into<String>) -> Self {
        let entries = if entries.is_empty() {
            default_entries()
        } else {
            entries
        };
        Self {
            entries,
            avatar_base_url: avatar_base_url.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The identity for a join ordinal. Deterministic.
    pub fn identity_for(&self, ordinal: u32) -> Identity {
        let len = self.entries.len() as u32;
        let entry = &self.entries[(ordinal % len) as usize];
        let lap = ordinal / len;
        let name = if lap == 0 {
            entry.name.clone()
        } else {
            format!("{} {}", entry.name, lap + 1)
        };
        let avatar = format!(
            "{}/{}.svg",
            self.avatar_base_url.trim_end_matches('/'),
            entry.name.to_lowercase().replace(' ', "-")
        );
        Identity {
            ordinal,
            name,
            color: entry.color.clone(),
            avatar,
        }
    }
}

impl Default for IdentityPalette {
    fn default() -> Self {
        Self::new(default_entries(), "/avatars")
    }
}

/// The built-in eight-entry palette.
pub fn default_entries() -> Vec<PaletteEntry> {
    [
        ("Fox", "#e4572e"),
        ("Owl", "#29335c"),
        ("Otter", "#f3a712"),
        ("Heron", "#669bbc"),
        ("Lynx", "#a8c686"),
        ("Badger", "#8e5572"),
        ("Wren", "#2a9d8f"),
        ("Moth", "#6d597a"),
    ]
    .into_iter()
    .map(|(name, color)| PaletteEntry::new(name, color))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_for_first_lap_uses_plain_names() {
        let palette = IdentityPalette::default();
        let id = palette.identity_for(1);
        assert_eq!(id.name, "Owl");
        assert_eq!(id.color, "#29335c");
        assert_eq!(id.avatar, "/avatars/owl.svg");
        assert_eq!(id.ordinal, 1);
    }

    #[test]
    fn test_identity_for_wrapped_ordinal_adds_suffix() {
        let palette = IdentityPalette::default();
        let wrapped = palette.identity_for(8);
        assert_eq!(wrapped.name, "Fox 2");
        assert_eq!(wrapped.color, palette.identity_for(0).color);
    }

    #[test]
    fn test_new_with_empty_entries_falls_back_to_default() {
        let palette = IdentityPalette::new(Vec::new(), "https://cdn.example/a/");
        assert_eq!(palette.len(), 8);
        assert_eq!(palette.identity_for(0).avatar, "https://cdn.example/a/fox.svg");
    }
}
