//! Who is in a room, and what they are pointing at.
//!
//! This crate holds the two pieces of per-room state that are about
//! connections rather than the document:
//!
//! 1. **Roster** ([`Roster`]): identities assigned to live connections,
//!    always re-derived from the host's enumeration ([`ConnectionRegistry`])
//! 2. **Presence** ([`PresenceStore`]): the last presence payload each
//!    connection published
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← asks the roster for snapshots, routes presence
//!     ↕
//! Session Layer (this crate)  ← identity and presence bookkeeping
//!     ↕
//! Protocol Layer (below)  ← provides ConnectionId, Identity, RosterSnapshot
//! ```
//!
//! Neither type survives actor re-instantiation. The roster rebuilds
//! itself from connection attachments; presence is simply lost until
//! clients publish again.

mod palette;
mod presence;
mod registry;
mod roster;

pub use palette::{IdentityPalette, PaletteEntry, default_entries};
pub use presence::PresenceStore;
pub use registry::ConnectionRegistry;
pub use roster::Roster;
