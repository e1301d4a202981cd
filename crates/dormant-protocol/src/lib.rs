//! Wire protocol for Dormant.
//!
//! This crate defines what clients and the relay say to each other:
//!
//! - **Types** ([`Frame`], [`SyncMessage`], [`PresenceUpdate`],
//!   [`AppMessage`], roster types): the messages that travel on the wire.
//! - **Codec** ([`codec::encode`], [`codec::decode`]): the compact binary
//!   envelope around them.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the room
//! (document, roster, presence). It knows nothing about connections or
//! storage.
//!
//! ```text
//! Transport (bytes) → Protocol (Frame) → Room actor (replica, roster, presence)
//! ```

pub mod codec;
mod error;
mod types;

pub use codec::MessageTag;
pub use error::ProtocolError;
pub use types::{
    AppMessage, AppType, ConnectionId, Frame, Identity, MAX_ROOM_NAME_LEN, PresenceUpdate,
    RoomName, RoomStatus, RosterMode, RosterSnapshot, RosterUser, SyncMessage, unix_millis,
};
