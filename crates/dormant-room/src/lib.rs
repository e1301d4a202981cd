//! Hibernation-safe rooms for Dormant.
//!
//! A room relays one replicated document, its presence data, and its
//! roster between the connections attached to it. The relay logic
//! ([`RoomActor`]) is written against host capabilities ([`RoomHost`],
//! [`BlobStore`]) and keeps no authority of its own, so it can be thrown
//! away between any two events and rebuilt without clients noticing.
//!
//! # Key types
//!
//! - [`RoomActor`]: per-event relay logic over a host and a store
//! - [`RoomHost`]: send/broadcast plus connection enumeration
//! - [`BlobStore`]: durable snapshots ([`MemoryStore`], [`FileStore`])
//! - [`RoomManager`] / [`RoomHandle`]: the in-process host, one Tokio
//!   task per room
//! - [`RoomConfig`]: identity palette and hibernation policy

mod actor;
mod config;
mod error;
mod host;
mod manager;
mod room;
mod store;

pub use actor::RoomActor;
pub use config::{HibernationPolicy, RoomConfig};
pub use error::{RoomError, StoreError};
pub use host::RoomHost;
pub use manager::RoomManager;
pub use room::{ConnectionSender, RoomHandle};
pub use store::{BlobStore, FileStore, MemoryStore, snapshot_key};
