//! # Dormant
//!
//! A realtime document-sync relay that stays correct when the room holding
//! a document is suspended and rebuilt between any two events.
//!
//! Clients connect over WebSocket to `/{room}` and exchange three kinds of
//! frames: document sync, presence, and application messages. Each room
//! keeps no authority of its own; the live connection set and the durable
//! snapshot store are the only sources of truth.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dormant::prelude::*;
//!
//! # async fn run() -> Result<(), DormantError> {
//! let server = DormantServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .status_bind("127.0.0.1:8081")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;
mod status;

pub use error::DormantError;
pub use server::{DormantServer, DormantServerBuilder};

pub use dormant_doc as doc;
pub use dormant_protocol as protocol;
pub use dormant_room as room;
pub use dormant_session as session;
pub use dormant_transport as transport;

pub mod prelude {
    pub use crate::{DormantError, DormantServer, DormantServerBuilder};
    pub use dormant_protocol::{AppMessage, ConnectionId, Frame, RoomName, RoomStatus};
    pub use dormant_room::{BlobStore, FileStore, HibernationPolicy, MemoryStore, RoomConfig};
}
