//! Client side of Dormant.
//!
//! A [`Provider`] binds a local [`Replica`](dormant_doc::Replica) to one
//! room on a relay. It keeps the WebSocket connection alive, exchanges
//! sync steps on every (re)connect, pushes local edits as updates, and
//! hands everything else (presence, roster, identity, application
//! messages) to the caller as [`ProviderEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ProviderConfig::new("ws://127.0.0.1:8080", RoomName::new("notes")?);
//! let (provider, mut events) = Provider::new(config, Replica::new())?;
//! while let Some(event) = events.recv().await {
//!     if let ProviderEvent::Synced = event {
//!         provider.publish_presence(json!({"cursor": 0}))?;
//!     }
//! }
//! ```

mod config;
mod error;
mod provider;

pub use config::ProviderConfig;
pub use error::ProviderError;
pub use provider::{ConnectionStatus, Provider, ProviderEvent};
