//! Replicated document for Dormant.
//!
//! [`Replica`] wraps a `yrs` document with garbage collection disabled and
//! exposes the handful of byte-level operations the relay and the client
//! provider need: apply, state vector, diff, and whole-document
//! serialization for persistence.

mod error;
mod replica;

pub use error::ReplicaError;
pub use replica::{REMOTE_ORIGIN, Replica, SyncOutcome};
pub use yrs;
