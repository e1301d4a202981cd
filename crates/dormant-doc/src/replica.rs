use dormant_protocol::SyncMessage;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, Options, Origin, ReadTxn, StateVector, Subscription, Transact, Update};

use crate::ReplicaError;

/// Transaction origin tagged on every update that arrived over the wire.
///
/// Update observers use it to tell remote changes from local edits.
pub const REMOTE_ORIGIN: &str = "dormant-remote";

/// What a sync sub-message asked of the replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The peer sent its state vector; answer with this message.
    Reply(SyncMessage),
    /// The peer's update was merged and changed the document.
    Applied,
    /// The peer's update held nothing this replica lacked.
    Unchanged,
}

/// A replica of one room's document.
///
/// Cloning shares the underlying document.
#[derive(Clone)]
pub struct Replica {
    doc: Doc,
}

impl Replica {
    /// Creates an empty replica with garbage collection disabled.
    pub fn new() -> Self {
        let options = Options {
            skip_gc: true,
            ..Options::default()
        };
        Self {
            doc: Doc::with_options(options),
        }
    }

    /// Restores a replica from bytes produced by [`serialize_full`](Self::serialize_full).
    pub fn from_snapshot(snapshot: &[u8]) -> Result<Self, ReplicaError> {
        let replica = Self::new();
        replica.load_full(snapshot)?;
        Ok(replica)
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// Merges a v1-encoded update. Applying the same update twice is a no-op.
    pub fn apply_remote_update(&self, update: &[u8]) -> Result<(), ReplicaError> {
        self.apply_update_with_origin(update, REMOTE_ORIGIN)
    }

    pub fn apply_update_with_origin(
        &self,
        update: &[u8],
        origin: &str,
    ) -> Result<(), ReplicaError> {
        let update = Update::decode_v1(update).map_err(|e| ReplicaError::Decode {
            what: "update",
            reason: e.to_string(),
        })?;
        self.doc
            .transact_mut_with(origin)
            .apply_update(update)
            .map_err(|e| ReplicaError::Apply(e.to_string()))
    }

    /// Returns the v1-encoded state vector.
    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Returns everything this replica has that a peer with `state_vector`
    /// is missing.
    pub fn diff_since(&self, state_vector: &[u8]) -> Result<Vec<u8>, ReplicaError> {
        let sv = StateVector::decode_v1(state_vector).map_err(|e| ReplicaError::Decode {
            what: "state vector",
            reason: e.to_string(),
        })?;
        Ok(self.doc.transact().encode_diff_v1(&sv))
    }

    /// Encodes the whole document as a single update.
    pub fn serialize_full(&self) -> Vec<u8> {
        self.doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default())
    }

    /// Merges a full-document snapshot into this replica.
    pub fn load_full(&self, snapshot: &[u8]) -> Result<(), ReplicaError> {
        self.apply_update_with_origin(snapshot, REMOTE_ORIGIN)
    }

    /// Handles one sync sub-message from a peer.
    ///
    /// A step 1 is answered with a step 2 carrying the diff. A step 2 or an
    /// update is merged with [`REMOTE_ORIGIN`]; merging one that adds no
    /// structs and no deletions reports [`SyncOutcome::Unchanged`].
    pub fn handle_sync(&self, msg: &SyncMessage) -> Result<SyncOutcome, ReplicaError> {
        match msg {
            SyncMessage::Step1(sv) => Ok(SyncOutcome::Reply(SyncMessage::Step2(
                self.diff_since(sv)?,
            ))),
            SyncMessage::Step2(update) | SyncMessage::Update(update) => {
                if self.merge(update)? {
                    Ok(SyncOutcome::Applied)
                } else {
                    tracing::trace!(bytes = update.len(), "update already known");
                    Ok(SyncOutcome::Unchanged)
                }
            }
        }
    }

    /// Merges `bytes` and reports whether the document moved.
    ///
    /// Structs the replica cannot integrate yet (missing dependencies) still
    /// count as a change, since they are kept and may be needed by peers.
    fn merge(&self, bytes: &[u8]) -> Result<bool, ReplicaError> {
        let update = Update::decode_v1(bytes).map_err(|e| ReplicaError::Decode {
            what: "update",
            reason: e.to_string(),
        })?;
        let before = self.doc.transact().snapshot();
        let ahead = update
            .state_vector()
            .iter()
            .any(|(client, clock)| *clock > before.state_map.get(client));

        self.doc
            .transact_mut_with(REMOTE_ORIGIN)
            .apply_update(update)
            .map_err(|e| ReplicaError::Apply(e.to_string()))?;

        Ok(ahead || self.doc.transact().snapshot() != before)
    }

    /// Calls `f` with every update produced by a transaction whose origin
    /// is not [`REMOTE_ORIGIN`].
    ///
    /// The observer stays registered until the returned subscription is
    /// dropped.
    pub fn observe_local_updates<F>(&self, f: F) -> Result<Subscription, ReplicaError>
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        let remote = Origin::from(REMOTE_ORIGIN);
        self.doc
            .observe_update_v1(move |txn, event| {
                if txn.origin() == Some(&remote) {
                    return;
                }
                f(event.update.clone());
            })
            .map_err(|e| ReplicaError::Observe(e.to_string()))
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("client_id", &self.doc.client_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use yrs::{GetString, Text, WriteTxn};

    use super::*;

    fn insert(replica: &Replica, at: u32, s: &str) {
        let mut txn = replica.doc().transact_mut();
        let text = txn.get_or_insert_text("body");
        text.insert(&mut txn, at, s);
    }

    fn read(replica: &Replica) -> String {
        let mut txn = replica.doc().transact_mut();
        let text = txn.get_or_insert_text("body");
        text.get_string(&txn)
    }

    #[test]
    fn test_sync_exchange_converges() {
        let a = Replica::new();
        let b = Replica::new();
        insert(&a, 0, "hello");
        insert(&b, 0, "world");

        let SyncOutcome::Reply(to_b) = a.handle_sync(&SyncMessage::Step1(b.state_vector())).unwrap()
        else {
            panic!("step 1 must be answered");
        };
        let SyncOutcome::Reply(to_a) = b.handle_sync(&SyncMessage::Step1(a.state_vector())).unwrap()
        else {
            panic!("step 1 must be answered");
        };
        assert_eq!(b.handle_sync(&to_b).unwrap(), SyncOutcome::Applied);
        assert_eq!(a.handle_sync(&to_a).unwrap(), SyncOutcome::Applied);

        assert_eq!(read(&a), read(&b));
        assert_eq!(read(&a).len(), 10);
    }

    #[test]
    fn test_handle_sync_step2_from_synced_peer_is_unchanged() {
        let a = Replica::new();
        insert(&a, 0, "shared");
        let b = Replica::from_snapshot(&a.serialize_full()).unwrap();

        let step1 = SyncMessage::Step1(a.state_vector());
        let SyncOutcome::Reply(step2) = b.handle_sync(&step1).unwrap() else {
            panic!("step 1 must be answered");
        };
        assert_eq!(a.handle_sync(&step2).unwrap(), SyncOutcome::Unchanged);
        assert_eq!(
            a.handle_sync(&SyncMessage::Update(a.serialize_full())).unwrap(),
            SyncOutcome::Unchanged
        );
    }

    #[test]
    fn test_handle_sync_deletion_counts_as_change() {
        let a = Replica::new();
        insert(&a, 0, "abc");
        let b = Replica::from_snapshot(&a.serialize_full()).unwrap();
        {
            let mut txn = b.doc().transact_mut();
            let text = txn.get_or_insert_text("body");
            text.remove_range(&mut txn, 0, 1);
        }

        let update = SyncMessage::Update(b.diff_since(&a.state_vector()).unwrap());
        assert_eq!(a.handle_sync(&update).unwrap(), SyncOutcome::Applied);
        assert_eq!(read(&a), "bc");
    }

    #[test]
    fn test_apply_same_update_twice_is_idempotent() {
        let a = Replica::new();
        insert(&a, 0, "once");
        let update = a.serialize_full();

        let b = Replica::new();
        b.apply_remote_update(&update).unwrap();
        b.apply_remote_update(&update).unwrap();
        assert_eq!(read(&b), "once");
    }

    #[test]
    fn test_diff_from_empty_vector_matches_full_state() {
        let a = Replica::new();
        insert(&a, 0, "abc");
        let empty = StateVector::default().encode_v1();

        let restored = Replica::from_snapshot(&a.diff_since(&empty).unwrap()).unwrap();
        assert_eq!(read(&restored), "abc");
        assert_eq!(
            Replica::from_snapshot(&a.serialize_full()).map(|r| read(&r)).unwrap(),
            "abc"
        );
    }

    #[test]
    fn test_apply_garbage_is_rejected_and_state_kept() {
        let a = Replica::new();
        insert(&a, 0, "kept");
        let before = a.serialize_full();

        assert!(a.apply_remote_update(&[0xff, 0xff, 0xff]).is_err());
        assert!(a.diff_since(&[0xff, 0xff, 0xff]).is_err());
        assert_eq!(a.serialize_full(), before);
    }

    #[test]
    fn test_observer_skips_remote_updates() {
        let local = Replica::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = Arc::clone(&seen);
            local
                .observe_local_updates(move |u| seen.lock().unwrap().push(u))
                .unwrap()
        };

        insert(&local, 0, "mine");
        assert_eq!(seen.lock().unwrap().len(), 1);

        let other = Replica::new();
        insert(&other, 0, "theirs");
        local.apply_remote_update(&other.serialize_full()).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
