//! The connection roster.
//!
//! The roster never counts connections itself. Every answer about who is
//! in the room starts from [`ConnectionRegistry::live_connections`], and the
//! roster only remembers which identity each of those connections was
//! given. Identities are mirrored into the host's per-connection
//! attachment so that a freshly created roster can pick them up again.
//!
//! # Backfill
//!
//! When the actor is recreated while connections stay open, the new roster
//! starts empty. [`Roster::reconcile`] first restores identities from
//! attachments, then assigns new ones to any live connection still missing
//! one (walking the host's order), so the roster never under-counts and
//! never hands a connection a second identity.

use std::collections::BTreeMap;

use dormant_protocol::{ConnectionId, Identity, RosterMode, RosterSnapshot, RosterUser};

use crate::{ConnectionRegistry, IdentityPalette};

/// Identities of the live connections in one room.
#[derive(Debug)]
pub struct Roster {
    palette: IdentityPalette,
    identities: BTreeMap<ConnectionId, Identity>,
}

impl Roster {
    pub fn new(palette: IdentityPalette) -> Self {
        Self {
            palette,
            identities: BTreeMap::new(),
        }
    }

    /// The host's live connections. Never cached.
    pub fn live_connections<H: ConnectionRegistry + ?Sized>(&self, host: &H) -> Vec<ConnectionId> {
        host.live_connections()
    }

    /// Brings the known identities in line with the host.
    ///
    /// Forgets connections the host no longer lists, restores identities
    /// from attachments, and backfills the rest. Returns the identities
    /// assigned by this call, in host order, so they can be announced.
    pub fn reconcile<H: ConnectionRegistry + ?Sized>(&mut self, host: &mut H) -> Vec<RosterUser> {
        self.reconcile_expecting(host, None)
    }

    /// Registers a newly opened connection and assigns its identity.
    ///
    /// Any other live connection without an identity is backfilled in the
    /// same pass. The returned list holds every identity assigned, the new
    /// connection's included.
    pub fn on_connection_opened<H: ConnectionRegistry + ?Sized>(
        &mut self,
        host: &mut H,
        id: ConnectionId,
    ) -> Vec<RosterUser> {
        let mut assigned = self.reconcile_expecting(host, Some(id));
        if !self.identities.contains_key(&id) {
            // The host has not listed it yet; assign anyway so the owner
            // still learns its identity.
            let identity = self.assign_identity(host, id);
            assigned.push(RosterUser {
                connection_id: id,
                identity,
            });
        }
        assigned
    }

    /// Forgets a closed connection's identity.
    pub fn on_connection_closed(&mut self, id: ConnectionId) -> Option<Identity> {
        self.identities.remove(&id)
    }

    /// Returns the identity of `id`, assigning one if it has none.
    ///
    /// Idempotent: a connection that already has an identity, here or in
    /// its attachment, keeps it.
    pub fn assign_identity<H: ConnectionRegistry + ?Sized>(
        &mut self,
        host: &mut H,
        id: ConnectionId,
    ) -> Identity {
        if let Some(identity) = self.identities.get(&id) {
            return identity.clone();
        }
        if let Some(identity) = restore(host, id) {
            self.identities.insert(id, identity.clone());
            return identity;
        }

        let ordinal = self
            .identities
            .values()
            .map(|identity| identity.ordinal + 1)
            .max()
            .unwrap_or(0);
        let identity = self.palette.identity_for(ordinal);
        match serde_json::to_vec(&identity) {
            Ok(bytes) => host.set_attachment(id, bytes),
            Err(e) => tracing::warn!(conn = %id, error = %e, "failed to attach identity"),
        }
        tracing::debug!(conn = %id, ordinal, name = %identity.name, "identity assigned");
        self.identities.insert(id, identity.clone());
        identity
    }

    pub fn identity_of(&self, id: ConnectionId) -> Option<&Identity> {
        self.identities.get(&id)
    }

    /// How many identities this roster instance knows about.
    pub fn known_count(&self) -> usize {
        self.identities.len()
    }

    /// Derives `{count, mode, users}` from the host's live set.
    ///
    /// `count` is the host's count even if some connection has no identity
    /// yet; such connections are left out of `users`.
    pub fn snapshot<H: ConnectionRegistry + ?Sized>(&self, host: &H) -> RosterSnapshot {
        let live = host.live_connections();
        let users = live
            .iter()
            .filter_map(|id| {
                self.identities.get(id).map(|identity| RosterUser {
                    connection_id: *id,
                    identity: identity.clone(),
                })
            })
            .collect();
        RosterSnapshot {
            count: live.len(),
            mode: RosterMode::for_count(live.len()),
            users,
        }
    }

    fn reconcile_expecting<H: ConnectionRegistry + ?Sized>(
        &mut self,
        host: &mut H,
        expected: Option<ConnectionId>,
    ) -> Vec<RosterUser> {
        let live = host.live_connections();
        self.identities.retain(|id, _| live.contains(id));

        for &id in &live {
            if self.identities.contains_key(&id) {
                continue;
            }
            if let Some(identity) = restore(host, id) {
                self.identities.insert(id, identity);
            }
        }

        if live.len() <= self.identities.len() {
            return Vec::new();
        }

        let missing: Vec<ConnectionId> = live
            .iter()
            .copied()
            .filter(|id| !self.identities.contains_key(id))
            .collect();
        if missing.iter().any(|id| Some(*id) != expected) {
            tracing::warn!(
                live = live.len(),
                known = self.identities.len(),
                "roster behind host, backfilling identities"
            );
        }

        missing
            .into_iter()
            .map(|id| RosterUser {
                connection_id: id,
                identity: self.assign_identity(host, id),
            })
            .collect()
    }
}

fn restore<H: ConnectionRegistry + ?Sized>(host: &H, id: ConnectionId) -> Option<Identity> {
    let bytes = host.attachment(id)?;
    match serde_json::from_slice(&bytes) {
        Ok(identity) => Some(identity),
        Err(e) => {
            tracing::warn!(conn = %id, error = %e, "unreadable identity attachment");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A host that keeps connections in id order with attachments.
    #[derive(Default)]
    struct Host {
        conns: BTreeMap<ConnectionId, Option<Vec<u8>>>,
    }

    impl Host {
        fn open(&mut self, id: u64) -> ConnectionId {
            let id = ConnectionId(id);
            self.conns.insert(id, None);
            id
        }
    }

    impl ConnectionRegistry for Host {
        fn live_connections(&self) -> Vec<ConnectionId> {
            self.conns.keys().copied().collect()
        }

        fn attachment(&self, id: ConnectionId) -> Option<Vec<u8>> {
            self.conns.get(&id).cloned().flatten()
        }

        fn set_attachment(&mut self, id: ConnectionId, data: Vec<u8>) {
            if let Some(slot) = self.conns.get_mut(&id) {
                *slot = Some(data);
            }
        }
    }

    #[test]
    fn test_on_connection_opened_assigns_sequential_ordinals() {
        let mut host = Host::default();
        let mut roster = Roster::new(IdentityPalette::default());

        let a = host.open(1);
        let assigned = roster.on_connection_opened(&mut host, a);
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].identity.ordinal, 0);

        let b = host.open(2);
        let assigned = roster.on_connection_opened(&mut host, b);
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].connection_id, b);
        assert_eq!(assigned[0].identity.ordinal, 1);

        let snap = roster.snapshot(&host);
        assert_eq!(snap.count, 2);
        assert_eq!(snap.mode, RosterMode::Multi);
    }

    #[test]
    fn test_assign_identity_is_idempotent() {
        let mut host = Host::default();
        let mut roster = Roster::new(IdentityPalette::default());
        let a = host.open(1);

        let first = roster.assign_identity(&mut host, a);
        let second = roster.assign_identity(&mut host, a);
        assert_eq!(first, second);
        assert_eq!(roster.known_count(), 1);
    }

    #[test]
    fn test_reconcile_after_recreation_restores_from_attachments() {
        let mut host = Host::default();
        let mut roster = Roster::new(IdentityPalette::default());
        let a = host.open(1);
        let b = host.open(2);
        roster.on_connection_opened(&mut host, a);
        roster.on_connection_opened(&mut host, b);
        let before = roster.snapshot(&host);

        // Actor discarded; connections survive at the host.
        let mut fresh = Roster::new(IdentityPalette::default());
        let assigned = fresh.reconcile(&mut host);
        assert!(assigned.is_empty(), "no identity should be re-announced");
        assert_eq!(fresh.snapshot(&host), before);
    }

    #[test]
    fn test_reconcile_backfills_missing_identities_in_host_order() {
        let mut host = Host::default();
        host.open(5);
        host.open(3);
        let mut roster = Roster::new(IdentityPalette::default());

        let assigned = roster.reconcile(&mut host);
        let ids: Vec<_> = assigned.iter().map(|u| u.connection_id).collect();
        assert_eq!(ids, vec![ConnectionId(3), ConnectionId(5)]);
        assert_eq!(assigned[0].identity.ordinal, 0);
        assert_eq!(assigned[1].identity.ordinal, 1);
        assert_eq!(roster.snapshot(&host).count, 2);
    }

    #[test]
    fn test_reconcile_drops_connections_host_no_longer_lists() {
        let mut host = Host::default();
        let mut roster = Roster::new(IdentityPalette::default());
        let a = host.open(1);
        let b = host.open(2);
        roster.on_connection_opened(&mut host, a);
        roster.on_connection_opened(&mut host, b);

        host.conns.remove(&b);
        roster.reconcile(&mut host);
        assert_eq!(roster.known_count(), 1);
        let snap = roster.snapshot(&host);
        assert_eq!(snap.count, 1);
        assert_eq!(snap.mode, RosterMode::Solo);
    }

    #[test]
    fn test_on_connection_closed_forgets_identity() {
        let mut host = Host::default();
        let mut roster = Roster::new(IdentityPalette::default());
        let a = host.open(1);
        roster.on_connection_opened(&mut host, a);

        assert!(roster.on_connection_closed(a).is_some());
        assert!(roster.identity_of(a).is_none());
    }

    #[test]
    fn test_snapshot_counts_host_connections_without_identity() {
        let mut host = Host::default();
        host.open(1);
        let roster = Roster::new(IdentityPalette::default());
        let snap = roster.snapshot(&host);
        assert_eq!(snap.count, 1);
        assert!(snap.users.is_empty());
    }
}
