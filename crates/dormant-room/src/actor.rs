//! The room actor: one room's relay logic, written to be discarded.
//!
//! A [`RoomActor`] is a cache. The only authorities are the host's live
//! connection set (reached through [`RoomHost`]) and the durable store.
//! The host may drop the actor between any two events and build a fresh
//! one for the next; every handler therefore starts by activating, which
//! loads the snapshot once per instance and re-derives the roster from the
//! host.
//!
//! Nothing here registers a timer, a document observer, or a background
//! task. Every outbound message is sent from inside the handler of the
//! inbound event that caused it, and persistence is awaited (and its
//! failure logged) before the handler returns.
//!
//! # Event handling
//!
//! ```text
//! connect(id)   → identity, Step2(full state), Step1, presence entries, roster to all
//! message(id)   → SYNC step1: Step2 to sender
//!                 SYNC step2/update: merge; if it changed anything, Update to others, persist
//!                 PRESENCE: store, relay to others
//!                 APPLICATION ping: pong to sender; anything else relayed to others
//! close(id)     → forget identity and presence, presence null to others
//! settle()      → roster to all (after the host dropped the connection)
//! ```

use std::sync::Arc;

use dormant_doc::{Replica, SyncOutcome};
use dormant_protocol::{
    AppMessage, AppType, ConnectionId, Frame, PresenceUpdate, RoomName, RoomStatus, RosterUser,
    SyncMessage, codec, unix_millis,
};
use dormant_session::{IdentityPalette, PresenceStore, Roster};

use crate::store::snapshot_key;
use crate::{BlobStore, RoomHost};

/// Relay state for one room, valid for one instantiation.
pub struct RoomActor<S> {
    room: RoomName,
    store: Arc<S>,
    replica: Replica,
    roster: Roster,
    presence: PresenceStore,
    /// Whether this instance has merged the persisted snapshot.
    loaded: bool,
    /// Whether this instance has reconciled its roster with the host.
    activated: bool,
    /// Set when the instance woke up to connections it never saw join;
    /// the next message broadcasts a fresh roster.
    roster_pending: bool,
}

impl<S: BlobStore> RoomActor<S> {
    pub fn new(room: RoomName, store: Arc<S>, palette: IdentityPalette) -> Self {
        Self {
            room,
            store,
            replica: Replica::new(),
            roster: Roster::new(palette),
            presence: PresenceStore::new(),
            loaded: false,
            activated: false,
            roster_pending: false,
        }
    }

    pub fn room(&self) -> &RoomName {
        &self.room
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    /// Prepares this instance for its first event.
    ///
    /// Loads the persisted snapshot and reconciles the roster with the
    /// host, announcing any identity that had to be backfilled. Returns
    /// `true` if the host already had live connections, i.e. this instance
    /// is resuming a room rather than starting one. Later calls do nothing
    /// and return `false`.
    pub async fn activate<H: RoomHost>(&mut self, host: &mut H) -> bool {
        self.load_snapshot().await;
        if self.activated {
            return false;
        }
        self.activated = true;

        let assigned = self.roster.reconcile(host);
        self.announce(host, &assigned);

        let resumed = !self.roster.live_connections(host).is_empty();
        if resumed {
            self.roster_pending = true;
            tracing::info!(
                room = %self.room,
                live = self.roster.known_count(),
                "room resumed with live connections"
            );
        } else {
            tracing::info!(room = %self.room, "room activated");
        }
        resumed
    }

    /// Handles a connection the host has just opened.
    ///
    /// The host must already enumerate `id`.
    pub async fn on_connect<H: RoomHost>(&mut self, host: &mut H, id: ConnectionId) {
        self.load_snapshot().await;
        self.activated = true;

        let assigned = self.roster.on_connection_opened(host, id);
        self.announce(host, &assigned);

        self.send(host, id, &Frame::Sync(SyncMessage::Step2(self.replica.serialize_full())));
        self.send(host, id, &Frame::Sync(SyncMessage::Step1(self.replica.state_vector())));
        for (owner, state) in self.presence.all() {
            self.send(
                host,
                id,
                &Frame::Presence(PresenceUpdate::set(*owner, state.clone())),
            );
        }

        self.broadcast_roster(host);
        tracing::info!(
            room = %self.room,
            conn = %id,
            live = self.roster.live_connections(host).len(),
            "connection opened"
        );
    }

    /// Handles one inbound frame from `id`.
    ///
    /// Undecodable frames, bad updates, and failed writes are logged and
    /// dropped. None of them affects the connection.
    pub async fn on_message<H: RoomHost>(&mut self, host: &mut H, id: ConnectionId, data: &[u8]) {
        self.activate(host).await;

        match codec::decode(data) {
            Ok(Frame::Sync(msg)) => self.on_sync(host, id, data, msg).await,
            Ok(Frame::Presence(update)) => self.on_presence(host, id, update),
            Ok(Frame::Application(msg)) => self.on_application(host, id, data, msg),
            Err(e) => {
                let tag = codec::peek_tag(data).ok();
                tracing::warn!(
                    room = %self.room,
                    conn = %id,
                    tag = ?tag,
                    error = %e,
                    "dropping undecodable frame"
                );
            }
        }

        if self.roster_pending {
            self.broadcast_roster(host);
        }
    }

    /// Handles a close notification.
    ///
    /// The host still enumerates `id` at this point, so the roster is not
    /// broadcast here; [`settle`](Self::settle) does that once the host has
    /// dropped the connection.
    pub async fn on_close<H: RoomHost>(&mut self, host: &mut H, id: ConnectionId) {
        self.activate(host).await;

        let identity = self.roster.on_connection_closed(id);
        self.presence.clear(id);
        self.broadcast(host, &Frame::Presence(PresenceUpdate::removed(id)), &[id]);

        tracing::info!(
            room = %self.room,
            conn = %id,
            name = identity.as_ref().map(|i| i.name.as_str()).unwrap_or("<unknown>"),
            "connection closed"
        );
    }

    /// Re-derives the roster after the host finished processing a close and
    /// broadcasts it to the remaining connections.
    pub fn settle<H: RoomHost>(&mut self, host: &mut H) {
        let assigned = self.roster.reconcile(host);
        self.announce(host, &assigned);
        self.broadcast_roster(host);
    }

    /// Answers an administrative status query.
    pub async fn status<H: RoomHost>(&mut self, host: &mut H) -> RoomStatus {
        self.activate(host).await;
        RoomStatus {
            connection_count: self.roster.live_connections(host).len(),
            document_size_bytes: self.replica.serialize_full().len(),
            presence_count: self.presence.size(),
            timestamp: unix_millis(),
        }
    }

    async fn on_sync<H: RoomHost>(
        &mut self,
        host: &mut H,
        id: ConnectionId,
        raw: &[u8],
        msg: SyncMessage,
    ) {
        match self.replica.handle_sync(&msg) {
            Ok(SyncOutcome::Reply(reply)) => {
                self.send(host, id, &Frame::Sync(reply));
            }
            Ok(SyncOutcome::Applied) => {
                tracing::debug!(
                    room = %self.room,
                    conn = %id,
                    bytes = msg.payload().len(),
                    "update applied"
                );
                match msg {
                    SyncMessage::Update(_) => host.broadcast(raw, &[id]),
                    other => {
                        let update = SyncMessage::Update(other.payload().to_vec());
                        self.broadcast(host, &Frame::Sync(update), &[id]);
                    }
                }
                self.persist().await;
            }
            Ok(SyncOutcome::Unchanged) => {
                tracing::debug!(room = %self.room, conn = %id, "sync message changed nothing");
            }
            Err(e) => {
                tracing::warn!(
                    room = %self.room,
                    conn = %id,
                    error = %e,
                    "rejected sync message"
                );
            }
        }
    }

    fn on_presence<H: RoomHost>(&mut self, host: &mut H, id: ConnectionId, update: PresenceUpdate) {
        // Whatever id the client claimed, the entry belongs to its connection.
        let update = PresenceUpdate {
            client_id: id,
            state: update.state,
        };
        match &update.state {
            Some(state) if !update.is_removal() => self.presence.set(id, state.clone()),
            _ => {
                self.presence.clear(id);
            }
        }
        self.broadcast(host, &Frame::Presence(update), &[id]);
    }

    fn on_application<H: RoomHost>(
        &mut self,
        host: &mut H,
        id: ConnectionId,
        raw: &[u8],
        msg: AppMessage,
    ) {
        match msg.kind {
            AppType::Ping => {
                self.send(host, id, &Frame::Application(AppMessage::pong()));
            }
            kind => {
                tracing::debug!(
                    room = %self.room,
                    conn = %id,
                    kind = %kind,
                    "relaying application message"
                );
                host.broadcast(raw, &[id]);
            }
        }
    }

    async fn load_snapshot(&mut self) {
        if self.loaded {
            return;
        }
        let key = snapshot_key(self.room.as_str());
        match self.store.get(&key).await {
            Ok(Some(bytes)) => {
                if let Err(e) = self.replica.load_full(&bytes) {
                    tracing::warn!(
                        room = %self.room,
                        error = %e,
                        "persisted snapshot is corrupt, starting empty"
                    );
                } else {
                    tracing::debug!(room = %self.room, bytes = bytes.len(), "snapshot loaded");
                }
                self.loaded = true;
            }
            Ok(None) => self.loaded = true,
            Err(e) => {
                // Left unloaded: the next event retries, and merging later is safe.
                tracing::warn!(room = %self.room, error = %e, "failed to load snapshot");
            }
        }
    }

    /// Writes the full document over the stored snapshot.
    ///
    /// Skipped while the stored snapshot has not been merged: the replica
    /// would lack that history and the write would erase it. The merged
    /// update stays in memory and goes out with the next successful write.
    async fn persist(&mut self) {
        self.load_snapshot().await;
        if !self.loaded {
            tracing::warn!(room = %self.room, "snapshot not loaded, deferring persist");
            return;
        }
        let key = snapshot_key(self.room.as_str());
        let snapshot = self.replica.serialize_full();
        let len = snapshot.len();
        match self.store.put(&key, snapshot).await {
            Ok(()) => tracing::debug!(room = %self.room, bytes = len, "snapshot persisted"),
            Err(e) => tracing::warn!(room = %self.room, error = %e, "failed to persist snapshot"),
        }
    }

    fn announce<H: RoomHost>(&self, host: &H, assigned: &[RosterUser]) {
        for user in assigned {
            match AppMessage::identity(user) {
                Ok(msg) => self.send(host, user.connection_id, &Frame::Application(msg)),
                Err(e) => {
                    tracing::warn!(room = %self.room, error = %e, "failed to encode identity")
                }
            }
        }
    }

    fn broadcast_roster<H: RoomHost>(&mut self, host: &H) {
        self.roster_pending = false;
        let snapshot = self.roster.snapshot(host);
        tracing::debug!(room = %self.room, count = snapshot.count, mode = ?snapshot.mode, "roster");
        match AppMessage::roster(&snapshot) {
            Ok(msg) => self.broadcast(host, &Frame::Application(msg), &[]),
            Err(e) => tracing::warn!(room = %self.room, error = %e, "failed to encode roster"),
        }
    }

    fn send<H: RoomHost>(&self, host: &H, id: ConnectionId, frame: &Frame) {
        match codec::encode(frame) {
            Ok(bytes) => host.send_to(id, &bytes),
            Err(e) => tracing::warn!(
                room = %self.room,
                kind = frame.kind(),
                error = %e,
                "failed to encode frame"
            ),
        }
    }

    fn broadcast<H: RoomHost>(&self, host: &H, frame: &Frame, exclude: &[ConnectionId]) {
        match codec::encode(frame) {
            Ok(bytes) => host.broadcast(&bytes, exclude),
            Err(e) => tracing::warn!(
                room = %self.room,
                kind = frame.kind(),
                error = %e,
                "failed to encode frame"
            ),
        }
    }
}
