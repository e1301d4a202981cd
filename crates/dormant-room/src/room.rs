//! In-process host for room actors.
//!
//! Each room runs in its own Tokio task that plays the part of the hosting
//! runtime: it owns the live connections (their outbound channels and
//! attachments) and keeps the [`RoomActor`] only as a disposable cache.
//! Commands arrive through an mpsc channel and are handled one at a time,
//! so a room never runs two events concurrently.
//!
//! A room with no connections left after an event stops: it closes its
//! mailbox, turns away any `Connect` already queued, and exits. Callers
//! that see [`RoomError::Unavailable`] on connect ask the manager again and
//! get a fresh room, which reloads the snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use dormant_protocol::{ConnectionId, RoomName, RoomStatus};
use dormant_session::ConnectionRegistry;
use tokio::sync::{mpsc, oneshot};

use crate::{BlobStore, HibernationPolicy, RoomActor, RoomConfig, RoomError, RoomHost};

/// Channel the room uses to push encoded frames to one connection.
pub type ConnectionSender = mpsc::UnboundedSender<Vec<u8>>;

/// Commands sent to a room task through its channel.
///
/// Variants carrying a `oneshot::Sender` reply once the event has been
/// fully handled, which lets callers order their own work after it.
pub(crate) enum RoomCommand {
    Connect {
        id: ConnectionId,
        sender: ConnectionSender,
        reply: oneshot::Sender<()>,
    },
    Message {
        id: ConnectionId,
        data: Vec<u8>,
    },
    Close {
        id: ConnectionId,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<RoomStatus>,
    },
    /// Discard the in-memory actor, keeping connections.
    Hibernate {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Handle to a running room task.
///
/// Cheap to clone; it is an `mpsc::Sender` wrapper.
#[derive(Clone)]
pub struct RoomHandle {
    room: RoomName,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room(&self) -> &RoomName {
        &self.room
    }

    /// Whether the room task has stopped, or is stopping and takes no
    /// more commands.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Opens a connection in the room and waits until the room has greeted
    /// it.
    pub async fn connect(
        &self,
        id: ConnectionId,
        sender: ConnectionSender,
    ) -> Result<(), RoomError> {
        let (reply, done) = oneshot::channel();
        self.send(RoomCommand::Connect { id, sender, reply }).await?;
        done.await.map_err(|_| self.unavailable())
    }

    /// Delivers an inbound frame (fire-and-forget).
    pub async fn message(&self, id: ConnectionId, data: Vec<u8>) -> Result<(), RoomError> {
        self.send(RoomCommand::Message { id, data }).await
    }

    /// Closes a connection and waits for the room to settle.
    pub async fn close(&self, id: ConnectionId) -> Result<(), RoomError> {
        let (reply, done) = oneshot::channel();
        self.send(RoomCommand::Close { id, reply }).await?;
        done.await.map_err(|_| self.unavailable())
    }

    pub async fn status(&self) -> Result<RoomStatus, RoomError> {
        let (reply, status) = oneshot::channel();
        self.send(RoomCommand::Status { reply }).await?;
        status.await.map_err(|_| self.unavailable())
    }

    /// Drops the room's in-memory actor as a suspending host would. The
    /// next event builds a fresh one.
    pub async fn hibernate(&self) -> Result<(), RoomError> {
        let (reply, done) = oneshot::channel();
        self.send(RoomCommand::Hibernate { reply }).await?;
        done.await.map_err(|_| self.unavailable())
    }

    /// Tells the room task to stop.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown).await
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender.send(cmd).await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.room.clone())
    }
}

struct HostedConnection {
    sender: ConnectionSender,
    attachment: Option<Vec<u8>>,
}

/// The live connections of one room, ordered by connection id.
#[derive(Default)]
struct ConnectionSet {
    conns: BTreeMap<ConnectionId, HostedConnection>,
}

impl ConnectionRegistry for ConnectionSet {
    fn live_connections(&self) -> Vec<ConnectionId> {
        self.conns.keys().copied().collect()
    }

    fn attachment(&self, id: ConnectionId) -> Option<Vec<u8>> {
        self.conns.get(&id).and_then(|c| c.attachment.clone())
    }

    fn set_attachment(&mut self, id: ConnectionId, data: Vec<u8>) {
        if let Some(conn) = self.conns.get_mut(&id) {
            conn.attachment = Some(data);
        }
    }
}

impl RoomHost for ConnectionSet {
    fn send_to(&self, id: ConnectionId, data: &[u8]) {
        if let Some(conn) = self.conns.get(&id) {
            // Receiver gone means the handler is already tearing down.
            let _ = conn.sender.send(data.to_vec());
        }
    }

    fn broadcast(&self, data: &[u8], exclude: &[ConnectionId]) {
        for (id, conn) in &self.conns {
            if !exclude.contains(id) {
                let _ = conn.sender.send(data.to_vec());
            }
        }
    }
}

/// The room task's state.
struct RoomShell<S> {
    room: RoomName,
    config: RoomConfig,
    store: Arc<S>,
    connections: ConnectionSet,
    actor: Option<RoomActor<S>>,
    receiver: mpsc::Receiver<RoomCommand>,
    /// Set once the mailbox is closed; queued commands are still drained.
    stopping: bool,
}

impl<S: BlobStore> RoomShell<S> {
    async fn run(mut self) {
        tracing::info!(room = %self.room, "room task started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Connect { id, sender, reply } => {
                    if self.stopping {
                        tracing::debug!(
                            room = %self.room,
                            conn = %id,
                            "room stopping, turning connect away"
                        );
                        drop(reply);
                        continue;
                    }
                    self.connections.conns.insert(
                        id,
                        HostedConnection {
                            sender,
                            attachment: None,
                        },
                    );
                    let (actor, host) = self.actor_and_host();
                    actor.on_connect(host, id).await;
                    let _ = reply.send(());
                }
                RoomCommand::Message { id, data } => {
                    if !self.connections.conns.contains_key(&id) {
                        tracing::warn!(
                            room = %self.room,
                            conn = %id,
                            "message from unknown connection, ignoring"
                        );
                        continue;
                    }
                    let (actor, host) = self.actor_and_host();
                    actor.on_message(host, id, &data).await;
                }
                RoomCommand::Close { id, reply } => {
                    if self.connections.conns.contains_key(&id) {
                        let (actor, host) = self.actor_and_host();
                        actor.on_close(host, id).await;
                        self.connections.conns.remove(&id);
                        let (actor, host) = self.actor_and_host();
                        actor.settle(host);
                    }
                    let _ = reply.send(());
                }
                RoomCommand::Status { reply } => {
                    let (actor, host) = self.actor_and_host();
                    let status = actor.status(host).await;
                    let _ = reply.send(status);
                }
                RoomCommand::Hibernate { reply } => {
                    self.discard_actor("hibernate requested");
                    let _ = reply.send(());
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room = %self.room, "room shutting down");
                    break;
                }
            }

            if self.connections.conns.is_empty() {
                self.discard_actor("room idle");
                if !self.stopping {
                    tracing::debug!(room = %self.room, "room empty, closing mailbox");
                    self.stopping = true;
                    self.receiver.close();
                }
            } else if self.config.hibernation == HibernationPolicy::AfterEachEvent {
                self.discard_actor("hibernating after event");
            }
        }

        tracing::info!(room = %self.room, "room task stopped");
    }

    /// Returns the actor, creating one if the last was discarded, alongside
    /// the connection set it runs against.
    fn actor_and_host(&mut self) -> (&mut RoomActor<S>, &mut ConnectionSet) {
        let actor = self.actor.get_or_insert_with(|| {
            tracing::debug!(room = %self.room, "instantiating room actor");
            RoomActor::new(
                self.room.clone(),
                Arc::clone(&self.store),
                self.config.identity_palette(),
            )
        });
        (actor, &mut self.connections)
    }

    fn discard_actor(&mut self, reason: &str) {
        if self.actor.take().is_some() {
            tracing::debug!(room = %self.room, reason, "room actor discarded");
        }
    }
}

/// Spawns a room task and returns a handle to it.
pub(crate) fn spawn_room<S: BlobStore>(
    room: RoomName,
    config: RoomConfig,
    store: Arc<S>,
) -> RoomHandle {
    let (sender, receiver) = mpsc::channel(config.mailbox_size.max(1));
    let shell = RoomShell {
        room: room.clone(),
        config,
        store,
        connections: ConnectionSet::default(),
        actor: None,
        receiver,
        stopping: false,
    };
    tokio::spawn(shell.run());
    RoomHandle { room, sender }
}
