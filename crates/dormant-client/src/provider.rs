//! The client provider and its connection driver.
//!
//! Callers only ever set an *intent* (connected, disconnected, destroyed).
//! A background driver task owns the socket and moves the actual
//! [`ConnectionStatus`] toward that intent, so `disconnect()` returns
//! immediately even though the close handshake may take a while.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dormant_doc::yrs::Subscription;
use dormant_doc::{Replica, SyncOutcome};
use dormant_protocol::{
    AppMessage, AppType, ConnectionId, Frame, PresenceUpdate, RosterSnapshot, RosterUser,
    SyncMessage,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{ProviderConfig, ProviderError};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Actual state of the provider's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Something the caller may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// The connection status changed.
    Status(ConnectionStatus),
    /// The relay's full diff has been applied. Emitted once per connection.
    Synced,
    /// The relay announced this connection's identity.
    Identity(RosterUser),
    /// A roster snapshot for the room.
    Roster(RosterSnapshot),
    /// Another connection's presence changed. `state: None` means it left.
    Presence(PresenceUpdate),
    /// Any other application message, including `pong`.
    Application(AppMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Connected,
    Disconnected,
    Destroyed,
}

/// Keeps a [`Replica`] in sync with one room on a relay.
///
/// Dropping the provider destroys it.
pub struct Provider {
    config: ProviderConfig,
    replica: Replica,
    intent: watch::Sender<Intent>,
    status: watch::Receiver<ConnectionStatus>,
    identity: watch::Receiver<Option<RosterUser>>,
    synced: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    _local_updates: Subscription,
}

impl Provider {
    /// Creates a provider for `replica` and starts its driver task.
    ///
    /// Returns the provider and the receiving end of its event stream.
    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: ProviderConfig,
        replica: Replica,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ProviderEvent>), ProviderError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let initial = if config.connect_on_start {
            Intent::Connected
        } else {
            Intent::Disconnected
        };
        let (intent_tx, intent_rx) = watch::channel(initial);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (identity_tx, identity_rx) = watch::channel(None);
        let synced = Arc::new(AtomicBool::new(false));

        let updates_tx = outbound_tx.clone();
        let local_updates = replica.observe_local_updates(move |update| {
            match Frame::Sync(SyncMessage::Update(update)).encode() {
                Ok(bytes) => {
                    let _ = updates_tx.send(bytes);
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode local update"),
            }
        })?;

        let driver = Driver {
            config: config.clone(),
            replica: replica.clone(),
            intent: intent_rx,
            status: status_tx,
            identity: identity_tx,
            synced: Arc::clone(&synced),
            outbound: outbound_rx,
            events: events_tx,
        };
        tokio::spawn(driver.run());

        let provider = Self {
            config,
            replica,
            intent: intent_tx,
            status: status_rx,
            identity: identity_rx,
            synced,
            outbound: outbound_tx,
            _local_updates: local_updates,
        };
        Ok((provider, events_rx))
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Whether the relay's state has been merged on the current connection.
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// The identity the relay assigned to the current connection, if
    /// announced yet.
    pub fn identity(&self) -> Option<RosterUser> {
        self.identity.borrow().clone()
    }

    /// Asks the driver to connect (or reconnect right away if it is
    /// waiting out a reconnect delay).
    pub fn connect(&self) -> Result<(), ProviderError> {
        self.set_intent(Intent::Connected)
    }

    /// Asks the driver to close the connection and stay offline.
    pub fn disconnect(&self) -> Result<(), ProviderError> {
        self.set_intent(Intent::Disconnected)
    }

    /// Closes the connection for good. Later calls to `connect` fail.
    pub fn destroy(&self) {
        self.intent.send_replace(Intent::Destroyed);
    }

    /// Sends this client's presence to the other connections.
    ///
    /// Nothing is sent unless called; there is no periodic refresh.
    pub fn publish_presence(&self, state: Value) -> Result<(), ProviderError> {
        self.send(&Frame::Presence(PresenceUpdate::set(self.own_id(), state)))
    }

    /// Tells the other connections this client's presence is gone.
    pub fn clear_presence(&self) -> Result<(), ProviderError> {
        self.send(&Frame::Presence(PresenceUpdate::removed(self.own_id())))
    }

    pub fn send_application(&self, msg: AppMessage) -> Result<(), ProviderError> {
        self.send(&Frame::Application(msg))
    }

    /// Sends a `ping`; the relay answers with a `pong` application event.
    pub fn ping(&self) -> Result<(), ProviderError> {
        self.send_application(AppMessage::ping())
    }

    /// The relay overwrites `clientId` with the real sender, so before the
    /// identity arrives any value will do.
    fn own_id(&self) -> ConnectionId {
        self.identity
            .borrow()
            .as_ref()
            .map(|user| user.connection_id)
            .unwrap_or(ConnectionId(0))
    }

    fn send(&self, frame: &Frame) -> Result<(), ProviderError> {
        if *self.intent.borrow() == Intent::Destroyed {
            return Err(ProviderError::Destroyed);
        }
        if self.status() != ConnectionStatus::Connected {
            return Err(ProviderError::NotConnected);
        }
        let bytes = frame.encode()?;
        self.outbound
            .send(bytes)
            .map_err(|_| ProviderError::Destroyed)
    }

    fn set_intent(&self, intent: Intent) -> Result<(), ProviderError> {
        let mut destroyed = false;
        // Always notify, even when the value is unchanged, so a repeated
        // `connect` cuts a pending reconnect delay short.
        self.intent.send_if_modified(|current| {
            if *current == Intent::Destroyed {
                destroyed = true;
                return false;
            }
            *current = intent;
            true
        });
        if destroyed {
            Err(ProviderError::Destroyed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Closed because the intent changed.
    Stopped,
    /// The connection failed or the relay went away.
    Lost,
}

/// Owns the socket and reconciles the actual status with the intent.
struct Driver {
    config: ProviderConfig,
    replica: Replica,
    intent: watch::Receiver<Intent>,
    status: watch::Sender<ConnectionStatus>,
    identity: watch::Sender<Option<RosterUser>>,
    synced: Arc<AtomicBool>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<ProviderEvent>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            let intent = *self.intent.borrow_and_update();
            match intent {
                Intent::Destroyed => break,
                Intent::Disconnected => {
                    if !self.idle(None).await {
                        break;
                    }
                }
                Intent::Connected => {
                    let end = self.session().await;
                    self.synced.store(false, Ordering::SeqCst);
                    self.identity.send_replace(None);
                    self.set_status(ConnectionStatus::Disconnected);

                    if end == SessionEnd::Lost && *self.intent.borrow() == Intent::Connected {
                        let delay = self.config.reconnect_delay;
                        tracing::debug!(room = %self.config.room, ?delay, "reconnecting after delay");
                        if !self.idle(Some(delay)).await {
                            break;
                        }
                    }
                }
            }
        }
        tracing::debug!(room = %self.config.room, "provider stopped");
    }

    /// Waits until the intent changes or `delay` elapses, dropping any
    /// outbound frames meanwhile. Returns `false` once the provider is gone.
    async fn idle(&mut self, delay: Option<Duration>) -> bool {
        let sleep = async {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                changed = self.intent.changed() => return changed.is_ok(),
                frame = self.outbound.recv() => {
                    if frame.is_none() {
                        return false;
                    }
                }
            }
        }
    }

    /// Runs one connection from connect to close.
    async fn session(&mut self) -> SessionEnd {
        let url = self.config.url();
        self.set_status(ConnectionStatus::Connecting);

        let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "connect failed");
                return SessionEnd::Lost;
            }
        };
        let (mut sink, mut stream) = ws.split();

        if *self.intent.borrow() != Intent::Connected {
            let _ = sink.close().await;
            return SessionEnd::Stopped;
        }

        self.set_status(ConnectionStatus::Connected);
        tracing::info!(room = %self.config.room, "connected");

        let step1 = Frame::Sync(SyncMessage::Step1(self.replica.state_vector()));
        if let Err(e) = send_frame(&mut sink, &step1).await {
            tracing::debug!(error = %e, "sending step 1 failed");
            return SessionEnd::Lost;
        }

        loop {
            tokio::select! {
                changed = self.intent.changed() => {
                    if changed.is_err() || *self.intent.borrow_and_update() != Intent::Connected {
                        let _ = sink.close().await;
                        tracing::info!(room = %self.config.room, "disconnected on request");
                        return SessionEnd::Stopped;
                    }
                }
                frame = self.outbound.recv() => match frame {
                    Some(bytes) => {
                        if let Err(e) = sink.send(Message::Binary(bytes.into())).await {
                            tracing::debug!(error = %e, "send failed");
                            return SessionEnd::Lost;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        return SessionEnd::Stopped;
                    }
                },
                msg = stream.next() => {
                    let result = match msg {
                        Some(Ok(Message::Binary(data))) => self.handle_frame(&data, &mut sink).await,
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(text.as_bytes(), &mut sink).await
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(room = %self.config.room, "relay closed the connection");
                            return SessionEnd::Lost;
                        }
                        Some(Ok(_)) => Ok(()),
                        Some(Err(e)) => Err(e),
                    };
                    if let Err(e) = result {
                        tracing::debug!(error = %e, "connection lost");
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }

    /// Applies or forwards one inbound frame. Only socket errors are
    /// returned; bad frames are logged and dropped.
    async fn handle_frame(&mut self, data: &[u8], sink: &mut WsSink) -> Result<(), tungstenite::Error> {
        let frame = match Frame::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable frame");
                return Ok(());
            }
        };

        match frame {
            Frame::Sync(msg) => {
                let full_diff = matches!(msg, SyncMessage::Step2(_));
                match self.replica.handle_sync(&msg) {
                    Ok(SyncOutcome::Reply(reply)) => send_frame(sink, &Frame::Sync(reply)).await?,
                    Ok(SyncOutcome::Applied | SyncOutcome::Unchanged) => {
                        if full_diff && !self.synced.swap(true, Ordering::SeqCst) {
                            tracing::debug!(room = %self.config.room, "synced");
                            self.emit(ProviderEvent::Synced);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping sync message"),
                }
            }
            Frame::Presence(update) => self.emit(ProviderEvent::Presence(update)),
            Frame::Application(msg) => match msg.kind {
                AppType::Identity => match msg.parse_data::<RosterUser>() {
                    Ok(user) => {
                        self.identity.send_replace(Some(user.clone()));
                        self.emit(ProviderEvent::Identity(user));
                    }
                    Err(e) => tracing::warn!(error = %e, "bad identity message"),
                },
                AppType::Roster => match msg.parse_data::<RosterSnapshot>() {
                    Ok(roster) => self.emit(ProviderEvent::Roster(roster)),
                    Err(e) => tracing::warn!(error = %e, "bad roster message"),
                },
                _ => self.emit(ProviderEvent::Application(msg)),
            },
        }
        Ok(())
    }

    fn set_status(&self, status: ConnectionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            self.emit(ProviderEvent::Status(status));
        }
    }

    fn emit(&self, event: ProviderEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

async fn send_frame(sink: &mut WsSink, frame: &Frame) -> Result<(), tungstenite::Error> {
    match frame.encode() {
        Ok(bytes) => sink.send(Message::Binary(bytes.into())).await,
        Err(e) => {
            tracing::warn!(kind = frame.kind(), error = %e, "failed to encode frame");
            Ok(())
        }
    }
}
