//! Per-connection handler: room lookup and frame pumping.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Derive the room name from the request path
//!   2. Open the connection in that room
//!   3. Loop: forward inbound frames to the room, outbound frames to the
//!      socket, until either side goes away
//!
//! The handler applies no timeouts. Keepalive is the transport's concern.

use std::sync::Arc;

use dormant_protocol::{ConnectionId, RoomName};
use dormant_room::{BlobStore, RoomHandle};
use dormant_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::DormantError;
use crate::server::ServerState;

/// How many stopped rooms a connection may run into before giving up.
const MAX_JOIN_RETRIES: usize = 3;

/// Drop guard that closes the connection in its room when the handler
/// exits, including on error or panic.
struct RoomGuard {
    id: ConnectionId,
    handle: RoomHandle,
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        let id = self.id;
        let handle = self.handle.clone();
        tokio::spawn(async move {
            if let Err(e) = handle.close(id).await {
                tracing::debug!(conn = %id, error = %e, "room gone before close");
            }
        });
    }
}

/// Parses `/{room}` (an optional trailing slash is tolerated).
pub(crate) fn room_from_path(path: &str) -> Result<RoomName, DormantError> {
    let name = path.trim_start_matches('/').trim_end_matches('/');
    Ok(RoomName::new(name)?)
}

/// Opens `id` in `room`.
///
/// A room whose task stopped between lookup and connect turns the
/// connection away; the manager then hands out a fresh room.
async fn join_room<S: BlobStore>(
    state: &ServerState<S>,
    room: &RoomName,
    id: ConnectionId,
) -> Result<(RoomHandle, mpsc::UnboundedReceiver<Vec<u8>>), DormantError> {
    let mut retries = 0;
    loop {
        let handle = state.rooms.lock().await.get_or_create(room);
        let (tx, outbound) = mpsc::unbounded_channel();
        match handle.connect(id, tx).await {
            Ok(()) => return Ok((handle, outbound)),
            Err(e) if handle.is_closed() && retries < MAX_JOIN_RETRIES => {
                retries += 1;
                tracing::debug!(
                    room = %room,
                    conn = %id,
                    error = %e,
                    "room stopped, retrying join"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S: BlobStore>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S>>,
) -> Result<(), DormantError> {
    let id = conn.id();
    let room = match room_from_path(conn.path()) {
        Ok(room) => room,
        Err(e) => {
            tracing::warn!(conn = %id, path = conn.path(), error = %e, "rejecting connection");
            let _ = conn.close().await;
            return Err(e);
        }
    };

    let (handle, mut outbound) = join_room(&state, &room, id).await?;
    let _guard = RoomGuard {
        id,
        handle: handle.clone(),
    };

    loop {
        tokio::select! {
            inbound = conn.recv() => match inbound {
                Ok(Some(data)) => handle.message(id, data).await?,
                Ok(None) => {
                    tracing::debug!(room = %room, conn = %id, "connection closed cleanly");
                    break;
                }
                Err(e) => {
                    tracing::debug!(room = %room, conn = %id, error = %e, "recv error");
                    break;
                }
            },
            frame = outbound.recv() => match frame {
                Some(bytes) => conn.send(&bytes).await?,
                None => {
                    tracing::debug!(room = %room, conn = %id, "room dropped connection");
                    break;
                }
            },
        }
    }

    let _ = conn.close().await;
    Ok(())
}
