//! Plain-HTTP status endpoint: `GET /{room}/status`.
//!
//! Informational only. For a running room the request is routed through
//! its mailbox like any other event, so it sees the same state a
//! connection would. A room that is not running is reported from the store
//! alone and is not started.

use std::sync::Arc;

use dormant_protocol::{RoomName, RoomStatus, unix_millis};
use dormant_room::{BlobStore, StoreError, snapshot_key};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::server::ServerState;

/// Requests larger than this are rejected; the endpoint takes no body.
const MAX_REQUEST: usize = 8 * 1024;

/// Accepts status requests until the listener fails.
pub(crate) async fn serve_status<S: BlobStore>(listener: TcpListener, state: Arc<ServerState<S>>) {
    tracing::info!(addr = ?listener.local_addr().ok(), "status endpoint running");
    loop {
        let (socket, _) = match listener.accept().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "status accept failed");
                continue;
            }
        };
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = serve_one(socket, state).await {
                tracing::debug!(error = %e, "status request failed");
            }
        });
    }
}

async fn serve_one<S: BlobStore>(
    mut socket: TcpStream,
    state: Arc<ServerState<S>>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; MAX_REQUEST];
    let mut total = 0;
    let complete = loop {
        let n = socket.read(&mut buf[total..]).await?;
        if n == 0 {
            break false;
        }
        total += n;
        if find_header_end(&buf[..total]).is_some() {
            break true;
        }
        if total == buf.len() {
            break false;
        }
    };

    let response = if complete {
        let request = String::from_utf8_lossy(&buf[..total]);
        route(&request, &state).await
    } else {
        http_response(400, "Bad Request", "text/plain", "bad request")
    };

    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

async fn route<S: BlobStore>(request: &str, state: &ServerState<S>) -> String {
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return http_response(400, "Bad Request", "text/plain", "bad request");
    };
    let path = target.split('?').next().unwrap_or(target);

    let Some(name) = path
        .strip_prefix('/')
        .and_then(|p| p.strip_suffix("/status"))
    else {
        return http_response(404, "Not Found", "text/plain", "not found");
    };
    if method != "GET" {
        return http_response(405, "Method Not Allowed", "text/plain", "method not allowed");
    }
    let room = match RoomName::new(name) {
        Ok(room) => room,
        Err(e) => return http_response(400, "Bad Request", "text/plain", &e.to_string()),
    };

    let (handle, store) = {
        let rooms = state.rooms.lock().await;
        (rooms.get(&room), Arc::clone(rooms.store()))
    };
    let running = match handle {
        Some(handle) => handle.status().await.ok(),
        None => None,
    };
    let status = match running {
        Some(status) => status,
        None => match idle_status(&room, &*store).await {
            Ok(status) => status,
            Err(e) => {
                return http_response(503, "Service Unavailable", "text/plain", &e.to_string());
            }
        },
    };
    match serde_json::to_string(&status) {
        Ok(body) => http_response(200, "OK", "application/json", &body),
        Err(e) => http_response(500, "Internal Server Error", "text/plain", &e.to_string()),
    }
}

/// Status of a room with no running task: no connections, no presence, and
/// the size of whatever snapshot is stored.
async fn idle_status<S: BlobStore>(room: &RoomName, store: &S) -> Result<RoomStatus, StoreError> {
    let stored = store.get(&snapshot_key(room.as_str())).await?;
    Ok(RoomStatus {
        connection_count: 0,
        document_size_bytes: stored.map_or(0, |bytes| bytes.len()),
        presence_count: 0,
        timestamp: unix_millis(),
    })
}

/// Position just past the blank line ending the headers.
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .or_else(|| data.windows(2).position(|w| w == b"\n\n").map(|i| i + 2))
}

fn http_response(code: u16, reason: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}
