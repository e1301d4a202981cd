//! `DormantServer` builder and accept loop.
//!
//! Ties the layers together: transport → room manager → room tasks, plus
//! the optional HTTP status listener.

use std::net::SocketAddr;
use std::sync::Arc;

use dormant_room::{BlobStore, MemoryStore, RoomConfig, RoomManager};
use dormant_transport::{PendingConnection, Transport, WebSocketTransport};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::DormantError;
use crate::handler::handle_connection;
use crate::status::serve_status;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<S> {
    pub(crate) rooms: Mutex<RoomManager<S>>,
}

/// Builder for configuring and starting a Dormant server.
///
/// # Example
///
/// ```rust,ignore
/// let server = DormantServer::builder()
///     .bind("0.0.0.0:8080")
///     .store(FileStore::open("./data").await?)
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct DormantServerBuilder<S = MemoryStore> {
    bind_addr: String,
    status_addr: Option<String>,
    room_config: RoomConfig,
    store: Arc<S>,
}

impl DormantServerBuilder<MemoryStore> {
    /// Creates a new builder with default settings and an in-memory store.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            status_addr: None,
            room_config: RoomConfig::default(),
            store: Arc::new(MemoryStore::new()),
        }
    }
}

impl Default for DormantServerBuilder<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: BlobStore> DormantServerBuilder<S> {
    /// Sets the address to accept WebSocket connections on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Enables the HTTP status listener on `addr`.
    pub fn status_bind(mut self, addr: &str) -> Self {
        self.status_addr = Some(addr.to_string());
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Uses `store` for document snapshots.
    pub fn store<T: BlobStore>(self, store: T) -> DormantServerBuilder<T> {
        self.shared_store(Arc::new(store))
    }

    /// Uses a store the caller keeps a handle to.
    pub fn shared_store<T: BlobStore>(self, store: Arc<T>) -> DormantServerBuilder<T> {
        DormantServerBuilder {
            bind_addr: self.bind_addr,
            status_addr: self.status_addr,
            room_config: self.room_config,
            store,
        }
    }

    /// Binds the listeners.
    pub async fn build(self) -> Result<DormantServer<S>, DormantError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let status = match &self.status_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| DormantError::Status {
                        addr: addr.clone(),
                        source,
                    })?;
                tracing::info!(addr = %addr, "status listener bound");
                Some(listener)
            }
            None => None,
        };

        let state = Arc::new(ServerState {
            rooms: Mutex::new(RoomManager::new(self.room_config, self.store)),
        });

        Ok(DormantServer {
            transport,
            status,
            state,
        })
    }
}

/// A bound Dormant server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DormantServer<S = MemoryStore> {
    transport: WebSocketTransport,
    status: Option<TcpListener>,
    state: Arc<ServerState<S>>,
}

impl DormantServer<MemoryStore> {
    pub fn builder() -> DormantServerBuilder {
        DormantServerBuilder::new()
    }
}

impl<S: BlobStore> DormantServer<S> {
    /// Returns the address the WebSocket listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the address of the status listener, if enabled.
    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.status.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Each peer's WebSocket upgrade runs in its own task.
    pub async fn run(mut self) -> Result<(), DormantError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Dormant server running");

        if let Some(listener) = self.status.take() {
            tokio::spawn(serve_status(listener, Arc::clone(&self.state)));
        }

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let peer = pending.peer_addr();
                        let conn = match pending.complete().await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "handshake failed");
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
