//! Room manager: spawns room tasks on demand and routes to them by name.

use std::collections::HashMap;
use std::sync::Arc;

use dormant_protocol::RoomName;

use crate::room::spawn_room;
use crate::{BlobStore, RoomConfig, RoomHandle};

/// Tracks the running room tasks.
///
/// Rooms are created lazily by the first connection to a name and share
/// one [`BlobStore`]. A room task stops by itself once empty; its entry is
/// dropped the next time a room is created.
pub struct RoomManager<S> {
    rooms: HashMap<RoomName, RoomHandle>,
    config: RoomConfig,
    store: Arc<S>,
}

impl<S: BlobStore> RoomManager<S> {
    pub fn new(config: RoomConfig, store: Arc<S>) -> Self {
        Self {
            rooms: HashMap::new(),
            config,
            store,
        }
    }

    /// Returns the handle for `room`, spawning its task if it is not
    /// running.
    pub fn get_or_create(&mut self, room: &RoomName) -> RoomHandle {
        if let Some(handle) = self.get(room) {
            return handle;
        }
        self.rooms.retain(|_, handle| !handle.is_closed());
        let handle = spawn_room(room.clone(), self.config.clone(), Arc::clone(&self.store));
        self.rooms.insert(room.clone(), handle.clone());
        tracing::info!(room = %room, "room created");
        handle
    }

    /// Shuts down a room task and forgets it. Its snapshot stays in the
    /// store.
    pub async fn destroy_room(&mut self, room: &RoomName) -> bool {
        match self.rooms.remove(room) {
            Some(handle) => {
                let _ = handle.shutdown().await;
                tracing::info!(room = %room, "room destroyed");
                true
            }
            None => false,
        }
    }

    /// Returns the handle for `room` only if its task is running.
    pub fn get(&self, room: &RoomName) -> Option<RoomHandle> {
        self.rooms
            .get(room)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// The shared snapshot store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Number of rooms whose task is still running.
    pub fn room_count(&self) -> usize {
        self.rooms.values().filter(|handle| !handle.is_closed()).count()
    }
}
