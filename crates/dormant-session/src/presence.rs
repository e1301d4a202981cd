use std::collections::BTreeMap;

use dormant_protocol::ConnectionId;
use serde_json::Value;

/// Last-known presence payload per connection.
///
/// Payloads are opaque. Nothing here is persisted, and an entry exists only
/// while its connection has published a non-null state.
#[derive(Debug, Default)]
pub struct PresenceStore {
    entries: BTreeMap<ConnectionId, Value>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `payload` for `id`. A JSON `null` clears the entry instead.
    pub fn set(&mut self, id: ConnectionId, payload: Value) {
        if payload.is_null() {
            self.entries.remove(&id);
        } else {
            self.entries.insert(id, payload);
        }
    }

    /// Removes the entry for `id`, returning it if there was one.
    pub fn clear(&mut self, id: ConnectionId) -> Option<Value> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Value> {
        self.entries.get(&id)
    }

    /// Every entry, ordered by connection id.
    pub fn all(&self) -> &BTreeMap<ConnectionId, Value> {
        &self.entries
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_clear_removes_entry() {
        let mut store = PresenceStore::new();
        store.set(ConnectionId(1), json!({"cursor": {"line": 1, "col": 2}}));
        assert_eq!(store.size(), 1);
        assert_eq!(
            store.clear(ConnectionId(1)),
            Some(json!({"cursor": {"line": 1, "col": 2}}))
        );
        assert_eq!(store.size(), 0);
        assert_eq!(store.clear(ConnectionId(1)), None);
    }

    #[test]
    fn test_set_null_acts_as_clear() {
        let mut store = PresenceStore::new();
        store.set(ConnectionId(1), json!({"x": 1}));
        store.set(ConnectionId(1), Value::Null);
        assert!(store.get(ConnectionId(1)).is_none());
    }

    #[test]
    fn test_set_overwrites_previous_payload() {
        let mut store = PresenceStore::new();
        store.set(ConnectionId(2), json!(1));
        store.set(ConnectionId(2), json!(2));
        store.set(ConnectionId(1), json!(3));
        let ids: Vec<_> = store.all().keys().copied().collect();
        assert_eq!(ids, vec![ConnectionId(1), ConnectionId(2)]);
        assert_eq!(store.get(ConnectionId(2)), Some(&json!(2)));
    }
}
