//! Core protocol types for Dormant's wire format.
//!
//! Every structure in this module either travels on the wire inside a
//! [`Frame`] or is derived from one (roster snapshots, room status). The
//! JSON shapes are fixed: browser clients parse them, so field names are
//! camelCase and the application `type` is a plain string.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// Longest room name accepted by [`RoomName::new`].
pub const MAX_ROOM_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque identifier for one live transport connection.
///
/// Assigned by the host that owns the socket, never by the relay. The relay
/// only compares, orders, and echoes these values. `#[serde(transparent)]`
/// keeps it a plain number in JSON (`7`, not `{"0": 7}`), which is what the
/// `clientId` field of a presence message carries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The name of a collaboration room. One room holds exactly one document.
///
/// Room names come from the request path of the WebSocket upgrade, so they
/// are restricted to URL-safe characters: ASCII letters, digits, `-`, `_`
/// and `.`. The restriction also keeps them safe to use as storage keys.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
    /// Validates and wraps a room name.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidRoomName`] if the name is empty,
    /// longer than [`MAX_ROOM_NAME_LEN`], starts with a dot, or contains a
    /// character outside `[A-Za-z0-9_.-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into();
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if name.is_empty()
            || name.len() > MAX_ROOM_NAME_LEN
            || name.starts_with('.')
            || !valid_chars
        {
            return Err(ProtocolError::InvalidRoomName(name));
        }
        Ok(Self(name))
    }

    /// Returns the room name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomName {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RoomName {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomName> for String {
    fn from(value: RoomName) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// SyncMessage: document replication
// ---------------------------------------------------------------------------

/// A document-sync sub-message carried inside a [`Frame::Sync`].
///
/// The bytes are opaque to the protocol layer: they are yrs v1-encoded state
/// vectors or updates, interpreted only by the document replica.
///
/// ```text
/// Step1(state vector)  ──►  "here is what I have, send me what I lack"
/// Step2(diff)          ◄──  the answer to a Step1
/// Update(delta)        ◄─►  an incremental change, pushed as it happens
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// A state vector asking the peer for everything it has that we lack.
    Step1(Vec<u8>),
    /// The diff answering a `Step1`.
    Step2(Vec<u8>),
    /// An incremental update produced by a local edit.
    Update(Vec<u8>),
}

impl SyncMessage {
    /// Returns the raw yrs payload.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Step1(bytes) | Self::Step2(bytes) | Self::Update(bytes) => bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// PresenceUpdate: ephemeral awareness
// ---------------------------------------------------------------------------

/// A presence (awareness) payload for one connection.
///
/// The `state` is chosen entirely by the client (cursor, selection, custom
/// fields) and is never inspected by the relay. `state: null` means the
/// connection's presence was removed.
///
/// JSON shape: `{"clientId": 7, "state": {"cursor": {"line": 1}}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    /// The connection this presence belongs to. The relay overwrites it
    /// with the real sender before rebroadcasting.
    pub client_id: ConnectionId,
    /// The presence payload, or `None` for removal.
    pub state: Option<Value>,
}

impl PresenceUpdate {
    /// Presence for `client_id` set to `state`.
    pub fn set(client_id: ConnectionId, state: Value) -> Self {
        Self {
            client_id,
            state: Some(state),
        }
    }

    /// Presence removal for `client_id`.
    pub fn removed(client_id: ConnectionId) -> Self {
        Self {
            client_id,
            state: None,
        }
    }

    /// Returns `true` if this update removes the connection's presence.
    /// A JSON `null` state counts as a removal too.
    pub fn is_removal(&self) -> bool {
        matches!(self.state, None | Some(Value::Null))
    }
}

// ---------------------------------------------------------------------------
// AppMessage: relay-level signaling
// ---------------------------------------------------------------------------

/// The `type` field of an application message.
///
/// The set is open: the relay understands `ping` and emits `pong`,
/// `roster` and `identity`; every other string is carried as
/// [`AppType::Other`] and relayed without interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppType {
    /// Client → relay liveness check.
    Ping,
    /// Relay → client answer to a `Ping`.
    Pong,
    /// Relay → clients: the current roster snapshot.
    Roster,
    /// Relay → one client: the identity assigned to its connection.
    Identity,
    /// Anything else; relayed to the other connections untouched.
    Other(String),
}

impl AppType {
    /// Returns the wire string for this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Roster => "roster",
            Self::Identity => "identity",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for AppType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "roster" => Self::Roster,
            "identity" => Self::Identity,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for AppType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<AppType> for String {
    fn from(value: AppType) -> Self {
        match value {
            AppType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An application message: `{"type": "...", "data": ..., "timestamp": ...}`.
///
/// `data` is intentionally loosely typed, since application messages are
/// the extension point of the protocol. Absent fields are omitted on the
/// wire rather than written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMessage {
    /// What kind of message this is.
    #[serde(rename = "type")]
    pub kind: AppType,
    /// Free-form payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Milliseconds since the Unix epoch at the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl AppMessage {
    /// A message of the given type with no data and no timestamp.
    pub fn new(kind: impl Into<AppType>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
            timestamp: None,
        }
    }

    /// Attaches a data payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches a timestamp.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// A `ping` stamped with the current time.
    pub fn ping() -> Self {
        Self::new(AppType::Ping).with_timestamp(unix_millis())
    }

    /// A `pong` stamped with the current time.
    pub fn pong() -> Self {
        Self::new(AppType::Pong).with_timestamp(unix_millis())
    }

    /// A `roster` broadcast carrying `snapshot`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the snapshot cannot be
    /// represented as JSON.
    pub fn roster(snapshot: &RosterSnapshot) -> Result<Self, ProtocolError> {
        let data = serde_json::to_value(snapshot).map_err(ProtocolError::Encode)?;
        Ok(Self::new(AppType::Roster)
            .with_data(data)
            .with_timestamp(unix_millis()))
    }

    /// An `identity` announcement for one connection.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the user cannot be represented
    /// as JSON.
    pub fn identity(user: &RosterUser) -> Result<Self, ProtocolError> {
        let data = serde_json::to_value(user).map_err(ProtocolError::Encode)?;
        Ok(Self::new(AppType::Identity).with_data(data))
    }

    /// Parses `data` as `T`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] when there is no data and
    /// [`ProtocolError::Decode`] when it has the wrong shape.
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let data = self.data.clone().ok_or_else(|| {
            ProtocolError::InvalidMessage(format!("{} message has no data", self.kind))
        })?;
        serde_json::from_value(data).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Roster types
// ---------------------------------------------------------------------------

/// The display identity assigned to a connection.
///
/// Picked from a fixed palette by join ordinal, so the same ordinal always
/// yields the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Join ordinal the identity was derived from.
    pub ordinal: u32,
    /// Display name.
    pub name: String,
    /// CSS color string for cursors and selections.
    pub color: String,
    /// Avatar image URL.
    pub avatar: String,
}

/// One entry of a roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterUser {
    /// The connection this user is attached to.
    pub connection_id: ConnectionId,
    /// Its assigned identity, flattened into the same JSON object.
    #[serde(flatten)]
    pub identity: Identity,
}

/// Whether a room currently has one party or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterMode {
    /// Zero or one connection.
    Solo,
    /// Two or more connections.
    Multi,
}

impl RosterMode {
    /// The mode for a room with `count` live connections.
    pub fn for_count(count: usize) -> Self {
        if count <= 1 { Self::Solo } else { Self::Multi }
    }
}

/// `{count, mode, users}`, derived from the live connection set on every
/// roster-changing event. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    /// Number of live connections.
    pub count: usize,
    /// `solo` when `count <= 1`, `multi` otherwise.
    pub mode: RosterMode,
    /// Live connections with their identities, in host enumeration order.
    pub users: Vec<RosterUser>,
}

impl RosterSnapshot {
    /// Builds a snapshot, deriving `count` and `mode` from `users`.
    pub fn new(users: Vec<RosterUser>) -> Self {
        Self {
            count: users.len(),
            mode: RosterMode::for_count(users.len()),
            users,
        }
    }
}

/// Informational room status served over HTTP. Not part of the sync
/// protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    /// Live connections according to the host.
    pub connection_count: usize,
    /// Size of the fully serialized document.
    pub document_size_bytes: usize,
    /// Presence entries currently held.
    pub presence_count: usize,
    /// Milliseconds since the Unix epoch when the status was taken.
    pub timestamp: u64,
}

// ---------------------------------------------------------------------------
// Frame: the top-level wire format
// ---------------------------------------------------------------------------

/// One message on the wire.
///
/// A tagged union with exactly three kinds. See [`crate::codec`] for the
/// byte layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Document replication.
    Sync(SyncMessage),
    /// Ephemeral presence.
    Presence(PresenceUpdate),
    /// Relay-level signaling.
    Application(AppMessage),
}

impl Frame {
    /// Encodes this frame with the binary envelope.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if a JSON payload cannot be
    /// serialized.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        crate::codec::encode(self)
    }

    /// Decodes a frame from bytes.
    ///
    /// # Errors
    /// See [`crate::codec::decode`].
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        crate::codec::decode(data)
    }

    /// Short name of the frame kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::Presence(_) => "presence",
            Self::Application(_) => "application",
        }
    }
}

/// Milliseconds since the Unix epoch. Returns 0 if the system clock is set
/// before 1970.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The JSON shapes here are consumed by browser clients, so these tests
    //! pin field names and tagging rather than round-tripping everything.

    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&ConnectionId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_orders_by_value() {
        let mut ids = vec![ConnectionId(3), ConnectionId(1), ConnectionId(2)];
        ids.sort();
        assert_eq!(ids, vec![ConnectionId(1), ConnectionId(2), ConnectionId(3)]);
    }

    #[test]
    fn test_room_name_accepts_url_safe_names() {
        for name in ["r1", "design-review", "team_42", "v1.2"] {
            assert!(RoomName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_room_name_rejects_unsafe_names() {
        let too_long = "a".repeat(MAX_ROOM_NAME_LEN + 1);
        for name in ["", "a/b", "..", ".hidden", "sp ace", "ü", too_long.as_str()] {
            assert!(
                matches!(RoomName::new(name), Err(ProtocolError::InvalidRoomName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_room_name_deserialize_validates() {
        let ok: RoomName = serde_json::from_str("\"r1\"").unwrap();
        assert_eq!(ok.as_str(), "r1");
        assert!(serde_json::from_str::<RoomName>("\"../etc\"").is_err());
    }

    #[test]
    fn test_presence_update_json_uses_client_id_and_state() {
        let update = PresenceUpdate::set(
            ConnectionId(5),
            json!({"cursor": {"line": 1, "col": 2}}),
        );
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(
            value,
            json!({"clientId": 5, "state": {"cursor": {"line": 1, "col": 2}}})
        );
    }

    #[test]
    fn test_presence_removal_serializes_null_state() {
        let value = serde_json::to_value(PresenceUpdate::removed(ConnectionId(5))).unwrap();
        assert_eq!(value, json!({"clientId": 5, "state": null}));
    }

    #[test]
    fn test_presence_missing_state_is_removal() {
        let update: PresenceUpdate = serde_json::from_str(r#"{"clientId": 9}"#).unwrap();
        assert!(update.is_removal());
    }

    #[test]
    fn test_app_type_known_and_custom_strings() {
        assert_eq!(AppType::from("ping"), AppType::Ping);
        assert_eq!(AppType::from("roster"), AppType::Roster);
        assert_eq!(
            AppType::from("config"),
            AppType::Other("config".to_string())
        );
        assert_eq!(String::from(AppType::Other("x".into())), "x");
        assert_eq!(String::from(AppType::Identity), "identity");
    }

    #[test]
    fn test_app_message_omits_absent_fields() {
        let value = serde_json::to_value(AppMessage::new("config")).unwrap();
        assert_eq!(value, json!({"type": "config"}));
    }

    #[test]
    fn test_app_message_parses_without_optional_fields() {
        let msg: AppMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg.kind, AppType::Ping);
        assert!(msg.data.is_none());
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_app_message_missing_type_is_error() {
        assert!(serde_json::from_str::<AppMessage>(r#"{"data": 1}"#).is_err());
    }

    #[test]
    fn test_roster_mode_boundaries() {
        assert_eq!(RosterMode::for_count(0), RosterMode::Solo);
        assert_eq!(RosterMode::for_count(1), RosterMode::Solo);
        assert_eq!(RosterMode::for_count(2), RosterMode::Multi);
    }

    #[test]
    fn test_roster_message_json_shape() {
        let snapshot = RosterSnapshot::new(vec![RosterUser {
            connection_id: ConnectionId(1),
            identity: Identity {
                ordinal: 0,
                name: "Otter".into(),
                color: "#f97316".into(),
                avatar: "/avatars/otter.svg".into(),
            },
        }]);
        let msg = AppMessage::roster(&snapshot).unwrap();
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "roster");
        assert_eq!(value["data"]["count"], 1);
        assert_eq!(value["data"]["mode"], "solo");
        assert_eq!(value["data"]["users"][0]["connectionId"], 1);
        assert_eq!(value["data"]["users"][0]["name"], "Otter");
        assert!(value["timestamp"].is_u64());

        let parsed: RosterSnapshot = msg.parse_data().unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_parse_data_without_data_is_invalid_message() {
        let result = AppMessage::new("roster").parse_data::<RosterSnapshot>();
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_room_status_json_is_camel_case() {
        let status = RoomStatus {
            connection_count: 2,
            document_size_bytes: 10,
            presence_count: 1,
            timestamp: 5,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            json!({
                "connectionCount": 2,
                "documentSizeBytes": 10,
                "presenceCount": 1,
                "timestamp": 5
            })
        );
    }
}
