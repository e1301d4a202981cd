//! Binary envelope for [`Frame`]s.
//!
//! Every frame starts with one unsigned varint tag naming its kind. What
//! follows depends on the kind:
//!
//! ```text
//! SYNC         varint 0 │ varint sub-tag │ varint len │ yrs bytes
//! PRESENCE     varint 1 │ varint len │ UTF-8 JSON {clientId, state}
//! APPLICATION  varint 2 │ varint len │ UTF-8 JSON {type, data?, timestamp?}
//! ```
//!
//! Sync sub-tags follow the y-protocols numbering (`0` step 1, `1` step 2,
//! `2` update) so existing Yjs tooling can read the sync payloads. The
//! varint and length-prefix primitives are the ones yrs itself encodes
//! updates with.
//!
//! Decoding is strict about the discriminant and lenient about nothing
//! else: an unknown tag is an error the caller is expected to log and drop
//! without closing the connection.

use yrs::encoding::read::{Cursor, Read};
use yrs::encoding::write::Write;

use crate::{AppMessage, Frame, PresenceUpdate, ProtocolError, SyncMessage};

/// The leading tag of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageTag {
    /// Document replication.
    Sync = 0,
    /// Ephemeral presence.
    Presence = 1,
    /// Relay-level signaling.
    Application = 2,
}

impl TryFrom<u32> for MessageTag {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Sync),
            1 => Ok(Self::Presence),
            2 => Ok(Self::Application),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

const SYNC_STEP1: u32 = 0;
const SYNC_STEP2: u32 = 1;
const SYNC_UPDATE: u32 = 2;

/// Encodes a frame into bytes.
///
/// # Errors
/// Returns [`ProtocolError::Encode`] if a JSON payload fails to serialize.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    match frame {
        Frame::Sync(msg) => {
            let sub_tag = match msg {
                SyncMessage::Step1(_) => SYNC_STEP1,
                SyncMessage::Step2(_) => SYNC_STEP2,
                SyncMessage::Update(_) => SYNC_UPDATE,
            };
            buf.write_var(MessageTag::Sync as u32);
            buf.write_var(sub_tag);
            buf.write_buf(msg.payload());
        }
        Frame::Presence(update) => {
            let json = serde_json::to_vec(update).map_err(ProtocolError::Encode)?;
            buf.write_var(MessageTag::Presence as u32);
            buf.write_buf(json);
        }
        Frame::Application(msg) => {
            let json = serde_json::to_vec(msg).map_err(ProtocolError::Encode)?;
            buf.write_var(MessageTag::Application as u32);
            buf.write_buf(json);
        }
    }
    Ok(buf)
}

/// Decodes bytes into a frame.
///
/// # Errors
/// - [`ProtocolError::Malformed`] for truncated input or bad varints
/// - [`ProtocolError::UnknownTag`] / [`ProtocolError::UnknownSyncTag`] for
///   discriminants this version does not know
/// - [`ProtocolError::Decode`] for PRESENCE/APPLICATION JSON that does not
///   match its schema
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    let mut cursor = Cursor::new(data);
    let tag: u32 = cursor.read_var()?;

    match MessageTag::try_from(tag)? {
        MessageTag::Sync => {
            let sub_tag: u32 = cursor.read_var()?;
            let payload = cursor.read_buf()?.to_vec();
            let msg = match sub_tag {
                SYNC_STEP1 => SyncMessage::Step1(payload),
                SYNC_STEP2 => SyncMessage::Step2(payload),
                SYNC_UPDATE => SyncMessage::Update(payload),
                other => return Err(ProtocolError::UnknownSyncTag(other)),
            };
            Ok(Frame::Sync(msg))
        }
        MessageTag::Presence => {
            let json = cursor.read_buf()?;
            let update: PresenceUpdate =
                serde_json::from_slice(json).map_err(ProtocolError::Decode)?;
            Ok(Frame::Presence(update))
        }
        MessageTag::Application => {
            let json = cursor.read_buf()?;
            let msg: AppMessage =
                serde_json::from_slice(json).map_err(ProtocolError::Decode)?;
            Ok(Frame::Application(msg))
        }
    }
}

/// Reads only the leading tag, without decoding the payload.
///
/// The relay uses this to log which kind of frame failed to decode.
///
/// # Errors
/// Same as the tag part of [`decode`].
pub fn peek_tag(data: &[u8]) -> Result<MessageTag, ProtocolError> {
    let mut cursor = Cursor::new(data);
    let tag: u32 = cursor.read_var()?;
    MessageTag::try_from(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppType, ConnectionId};
    use serde_json::json;

    #[test]
    fn test_encode_sync_step1_layout() {
        let bytes = encode(&Frame::Sync(SyncMessage::Step1(vec![9, 8]))).unwrap();
        // tag 0, sub-tag 0, len 2, payload
        assert_eq!(bytes, vec![0, 0, 2, 9, 8]);
    }

    #[test]
    fn test_encode_sync_update_layout() {
        let bytes = encode(&Frame::Sync(SyncMessage::Update(vec![1]))).unwrap();
        assert_eq!(bytes, vec![0, 2, 1, 1]);
    }

    #[test]
    fn test_encode_presence_starts_with_tag_one_and_json() {
        let frame = Frame::Presence(PresenceUpdate::set(ConnectionId(3), json!({"x": 1})));
        let bytes = encode(&frame).unwrap();
        assert_eq!(bytes[0], 1);
        let json: serde_json::Value = serde_json::from_slice(&bytes[2..]).unwrap();
        assert_eq!(json, json!({"clientId": 3, "state": {"x": 1}}));
    }

    #[test]
    fn test_decode_each_sync_kind() {
        for msg in [
            SyncMessage::Step1(vec![1, 2]),
            SyncMessage::Step2(vec![3]),
            SyncMessage::Update(Vec::new()),
        ] {
            let bytes = encode(&Frame::Sync(msg.clone())).unwrap();
            assert_eq!(decode(&bytes).unwrap(), Frame::Sync(msg));
        }
    }

    #[test]
    fn test_decode_application_hand_written_json() {
        let json = br#"{"type":"config","data":{"theme":"dark"}}"#;
        let mut bytes = vec![2, json.len() as u8];
        bytes.extend_from_slice(json);

        let Frame::Application(msg) = decode(&bytes).unwrap() else {
            panic!("expected application frame");
        };
        assert_eq!(msg.kind, AppType::Other("config".into()));
        assert_eq!(msg.data, Some(json!({"theme": "dark"})));
    }

    #[test]
    fn test_decode_large_payload_uses_multibyte_length() {
        let payload = vec![7u8; 70_000];
        let bytes = encode(&Frame::Sync(SyncMessage::Update(payload.clone()))).unwrap();
        assert_eq!(
            decode(&bytes).unwrap(),
            Frame::Sync(SyncMessage::Update(payload))
        );
    }

    #[test]
    fn test_decode_unknown_tag_is_reported() {
        assert!(matches!(decode(&[7, 0]), Err(ProtocolError::UnknownTag(7))));
    }

    #[test]
    fn test_decode_unknown_sync_sub_tag_is_reported() {
        assert!(matches!(
            decode(&[0, 5, 0]),
            Err(ProtocolError::UnknownSyncTag(5))
        ));
    }

    #[test]
    fn test_decode_truncated_frame_is_malformed() {
        // Claims 10 payload bytes, carries 1.
        assert!(matches!(
            decode(&[0, 2, 10, 1]),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(decode(&[]), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_malformed_application_json() {
        let json = b"{not json";
        let mut bytes = vec![2, json.len() as u8];
        bytes.extend_from_slice(json);
        assert!(matches!(decode(&bytes), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_peek_tag_reads_kind_without_payload() {
        assert_eq!(peek_tag(&[1, 200]).unwrap(), MessageTag::Presence);
        assert!(matches!(peek_tag(&[3]), Err(ProtocolError::UnknownTag(3))));
    }
}
