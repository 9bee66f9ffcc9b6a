//! Wire types for the Chorus voice-room protocol.
//!
//! Everything a client writes to or reads from the signaling relay lives
//! here: the hierarchical path grammar, the CBOR-encoded value types, and
//! the encode/decode helpers. The relay itself treats values as opaque
//! bytes; only clients interpret them.
//!
//! We chose CBOR because it's self-describing (field names embedded),
//! compact, and needs no code generation. The relay never deserializes
//! values - only clients do.

pub mod error;
pub mod log;
pub mod paths;
pub mod roster;
pub mod signal;

use serde::{Serialize, de::DeserializeOwned};

pub use error::ProtocolError;
pub use log::{CommentBody, CommentEntry, WelcomeEvent};
pub use paths::{PathKind, RoomPaths};
pub use roster::{MicRequest, ParticipantEntry, RoomConfig};
pub use signal::{SignalEnvelope, SignalKind, SignalPayload};

/// Stable user identity, assigned by the surrounding application.
pub type ParticipantId = String;

/// Room identifier.
pub type RoomId = String;

/// Entries on replayed append streams older than this are ignored on
/// receipt.
///
/// The relay replays the single most recent entry of the signal, welcome,
/// and comment streams when a client subscribes. The window keeps those
/// replays from being mistaken for fresh traffic; nothing is deleted from
/// storage.
pub const VALIDITY_WINDOW_MS: u64 = 5_000;

/// Encode a relay value to CBOR bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::Encode { reason: e.to_string() })?;
    Ok(buf)
}

/// Decode a relay value from CBOR bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode { reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_participant_entry() {
        let entry = ParticipantEntry {
            display_name: "ada".into(),
            avatar_ref: Some("avatars/ada.png".into()),
            is_speaker: true,
            muted: false,
            is_speaking: false,
        };

        let bytes = encode(&entry).unwrap();
        let back: ParticipantEntry = decode(&bytes).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn decode_garbage_fails() {
        let result: Result<ParticipantEntry, _> = decode(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::Decode { .. })));
    }
}
