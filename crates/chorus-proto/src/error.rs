//! Protocol-level errors.

use thiserror::Error;

/// Errors produced while encoding, decoding, or addressing relay values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// CBOR encoding failed.
    #[error("encode failed: {reason}")]
    Encode {
        /// Serializer error text.
        reason: String,
    },

    /// CBOR decoding failed.
    #[error("decode failed: {reason}")]
    Decode {
        /// Deserializer error text.
        reason: String,
    },

    /// A relay path did not match the expected grammar.
    #[error("malformed path: {path}")]
    MalformedPath {
        /// The offending path.
        path: String,
    },
}
