/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the FixWire FIX engine.
//!
//! This module provides a unified error hierarchy using `thiserror` for typed,
//! domain-specific errors across all FixWire operations. Framing errors live
//! next to the frame decoder in `fixwire-tagvalue`, since they carry decoder
//! positions rather than message semantics.

use std::ops::Range;
use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all FixWire operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error during message decoding.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error during message encoding.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in message store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error from underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur while parsing a framed FIX message into fields.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message buffer is incomplete, need more data.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// Invalid BeginString field (tag 8).
    #[error("invalid begin string: expected 8=FIX.x.y")]
    InvalidBeginString,

    /// Missing BodyLength field (tag 9).
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// Invalid BodyLength value.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Declared BodyLength does not match the bytes actually present.
    #[error("body length mismatch: declared {declared}, actual {actual}")]
    BodyLengthMismatch {
        /// Value carried in tag 9.
        declared: usize,
        /// Byte count between the BodyLength field and the checksum field.
        actual: usize,
    },

    /// Missing MsgType field (tag 35), or MsgType not the third field.
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },

    /// Missing required field.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for the expected type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Invalid UTF-8 in string field.
    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

impl DecodeError {
    /// Returns true if the error means the bytes on the wire were damaged
    /// (bad checksum or length) rather than structurally incomplete.
    #[must_use]
    pub const fn is_transport_damage(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::BodyLengthMismatch { .. }
        )
    }
}

/// Errors that occur during FIX message encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Missing required field during encoding.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for encoding.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// The outbound item cannot be represented in the configured charset.
    #[error("unencodable message: {reason}")]
    Unencodable {
        /// Description of the failure.
        reason: String,
    },
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session is not in the correct state for the operation.
    #[error("invalid session state: expected {expected}, current {current}")]
    InvalidState {
        /// Expected state for the operation.
        expected: String,
        /// Current session state.
        current: String,
    },

    /// A responder is already bound to this session.
    #[error("session {session} already bound to {remote}")]
    AlreadyBound {
        /// Session identity.
        session: String,
        /// Remote address of the existing binding.
        remote: String,
    },

    /// No responder is bound; the session is logically disconnected.
    #[error("session {0} is not bound to a connection")]
    NotBound(String),

    /// No session could be resolved for an identity.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// Nothing arrived from the counterparty, not even the answer to a
    /// TestRequest. The message doubles as the Logout text.
    #[error("Timed out waiting for heartbeat after {elapsed_ms} ms")]
    HeartbeatTimeout {
        /// Time since the last inbound message.
        elapsed_ms: u64,
    },

    /// MsgSeqNum below the expected one without PossDupFlag. The message
    /// doubles as the Logout text.
    #[error("MsgSeqNum too low, expecting {expected} but received {received}")]
    SequenceTooLow {
        /// Next inbound sequence number we expected.
        expected: u64,
        /// MsgSeqNum actually carried.
        received: u64,
    },

    /// Responder refused or failed to write the bytes.
    #[error("send failed for session {0}")]
    SendFailed(String),

    /// Session configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Message store failure surfaced through the session.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Outbound message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
}

/// Errors in message store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Range of messages not available.
    #[error("messages not available for range: {range:?}")]
    RangeNotAvailable {
        /// The requested range of sequence numbers.
        range: Range<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::ChecksumMismatch {
            calculated: 100,
            declared: 200,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: calculated 100, declared 200"
        );
    }

    #[test]
    fn test_transport_damage() {
        assert!(
            DecodeError::BodyLengthMismatch {
                declared: 10,
                actual: 12
            }
            .is_transport_damage()
        );
        assert!(!DecodeError::MissingMsgType.is_transport_damage());
    }

    #[test]
    fn test_fix_error_from_decode() {
        let decode_err = DecodeError::Incomplete;
        let fix_err: FixError = decode_err.into();
        assert!(matches!(fix_err, FixError::Decode(DecodeError::Incomplete)));
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::SequenceTooLow {
            expected: 5,
            received: 3,
        };
        assert_eq!(err.to_string(), "MsgSeqNum too low, expecting 5 but received 3");

        let err = SessionError::HeartbeatTimeout { elapsed_ms: 61_000 };
        assert_eq!(err.to_string(), "Timed out waiting for heartbeat after 61000 ms");
    }

    #[test]
    fn test_session_error_from_store() {
        let err: SessionError = StoreError::RangeNotAvailable { range: 3..5 }.into();
        assert_eq!(err.to_string(), "store error: messages not available for range: 3..5");
    }
}
