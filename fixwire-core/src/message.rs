/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message types for FIX protocol.
//!
//! This module provides:
//! - [`MsgType`]: Closed set of message kinds distinguished by tag 35
//! - [`RawMessage`]: Zero-copy view into a framed FIX message buffer
//! - [`Message`]: Owned header/body/trailer field container
//!
//! There is no per-message-type struct hierarchy. Every message, whatever its
//! version or kind, is a [`Message`] whose fields are addressed by tag number.

use crate::error::DecodeError;
use crate::field::{FieldMap, FieldRef};
use crate::tags;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::Range;

/// FIX message kinds.
///
/// Administrative kinds are handled by the session engine. Application kinds
/// the engine does not need to distinguish fall into `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MsgType {
    /// Heartbeat (0).
    #[default]
    Heartbeat,
    /// Test Request (1).
    TestRequest,
    /// Resend Request (2).
    ResendRequest,
    /// Reject (3).
    Reject,
    /// Sequence Reset (4).
    SequenceReset,
    /// Logout (5).
    Logout,
    /// Execution Report (8).
    ExecutionReport,
    /// Order Cancel Reject (9).
    OrderCancelReject,
    /// Logon (A).
    Logon,
    /// New Order Single (D).
    NewOrderSingle,
    /// Order Cancel Request (F).
    OrderCancelRequest,
    /// Order Cancel/Replace Request (G).
    OrderCancelReplaceRequest,
    /// Market Data Request (V).
    MarketDataRequest,
    /// Business Message Reject (j).
    BusinessMessageReject,
    /// Any other message type.
    Custom(String),
}

impl std::str::FromStr for MsgType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "8" => Self::ExecutionReport,
            "9" => Self::OrderCancelReject,
            "A" => Self::Logon,
            "D" => Self::NewOrderSingle,
            "F" => Self::OrderCancelRequest,
            "G" => Self::OrderCancelReplaceRequest,
            "V" => Self::MarketDataRequest,
            "j" => Self::BusinessMessageReject,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl MsgType {
    /// Parses a MsgType value; unknown values become `Custom`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }

    /// Returns the wire representation of this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::ExecutionReport => "8",
            Self::OrderCancelReject => "9",
            Self::Logon => "A",
            Self::NewOrderSingle => "D",
            Self::OrderCancelRequest => "F",
            Self::OrderCancelReplaceRequest => "G",
            Self::MarketDataRequest => "V",
            Self::BusinessMessageReject => "j",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Returns true if this is a session-level (administrative) message.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::TestRequest
                | Self::ResendRequest
                | Self::Reject
                | Self::SequenceReset
                | Self::Logout
                | Self::Logon
        )
    }

    /// Returns true if this is an application message.
    #[must_use]
    pub fn is_app(&self) -> bool {
        !self.is_admin()
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Zero-copy view into a FIX message buffer.
///
/// Fields reference the original buffer; nothing is allocated for values.
#[derive(Debug, Clone)]
pub struct RawMessage<'a> {
    /// The complete message buffer.
    buffer: &'a [u8],
    /// Range of the BeginString field value.
    begin_string: Range<usize>,
    /// Range of the message body (after BodyLength, before checksum).
    body: Range<usize>,
    /// The parsed message type.
    msg_type: MsgType,
    /// Parsed field references, including BeginString, BodyLength and CheckSum.
    fields: SmallVec<[FieldRef<'a>; 32]>,
}

impl<'a> RawMessage<'a> {
    /// Creates a new RawMessage from parsed components.
    #[must_use]
    pub fn new(
        buffer: &'a [u8],
        begin_string: Range<usize>,
        body: Range<usize>,
        msg_type: MsgType,
        fields: SmallVec<[FieldRef<'a>; 32]>,
    ) -> Self {
        Self {
            buffer,
            begin_string,
            body,
            msg_type,
            fields,
        }
    }

    /// Returns the complete message buffer.
    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Returns the BeginString value (e.g., "FIX.4.4").
    #[must_use]
    pub fn begin_string(&self) -> &'a str {
        std::str::from_utf8(&self.buffer[self.begin_string.clone()]).unwrap_or("")
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Returns an iterator over all fields.
    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = &FieldRef<'a>> {
        self.fields.iter()
    }

    /// Gets a field by tag number.
    #[must_use]
    pub fn get_field(&self, tag: u32) -> Option<&FieldRef<'a>> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Gets a field value as a string.
    #[must_use]
    pub fn get_field_str(&self, tag: u32) -> Option<&'a str> {
        self.get_field(tag).and_then(|f| f.as_str().ok())
    }

    /// Returns the message body range.
    #[inline]
    #[must_use]
    pub fn body_range(&self) -> &Range<usize> {
        &self.body
    }

    /// Converts this borrowed view to an owned [`Message`].
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidUtf8` if a field value is not UTF-8.
    pub fn to_message(&self) -> Result<Message, DecodeError> {
        Message::from_raw(self)
    }
}

/// Owned FIX message: three ordered field maps.
///
/// BodyLength and CheckSum are never stored; the encoder derives them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    header: FieldMap,
    body: FieldMap,
    trailer: FieldMap,
}

impl Message {
    /// Creates an empty message of the given type.
    #[must_use]
    pub fn new(msg_type: MsgType) -> Self {
        let mut header = FieldMap::new();
        header.set(tags::MSG_TYPE, msg_type.as_str());
        Self {
            header,
            body: FieldMap::new(),
            trailer: FieldMap::new(),
        }
    }

    /// Builds an owned message from a parsed raw view, sorting fields into
    /// header, body and trailer.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidUtf8` if a field value is not UTF-8.
    pub fn from_raw(raw: &RawMessage<'_>) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        for field in raw.fields() {
            let value = field.as_str()?;
            match field.tag {
                tags::BODY_LENGTH | tags::CHECKSUM => {}
                t if tags::is_header_tag(t) => message.header.set(t, value),
                t if tags::is_trailer_tag(t) => message.trailer.set(t, value),
                t => message.body.set(t, value),
            }
        }
        Ok(message)
    }

    /// Returns the message type, `Custom("")` when tag 35 is absent.
    #[must_use]
    pub fn msg_type(&self) -> MsgType {
        MsgType::parse(self.header.get(tags::MSG_TYPE).unwrap_or(""))
    }

    /// Returns the BeginString, if set.
    #[must_use]
    pub fn begin_string(&self) -> Option<&str> {
        self.header.get(tags::BEGIN_STRING)
    }

    /// Returns MsgSeqNum, if present and numeric.
    #[must_use]
    pub fn msg_seq_num(&self) -> Option<u64> {
        self.header.get_as(tags::MSG_SEQ_NUM).ok()
    }

    /// Returns true if PossDupFlag is `Y`.
    #[must_use]
    pub fn is_poss_dup(&self) -> bool {
        self.header.get_bool(tags::POSS_DUP_FLAG)
    }

    /// Returns the header fields.
    #[must_use]
    pub const fn header(&self) -> &FieldMap {
        &self.header
    }

    /// Returns the header fields mutably.
    pub fn header_mut(&mut self) -> &mut FieldMap {
        &mut self.header
    }

    /// Returns the body fields.
    #[must_use]
    pub const fn body(&self) -> &FieldMap {
        &self.body
    }

    /// Returns the body fields mutably.
    pub fn body_mut(&mut self) -> &mut FieldMap {
        &mut self.body
    }

    /// Returns the trailer fields.
    #[must_use]
    pub const fn trailer(&self) -> &FieldMap {
        &self.trailer
    }

    /// Returns the trailer fields mutably.
    pub fn trailer_mut(&mut self) -> &mut FieldMap {
        &mut self.trailer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_from_str() {
        assert_eq!(MsgType::parse("0"), MsgType::Heartbeat);
        assert_eq!(MsgType::parse("A"), MsgType::Logon);
        assert_eq!(MsgType::parse("D"), MsgType::NewOrderSingle);
        assert_eq!(MsgType::parse("8"), MsgType::ExecutionReport);
    }

    #[test]
    fn test_msg_type_is_admin() {
        assert!(MsgType::Heartbeat.is_admin());
        assert!(MsgType::Logon.is_admin());
        assert!(MsgType::SequenceReset.is_admin());
        assert!(!MsgType::BusinessMessageReject.is_admin());
        assert!(MsgType::NewOrderSingle.is_app());
    }

    #[test]
    fn test_msg_type_custom_roundtrip() {
        let custom = MsgType::parse("XX");
        assert!(matches!(custom, MsgType::Custom(_)));
        assert_eq!(custom.as_str(), "XX");
        assert!(custom.is_app());
    }

    #[test]
    fn test_message_new_sets_msg_type() {
        let mut msg = Message::new(MsgType::TestRequest);
        msg.body_mut().set(tags::TEST_REQ_ID, "PING");

        assert_eq!(msg.msg_type(), MsgType::TestRequest);
        assert_eq!(msg.body().get(tags::TEST_REQ_ID), Some("PING"));
        assert!(msg.msg_seq_num().is_none());
        assert!(!msg.is_poss_dup());
    }

    #[test]
    fn test_message_from_raw_splits_sections() {
        let buffer = b"8=FIX.4.4\x019=5\x0135=D\x0134=7\x0111=ORD1\x0110=000\x01";
        let fields: SmallVec<[FieldRef<'_>; 32]> = SmallVec::from_vec(vec![
            FieldRef::new(8, &buffer[2..9]),
            FieldRef::new(9, &buffer[12..13]),
            FieldRef::new(35, &buffer[17..18]),
            FieldRef::new(34, &buffer[22..23]),
            FieldRef::new(11, &buffer[27..31]),
            FieldRef::new(10, &buffer[35..38]),
        ]);
        let raw = RawMessage::new(buffer, 2..9, 14..32, MsgType::NewOrderSingle, fields);
        let msg = raw.to_message().unwrap();

        assert_eq!(msg.begin_string(), Some("FIX.4.4"));
        assert_eq!(msg.msg_seq_num(), Some(7));
        assert_eq!(msg.body().get(11), Some("ORD1"));
        assert!(!msg.header().contains(tags::BODY_LENGTH));
        assert!(msg.trailer().is_empty());
    }
}
