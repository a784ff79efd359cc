/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX message encoder.
//!
//! This module provides:
//! - [`Encoder`]: low-level tag=value builder that frames the body with
//!   BeginString, BodyLength and CheckSum
//! - [`encode_message`]: serializes an owned [`Message`]
//! - [`MessageEncoder`]: turns an [`Outbound`] item into wire bytes in a
//!   configured character set

use crate::checksum::{calculate_checksum, format_checksum};
use crate::decoder::SOH;
use bytes::{BufMut, Bytes, BytesMut};
use fixwire_core::error::EncodeError;
use fixwire_core::message::Message;
use fixwire_core::tags;
use memchr::memchr;
use std::borrow::Cow;

/// FIX message encoder.
///
/// The encoder builds FIX messages by appending fields in tag=value format.
/// It handles BeginString, BodyLength, and Checksum fields automatically.
#[derive(Debug)]
pub struct Encoder {
    /// Buffer for the message body (between BodyLength and Checksum).
    body: BytesMut,
    /// The BeginString value (e.g., "FIX.4.4").
    begin_string: String,
}

impl Encoder {
    /// Creates a new encoder with the specified BeginString.
    ///
    /// # Arguments
    /// * `begin_string` - The FIX version string (e.g., "FIX.4.4")
    #[must_use]
    pub fn new(begin_string: impl Into<String>) -> Self {
        Self {
            body: BytesMut::with_capacity(256),
            begin_string: begin_string.into(),
        }
    }

    /// Creates a new encoder with pre-allocated capacity.
    ///
    /// # Arguments
    /// * `begin_string` - The FIX version string
    /// * `capacity` - Initial buffer capacity in bytes
    #[must_use]
    pub fn with_capacity(begin_string: impl Into<String>, capacity: usize) -> Self {
        Self {
            body: BytesMut::with_capacity(capacity),
            begin_string: begin_string.into(),
        }
    }

    /// Appends a field with a string value.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    /// * `value` - The field value
    #[inline]
    pub fn put_str(&mut self, tag: u32, value: &str) {
        self.put_raw(tag, value.as_bytes());
    }

    /// Appends a field with an unsigned integer value.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    /// * `value` - The field value
    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        let s = buf.format(value);
        self.put_raw(tag, s.as_bytes());
    }

    /// Appends a field with a boolean value (Y/N).
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    /// * `value` - The field value
    #[inline]
    pub fn put_bool(&mut self, tag: u32, value: bool) {
        self.put_raw(tag, if value { b"Y" } else { b"N" });
    }

    /// Appends a field with raw bytes.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    /// * `value` - The field value bytes
    #[inline]
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        let tag_str = tag_buf.format(tag);

        self.body.put_slice(tag_str.as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
    }

    /// Finalizes the message and returns the complete encoded bytes.
    ///
    /// This method:
    /// 1. Prepends BeginString (tag 8) and BodyLength (tag 9)
    /// 2. Appends Checksum (tag 10)
    ///
    /// # Returns
    /// The complete FIX message as bytes.
    #[must_use]
    pub fn finish(self) -> BytesMut {
        let body_len = self.body.len();

        // Build header: 8=BeginString|9=BodyLength|
        let mut header = BytesMut::with_capacity(32);
        header.put_slice(b"8=");
        header.put_slice(self.begin_string.as_bytes());
        header.put_u8(SOH);
        header.put_slice(b"9=");

        let mut len_buf = itoa::Buffer::new();
        let len_str = len_buf.format(body_len);
        header.put_slice(len_str.as_bytes());
        header.put_u8(SOH);

        // Combine header and body
        let mut message = BytesMut::with_capacity(header.len() + body_len + 8);
        message.put_slice(&header);
        message.put_slice(&self.body);

        // Calculate and append checksum
        let checksum = calculate_checksum(&message);
        let checksum_bytes = format_checksum(checksum);

        message.put_slice(b"10=");
        message.put_slice(&checksum_bytes);
        message.put_u8(SOH);

        message
    }

    /// Returns the current body length.
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Clears the encoder for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.body.clear();
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new("FIX.4.4")
    }
}

/// Character set used to turn text into wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// UTF-8, the default.
    #[default]
    Utf8,
    /// ISO-8859-1; one byte per character up to U+00FF.
    Latin1,
    /// 7-bit US-ASCII.
    Ascii,
}

impl Charset {
    /// Encodes `text`, borrowing when no transcoding is needed.
    ///
    /// # Errors
    /// Returns `EncodeError::Unencodable` for characters outside the charset.
    pub fn encode<'a>(self, text: &'a str) -> Result<Cow<'a, [u8]>, EncodeError> {
        if self == Self::Utf8 || text.is_ascii() {
            return Ok(Cow::Borrowed(text.as_bytes()));
        }
        let unencodable = |c: char| EncodeError::Unencodable {
            reason: format!("character {c:?} is not representable in {self:?}"),
        };
        match self {
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| unencodable(c)))
                .collect::<Result<Vec<u8>, _>>()
                .map(Cow::Owned),
            _ => Err(text
                .chars()
                .find(|c| !c.is_ascii())
                .map_or_else(|| unencodable('?'), unencodable)),
        }
    }
}

/// Item handed to the transport for writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A message already formatted as tag=value text.
    Text(String),
    /// A message to serialize.
    Message(Message),
}

impl From<String> for Outbound {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Message> for Outbound {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

/// Serializes a message as UTF-8.
///
/// MsgType is written first after BodyLength, then the remaining header,
/// body and trailer fields in insertion order. BodyLength and CheckSum are
/// always computed, never copied from the message.
///
/// # Errors
/// `MissingRequiredField` if BeginString or MsgType is absent,
/// `InvalidFieldValue` if a value contains the SOH delimiter.
pub fn encode_message(message: &Message) -> Result<BytesMut, EncodeError> {
    encode_with_charset(message, Charset::Utf8)
}

fn encode_with_charset(message: &Message, charset: Charset) -> Result<BytesMut, EncodeError> {
    let begin_string = message
        .begin_string()
        .ok_or(EncodeError::MissingRequiredField {
            tag: tags::BEGIN_STRING,
        })?;
    let msg_type = message
        .header()
        .get(tags::MSG_TYPE)
        .filter(|v| !v.is_empty())
        .ok_or(EncodeError::MissingRequiredField { tag: tags::MSG_TYPE })?;

    let mut encoder = Encoder::new(begin_string);
    encoder.put_raw(tags::MSG_TYPE, &charset.encode(msg_type)?);

    let fields = message
        .header()
        .iter()
        .chain(message.body().iter())
        .chain(message.trailer().iter())
        .filter(|(tag, _)| {
            !matches!(
                *tag,
                tags::BEGIN_STRING | tags::BODY_LENGTH | tags::MSG_TYPE | tags::CHECKSUM
            )
        });
    for (tag, value) in fields {
        let bytes = charset.encode(value)?;
        if memchr(SOH, &bytes).is_some() {
            return Err(EncodeError::InvalidFieldValue {
                tag,
                reason: "value contains the SOH delimiter".to_string(),
            });
        }
        encoder.put_raw(tag, &bytes);
    }

    Ok(encoder.finish())
}

/// Stateless outbound encoder bound to a character set.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageEncoder {
    charset: Charset,
}

impl MessageEncoder {
    /// Creates an encoder for the given charset.
    #[must_use]
    pub const fn new(charset: Charset) -> Self {
        Self { charset }
    }

    /// The configured charset.
    #[must_use]
    pub const fn charset(&self) -> Charset {
        self.charset
    }

    /// Encodes an outbound item to wire bytes.
    ///
    /// Text is transcoded as-is; messages are framed with freshly computed
    /// BodyLength and CheckSum.
    ///
    /// # Errors
    /// `Unencodable` if text falls outside the charset, or any error from
    /// [`encode_message`].
    pub fn encode(&self, outbound: &Outbound) -> Result<Bytes, EncodeError> {
        match outbound {
            Outbound::Text(text) => Ok(Bytes::from(self.charset.encode(text)?.into_owned())),
            Outbound::Message(message) => {
                encode_with_charset(message, self.charset).map(BytesMut::freeze)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixwire_core::message::MsgType;

    #[test]
    fn test_encoder_basic() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "0");

        let message = encoder.finish();
        let msg_str = String::from_utf8_lossy(&message);

        assert!(msg_str.starts_with("8=FIX.4.4\x01"));
        assert!(msg_str.contains("35=0\x01"));
        assert!(msg_str.contains("10="));
    }

    #[test]
    fn test_encoder_multiple_fields() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "D");
        encoder.put_str(49, "SENDER");
        encoder.put_str(56, "TARGET");
        encoder.put_uint(34, 1);

        let message = encoder.finish();
        let msg_str = String::from_utf8_lossy(&message);

        assert!(msg_str.contains("35=D\x01"));
        assert!(msg_str.contains("49=SENDER\x01"));
        assert!(msg_str.contains("56=TARGET\x01"));
        assert!(msg_str.contains("34=1\x01"));
    }

    #[test]
    fn test_encoder_bool() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_bool(141, true);
        encoder.put_bool(142, false);

        let message = encoder.finish();
        let msg_str = String::from_utf8_lossy(&message);

        assert!(msg_str.contains("141=Y\x01"));
        assert!(msg_str.contains("142=N\x01"));
    }

    #[test]
    fn test_encoder_clear() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "0");
        assert!(encoder.body_len() > 0);

        encoder.clear();
        assert_eq!(encoder.body_len(), 0);
    }

    fn heartbeat() -> Message {
        let mut msg = Message::new(MsgType::Heartbeat);
        msg.header_mut().set(tags::BEGIN_STRING, "FIX.4.4");
        msg.header_mut().set(tags::SENDER_COMP_ID, "SENDER");
        msg.header_mut().set(tags::TARGET_COMP_ID, "TARGET");
        msg.header_mut().set_u64(tags::MSG_SEQ_NUM, 4);
        msg
    }

    #[test]
    fn test_encode_message_orders_msg_type_first() {
        let bytes = encode_message(&heartbeat()).unwrap();
        let text = String::from_utf8_lossy(&bytes);

        assert!(text.starts_with("8=FIX.4.4\x019="));
        let after_length = &text[text.find("\x0135=").unwrap()..];
        assert!(after_length.starts_with("\x0135=0\x0149=SENDER\x0156=TARGET\x0134=4\x01"));
    }

    #[test]
    fn test_encode_message_parses_back() {
        let mut msg = heartbeat();
        msg.body_mut().set(tags::TEST_REQ_ID, "PING");
        let bytes = encode_message(&msg).unwrap();

        let parsed = crate::decoder::parse_message(&bytes, true).unwrap();
        assert_eq!(parsed.body().get(tags::TEST_REQ_ID), Some("PING"));
        assert_eq!(parsed.msg_seq_num(), Some(4));
    }

    #[test]
    fn test_encode_message_missing_fields() {
        let msg = Message::new(MsgType::Heartbeat);
        assert_eq!(
            encode_message(&msg),
            Err(EncodeError::MissingRequiredField { tag: 8 })
        );

        let mut msg = Message::default();
        msg.header_mut().set(tags::BEGIN_STRING, "FIX.4.4");
        assert_eq!(
            encode_message(&msg),
            Err(EncodeError::MissingRequiredField { tag: 35 })
        );
    }

    #[test]
    fn test_encode_message_rejects_embedded_soh() {
        let mut msg = heartbeat();
        msg.body_mut().set(tags::TEXT, "a\x01b");
        assert!(matches!(
            encode_message(&msg),
            Err(EncodeError::InvalidFieldValue { tag: 58, .. })
        ));
    }

    #[test]
    fn test_message_encoder_text() {
        let encoder = MessageEncoder::default();
        let bytes = encoder
            .encode(&Outbound::Text("8=FIX.4.4\x019=5\x0135=0\x0110=163\x01".into()))
            .unwrap();
        assert_eq!(&bytes[..], b"8=FIX.4.4\x019=5\x0135=0\x0110=163\x01");
    }

    #[test]
    fn test_message_encoder_charsets() {
        let mut msg = heartbeat();
        msg.body_mut().set(tags::TEXT, "caf\u{e9}");

        let utf8 = MessageEncoder::new(Charset::Utf8)
            .encode(&msg.clone().into())
            .unwrap();
        assert!(utf8.windows(2).any(|w| w == [0xC3, 0xA9]));

        let latin1 = MessageEncoder::new(Charset::Latin1)
            .encode(&msg.clone().into())
            .unwrap();
        assert!(latin1.contains(&0xE9));
        assert_eq!(latin1.len() + 1, utf8.len());

        let ascii = MessageEncoder::new(Charset::Ascii).encode(&msg.into());
        assert!(matches!(ascii, Err(EncodeError::Unencodable { .. })));
    }

    #[test]
    fn test_latin1_out_of_range() {
        assert!(matches!(
            Charset::Latin1.encode("\u{20ac}"),
            Err(EncodeError::Unencodable { .. })
        ));
        assert_eq!(Charset::Latin1.encode("abc").unwrap(), Cow::Borrowed(&b"abc"[..]));
    }
}
