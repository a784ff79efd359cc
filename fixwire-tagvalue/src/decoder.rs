/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Zero-copy FIX message decoder.
//!
//! This module provides a high-performance decoder that parses FIX messages
//! without allocating memory for field values. Field values are returned as
//! references to the original buffer.

use crate::checksum::{calculate_checksum, parse_checksum};
use fixwire_core::error::DecodeError;
use fixwire_core::field::FieldRef;
use fixwire_core::message::{Message, MsgType, RawMessage};
use fixwire_core::tags;
use memchr::memchr;
use smallvec::SmallVec;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// Zero-copy FIX message decoder.
///
/// The decoder parses FIX messages from a byte buffer, extracting fields
/// as references to the original data without copying.
#[derive(Debug)]
pub struct Decoder<'a> {
    /// Input buffer.
    input: &'a [u8],
    /// Current position in the buffer.
    offset: usize,
    /// Whether to validate checksums.
    validate_checksum: bool,
}

impl<'a> Decoder<'a> {
    /// Creates a new decoder for the given input buffer.
    ///
    /// # Arguments
    /// * `input` - The FIX message bytes to decode
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            validate_checksum: true,
        }
    }

    /// Sets whether to validate checksums during decoding.
    ///
    /// # Arguments
    /// * `validate` - Whether to validate checksums
    #[inline]
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Decodes a complete FIX message from the buffer.
    ///
    /// Besides the field layout, this checks that MsgType is the third field,
    /// that the declared BodyLength matches the bytes present and, when
    /// enabled, the checksum.
    ///
    /// # Returns
    /// A `RawMessage` containing zero-copy references to the parsed fields.
    ///
    /// # Errors
    /// Returns `DecodeError` if the message is malformed or incomplete.
    pub fn decode(&mut self) -> Result<RawMessage<'a>, DecodeError> {
        let start_offset = self.offset;

        let begin_string_field = self.next_field().ok_or(DecodeError::Incomplete)?;
        if begin_string_field.tag != tags::BEGIN_STRING {
            return Err(DecodeError::InvalidBeginString);
        }
        let begin_string_start = self.offset_of(begin_string_field.value);
        let begin_string =
            begin_string_start..begin_string_start + begin_string_field.value.len();

        let body_length_field = self.next_field().ok_or(DecodeError::MissingBodyLength)?;
        if body_length_field.tag != tags::BODY_LENGTH {
            return Err(DecodeError::MissingBodyLength);
        }
        let body_length: usize = body_length_field
            .as_str()?
            .parse()
            .map_err(|_| DecodeError::InvalidBodyLength)?;

        let body_start = self.offset;

        let msg_type_field = self.next_field().ok_or(DecodeError::MissingMsgType)?;
        if msg_type_field.tag != tags::MSG_TYPE || msg_type_field.value.is_empty() {
            return Err(DecodeError::MissingMsgType);
        }
        let msg_type = MsgType::parse(msg_type_field.as_str()?);

        let mut fields: SmallVec<[FieldRef<'a>; 32]> = SmallVec::new();
        fields.push(begin_string_field);
        fields.push(body_length_field);
        fields.push(msg_type_field);

        let mut checksum_field: Option<(usize, FieldRef<'a>)> = None;
        loop {
            let field_start = self.offset;
            let Some(field) = self.next_field() else {
                break;
            };
            if field.tag == tags::CHECKSUM {
                checksum_field = Some((field_start, field));
                break;
            }
            fields.push(field);
        }
        let (checksum_start, checksum_ref) = checksum_field.ok_or(DecodeError::Incomplete)?;

        let actual = checksum_start - body_start;
        if actual != body_length {
            return Err(DecodeError::BodyLengthMismatch {
                declared: body_length,
                actual,
            });
        }

        let declared =
            parse_checksum(checksum_ref.value).ok_or_else(|| DecodeError::InvalidFieldValue {
                tag: tags::CHECKSUM,
                reason: "invalid checksum format".to_string(),
            })?;
        if self.validate_checksum {
            let calculated = calculate_checksum(&self.input[start_offset..checksum_start]);
            if calculated != declared {
                return Err(DecodeError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }
        fields.push(checksum_ref);

        Ok(RawMessage::new(
            &self.input[start_offset..self.offset],
            begin_string,
            body_start..checksum_start,
            msg_type,
            fields,
        ))
    }

    #[inline]
    fn offset_of(&self, value: &[u8]) -> usize {
        value.as_ptr() as usize - self.input.as_ptr() as usize
    }

    /// Parses the next field from the buffer.
    ///
    /// # Returns
    /// The next field, or `None` if the buffer is exhausted.
    #[inline]
    pub fn next_field(&mut self) -> Option<FieldRef<'a>> {
        if self.offset >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.offset..];

        // Find '=' delimiter using SIMD-accelerated search
        let eq_pos = memchr(EQUALS, remaining)?;
        let tag_bytes = &remaining[..eq_pos];

        // Parse tag number
        let tag = parse_tag(tag_bytes)?;

        // Find SOH delimiter
        let value_start = eq_pos + 1;
        let soh_pos = memchr(SOH, &remaining[value_start..])?;
        let value = &remaining[value_start..value_start + soh_pos];

        self.offset += value_start + soh_pos + 1;

        Some(FieldRef::new(tag, value))
    }

    /// Returns the current offset in the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the remaining bytes in the buffer.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.offset..]
    }

    /// Returns true if the buffer has been fully consumed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.input.len()
    }

    /// Resets the decoder to the beginning of the buffer.
    #[inline]
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

/// Parses a tag number from ASCII bytes.
///
/// # Arguments
/// * `bytes` - The ASCII bytes representing the tag number
///
/// # Returns
/// The parsed tag number, or `None` if invalid.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }

    let mut result: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add((b - b'0') as u32)?;
    }

    Some(result)
}

/// Parses one framed message into an owned [`Message`].
///
/// # Errors
/// Returns the first structural problem found; see [`Decoder::decode`].
pub fn parse_message(frame: &[u8], validate_checksum: bool) -> Result<Message, DecodeError> {
    Decoder::new(frame)
        .with_checksum_validation(validate_checksum)
        .decode()?
        .to_message()
}
