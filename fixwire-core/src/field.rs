/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Field types for FIX protocol messages.
//!
//! This module provides:
//! - [`FieldTag`]: Type-safe wrapper for FIX field tag numbers
//! - [`FieldRef`]: Zero-copy reference to a field within a message buffer
//! - [`FieldMap`]: Ordered, owned tag-indexed field container

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// FIX field tag number.
///
/// Tags are positive integers that identify fields within a FIX message.
/// Standard tags are defined in the FIX specification (1-5000 range),
/// while user-defined tags use the 5001+ range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct FieldTag(u32);

impl FieldTag {
    /// Creates a new field tag.
    #[inline]
    #[must_use]
    pub const fn new(tag: u32) -> Self {
        Self(tag)
    }

    /// Returns the raw tag number.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns true if this is a standard FIX tag (1-5000).
    #[inline]
    #[must_use]
    pub const fn is_standard(self) -> bool {
        self.0 >= 1 && self.0 <= 5000
    }

    /// Returns true if this is a user-defined tag (5001+).
    #[inline]
    #[must_use]
    pub const fn is_user_defined(self) -> bool {
        self.0 > 5000
    }
}

impl From<u32> for FieldTag {
    fn from(tag: u32) -> Self {
        Self(tag)
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-copy reference to a field within a FIX message buffer.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    /// The field tag number.
    pub tag: u32,
    /// Reference to the field value bytes (without delimiters).
    pub value: &'a [u8],
}

impl<'a> FieldRef<'a> {
    /// Creates a new field reference.
    #[inline]
    #[must_use]
    pub const fn new(tag: u32, value: &'a [u8]) -> Self {
        Self { tag, value }
    }

    /// Returns the field tag.
    #[inline]
    #[must_use]
    pub const fn tag(&self) -> FieldTag {
        FieldTag(self.tag)
    }

    /// Returns the value as a string slice.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidUtf8` if the value is not valid UTF-8.
    pub fn as_str(&self) -> Result<&'a str, DecodeError> {
        std::str::from_utf8(self.value).map_err(DecodeError::from)
    }

    /// Parses the value as the specified type.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if parsing fails.
    pub fn parse<T: FromStr>(&self) -> Result<T, DecodeError> {
        let s = self.as_str()?;
        parse_value(self.tag, s)
    }

    /// Returns the value as a u64.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not a valid integer.
    pub fn as_u64(&self) -> Result<u64, DecodeError> {
        self.parse()
    }

    /// Returns the raw bytes of the value.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.value
    }
}

fn parse_value<T: FromStr>(tag: u32, s: &str) -> Result<T, DecodeError> {
    s.parse().map_err(|_| DecodeError::InvalidFieldValue {
        tag,
        reason: format!("failed to parse '{}' as {}", s, std::any::type_name::<T>()),
    })
}

/// Ordered tag-indexed field container.
///
/// Keeps fields in insertion order, which is the order they are written on
/// the wire. Setting an existing tag replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: Vec<(u32, String)>,
}

impl FieldMap {
    /// Creates an empty field map.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Sets a field, replacing any existing value for the tag.
    pub fn set(&mut self, tag: u32, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((tag, value)),
        }
    }

    /// Sets an unsigned integer field.
    pub fn set_u64(&mut self, tag: u32, value: u64) {
        self.set(tag, value.to_string());
    }

    /// Sets a boolean field using FIX `Y`/`N`.
    pub fn set_bool(&mut self, tag: u32, value: bool) {
        self.set(tag, if value { "Y" } else { "N" });
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Parses a field value as the requested type.
    ///
    /// # Errors
    /// `MissingRequiredField` if absent, `InvalidFieldValue` if unparseable.
    pub fn get_as<T: FromStr>(&self, tag: u32) -> Result<T, DecodeError> {
        let s = self
            .get(tag)
            .ok_or(DecodeError::MissingRequiredField { tag })?;
        parse_value(tag, s)
    }

    /// Returns a `Y`/`N` field as a boolean, `false` when absent or malformed.
    #[must_use]
    pub fn get_bool(&self, tag: u32) -> bool {
        self.get(tag) == Some("Y")
    }

    /// Returns true if the tag is present.
    #[must_use]
    pub fn contains(&self, tag: u32) -> bool {
        self.fields.iter().any(|(t, _)| *t == tag)
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, tag: u32) -> Option<String> {
        let idx = self.fields.iter().position(|(t, _)| *t == tag)?;
        Some(self.fields.remove(idx).1)
    }

    /// Iterates over `(tag, value)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.fields.iter().map(|(t, v)| (*t, v.as_str()))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_tag() {
        let tag = FieldTag::new(35);
        assert_eq!(tag.value(), 35);
        assert!(tag.is_standard());
        assert!(!tag.is_user_defined());

        let user_tag = FieldTag::new(5001);
        assert!(!user_tag.is_standard());
        assert!(user_tag.is_user_defined());
    }

    #[test]
    fn test_field_ref_as_str() {
        let field = FieldRef::new(11, b"ORDER123");
        assert_eq!(field.as_str().unwrap(), "ORDER123");
    }

    #[test]
    fn test_field_ref_as_u64() {
        let field = FieldRef::new(34, b"12345");
        assert_eq!(field.as_u64().unwrap(), 12345);
        assert!(FieldRef::new(34, b"12x").as_u64().is_err());
    }

    #[test]
    fn test_field_ref_invalid_utf8() {
        let field = FieldRef::new(1, &[0xFF, 0xFE]);
        assert!(field.as_str().is_err());
    }

    #[test]
    fn test_field_map_set_replaces_in_place() {
        let mut map = FieldMap::new();
        map.set(49, "SENDER");
        map.set(56, "TARGET");
        map.set(49, "OTHER");

        let tags: Vec<u32> = map.iter().map(|(t, _)| t).collect();
        assert_eq!(tags, vec![49, 56]);
        assert_eq!(map.get(49), Some("OTHER"));
    }

    #[test]
    fn test_field_map_typed_access() {
        let mut map = FieldMap::new();
        map.set_u64(34, 17);
        map.set_bool(43, true);

        assert_eq!(map.get_as::<u64>(34).unwrap(), 17);
        assert!(map.get_bool(43));
        assert!(!map.get_bool(97));
        assert_eq!(
            map.get_as::<u64>(7),
            Err(DecodeError::MissingRequiredField { tag: 7 })
        );
    }

    #[test]
    fn test_field_map_remove() {
        let mut map = FieldMap::new();
        map.set(58, "text");
        assert_eq!(map.remove(58), Some("text".to_string()));
        assert!(map.is_empty());
        assert_eq!(map.remove(58), None);
    }
}
