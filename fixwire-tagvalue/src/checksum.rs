/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX checksum calculation.
//!
//! The checksum is the byte sum of everything before the `10=` field,
//! modulo 256, written as three zero-padded decimal digits.

/// Calculates the FIX checksum of `data`.
///
/// # Example
/// ```
/// use fixwire_tagvalue::calculate_checksum;
///
/// let data = b"8=FIX.4.4\x019=5\x0135=0\x01";
/// assert_eq!(calculate_checksum(data), 163);
/// ```
#[inline]
#[must_use]
pub fn calculate_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Formats a checksum as three ASCII digits.
#[inline]
#[must_use]
pub const fn format_checksum(checksum: u8) -> [u8; 3] {
    [
        b'0' + checksum / 100,
        b'0' + (checksum / 10) % 10,
        b'0' + checksum % 10,
    ]
}

/// Parses three ASCII digits into a checksum.
///
/// Returns `None` unless `bytes` is exactly three digits with a value
/// of at most 255.
#[inline]
#[must_use]
pub fn parse_checksum(bytes: &[u8]) -> Option<u8> {
    let [d0, d1, d2] = <[u8; 3]>::try_from(bytes).ok()?;
    if ![d0, d1, d2].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = u32::from(d0 - b'0') * 100 + u32::from(d1 - b'0') * 10 + u32::from(d2 - b'0');
    u8::try_from(value).ok()
}
