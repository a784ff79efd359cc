/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Header value types shared by the session layer.
//!
//! [`Timestamp`] carries SendingTime (52) and OrigSendingTime (122) values,
//! [`CompId`] carries SenderCompID (49) and TargetCompID (56).

use arrayvec::ArrayString;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Longest CompID accepted, in bytes.
pub const COMP_ID_MAX_LEN: usize = 32;

/// Wire pattern of a UTCTimestamp; the fractional part is optional on input.
const UTC_TIMESTAMP: &str = "%Y%m%d-%H:%M:%S%.f";

/// A UTC instant, stored as nanoseconds since the Unix epoch.
///
/// Outbound values are always written with millisecond precision
/// (`YYYYMMDD-HH:MM:SS.sss`); inbound values may carry any precision up to
/// nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().map_or(0, |nanos| nanos.max(0) as u64))
    }

    /// Builds a timestamp from nanoseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Renders the value as a SendingTime field: `YYYYMMDD-HH:MM:SS.sss`.
    #[must_use]
    pub fn format_millis(self) -> ArrayString<21> {
        let at = DateTime::<Utc>::from_timestamp_nanos(self.0 as i64);
        let mut out = ArrayString::new();
        let _ = fmt::write(&mut out, format_args!("{}", at.format("%Y%m%d-%H:%M:%S%.3f")));
        out
    }

    /// Reads a UTCTimestamp field value, `None` when it is malformed or
    /// before the epoch.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let at = NaiveDateTime::parse_from_str(value, UTC_TIMESTAMP).ok()?;
        let nanos = at.and_utc().timestamp_nanos_opt()?;
        u64::try_from(nanos).ok().map(Self)
    }

    /// Distance between two instants regardless of order.
    #[must_use]
    pub const fn abs_diff(self, other: Self) -> Duration {
        Duration::from_nanos(self.0.abs_diff(other.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_millis())
    }
}

/// A SenderCompID or TargetCompID, at most [`COMP_ID_MAX_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompId(ArrayString<COMP_ID_MAX_LEN>);

impl CompId {
    /// Returns `None` when `value` does not fit.
    #[must_use]
    pub fn new(value: &str) -> Option<Self> {
        ArrayString::from(value).ok().map(Self)
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CompId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sending_time_has_millisecond_precision() {
        let at = Timestamp::from_nanos(1_704_164_645_678_901_234);
        assert_eq!(at.format_millis().as_str(), "20240102-03:04:05.678");
        assert_eq!(at.to_string(), "20240102-03:04:05.678");
        assert_eq!(at.as_millis(), 1_704_164_645_678);
        assert_eq!(Timestamp::from_nanos(0).format_millis().as_str(), "19700101-00:00:00.000");
    }

    #[test]
    fn test_parse_accepts_any_fraction() {
        let millis = Timestamp::parse("20240102-03:04:05.678").unwrap();
        assert_eq!(millis.format_millis().as_str(), "20240102-03:04:05.678");

        let whole = Timestamp::parse("20240102-03:04:05").unwrap();
        assert_eq!(millis.abs_diff(whole).as_millis(), 678);
        assert_eq!(whole.abs_diff(millis), millis.abs_diff(whole));

        let nanos = Timestamp::parse("20240102-03:04:05.678901234").unwrap();
        assert_eq!(nanos.as_nanos() - whole.as_nanos(), 678_901_234);
        assert!(nanos > millis);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Timestamp::parse("2024-01-02 03:04:05").is_none());
        assert!(Timestamp::parse("20240102-25:04:05").is_none());
        assert!(Timestamp::parse("19691231-23:59:59").is_none());
        assert!(Timestamp::parse("").is_none());
    }

    #[test]
    fn test_now_round_trips_through_sending_time() {
        let now = Timestamp::now();
        let reread = Timestamp::parse(&now.format_millis()).unwrap();
        assert!(now.abs_diff(reread) < Duration::from_millis(1));
    }

    #[test]
    fn test_comp_id_bounds() {
        let id = CompId::new("SENDER").unwrap();
        assert_eq!(id.as_str(), "SENDER");
        assert_eq!(id.to_string(), "SENDER");
        assert!(CompId::new("").unwrap().is_empty());
        assert!(CompId::new(&"A".repeat(COMP_ID_MAX_LEN)).is_some());
        assert!(CompId::new(&"A".repeat(COMP_ID_MAX_LEN + 1)).is_none());
    }
}
