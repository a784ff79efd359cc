/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Sequence number bookkeeping.
//!
//! Classifies inbound MsgSeqNum values, tracks the outstanding
//! ResendRequest range, and holds messages that arrived ahead of a gap.

use fixwire_core::message::Message;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Relation of a received MsgSeqNum to the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// The message is the next one expected.
    Expected,
    /// Messages are missing before this one.
    TooHigh,
    /// The message was already seen.
    TooLow,
}

impl SequenceCheck {
    /// Classifies `received` against `expected`.
    #[inline]
    #[must_use]
    pub fn of(expected: u64, received: u64) -> Self {
        match received.cmp(&expected) {
            Ordering::Equal => Self::Expected,
            Ordering::Greater => Self::TooHigh,
            Ordering::Less => Self::TooLow,
        }
    }
}

/// A requested resend range. `end == 0` means "through infinity".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendRange {
    /// First sequence number requested.
    pub begin: u64,
    /// Last sequence number requested, or 0 for open-ended.
    pub end: u64,
}

impl ResendRange {
    /// Creates a new resend range.
    #[must_use]
    pub const fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    /// Returns true if `seq` falls inside the range.
    #[must_use]
    pub const fn covers(&self, seq: u64) -> bool {
        seq >= self.begin && (self.end == 0 || seq <= self.end)
    }

    /// Returns true if the range is open-ended.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.end == 0
    }
}

/// Messages received ahead of a sequence gap, keyed by MsgSeqNum.
#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: BTreeMap<u64, Message>,
}

impl MessageQueue {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: BTreeMap::new(),
        }
    }

    /// Queues a message; a later copy of the same seq replaces the earlier one.
    pub fn enqueue(&mut self, seq: u64, message: Message) {
        self.messages.insert(seq, message);
    }

    /// Removes and returns the message at `seq`, discarding anything older.
    pub fn take(&mut self, seq: u64) -> Option<Message> {
        while let Some(entry) = self.messages.first_entry() {
            match entry.key().cmp(&seq) {
                Ordering::Less => {
                    entry.remove();
                }
                Ordering::Equal => return Some(entry.remove()),
                Ordering::Greater => return None,
            }
        }
        None
    }

    /// Lowest queued sequence number.
    #[must_use]
    pub fn lowest(&self) -> Option<u64> {
        self.messages.keys().next().copied()
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drops every queued message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
