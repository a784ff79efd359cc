/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Byte pattern matching for frame boundaries.
//!
//! A [`Pattern`] is built from a textual template in which every byte is one
//! of three token kinds:
//! - `?` matches any single byte
//! - a lowercase ASCII letter is optional: it matches itself in either case,
//!   or is skipped entirely
//! - any other byte must match exactly
//!
//! Optional tokens are resolved greedily with a single-step backtrack, which
//! is enough for templates where optional letters are never adjacent.

use memchr::memchr;
use smallvec::SmallVec;

/// Template of the message header: `8=FIX.x.y<SOH>9=` or `8=FIXT.x.y<SOH>9=`.
pub const HEADER_TEMPLATE: &str = "8=FIXt.?.?\x019=";

/// Template of the trailing checksum field.
pub const CHECKSUM_TEMPLATE: &str = "10=???\x01";

/// Template of a MsgType field carrying a Logon, including both delimiters.
pub const LOGON_TEMPLATE: &str = "\x0135=A\x01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(u8),
    Wildcard,
    Optional(u8),
}

impl Token {
    #[inline]
    fn classify(byte: u8) -> Self {
        match byte {
            b'?' => Self::Wildcard,
            b if b.is_ascii_lowercase() => Self::Optional(b),
            b => Self::Literal(b),
        }
    }

    #[inline]
    fn accepts(self, byte: u8) -> bool {
        match self {
            Self::Literal(b) => b == byte,
            Self::Wildcard => true,
            Self::Optional(b) => b.eq_ignore_ascii_case(&byte),
        }
    }
}

/// Immutable byte template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    tokens: SmallVec<[Token; 16]>,
    min_length: usize,
}

impl Pattern {
    /// Builds a pattern from its textual template.
    #[must_use]
    pub fn new(template: &str) -> Self {
        let tokens: SmallVec<[Token; 16]> = template.bytes().map(Token::classify).collect();
        let min_length = tokens
            .iter()
            .filter(|t| !matches!(t, Token::Optional(_)))
            .count();
        Self { tokens, min_length }
    }

    /// The message header pattern.
    #[must_use]
    pub fn header() -> Self {
        Self::new(HEADER_TEMPLATE)
    }

    /// The checksum field pattern.
    #[must_use]
    pub fn checksum() -> Self {
        Self::new(CHECKSUM_TEMPLATE)
    }

    /// The Logon MsgType marker pattern.
    #[must_use]
    pub fn logon() -> Self {
        Self::new(LOGON_TEMPLATE)
    }

    /// Number of non-optional tokens; no match is ever shorter.
    #[inline]
    #[must_use]
    pub const fn min_length(&self) -> usize {
        self.min_length
    }

    /// Template length; no match is ever longer.
    #[inline]
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.tokens.len()
    }

    /// Returns the number of bytes matched if the pattern matches exactly at
    /// `offset`, or `None` otherwise.
    ///
    /// Also returns `None` when fewer than [`min_length`](Self::min_length)
    /// bytes are available at `offset`.
    #[must_use]
    pub fn match_at(&self, buf: &[u8], offset: usize) -> Option<usize> {
        if offset.checked_add(self.min_length)? > buf.len() {
            return None;
        }

        let mut ti = 0;
        let mut bi = offset;
        // Resume point that treats the last consumed optional token as skipped.
        let mut retry: Option<(usize, usize)> = None;

        while ti < self.tokens.len() {
            let token = self.tokens[ti];
            let accepted = bi < buf.len() && token.accepts(buf[bi]);
            match token {
                Token::Optional(_) => {
                    if accepted {
                        retry = Some((ti + 1, bi));
                        bi += 1;
                    }
                    ti += 1;
                }
                _ if accepted => {
                    bi += 1;
                    ti += 1;
                }
                _ => {
                    let (t, b) = retry.take()?;
                    ti = t;
                    bi = b;
                }
            }
        }

        Some(bi - offset)
    }

    /// Scans forward from `start` and returns `(offset, matched_len)` of the
    /// first match.
    ///
    /// `None` means no match in the searched region. Whether that is final or
    /// just a lack of data is for the caller to decide from the number of
    /// bytes remaining versus [`min_length`](Self::min_length).
    #[must_use]
    pub fn find(&self, buf: &[u8], start: usize) -> Option<(usize, usize)> {
        let mut pos = start;
        while pos.checked_add(self.min_length)? <= buf.len() {
            let candidate = match self.tokens.first() {
                Some(Token::Literal(first)) => pos + memchr(*first, &buf[pos..])?,
                Some(_) => pos,
                None => return Some((pos, 0)),
            };
            if let Some(len) = self.match_at(buf, candidate) {
                return Some((candidate, len));
            }
            pos = candidate + 1;
        }
        None
    }
}
