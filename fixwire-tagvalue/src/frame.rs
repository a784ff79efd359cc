/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Incremental FIX frame decoder.
//!
//! [`FrameDecoder`] finds message boundaries in a byte stream that may arrive
//! fragmented, may carry garbage between messages, and may contain messages
//! whose BodyLength is wrong. It works directly on the connection's receive
//! buffer and splits off each complete frame as [`Bytes`].
//!
//! The decoder only removes bytes it has committed to: the emitted frame, any
//! garbage in front of it, and the leading bytes of a skipped malformed
//! candidate. Anything else stays in the buffer so the next call, with more
//! bytes appended, picks up exactly where this one stopped. Skipped bytes
//! count against the garbage tolerance until the next frame is emitted.

use crate::decoder::SOH;
use crate::pattern::Pattern;
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of undecodable bytes tolerated before giving up.
pub const DEFAULT_MAX_UNDECODED: usize = 4096;

/// Default upper bound on a declared BodyLength.
pub const DEFAULT_MAX_BODY_LENGTH: usize = 1024 * 1024;

/// Framing errors the caller must act on by disconnecting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A Logon could not be framed; it cannot be trusted to delimit the
    /// traffic that follows it.
    #[error("corrupt logon frame at offset {offset}")]
    CorruptLogon {
        /// Offset of the frame's header within the receive buffer.
        offset: usize,
    },

    /// No header was found within the garbage tolerance.
    #[error("no message header within {size} undecoded bytes (limit {limit})")]
    GarbageOverflow {
        /// Bytes buffered without a header.
        size: usize,
        /// Configured tolerance.
        limit: usize,
    },
}

/// Decoder state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    /// Looking for `8=FIX...<SOH>9=`.
    #[default]
    SeekingHeader,
    /// Accumulating BodyLength digits.
    ParsingLength,
    /// Waiting for BodyLength bytes of body.
    ReadingBody,
    /// Expecting `10=NNN<SOH>` at the current position.
    ParsingChecksum,
}

/// Answer to "is there anything to decode in this buffer?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decodable {
    /// A header was found, or a frame is already in progress.
    Ok,
    /// Nothing yet, but still within the garbage tolerance.
    NeedData,
    /// Garbage tolerance exceeded; the connection is corrupt.
    NotOk,
}

/// Result of a decode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// At least one frame was emitted.
    Ok,
    /// No complete frame yet.
    NeedData,
}

/// Why a candidate frame was abandoned.
#[derive(Debug, Clone, Copy)]
enum Malformation {
    LengthFormat(u8),
    LengthOverflow,
    ChecksumMisplaced,
    ChecksumMissing,
}

/// Per-connection incremental frame decoder.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    state: DecoderState,
    body_length: usize,
    /// Scan position, relative to the start of the receive buffer.
    position: usize,
    /// Offset of the current candidate's `8=`.
    header_start: usize,
    /// Offset of the first body byte, just past the BodyLength delimiter.
    body_start: usize,
    /// Bytes discarded by recoveries since the last emitted frame.
    skipped: usize,
    recoveries: u64,
    header: Pattern,
    checksum: Pattern,
    logon: Pattern,
    max_undecoded: usize,
    max_body_length: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Creates a decoder with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DecoderState::SeekingHeader,
            body_length: 0,
            position: 0,
            header_start: 0,
            body_start: 0,
            skipped: 0,
            recoveries: 0,
            header: Pattern::header(),
            checksum: Pattern::checksum(),
            logon: Pattern::logon(),
            max_undecoded: DEFAULT_MAX_UNDECODED,
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
        }
    }

    /// Sets the garbage tolerance used by [`decodable`](Self::decodable).
    #[must_use]
    pub const fn with_max_undecoded(mut self, max: usize) -> Self {
        self.max_undecoded = max;
        self
    }

    /// Sets the largest BodyLength accepted before treating the length as
    /// malformed.
    #[must_use]
    pub const fn with_max_body_length(mut self, max: usize) -> Self {
        self.max_body_length = max;
        self
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> DecoderState {
        self.state
    }

    /// Current scan position within the receive buffer.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// BodyLength accumulated so far for the current candidate.
    #[inline]
    #[must_use]
    pub const fn body_length(&self) -> usize {
        self.body_length
    }

    /// Number of malformed candidates skipped since creation.
    #[inline]
    #[must_use]
    pub const fn recoveries(&self) -> u64 {
        self.recoveries
    }

    /// Bytes discarded from skipped candidates since the last emitted frame.
    #[inline]
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// Garbage tolerance.
    #[inline]
    #[must_use]
    pub const fn max_undecoded(&self) -> usize {
        self.max_undecoded
    }

    /// Returns to `SeekingHeader` at the start of the buffer.
    pub fn reset(&mut self) {
        self.state = DecoderState::SeekingHeader;
        self.body_length = 0;
        self.position = 0;
        self.header_start = 0;
        self.body_start = 0;
        self.skipped = 0;
    }

    /// Reports whether `buf` holds something worth decoding.
    ///
    /// Bytes already skipped since the last emitted frame count toward the
    /// tolerance, so a stream of malformed candidates is cut off as well.
    #[must_use]
    pub fn decodable(&self, buf: &[u8]) -> Decodable {
        if self.skipped > self.max_undecoded {
            Decodable::NotOk
        } else if self.state != DecoderState::SeekingHeader
            || self.header.find(buf, self.position).is_some()
        {
            Decodable::Ok
        } else if self.skipped + buf.len() <= self.max_undecoded {
            Decodable::NeedData
        } else {
            Decodable::NotOk
        }
    }

    /// Runs the state machine over `buf`, calling `emit` with every complete
    /// frame in order.
    ///
    /// Emitted frames, and garbage in front of them, are split off the front
    /// of `buf`. Malformed candidates are logged and skipped.
    ///
    /// # Errors
    /// Returns [`FrameError::CorruptLogon`] when a Logon cannot be framed.
    /// The decoder is reset; the caller must drop the connection.
    pub fn decode<F>(&mut self, buf: &mut BytesMut, mut emit: F) -> Result<DecodeStatus, FrameError>
    where
        F: FnMut(Bytes),
    {
        let mut emitted = 0usize;
        if self.position > buf.len() {
            self.reset();
        }

        loop {
            match self.state {
                DecoderState::SeekingHeader => {
                    let Some((start, len)) = self.header.find(buf, self.position) else {
                        self.settle_scan(buf);
                        break;
                    };
                    self.header_start = start;
                    self.position = start + len;
                    self.body_length = 0;
                    self.state = DecoderState::ParsingLength;
                }
                DecoderState::ParsingLength => {
                    let Some(&byte) = buf.get(self.position) else {
                        break;
                    };
                    if byte.is_ascii_digit() {
                        let length = self
                            .body_length
                            .checked_mul(10)
                            .and_then(|l| l.checked_add(usize::from(byte - b'0')))
                            .filter(|&l| l <= self.max_body_length);
                        match length {
                            Some(l) => {
                                self.body_length = l;
                                self.position += 1;
                            }
                            None => self.recover(buf, Malformation::LengthOverflow),
                        }
                    } else if byte == SOH && buf[self.position - 1] != b'=' {
                        self.position += 1;
                        self.body_start = self.position;
                        self.state = DecoderState::ReadingBody;
                    } else {
                        self.recover(buf, Malformation::LengthFormat(byte));
                    }
                }
                DecoderState::ReadingBody => {
                    if buf.len() - self.position < self.body_length {
                        break;
                    }
                    self.position += self.body_length;
                    self.state = DecoderState::ParsingChecksum;
                }
                DecoderState::ParsingChecksum => {
                    match self.checksum.match_at(buf, self.position) {
                        Some(len) if buf[self.position - 1] == SOH => {
                            let end = self.position + len;
                            let mut consumed = buf.split_to(end);
                            let frame = consumed.split_off(self.header_start).freeze();
                            if self.header_start > 0 {
                                debug!(skipped = self.header_start, "discarded bytes before frame");
                            }
                            self.reset();
                            emitted += 1;
                            emit(frame);
                        }
                        Some(_) => self.fail_frame(buf, Malformation::ChecksumMisplaced)?,
                        None if buf.len() - self.position >= self.checksum.min_length() => {
                            self.fail_frame(buf, Malformation::ChecksumMissing)?;
                        }
                        None => break,
                    }
                }
            }
        }

        Ok(if emitted > 0 {
            DecodeStatus::Ok
        } else {
            DecodeStatus::NeedData
        })
    }

    /// After a fruitless header scan, skips offsets that already had a full
    /// template's worth of bytes behind them.
    fn settle_scan(&mut self, buf: &[u8]) {
        let settled = buf.len().saturating_sub(self.header.max_length() - 1);
        self.position = self.position.max(settled);
    }

    /// Framing failure after the body was read: fatal for a Logon,
    /// recoverable otherwise.
    fn fail_frame(&mut self, buf: &mut BytesMut, cause: Malformation) -> Result<(), FrameError> {
        let marker_at = self.body_start.saturating_sub(1);
        if self.logon.match_at(&buf[..], marker_at).is_some() {
            let offset = self.header_start;
            warn!(offset, ?cause, "corrupt logon frame");
            self.reset();
            return Err(FrameError::CorruptLogon { offset });
        }
        self.recover(buf, cause);
        Ok(())
    }

    /// Abandons the current candidate and resumes the header search one byte
    /// past its start. Everything up to that point is discarded.
    fn recover(&mut self, buf: &mut BytesMut, cause: Malformation) {
        self.recoveries += 1;
        warn!(
            offset = self.header_start,
            body_length = self.body_length,
            ?cause,
            "malformed frame skipped"
        );
        let resume = self.header_start + 1;
        buf.advance(resume);
        self.skipped = self.skipped.saturating_add(resume);
        self.position = 0;
        self.header_start = 0;
        self.body_start = 0;
        self.body_length = 0;
        self.state = DecoderState::SeekingHeader;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use proptest::prelude::*;

    fn message(msg_type: &str, seq: u64, text: &str) -> Vec<u8> {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, msg_type);
        encoder.put_uint(34, seq);
        encoder.put_str(49, "SENDER");
        encoder.put_str(56, "TARGET");
        if !text.is_empty() {
            encoder.put_str(58, text);
        }
        encoder.finish().to_vec()
    }

    /// Rewrites the BodyLength of an encoded message by `delta`.
    fn with_body_length_delta(msg: &[u8], delta: isize) -> Vec<u8> {
        let text = std::str::from_utf8(msg).unwrap();
        let start = text.find("\x019=").unwrap() + 3;
        let end = start + text[start..].find('\x01').unwrap();
        let declared: isize = text[start..end].parse().unwrap();
        let mut out = Vec::new();
        out.extend_from_slice(&msg[..start]);
        out.extend_from_slice((declared + delta).to_string().as_bytes());
        out.extend_from_slice(&msg[end..]);
        out
    }

    fn decode_all(decoder: &mut FrameDecoder, buf: &mut BytesMut) -> Result<Vec<Bytes>, FrameError> {
        let mut frames = Vec::new();
        decoder.decode(buf, |frame| frames.push(frame))?;
        Ok(frames)
    }

    #[test]
    fn test_single_message_round_trip() {
        let msg = message("0", 1, "");
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&msg[..]);

        let frames = decode_all(&mut decoder, &mut buf).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &msg[..]);
        assert!(buf.is_empty());
        assert_eq!(decoder.state(), DecoderState::SeekingHeader);
        assert_eq!(decoder.position(), 0);
    }

    #[test]
    fn test_fixt_header() {
        let mut encoder = Encoder::new("FIXT.1.1");
        encoder.put_str(35, "0");
        let msg = encoder.finish();
        let mut buf = BytesMut::from(&msg[..]);

        let frames = decode_all(&mut FrameDecoder::new(), &mut buf).unwrap();
        assert_eq!(frames, vec![msg.freeze()]);
    }

    #[test]
    fn test_every_split_point() {
        let msg = message("D", 7, "split me");
        for k in 1..msg.len() {
            let mut decoder = FrameDecoder::new();
            let mut buf = BytesMut::from(&msg[..k]);

            let status = decoder.decode(&mut buf, |_| panic!("emitted early at {k}"));
            assert_eq!(status, Ok(DecodeStatus::NeedData), "split at {k}");

            buf.extend_from_slice(&msg[k..]);
            let frames = decode_all(&mut decoder, &mut buf).unwrap();
            assert_eq!(frames.len(), 1, "split at {k}");
            assert_eq!(&frames[0][..], &msg[..]);
        }
    }

    #[test]
    fn test_garbage_before_message_is_discarded() {
        let msg = message("0", 2, "");
        let mut buf = BytesMut::from(&b"\x00\xffnoise8=FIX 10=abc\x01"[..]);
        buf.extend_from_slice(&msg);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &mut buf).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &msg[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_messages_in_order() {
        let msgs: Vec<Vec<u8>> = (1..=5).map(|i| message("D", i, "order")).collect();
        let mut buf = BytesMut::new();
        for m in &msgs {
            buf.extend_from_slice(m);
        }

        let frames = decode_all(&mut FrameDecoder::new(), &mut buf).unwrap();

        assert_eq!(frames.len(), 5);
        for (frame, msg) in frames.iter().zip(&msgs) {
            assert_eq!(&frame[..], &msg[..]);
        }
    }

    #[test]
    fn test_body_length_too_short_recovers() {
        let bad = with_body_length_delta(&message("D", 1, "first"), -4);
        let good = message("D", 2, "second");
        let mut buf = BytesMut::from(&bad[..]);
        buf.extend_from_slice(&good);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &mut buf).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &good[..]);
        assert!(decoder.recoveries() >= 1);
    }

    #[test]
    fn test_body_length_too_long_recovers() {
        // The overshoot lands inside the following message.
        let bad = with_body_length_delta(&message("D", 1, "first"), 12);
        let good = message("D", 2, "second");
        let mut buf = BytesMut::from(&bad[..]);
        buf.extend_from_slice(&good);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &mut buf).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &good[..]);
        assert_eq!(decoder.recoveries(), 1);
    }

    #[test]
    fn test_body_length_too_long_waits_for_data() {
        let bad = with_body_length_delta(&message("D", 1, "first"), 12);
        let mut buf = BytesMut::from(&bad[..]);

        let mut decoder = FrameDecoder::new();
        assert!(decode_all(&mut decoder, &mut buf).unwrap().is_empty());
        assert_eq!(decoder.state(), DecoderState::ReadingBody);
        assert_eq!(buf.len(), bad.len());
    }

    #[test]
    fn test_checksum_embedded_in_body_recovers() {
        let msg = message("D", 1, "ab10=123");
        let text = std::str::from_utf8(&msg).unwrap();
        // Shrink BodyLength so the scan lands on the `10=123` inside tag 58.
        let cut = text.len() - text.find("10=123").unwrap();
        let bad = with_body_length_delta(&msg, -(cut as isize - 7));
        let good = message("0", 2, "");
        let mut buf = BytesMut::from(&bad[..]);
        buf.extend_from_slice(&good);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &mut buf).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &good[..]);
        assert_eq!(decoder.recoveries(), 1);
    }

    #[test]
    fn test_corrupt_logon_is_fatal() {
        let bad = with_body_length_delta(&message("A", 1, ""), -3);
        let mut buf = BytesMut::from(&bad[..]);
        buf.extend_from_slice(&message("0", 2, ""));

        let mut decoder = FrameDecoder::new();
        let result = decode_all(&mut decoder, &mut buf);

        assert_eq!(result, Err(FrameError::CorruptLogon { offset: 0 }));
        assert_eq!(decoder.state(), DecoderState::SeekingHeader);
        assert_eq!(decoder.position(), 0);
    }

    #[test]
    fn test_length_format_error_recovers() {
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=1x\x01"[..]);
        let good = message("0", 3, "");
        buf.extend_from_slice(&good);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &mut buf).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &good[..]);
        assert_eq!(decoder.recoveries(), 1);
    }

    #[test]
    fn test_empty_length_is_malformed() {
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=\x0135=0\x0110=000\x01"[..]);
        let mut decoder = FrameDecoder::new();
        assert!(decode_all(&mut decoder, &mut buf).unwrap().is_empty());
        assert_eq!(decoder.recoveries(), 1);
    }

    #[test]
    fn test_oversized_length_is_malformed() {
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=99999\x01"[..]);
        let mut decoder = FrameDecoder::new().with_max_body_length(1000);
        assert!(decode_all(&mut decoder, &mut buf).unwrap().is_empty());
        assert_eq!(decoder.recoveries(), 1);
        assert_eq!(decoder.state(), DecoderState::SeekingHeader);
    }

    #[test]
    fn test_pathological_fragments_terminate() {
        let mut buf = BytesMut::new();
        for _ in 0..500 {
            buf.extend_from_slice(b"8=FIX.4.4\x019=0");
        }
        let mut decoder = FrameDecoder::new();
        let status = decoder.decode(&mut buf, |_| panic!("nothing is valid"));

        assert_eq!(status, Ok(DecodeStatus::NeedData));
        assert_eq!(decoder.recoveries(), 499);
        // only the last two candidates' bytes are still buffered
        assert_eq!(buf.len(), 25);
        assert_eq!(decoder.skipped(), 500 * 13 - 25);
        assert_eq!(decoder.decodable(&buf), Decodable::NotOk);
    }

    #[test]
    fn test_fragments_across_calls_stay_bounded() {
        let mut decoder = FrameDecoder::new().with_max_undecoded(256);
        let mut buf = BytesMut::new();
        let mut calls = 0;
        while decoder.decodable(&buf) != Decodable::NotOk {
            buf.extend_from_slice(b"8=FIX.4.4\x019=0");
            decoder.decode(&mut buf, |_| panic!("nothing is valid")).unwrap();
            assert!(buf.len() <= 26, "buffered {} bytes", buf.len());
            calls += 1;
            assert!(calls < 100, "garbage tolerance never exhausted");
        }
        assert!(decoder.skipped() > 256);
    }

    #[test]
    fn test_emitted_frame_clears_skipped() {
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=1x\x01"[..]);
        buf.extend_from_slice(&message("0", 1, ""));
        let mut decoder = FrameDecoder::new();

        let frames = decode_all(&mut decoder, &mut buf).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(decoder.recoveries(), 1);
        assert_eq!(decoder.skipped(), 0);
    }

    #[test]
    fn test_decodable() {
        let decoder = FrameDecoder::new().with_max_undecoded(64);

        assert_eq!(decoder.decodable(b"junk"), Decodable::NeedData);
        assert_eq!(decoder.decodable(&[b'x'; 64]), Decodable::NeedData);
        assert_eq!(decoder.decodable(&[b'x'; 65]), Decodable::NotOk);
        assert_eq!(decoder.decodable(&message("0", 1, "")), Decodable::Ok);
    }

    #[test]
    fn test_decodable_in_progress() {
        let msg = message("0", 1, "");
        let mut buf = BytesMut::from(&msg[..20]);
        let mut decoder = FrameDecoder::new().with_max_undecoded(8);
        decode_all(&mut decoder, &mut buf).unwrap();

        assert_ne!(decoder.state(), DecoderState::SeekingHeader);
        assert_eq!(decoder.decodable(&buf), Decodable::Ok);
    }

    #[test]
    fn test_garbage_scan_position_advances() {
        let mut buf = BytesMut::from(&[b'z'; 100][..]);
        let mut decoder = FrameDecoder::new();
        decode_all(&mut decoder, &mut buf).unwrap();
        assert_eq!(decoder.position(), 100 - 12);

        // A header split across calls is still found.
        buf.extend_from_slice(b"8=FIX.4.");
        decode_all(&mut decoder, &mut buf).unwrap();
        let msg = message("0", 1, "");
        buf.extend_from_slice(&msg[8..]);
        let frames = decode_all(&mut decoder, &mut buf).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &msg[..]);
    }

    proptest! {
        #[test]
        fn prop_split_invariance(text in "[a-zA-Z0-9 ]{0,40}", seq in 1u64..1_000_000, split in any::<prop::sample::Index>()) {
            let msg = message("D", seq, &text);
            let k = 1 + split.index(msg.len() - 1);
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::new();

            let mut buf = BytesMut::from(&msg[..k]);
            decoder.decode(&mut buf, |f| frames.push(f)).unwrap();
            buf.extend_from_slice(&msg[k..]);
            decoder.decode(&mut buf, |f| frames.push(f)).unwrap();

            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(&frames[0][..], &msg[..]);
        }

        #[test]
        fn prop_garbage_skip(garbage in prop::collection::vec(any::<u8>().prop_filter("no header start", |b| *b != b'8'), 0..200)) {
            let msg = message("0", 1, "");
            let mut buf = BytesMut::from(&garbage[..]);
            buf.extend_from_slice(&msg);
            let mut frames = Vec::new();

            FrameDecoder::new().decode(&mut buf, |f| frames.push(f)).unwrap();

            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(&frames[0][..], &msg[..]);
            prop_assert!(buf.is_empty());
        }
    }
}
