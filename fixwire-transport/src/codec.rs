/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tokio codec for FIX message framing.
//!
//! Wraps the incremental [`FrameDecoder`] so a connection can be read with
//! `FramedRead`. Malformed candidates are skipped inside the decoder; only
//! fatal framing conditions surface as errors.

use bytes::{BufMut, Bytes, BytesMut};
use fixwire_core::error::EncodeError;
use fixwire_tagvalue::{Decodable, FrameDecoder, FrameError};
use std::collections::VecDeque;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Errors that can occur during codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Fatal framing condition; the connection must be dropped.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// Outbound message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tokio codec yielding one complete FIX frame per item.
#[derive(Debug, Clone, Default)]
pub struct FixCodec {
    decoder: FrameDecoder,
    ready: VecDeque<Bytes>,
}

impl FixCodec {
    /// Creates a new codec with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many bytes without a message header are tolerated before
    /// the stream is declared corrupt.
    #[must_use]
    pub fn with_max_undecoded(mut self, max: usize) -> Self {
        self.decoder = self.decoder.with_max_undecoded(max);
        self
    }

    /// Sets the largest BodyLength accepted.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.decoder = self.decoder.with_max_body_length(size);
        self
    }

    /// The wrapped frame decoder.
    #[must_use]
    pub const fn frame_decoder(&self) -> &FrameDecoder {
        &self.decoder
    }
}

impl Decoder for FixCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.ready.pop_front() {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let ready = &mut self.ready;
        self.decoder.decode(src, |frame| ready.push_back(frame))?;
        if let Some(frame) = self.ready.pop_front() {
            return Ok(Some(frame));
        }

        match self.decoder.decodable(src) {
            Decodable::NotOk => Err(FrameError::GarbageOverflow {
                size: self.decoder.skipped() + src.len(),
                limit: self.decoder.max_undecoded(),
            }
            .into()),
            Decodable::Ok | Decodable::NeedData => Ok(None),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    debug!(remaining = buf.len(), "discarding partial frame at end of stream");
                    buf.clear();
                    self.decoder.reset();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}
