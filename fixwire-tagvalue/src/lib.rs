/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixWire Tag-Value
//!
//! FIX tag=value framing, parsing and serialization for the FixWire engine.
//!
//! ## Features
//!
//! - **Pattern matching**: literal/wildcard/optional byte templates locating
//!   headers and checksums
//! - **Incremental framing**: a resumable state machine that splits complete
//!   frames off a receive buffer, skipping garbage and malformed lengths
//! - **Zero-copy parsing**: Field values reference the original buffer
//! - **Encoding**: BodyLength and CheckSum computed on write, with a
//!   configurable character set

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod pattern;

pub use checksum::calculate_checksum;
pub use decoder::{Decoder, SOH, parse_message};
pub use encoder::{Charset, Encoder, MessageEncoder, Outbound, encode_message};
pub use fixwire_core::message::RawMessage;
pub use frame::{DecodeStatus, Decodable, DecoderState, FrameDecoder, FrameError};
pub use pattern::Pattern;
