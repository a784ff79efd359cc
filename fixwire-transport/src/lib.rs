/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixWire Transport
//!
//! Network transport layer for the FixWire FIX engine.
//!
//! This crate provides:
//! - **Codec**: Tokio codec yielding complete FIX frames from a byte stream
//! - **Responder**: Channel-backed writer task with bounded backpressure

pub mod codec;
pub mod responder;

pub use codec::{CodecError, FixCodec};
pub use responder::{ChannelResponder, DEFAULT_DRAIN_TIMEOUT, DEFAULT_QUEUE_DEPTH, WriteMode};
