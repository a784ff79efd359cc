/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixWire Core
//!
//! Core types and error definitions for the FixWire FIX protocol engine.
//!
//! This crate provides the fundamental building blocks used across all FixWire crates:
//! - **Error types**: Unified error handling with `thiserror`
//! - **Field types**: `FieldTag`, `FieldRef`, and the ordered `FieldMap`
//! - **Message types**: `MsgType`, the zero-copy `RawMessage`, and the owned `Message`
//! - **Core types**: `Timestamp`, `CompId`
//! - **Tags**: the session-level tag numbers and header/trailer classification
//!
//! ## Zero-Copy Design
//!
//! Parsing produces borrowed views over the receive buffer; the session layer
//! converts them into owned [`Message`] values for storage and cross-task transfer.

pub mod error;
pub mod field;
pub mod message;
pub mod tags;
pub mod types;

pub use error::{DecodeError, EncodeError, FixError, Result, SessionError, StoreError};
pub use field::{FieldMap, FieldRef, FieldTag};
pub use message::{Message, MsgType, RawMessage};
pub use types::{CompId, Timestamp};
