/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixWire Store
//!
//! Message persistence and storage for the FixWire FIX protocol engine.
//!
//! This crate provides:
//! - **MessageStore trait**: Abstract interface for message and sequence storage
//! - **MessageStoreFactory trait**: One store per session identity
//! - **MemoryStore**: In-memory message store for testing and simple use cases

pub mod memory;
pub mod traits;

pub use memory::{MemoryStore, MemoryStoreFactory};
pub use traits::{MessageStore, MessageStoreFactory};
