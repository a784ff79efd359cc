/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixWire Engine
//!
//! Runtime tying sessions to connections.
//!
//! This crate provides:
//! - **Engine**: accepts or binds connections and resolves their sessions
//! - **Dispatcher**: hands inbound messages to per-session or shared workers
//! - **Session timer**: drives heartbeats, test requests and timeouts
//! - **Builder API**: fluent configuration for engine setup

pub mod builder;
pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod timer;

#[cfg(test)]
mod testing;

pub use builder::EngineBuilder;
pub use connection::ConnectionSettings;
pub use dispatcher::{
    DEFAULT_DISPATCH_QUEUE_DEPTH, DEFAULT_POLL_INTERVAL, DispatchMode, Dispatcher, Work,
};
pub use engine::Engine;
pub use timer::{DEFAULT_TIMER_INTERVAL, SessionTimer};
