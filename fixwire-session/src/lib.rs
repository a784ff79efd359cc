/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixWire Session
//!
//! FIX session layer for the FixWire engine.
//!
//! This crate provides:
//! - **Session**: Protocol engine for Logon/Logout, sequencing and recovery
//! - **State**: Per-identity runtime record with a derived status
//! - **Heartbeat handling**: Heartbeat/TestRequest liveness
//! - **Registry**: Injectable map of identities to sessions
//! - **Providers**: Static and template-driven session resolution
//! - **Configuration**: Session configuration options

pub mod admin;
pub mod application;
pub mod config;
pub mod heartbeat;
pub mod id;
pub mod provider;
pub mod registry;
pub mod responder;
pub mod sequence;
pub mod session;
pub mod state;

pub use application::{Application, NoOpApplication, RejectReason};
pub use config::{ConnectionType, GarbledPolicy, SessionConfig, SessionConfigBuilder};
pub use heartbeat::HeartbeatManager;
pub use id::SessionId;
pub use provider::{DynamicSessionProvider, SessionProvider, StaticSessionProvider};
pub use registry::SessionRegistry;
pub use responder::Responder;
pub use sequence::{MessageQueue, ResendRange, SequenceCheck};
pub use session::{Inbound, Session};
pub use state::{SessionState, SessionStatus};
