/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixWire
//!
//! A FIX session engine for Rust.
//!
//! FixWire frames tag=value messages off a byte stream, runs the FIX session
//! protocol (logon, heartbeats, sequence gaps, resends, logout) for each
//! counterparty, and hands application messages to your code.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixwire::prelude::*;
//!
//! let config = SessionConfigBuilder::new()
//!     .sender_comp_id("SERVER")
//!     .target_comp_id("CLIENT")
//!     .build()?;
//! let engine = EngineBuilder::new()
//!     .with_application(Arc::new(MyApplication))
//!     .add_session(config)
//!     .build()
//!     .await?;
//! engine.serve(TcpListener::bind("0.0.0.0:9880").await?).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Messages, fields, identifiers and error types
//! - [`tagvalue`]: Pattern matching, frame decoding and tag=value encoding
//! - [`session`]: Session protocol state machine
//! - [`store`]: Sequence number and outbound message persistence
//! - [`transport`]: Stream codec and connection responder
//! - [`engine`]: Connection tasks, dispatch and the session timer

pub mod core {
    //! Messages, fields, identifiers and error types.
    pub use fixwire_core::*;
}

pub mod tagvalue {
    //! Pattern matching, frame decoding and tag=value encoding.
    pub use fixwire_tagvalue::*;
}

pub mod session {
    //! Session protocol state machine.
    pub use fixwire_session::*;
}

pub mod store {
    //! Sequence number and outbound message persistence.
    pub use fixwire_store::*;
}

pub mod transport {
    //! Stream codec and connection responder.
    pub use fixwire_transport::*;
}

pub mod engine {
    //! Connection tasks, dispatch and the session timer.
    pub use fixwire_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use fixwire_core::{
        CompId, DecodeError, EncodeError, FieldMap, FixError, Message, MsgType, RawMessage,
        Result, SessionError, StoreError, Timestamp,
    };

    // Tag-value encoding
    pub use fixwire_tagvalue::{
        Charset, FrameDecoder, MessageEncoder, Outbound, Pattern, calculate_checksum,
        parse_message,
    };

    // Session
    pub use fixwire_session::{
        Application, ConnectionType, GarbledPolicy, RejectReason, Session, SessionConfig,
        SessionConfigBuilder, SessionId, SessionRegistry, SessionStatus,
    };

    // Store
    pub use fixwire_store::{MemoryStore, MessageStore, MessageStoreFactory};

    // Transport
    pub use fixwire_transport::{CodecError, FixCodec, WriteMode};

    // Engine
    pub use fixwire_engine::{DispatchMode, Engine, EngineBuilder};
}
