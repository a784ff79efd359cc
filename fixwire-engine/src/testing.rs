/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Shared fixtures for engine tests.

use async_trait::async_trait;
use bytes::Bytes;
use fixwire_core::field::FieldMap;
use fixwire_core::message::{Message, MsgType};
use fixwire_core::tags;
use fixwire_core::types::Timestamp;
use fixwire_session::{
    ConnectionType, NoOpApplication, Responder, Session, SessionConfig, SessionConfigBuilder,
};
use fixwire_store::MemoryStore;
use fixwire_tagvalue::{MessageEncoder, Outbound, parse_message};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Responder recording every frame it is given.
#[derive(Debug, Default)]
pub struct MockResponder {
    sent: Mutex<Vec<Bytes>>,
    disconnected: AtomicBool,
}

impl MockResponder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.sent
            .lock()
            .iter()
            .map(|frame| parse_message(frame, true).unwrap())
            .collect()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn send(&self, data: Bytes) -> bool {
        self.sent.lock().push(data);
        true
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    fn remote_address(&self) -> String {
        "127.0.0.1:9999".to_string()
    }
}

/// Acceptor-side config: SERVER talking to `target`.
pub fn server_config(target: &str) -> SessionConfig {
    SessionConfigBuilder::new()
        .begin_string("FIX.4.4")
        .sender_comp_id("SERVER")
        .target_comp_id(target)
        .build()
        .unwrap()
}

pub fn acceptor_session(target: &str) -> Arc<Session> {
    session(server_config(target))
}

pub fn initiator_session(target: &str) -> Arc<Session> {
    let config = SessionConfigBuilder::new()
        .begin_string("FIX.4.4")
        .sender_comp_id("CLIENT")
        .target_comp_id(target)
        .connection_type(ConnectionType::Initiator)
        .build()
        .unwrap();
    session(config)
}

fn session(config: SessionConfig) -> Arc<Session> {
    Arc::new(Session::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(NoOpApplication),
    ))
}

/// Encodes a message from `sender` to SERVER.
pub fn client_message(
    msg_type: MsgType,
    sender: &str,
    seq: u64,
    body: impl FnOnce(&mut FieldMap),
) -> Bytes {
    let mut message = Message::new(msg_type);
    let header = message.header_mut();
    header.set(tags::BEGIN_STRING, "FIX.4.4");
    header.set(tags::SENDER_COMP_ID, sender);
    header.set(tags::TARGET_COMP_ID, "SERVER");
    header.set(tags::MSG_SEQ_NUM, seq.to_string());
    header.set(tags::SENDING_TIME, Timestamp::now().format_millis().as_str());
    body(message.body_mut());
    MessageEncoder::default()
        .encode(&Outbound::Message(message))
        .unwrap()
}
