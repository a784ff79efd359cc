/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Outbound side of a bound connection.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Writes encoded frames to the counterparty of a bound session.
///
/// Implemented by the transport layer; a session holds at most one.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Queues `data` for writing. Returns false if the bytes were refused.
    async fn send(&self, data: Bytes) -> bool;

    /// Closes the connection once already queued bytes have been written.
    fn disconnect(&self);

    /// The counterparty address, for logging.
    fn remote_address(&self) -> String;
}

/// Returns true if both handles refer to the same responder.
#[must_use]
pub fn same_responder(a: &Arc<dyn Responder>, b: &Arc<dyn Responder>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use fixwire_core::message::Message;
    use fixwire_tagvalue::parse_message;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Responder that records every frame it is given.
    #[derive(Debug, Default)]
    pub struct MockResponder {
        sent: Mutex<Vec<Bytes>>,
        disconnected: AtomicBool,
        refuse: AtomicBool,
    }

    impl MockResponder {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn refuse_writes(&self) {
            self.refuse.store(true, Ordering::SeqCst);
        }

        pub fn is_disconnected(&self) -> bool {
            self.disconnected.load(Ordering::SeqCst)
        }

        pub fn messages(&self) -> Vec<Message> {
            self.sent
                .lock()
                .iter()
                .map(|frame| parse_message(frame, true).unwrap())
                .collect()
        }

        pub fn take(&self) -> Vec<Message> {
            let out = self.messages();
            self.sent.lock().clear();
            out
        }
    }

    #[async_trait]
    impl Responder for MockResponder {
        async fn send(&self, data: Bytes) -> bool {
            if self.refuse.load(Ordering::SeqCst) {
                return false;
            }
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
}
