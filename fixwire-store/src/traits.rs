/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message store trait definitions.
//!
//! This module defines the abstract interface for message storage
//! implementations and the factory the engine uses to create one store per
//! session identity.

use async_trait::async_trait;
use bytes::Bytes;
use fixwire_core::error::StoreError;
use std::sync::Arc;

/// Abstract interface for FIX message storage.
///
/// Implementations persist outgoing messages to support resend requests, and
/// both sequence numbers so a session can resume after a reconnect.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Stores an outgoing message for potential resend.
    ///
    /// # Arguments
    /// * `seq_num` - The message sequence number
    /// * `message` - The encoded message bytes
    ///
    /// # Errors
    /// Returns `StoreError` if the message cannot be stored.
    async fn store(&self, seq_num: u64, message: Bytes) -> Result<(), StoreError>;

    /// Retrieves stored messages for a resend request, in sequence order.
    ///
    /// Sequence numbers with nothing stored are simply absent from the result.
    ///
    /// # Arguments
    /// * `begin` - Begin sequence number (inclusive)
    /// * `end` - End sequence number (inclusive, or 0 for infinity)
    ///
    /// # Errors
    /// Returns `StoreError::RangeNotAvailable` if `begin > end` with `end != 0`.
    async fn get_range(&self, begin: u64, end: u64) -> Result<Vec<(u64, Bytes)>, StoreError>;

    /// Returns the next sender sequence number.
    fn next_sender_seq(&self) -> u64;

    /// Returns the next expected target sequence number.
    fn next_target_seq(&self) -> u64;

    /// Sets the next sender sequence number.
    fn set_next_sender_seq(&self, seq: u64);

    /// Sets the next expected target sequence number.
    fn set_next_target_seq(&self, seq: u64);

    /// Advances the next sender sequence number by one.
    fn incr_next_sender_seq(&self) {
        self.set_next_sender_seq(self.next_sender_seq() + 1);
    }

    /// Advances the next expected target sequence number by one.
    fn incr_next_target_seq(&self) {
        self.set_next_target_seq(self.next_target_seq() + 1);
    }

    /// Resets the store, clearing all messages and resetting sequence numbers.
    ///
    /// # Errors
    /// Returns `StoreError` if the reset fails.
    async fn reset(&self) -> Result<(), StoreError>;

    /// Returns the creation time of the store/session.
    fn creation_time(&self) -> std::time::SystemTime;

    /// Refreshes the store from persistent storage.
    ///
    /// # Errors
    /// Returns `StoreError` if the refresh fails.
    async fn refresh(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Creates one message store per session.
pub trait MessageStoreFactory: Send + Sync {
    /// Creates the store for the session whose identity displays as `session_key`.
    ///
    /// # Errors
    /// Returns `StoreError` if the backing storage cannot be opened.
    fn create(&self, session_key: &str) -> Result<Arc<dyn MessageStore>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingStore {
        sender: AtomicU64,
        target: AtomicU64,
    }

    #[async_trait]
    impl MessageStore for CountingStore {
        async fn store(&self, _seq_num: u64, _message: Bytes) -> Result<(), StoreError> {
            Ok(())
        }

        async fn get_range(&self, _begin: u64, _end: u64) -> Result<Vec<(u64, Bytes)>, StoreError> {
            Ok(vec![])
        }

        fn next_sender_seq(&self) -> u64 {
            self.sender.load(Ordering::SeqCst)
        }

        fn next_target_seq(&self) -> u64 {
            self.target.load(Ordering::SeqCst)
        }

        fn set_next_sender_seq(&self, seq: u64) {
            self.sender.store(seq, Ordering::SeqCst);
        }

        fn set_next_target_seq(&self, seq: u64) {
            self.target.store(seq, Ordering::SeqCst);
        }

        async fn reset(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn creation_time(&self) -> std::time::SystemTime {
            std::time::SystemTime::now()
        }
    }

    #[tokio::test]
    async fn test_default_increments() {
        let store = CountingStore {
            sender: AtomicU64::new(1),
            target: AtomicU64::new(5),
        };
        store.incr_next_sender_seq();
        store.incr_next_target_seq();

        assert_eq!(store.next_sender_seq(), 2);
        assert_eq!(store.next_target_seq(), 6);
        assert!(store.refresh().await.is_ok());
    }
}
