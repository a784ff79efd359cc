/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Runtime state of a FIX session.
//!
//! [`SessionState`] is plain data plus derived queries. Everything that
//! changes it is crate-private, so only the protocol engine in
//! [`crate::session`] moves sequence numbers or flips logon flags.
//! Sequence numbers live in the [`MessageStore`] and every change is
//! written straight through to it.

use crate::heartbeat::HeartbeatManager;
use crate::responder::Responder;
use crate::sequence::{MessageQueue, ResendRange};
use fixwire_core::error::StoreError;
use fixwire_store::MessageStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Derived session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionStatus {
    /// No connection is bound.
    #[default]
    Disconnected,
    /// A Logout was sent or received and the exchange is not finished.
    LogoutInProgress,
    /// Logon was both sent and received.
    LoggedOn,
    /// Initiator sent Logon and is waiting for the answer.
    LogonInProgress,
    /// Connected, but no Logon exchange has happened.
    NotLoggedOn,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::LogoutInProgress => write!(f, "LOGOUT_IN_PROGRESS"),
            Self::LoggedOn => write!(f, "LOGGED_ON"),
            Self::LogonInProgress => write!(f, "LOGON_IN_PROGRESS"),
            Self::NotLoggedOn => write!(f, "NOT_LOGGED_ON"),
        }
    }
}

/// Mutable per-identity session record.
pub struct SessionState {
    store: Arc<dyn MessageStore>,
    initiator: bool,
    responder: Option<Arc<dyn Responder>>,
    heartbeat: HeartbeatManager,
    queue: MessageQueue,
    resend_range: Option<ResendRange>,
    logon_sent: bool,
    logon_received: bool,
    logout_sent: bool,
    logout_received: bool,
    reset_sent: bool,
    reset_received: bool,
    /// When the logon exchange started: bind time for acceptors, Logon
    /// send time for initiators.
    logon_started_at: Option<Instant>,
    logout_sent_at: Option<Instant>,
    logout_reason: Option<String>,
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("status", &self.status())
            .field("next_sender_seq", &self.next_sender_seq())
            .field("next_target_seq", &self.next_target_seq())
            .field("queued", &self.queue.len())
            .field("resend_range", &self.resend_range)
            .finish_non_exhaustive()
    }
}

impl SessionState {
    pub(crate) fn new(store: Arc<dyn MessageStore>, initiator: bool, heartbeat: HeartbeatManager) -> Self {
        Self {
            store,
            initiator,
            responder: None,
            heartbeat,
            queue: MessageQueue::new(),
            resend_range: None,
            logon_sent: false,
            logon_received: false,
            logout_sent: false,
            logout_received: false,
            reset_sent: false,
            reset_received: false,
            logon_started_at: None,
            logout_sent_at: None,
            logout_reason: None,
        }
    }

    /// Derived status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        if self.responder.is_none() {
            SessionStatus::Disconnected
        } else if self.logout_sent || self.logout_received {
            SessionStatus::LogoutInProgress
        } else if self.logon_sent && self.logon_received {
            SessionStatus::LoggedOn
        } else if self.initiator && self.logon_sent {
            SessionStatus::LogonInProgress
        } else {
            SessionStatus::NotLoggedOn
        }
    }

    /// Logon sent and received, and the counterparty has not gone silent.
    #[must_use]
    pub fn is_logged_on(&self) -> bool {
        self.has_logged_on() && !self.heartbeat.is_timed_out()
    }

    /// Logon sent and received, regardless of liveness.
    #[must_use]
    pub const fn has_logged_on(&self) -> bool {
        self.logon_sent && self.logon_received
    }

    /// Neither side has a Logon outstanding.
    #[must_use]
    pub const fn is_logged_out(&self) -> bool {
        !self.logon_sent && !self.logon_received
    }

    /// Returns true if a responder is bound.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.responder.is_some()
    }

    /// The bound responder.
    #[must_use]
    pub fn responder(&self) -> Option<&Arc<dyn Responder>> {
        self.responder.as_ref()
    }

    /// Next MsgSeqNum we will send.
    #[must_use]
    pub fn next_sender_seq(&self) -> u64 {
        self.store.next_sender_seq()
    }

    /// Next MsgSeqNum we expect to receive.
    #[must_use]
    pub fn next_target_seq(&self) -> u64 {
        self.store.next_target_seq()
    }

    /// Heartbeat bookkeeping.
    #[must_use]
    pub const fn heartbeat(&self) -> &HeartbeatManager {
        &self.heartbeat
    }

    /// Messages waiting behind a gap.
    #[must_use]
    pub const fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Outstanding ResendRequest, if any.
    #[must_use]
    pub const fn resend_range(&self) -> Option<ResendRange> {
        self.resend_range
    }

    #[must_use]
    pub const fn is_logon_sent(&self) -> bool {
        self.logon_sent
    }

    #[must_use]
    pub const fn is_logon_received(&self) -> bool {
        self.logon_received
    }

    #[must_use]
    pub const fn is_logout_sent(&self) -> bool {
        self.logout_sent
    }

    #[must_use]
    pub const fn is_logout_received(&self) -> bool {
        self.logout_received
    }

    #[must_use]
    pub const fn is_reset_sent(&self) -> bool {
        self.reset_sent
    }

    #[must_use]
    pub const fn is_reset_received(&self) -> bool {
        self.reset_received
    }

    /// Reason given for a locally initiated Logout.
    #[must_use]
    pub fn logout_reason(&self) -> Option<&str> {
        self.logout_reason.as_deref()
    }

    /// Logon exchange has not completed within `timeout`.
    #[must_use]
    pub fn is_logon_timed_out(&self, timeout: Duration) -> bool {
        !self.logon_received
            && self
                .logon_started_at
                .is_some_and(|started| started.elapsed() >= timeout)
    }

    /// Our Logout has not been answered within `timeout`.
    #[must_use]
    pub fn is_logout_timed_out(&self, timeout: Duration) -> bool {
        self.logout_sent
            && self
                .logout_sent_at
                .is_some_and(|sent| sent.elapsed() >= timeout)
    }

    pub(crate) fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub(crate) fn bind(&mut self, responder: Arc<dyn Responder>) {
        self.responder = Some(responder);
        self.heartbeat.reset();
        if !self.initiator {
            self.logon_started_at = Some(Instant::now());
        }
    }

    pub(crate) fn take_responder(&mut self) -> Option<Arc<dyn Responder>> {
        self.responder.take()
    }

    pub(crate) fn heartbeat_mut(&mut self) -> &mut HeartbeatManager {
        &mut self.heartbeat
    }

    pub(crate) fn queue_mut(&mut self) -> &mut MessageQueue {
        &mut self.queue
    }

    pub(crate) fn set_resend_range(&mut self, range: Option<ResendRange>) {
        self.resend_range = range;
    }

    pub(crate) fn set_next_target_seq(&mut self, seq: u64) {
        self.store.set_next_target_seq(seq);
    }

    pub(crate) fn incr_next_sender_seq(&mut self) {
        self.store.incr_next_sender_seq();
    }

    pub(crate) fn incr_next_target_seq(&mut self) {
        self.store.incr_next_target_seq();
    }

    /// Clears stored messages and restarts both sequences at 1.
    pub(crate) async fn reset_sequences(&mut self) -> Result<(), StoreError> {
        self.queue.clear();
        self.resend_range = None;
        self.store.reset().await
    }

    pub(crate) fn set_logon_sent(&mut self) {
        self.logon_sent = true;
        if self.initiator {
            self.logon_started_at = Some(Instant::now());
        }
    }

    pub(crate) fn set_logon_received(&mut self) {
        self.logon_received = true;
        self.logon_started_at = None;
    }

    pub(crate) fn set_logout_sent(&mut self, reason: Option<String>) {
        self.logout_sent = true;
        self.logout_sent_at = Some(Instant::now());
        self.logout_reason = reason;
    }

    pub(crate) fn set_logout_received(&mut self) {
        self.logout_received = true;
    }

    pub(crate) fn set_reset_sent(&mut self, reset: bool) {
        self.reset_sent = reset;
    }

    pub(crate) fn set_reset_received(&mut self, reset: bool) {
        self.reset_received = reset;
    }

    /// Returns the record to its unbound shape. Sequence numbers survive.
    pub(crate) fn clear_connection(&mut self) {
        self.responder = None;
        self.queue.clear();
        self.resend_range = None;
        self.logon_sent = false;
        self.logon_received = false;
        self.logout_sent = false;
        self.logout_received = false;
        self.reset_sent = false;
        self.reset_received = false;
        self.logon_started_at = None;
        self.logout_sent_at = None;
        self.logout_reason = None;
        self.heartbeat.reset();
    }
}
