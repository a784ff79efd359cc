/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX session protocol engine.
//!
//! A [`Session`] owns one identity's state and enforces the session layer:
//! - Logon/Logout handshakes and their timeouts
//! - Inbound sequence verification, gap detection and ResendRequests
//! - Replay of stored messages with gap fills for admin traffic
//! - Heartbeat/TestRequest liveness on timer ticks
//!
//! The session lock is held while application callbacks run. Callbacks that
//! want to send on the same session must do so from a spawned task.

use crate::admin;
use crate::application::{Application, RejectReason, session_reject};
use crate::config::{GarbledPolicy, SessionConfig};
use crate::heartbeat::{HeartbeatManager, generate_test_req_id};
use crate::id::SessionId;
use crate::responder::{Responder, same_responder};
use crate::sequence::{ResendRange, SequenceCheck};
use crate::state::{SessionState, SessionStatus};
use bytes::Bytes;
use fixwire_core::error::{DecodeError, SessionError};
use fixwire_core::message::{Message, MsgType};
use fixwire_core::tags;
use fixwire_core::types::Timestamp;
use fixwire_store::MessageStore;
use fixwire_tagvalue::{Charset, MessageEncoder, Outbound, SOH, parse_message};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Item delivered to a session by its connection.
#[derive(Debug)]
pub enum Inbound {
    /// A structurally valid message.
    Message(Message),
    /// A framed message that failed structural validation.
    Garbled {
        /// The raw frame.
        bytes: Bytes,
        /// What was wrong with it.
        error: DecodeError,
    },
}

/// One FIX session: identity, configuration, store and runtime state.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    application: Arc<dyn Application>,
    encoder: MessageEncoder,
    state: Mutex<SessionState>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connection_type", &self.config.connection_type)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session.
    ///
    /// # Arguments
    /// * `config` - Session configuration, including the identity
    /// * `store` - Message store holding sequence numbers and sent messages
    /// * `application` - Callbacks for session events and messages
    #[must_use]
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn MessageStore>,
        application: Arc<dyn Application>,
    ) -> Self {
        let heartbeat = HeartbeatManager::new(
            config.heartbeat_interval,
            config.test_request_delay_multiplier,
            config.heartbeat_timeout_multiplier,
        );
        let state = SessionState::new(store, config.is_initiator(), heartbeat);
        Self {
            id: config.session_id.clone(),
            config,
            application,
            encoder: MessageEncoder::default(),
            state: Mutex::new(state),
        }
    }

    /// Sets the charset used to encode outbound messages.
    #[must_use]
    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.encoder = MessageEncoder::new(charset);
        self
    }

    /// The session identity.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// The session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The application receiving this session's callbacks.
    #[must_use]
    pub fn application(&self) -> &Arc<dyn Application> {
        &self.application
    }

    /// Locks and returns the runtime state for inspection.
    pub async fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Current derived status.
    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status()
    }

    /// Returns true if the Logon exchange completed and the peer is alive.
    pub async fn is_logged_on(&self) -> bool {
        self.state.lock().await.is_logged_on()
    }

    /// Returns true if a connection is bound.
    pub async fn is_bound(&self) -> bool {
        self.state.lock().await.is_bound()
    }

    /// Binds a connection to this session.
    ///
    /// # Errors
    /// `SessionError::AlreadyBound` if another connection is bound; the
    /// existing binding is left untouched.
    pub async fn bind(&self, responder: Arc<dyn Responder>) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.responder() {
            warn!(
                session = %self.id,
                remote = %responder.remote_address(),
                bound = %existing.remote_address(),
                "session already bound, refusing connection"
            );
            return Err(SessionError::AlreadyBound {
                session: self.id.to_string(),
                remote: existing.remote_address(),
            });
        }
        info!(session = %self.id, remote = %responder.remote_address(), "connection bound");
        state.bind(responder);
        Ok(())
    }

    /// Unbinds `responder` if it is the bound connection, disconnecting the
    /// session. Any other responder is ignored.
    ///
    /// # Errors
    /// Store failures while resetting sequences on disconnect.
    pub async fn unbind(&self, responder: &Arc<dyn Responder>) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let bound = state
            .responder()
            .is_some_and(|current| same_responder(current, responder));
        if bound {
            self.disconnect_locked(&mut state, "connection closed").await
        } else {
            Ok(())
        }
    }

    /// Processes one inbound item, then any queued messages it unblocked.
    ///
    /// # Errors
    /// Store, encode or write failures while answering.
    pub async fn next(&self, inbound: Inbound) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if !state.is_bound() {
            debug!(session = %self.id, "dropping inbound message for unbound session");
            return Ok(());
        }
        match inbound {
            Inbound::Message(message) => self.verify(&mut state, message).await?,
            Inbound::Garbled { bytes, error } => self.garbled(&mut state, &bytes, &error).await?,
        }
        self.drain_queue(&mut state).await
    }

    /// Sends a message, filling the standard header.
    ///
    /// Application messages are stored and consume a sequence number even
    /// when they cannot be written, so a later ResendRequest replays them.
    ///
    /// # Errors
    /// `NotBound` without a connection, `InvalidState` for application
    /// messages before logon, `SendFailed` if the responder refuses the bytes.
    pub async fn send(&self, message: Message) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        self.send_locked(&mut state, message).await
    }

    /// Starts a Logout. The session disconnects when the peer answers or
    /// the logout timeout expires.
    ///
    /// # Errors
    /// Encode or write failures.
    pub async fn logout(&self, reason: Option<&str>) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if !state.is_bound() || state.is_logout_sent() {
            return Ok(());
        }
        self.initiate_logout(&mut state, reason).await
    }

    /// Drops the connection immediately.
    ///
    /// # Errors
    /// Store failures while resetting sequences.
    pub async fn disconnect(&self, reason: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        self.disconnect_locked(&mut state, reason).await
    }

    /// Periodic tick: logon initiation, timeouts and liveness.
    ///
    /// # Errors
    /// Store, encode or write failures; the caller logs and keeps ticking.
    pub async fn on_timer(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if !state.is_bound() {
            return Ok(());
        }
        if self.config.is_initiator() && !state.is_logon_sent() {
            return self.send_logon(&mut state).await;
        }
        if state.is_logon_timed_out(self.config.logon_timeout) {
            warn!(session = %self.id, remote = %remote(&state), "timed out waiting for Logon");
            return self
                .disconnect_locked(&mut state, "timed out waiting for Logon")
                .await;
        }
        if state.is_logout_timed_out(self.config.logout_timeout) {
            warn!(session = %self.id, remote = %remote(&state), "timed out waiting for Logout answer");
            return self
                .disconnect_locked(&mut state, "timed out waiting for Logout answer")
                .await;
        }
        if !state.has_logged_on() {
            return Ok(());
        }

        if state.heartbeat().is_timed_out() {
            let elapsed_ms = state.heartbeat().time_since_last_received().as_millis() as u64;
            let cause = SessionError::HeartbeatTimeout { elapsed_ms };
            error!(session = %self.id, remote = %remote(&state), elapsed_ms, "heartbeat timeout");
            return self.logout_and_disconnect(&mut state, &cause.to_string()).await;
        }
        if state.heartbeat().should_send_test_request() {
            let test_req_id = generate_test_req_id();
            debug!(session = %self.id, %test_req_id, "sending TestRequest");
            self.send_locked(&mut state, admin::test_request(&test_req_id))
                .await?;
            state.heartbeat_mut().on_test_request_sent(test_req_id);
        } else if state.heartbeat().should_send_heartbeat() {
            self.send_locked(&mut state, admin::heartbeat(None)).await?;
        }
        Ok(())
    }

    async fn send_logon(&self, state: &mut SessionState) -> Result<(), SessionError> {
        let reset = self.config.reset_on_logon;
        if reset {
            state.reset_sequences().await?;
        }
        let logon = admin::logon(
            self.config.heartbeat_interval,
            reset,
            self.appl_ver_id(),
        );
        self.send_locked(state, logon).await?;
        state.set_logon_sent();
        state.set_reset_sent(reset);
        info!(session = %self.id, remote = %remote(state), "Logon sent");
        Ok(())
    }

    fn appl_ver_id(&self) -> Option<&str> {
        if self.id.is_fixt() {
            self.config.default_appl_ver_id.as_deref()
        } else {
            None
        }
    }

    async fn verify(&self, state: &mut SessionState, message: Message) -> Result<(), SessionError> {
        let msg_type = message.msg_type();
        state.heartbeat_mut().on_message_received();

        if !state.is_logon_received() && msg_type != MsgType::Logon {
            warn!(
                session = %self.id,
                remote = %remote(state),
                %msg_type,
                "first message is not a Logon"
            );
            return self
                .disconnect_locked(state, "first message is not a Logon")
                .await;
        }
        if message.begin_string() != Some(self.id.begin_string()) {
            warn!(
                session = %self.id,
                remote = %remote(state),
                received = message.begin_string().unwrap_or_default(),
                "incorrect BeginString"
            );
            return self
                .logout_and_disconnect(state, "Incorrect BeginString")
                .await;
        }
        let Some(seq) = message.msg_seq_num() else {
            warn!(session = %self.id, remote = %remote(state), %msg_type, "MsgSeqNum missing");
            return self.logout_and_disconnect(state, "MsgSeqNum missing").await;
        };
        if self.config.check_comp_id && !self.comp_ids_match(&message) {
            let reason = RejectReason::new(session_reject::COMP_ID_PROBLEM, "CompID problem");
            self.reject(state, seq, Some(&msg_type), reason).await?;
            return self.logout_and_disconnect(state, "CompID problem").await;
        }
        if self.config.check_latency && !self.sending_time_ok(&message) {
            let reason = RejectReason::new(
                session_reject::SENDING_TIME_ACCURACY,
                "SendingTime accuracy problem",
            )
            .with_ref_tag(tags::SENDING_TIME);
            self.reject(state, seq, Some(&msg_type), reason).await?;
            return self
                .initiate_logout(state, Some("SendingTime accuracy problem"))
                .await;
        }

        if msg_type == MsgType::SequenceReset && !message.body().get_bool(tags::GAP_FILL_FLAG) {
            return self.on_sequence_reset(state, seq, &message).await;
        }
        if msg_type == MsgType::Logon {
            return self.on_logon(state, seq, message).await;
        }

        match SequenceCheck::of(state.next_target_seq(), seq) {
            SequenceCheck::Expected => self.dispatch(state, seq, message).await,
            SequenceCheck::TooHigh => self.on_too_high(state, seq, message).await,
            SequenceCheck::TooLow => self.on_too_low(state, seq, &message).await,
        }
    }

    /// Handles a message whose MsgSeqNum is the expected one.
    async fn dispatch(
        &self,
        state: &mut SessionState,
        seq: u64,
        message: Message,
    ) -> Result<(), SessionError> {
        let msg_type = message.msg_type();
        match msg_type {
            MsgType::Heartbeat => {
                state
                    .heartbeat_mut()
                    .on_heartbeat(message.body().get(tags::TEST_REQ_ID));
                self.admin_callback(state, seq, &message).await?;
                state.incr_next_target_seq();
            }
            MsgType::TestRequest => {
                let reply = admin::heartbeat(message.body().get(tags::TEST_REQ_ID));
                self.send_locked(state, reply).await?;
                self.admin_callback(state, seq, &message).await?;
                state.incr_next_target_seq();
            }
            MsgType::ResendRequest => {
                self.on_resend_request(state, seq, &message).await?;
                self.admin_callback(state, seq, &message).await?;
                state.incr_next_target_seq();
            }
            MsgType::SequenceReset => self.on_gap_fill(state, seq, &message).await?,
            MsgType::Logout => self.on_logout(state, seq, &message, true).await?,
            MsgType::Logon | MsgType::Reject => {
                self.admin_callback(state, seq, &message).await?;
                state.incr_next_target_seq();
            }
            _ => {
                if let Err(reason) = self.application.from_app(&message, &self.id).await {
                    warn!(
                        session = %self.id,
                        seq,
                        %msg_type,
                        code = reason.code,
                        text = %reason.text,
                        "application rejected message"
                    );
                    let reject = admin::business_reject(seq, &msg_type, &reason);
                    self.send_locked(state, reject).await?;
                }
                state.incr_next_target_seq();
            }
        }
        Ok(())
    }

    async fn admin_callback(
        &self,
        state: &mut SessionState,
        seq: u64,
        message: &Message,
    ) -> Result<(), SessionError> {
        match self.application.from_admin(message, &self.id).await {
            Ok(()) => Ok(()),
            Err(reason) => {
                let msg_type = message.msg_type();
                self.reject(state, seq, Some(&msg_type), reason).await
            }
        }
    }

    async fn on_logon(
        &self,
        state: &mut SessionState,
        seq: u64,
        message: Message,
    ) -> Result<(), SessionError> {
        let expected = state.next_target_seq();
        if state.is_logon_received() {
            warn!(session = %self.id, seq, "Logon received on an established session");
            return match SequenceCheck::of(expected, seq) {
                SequenceCheck::Expected => self.dispatch(state, seq, message).await,
                SequenceCheck::TooHigh => self.on_too_high(state, seq, message).await,
                SequenceCheck::TooLow => self.on_too_low(state, seq, &message).await,
            };
        }

        let Ok(heart_bt_int) = message.body().get_as::<u64>(tags::HEART_BT_INT) else {
            warn!(session = %self.id, remote = %remote(state), "Logon without a valid HeartBtInt");
            return self
                .logout_and_disconnect(state, "HeartBtInt missing or invalid")
                .await;
        };
        if let Err(reason) = self.application.from_admin(&message, &self.id).await {
            warn!(
                session = %self.id,
                remote = %remote(state),
                text = %reason.text,
                "Logon rejected by application"
            );
            return self.logout_and_disconnect(state, &reason.text).await;
        }

        let reset = message.body().get_bool(tags::RESET_SEQ_NUM_FLAG);
        state.set_reset_received(reset);
        if reset && !state.is_reset_sent() {
            info!(session = %self.id, "Logon carries ResetSeqNumFlag, resetting sequence numbers");
            state.reset_sequences().await?;
        } else if !reset && !self.config.is_initiator() && self.config.reset_on_logon {
            state.reset_sequences().await?;
        }

        let expected = state.next_target_seq();
        let check = SequenceCheck::of(expected, seq);
        if check == SequenceCheck::TooLow {
            let cause = SessionError::SequenceTooLow { expected, received: seq };
            error!(session = %self.id, remote = %remote(state), expected, received = seq, "Logon MsgSeqNum too low");
            return self.logout_and_disconnect(state, &cause.to_string()).await;
        }

        state.set_logon_received();
        if !self.config.is_initiator() {
            let interval = Duration::from_secs(heart_bt_int);
            state.heartbeat_mut().set_interval(interval);
            let reset_answer = reset || self.config.reset_on_logon;
            let answer = admin::logon(interval, reset_answer, self.appl_ver_id());
            self.send_locked(state, answer).await?;
            state.set_logon_sent();
            state.set_reset_sent(reset_answer);
        }
        info!(session = %self.id, remote = %remote(state), "logon complete");
        self.application.on_logon(&self.id).await;

        if check == SequenceCheck::Expected {
            state.incr_next_target_seq();
            Ok(())
        } else {
            state.queue_mut().enqueue(seq, message);
            self.request_gap(state, expected, seq).await
        }
    }

    async fn on_too_high(
        &self,
        state: &mut SessionState,
        seq: u64,
        message: Message,
    ) -> Result<(), SessionError> {
        let expected = state.next_target_seq();
        let msg_type = message.msg_type();
        info!(session = %self.id, expected, received = seq, %msg_type, "MsgSeqNum too high");

        if msg_type == MsgType::Logout {
            return self.on_logout(state, seq, &message, false).await;
        }
        if msg_type == MsgType::ResendRequest {
            self.on_resend_request(state, seq, &message).await?;
        }
        state.queue_mut().enqueue(seq, message);
        self.request_gap(state, expected, seq).await
    }

    async fn request_gap(
        &self,
        state: &mut SessionState,
        begin: u64,
        received: u64,
    ) -> Result<(), SessionError> {
        if let Some(range) = state.resend_range() {
            info!(
                session = %self.id,
                begin = range.begin,
                end = range.end,
                "ResendRequest already pending, not sending another"
            );
            return Ok(());
        }
        let end = if self.config.closed_resend_interval {
            received - 1
        } else {
            0
        };
        info!(session = %self.id, begin, end, "sending ResendRequest");
        self.send_locked(state, admin::resend_request(begin, end))
            .await?;
        state.set_resend_range(Some(ResendRange::new(begin, end)));
        Ok(())
    }

    async fn on_too_low(
        &self,
        state: &mut SessionState,
        seq: u64,
        message: &Message,
    ) -> Result<(), SessionError> {
        let expected = state.next_target_seq();
        let msg_type = message.msg_type();
        if !message.is_poss_dup() {
            error!(
                session = %self.id,
                remote = %remote(state),
                expected,
                received = seq,
                "MsgSeqNum too low"
            );
            let cause = SessionError::SequenceTooLow { expected, received: seq };
            return self.logout_and_disconnect(state, &cause.to_string()).await;
        }

        if msg_type != MsgType::SequenceReset {
            let header = message.header();
            let Some(orig) = header.get(tags::ORIG_SENDING_TIME) else {
                let reason = RejectReason::new(session_reject::REQUIRED_TAG_MISSING, "Required tag missing")
                    .with_ref_tag(tags::ORIG_SENDING_TIME);
                return self.reject(state, seq, Some(&msg_type), reason).await;
            };
            let sending = header.get(tags::SENDING_TIME).and_then(Timestamp::parse);
            if let (Some(orig), Some(sending)) = (Timestamp::parse(orig), sending)
                && orig.as_nanos() > sending.as_nanos()
            {
                let reason = RejectReason::new(
                    session_reject::SENDING_TIME_ACCURACY,
                    "SendingTime accuracy problem",
                );
                self.reject(state, seq, Some(&msg_type), reason).await?;
                return self
                    .initiate_logout(state, Some("SendingTime accuracy problem"))
                    .await;
            }
        }
        debug!(session = %self.id, seq, %msg_type, "ignoring duplicate");
        Ok(())
    }

    async fn on_resend_request(
        &self,
        state: &mut SessionState,
        seq: u64,
        message: &Message,
    ) -> Result<(), SessionError> {
        let body = message.body();
        let (begin, end) = match (
            body.get_as::<u64>(tags::BEGIN_SEQ_NO),
            body.get_as::<u64>(tags::END_SEQ_NO),
        ) {
            (Ok(begin), Ok(end)) => (begin, end),
            (begin, _) => {
                let tag = if begin.is_err() {
                    tags::BEGIN_SEQ_NO
                } else {
                    tags::END_SEQ_NO
                };
                let reason = RejectReason::new(session_reject::REQUIRED_TAG_MISSING, "Required tag missing")
                    .with_ref_tag(tag);
                return self
                    .reject(state, seq, Some(&MsgType::ResendRequest), reason)
                    .await;
            }
        };

        let last_sent = state.next_sender_seq().saturating_sub(1);
        let end = if end == 0 || end > last_sent { last_sent } else { end };
        info!(session = %self.id, begin, end, "received ResendRequest");
        if begin == 0 || begin > end {
            return Ok(());
        }

        let stored = state.store().get_range(begin, end).await?;
        let mut cursor = begin;
        for (stored_seq, frame) in stored {
            let Some(replay) = replayable(&frame) else {
                continue;
            };
            if stored_seq > cursor {
                self.send_gap_fill(state, cursor, stored_seq).await?;
            }
            self.resend(state, stored_seq, replay).await?;
            cursor = stored_seq + 1;
        }
        if cursor <= end {
            self.send_gap_fill(state, cursor, end + 1).await?;
        }
        Ok(())
    }

    async fn resend(
        &self,
        state: &mut SessionState,
        seq: u64,
        mut message: Message,
    ) -> Result<(), SessionError> {
        mark_poss_dup(&mut message);
        self.application.to_app(&mut message, &self.id).await;
        let msg_type = message.msg_type();
        let bytes = self.encoder.encode(&Outbound::Message(message))?;
        debug!(session = %self.id, seq, %msg_type, "resending");
        self.write(state, &msg_type, seq, bytes).await
    }

    async fn send_gap_fill(
        &self,
        state: &mut SessionState,
        begin: u64,
        new_seq_no: u64,
    ) -> Result<(), SessionError> {
        let mut message = admin::sequence_reset(new_seq_no, true);
        self.fill_header(&mut message, begin);
        mark_poss_dup(&mut message);
        self.application.to_admin(&mut message, &self.id).await;
        let bytes = self.encoder.encode(&Outbound::Message(message))?;
        debug!(session = %self.id, begin, new_seq_no, "sending gap fill");
        self.write(state, &MsgType::SequenceReset, begin, bytes).await
    }

    async fn on_gap_fill(
        &self,
        state: &mut SessionState,
        seq: u64,
        message: &Message,
    ) -> Result<(), SessionError> {
        let new_seq = match message.body().get_as::<u64>(tags::NEW_SEQ_NO) {
            Ok(new_seq) => new_seq,
            Err(_) => {
                let reason = RejectReason::new(session_reject::REQUIRED_TAG_MISSING, "Required tag missing")
                    .with_ref_tag(tags::NEW_SEQ_NO);
                self.reject(state, seq, Some(&MsgType::SequenceReset), reason)
                    .await?;
                state.incr_next_target_seq();
                return Ok(());
            }
        };
        if new_seq < seq {
            let reason = RejectReason::new(
                session_reject::VALUE_INCORRECT,
                format!("NewSeqNo {new_seq} is lower than MsgSeqNum {seq}"),
            )
            .with_ref_tag(tags::NEW_SEQ_NO);
            self.reject(state, seq, Some(&MsgType::SequenceReset), reason)
                .await?;
            state.incr_next_target_seq();
            return Ok(());
        }
        self.admin_callback(state, seq, message).await?;
        if new_seq > seq {
            info!(session = %self.id, from = seq, to = new_seq, "gap fill");
            state.set_next_target_seq(new_seq);
        } else {
            state.incr_next_target_seq();
        }
        Ok(())
    }

    /// SequenceReset in Reset mode; MsgSeqNum is ignored.
    async fn on_sequence_reset(
        &self,
        state: &mut SessionState,
        seq: u64,
        message: &Message,
    ) -> Result<(), SessionError> {
        let Ok(new_seq) = message.body().get_as::<u64>(tags::NEW_SEQ_NO) else {
            let reason = RejectReason::new(session_reject::REQUIRED_TAG_MISSING, "Required tag missing")
                .with_ref_tag(tags::NEW_SEQ_NO);
            return self
                .reject(state, seq, Some(&MsgType::SequenceReset), reason)
                .await;
        };
        let expected = state.next_target_seq();
        if new_seq < expected {
            let reason = RejectReason::new(
                session_reject::VALUE_INCORRECT,
                format!("NewSeqNo {new_seq} is lower than expected {expected}"),
            )
            .with_ref_tag(tags::NEW_SEQ_NO);
            return self
                .reject(state, seq, Some(&MsgType::SequenceReset), reason)
                .await;
        }
        self.admin_callback(state, seq, message).await?;
        if new_seq > expected {
            info!(session = %self.id, from = expected, to = new_seq, "sequence reset");
            state.set_next_target_seq(new_seq);
        }
        Ok(())
    }

    async fn on_logout(
        &self,
        state: &mut SessionState,
        seq: u64,
        message: &Message,
        advance: bool,
    ) -> Result<(), SessionError> {
        state.set_logout_received();
        if let Err(reason) = self.application.from_admin(message, &self.id).await {
            debug!(session = %self.id, seq, text = %reason.text, "ignoring Logout rejection");
        }
        if advance {
            state.incr_next_target_seq();
        }
        if state.is_logout_sent() {
            info!(session = %self.id, remote = %remote(state), "Logout acknowledged");
        } else {
            info!(session = %self.id, remote = %remote(state), "received Logout, answering");
            if let Err(err) = self.send_locked(state, admin::logout(None)).await {
                warn!(session = %self.id, remote = %remote(state), %err, "failed to answer Logout");
            }
        }
        self.disconnect_locked(state, "logout").await
    }

    async fn garbled(
        &self,
        state: &mut SessionState,
        bytes: &[u8],
        error: &DecodeError,
    ) -> Result<(), SessionError> {
        state.heartbeat_mut().on_message_received();
        if !state.is_logon_received() {
            warn!(session = %self.id, remote = %remote(state), %error, "garbled message before Logon");
            return self
                .disconnect_locked(state, "garbled message before Logon")
                .await;
        }
        if self.config.garbled_policy == GarbledPolicy::Drop {
            warn!(session = %self.id, remote = %remote(state), %error, "dropping garbled message");
            return Ok(());
        }

        let reason = match error {
            DecodeError::ChecksumMismatch { .. } => {
                Some(RejectReason::new(session_reject::OTHER, "Invalid checksum"))
            }
            DecodeError::BodyLengthMismatch { .. } => {
                Some(RejectReason::new(session_reject::OTHER, "Invalid body length"))
            }
            DecodeError::MissingMsgType => Some(
                RejectReason::new(session_reject::REQUIRED_TAG_MISSING, "Required tag missing")
                    .with_ref_tag(tags::MSG_TYPE),
            ),
            _ => None,
        };
        let seq = scan_seq_num(bytes);
        match (reason, seq) {
            (Some(reason), Some(seq)) if seq == state.next_target_seq() => {
                warn!(session = %self.id, seq, %error, "rejecting garbled message");
                self.reject(state, seq, None, reason).await?;
                state.incr_next_target_seq();
            }
            _ => {
                warn!(session = %self.id, remote = %remote(state), ?seq, %error, "dropping garbled message");
            }
        }
        Ok(())
    }

    /// Processes queued messages that became expected, then settles the
    /// outstanding ResendRequest.
    async fn drain_queue(&self, state: &mut SessionState) -> Result<(), SessionError> {
        while state.is_bound() {
            let expected = state.next_target_seq();
            let Some(message) = state.queue_mut().take(expected) else {
                break;
            };
            debug!(session = %self.id, seq = expected, "processing queued message");
            match message.msg_type() {
                // already acted on when they arrived
                MsgType::Logon | MsgType::ResendRequest => state.incr_next_target_seq(),
                _ => self.dispatch(state, expected, message).await?,
            }
        }
        if !state.is_bound() {
            return Ok(());
        }

        let next_target = state.next_target_seq();
        if let Some(range) = state.resend_range() {
            let satisfied = if range.is_open() {
                state.queue().is_empty()
            } else {
                next_target > range.end
            };
            if satisfied {
                info!(session = %self.id, begin = range.begin, end = range.end, "resend complete");
                state.set_resend_range(None);
            }
        }
        if state.resend_range().is_none()
            && let Some(lowest) = state.queue().lowest()
            && lowest > next_target
        {
            return self.request_gap(state, next_target, lowest).await;
        }
        Ok(())
    }

    async fn reject(
        &self,
        state: &mut SessionState,
        ref_seq: u64,
        ref_msg_type: Option<&MsgType>,
        reason: RejectReason,
    ) -> Result<(), SessionError> {
        warn!(
            session = %self.id,
            ref_seq,
            code = reason.code,
            text = %reason.text,
            "sending Reject"
        );
        self.send_locked(state, admin::reject(ref_seq, ref_msg_type, &reason))
            .await
    }

    async fn initiate_logout(
        &self,
        state: &mut SessionState,
        reason: Option<&str>,
    ) -> Result<(), SessionError> {
        info!(session = %self.id, remote = %remote(state), reason = reason.unwrap_or_default(), "sending Logout");
        self.send_locked(state, admin::logout(reason)).await?;
        state.set_logout_sent(reason.map(str::to_string));
        Ok(())
    }

    async fn logout_and_disconnect(
        &self,
        state: &mut SessionState,
        reason: &str,
    ) -> Result<(), SessionError> {
        if let Err(err) = self.initiate_logout(state, Some(reason)).await {
            warn!(session = %self.id, remote = %remote(state), %err, "failed to send Logout");
        }
        self.disconnect_locked(state, reason).await
    }

    async fn disconnect_locked(
        &self,
        state: &mut SessionState,
        reason: &str,
    ) -> Result<(), SessionError> {
        let Some(responder) = state.take_responder() else {
            return Ok(());
        };
        info!(
            session = %self.id,
            remote = %responder.remote_address(),
            reason,
            "disconnecting"
        );
        responder.disconnect();

        let was_logged_on = state.has_logged_on();
        let logout_exchanged = state.is_logout_sent() || state.is_logout_received();
        state.clear_connection();
        if was_logged_on {
            self.application.on_logout(&self.id).await;
        }
        if self.config.reset_on_disconnect || (logout_exchanged && self.config.reset_on_logout) {
            state.reset_sequences().await?;
        }
        Ok(())
    }

    async fn send_locked(
        &self,
        state: &mut SessionState,
        mut message: Message,
    ) -> Result<(), SessionError> {
        let msg_type = message.msg_type();
        let is_admin = msg_type.is_admin();
        if is_admin && !state.is_bound() {
            return Err(SessionError::NotBound(self.id.to_string()));
        }

        let seq = state.next_sender_seq();
        self.fill_header(&mut message, seq);
        if is_admin {
            self.application.to_admin(&mut message, &self.id).await;
        } else {
            self.application.to_app(&mut message, &self.id).await;
        }
        let bytes = self.encoder.encode(&Outbound::Message(message))?;
        if self.config.persist_messages {
            state.store().store(seq, bytes.clone()).await?;
        }
        state.incr_next_sender_seq();

        if !is_admin && state.is_bound() && !state.has_logged_on() {
            debug!(session = %self.id, seq, %msg_type, "not logged on, message kept for resend");
            return Err(SessionError::InvalidState {
                expected: SessionStatus::LoggedOn.to_string(),
                current: state.status().to_string(),
            });
        }
        self.write(state, &msg_type, seq, bytes).await
    }

    async fn write(
        &self,
        state: &mut SessionState,
        msg_type: &MsgType,
        seq: u64,
        bytes: Bytes,
    ) -> Result<(), SessionError> {
        let Some(responder) = state.responder().cloned() else {
            return Err(SessionError::NotBound(self.id.to_string()));
        };
        if !responder.send(bytes).await {
            warn!(
                session = %self.id,
                remote = %responder.remote_address(),
                seq,
                %msg_type,
                "responder refused message"
            );
            return Err(SessionError::SendFailed(self.id.to_string()));
        }
        state.heartbeat_mut().on_message_sent();
        debug!(session = %self.id, seq, %msg_type, "sent");
        Ok(())
    }

    fn fill_header(&self, message: &mut Message, seq: u64) {
        let id = &self.id;
        let header = message.header_mut();
        header.set(tags::BEGIN_STRING, id.begin_string());
        header.set(tags::SENDER_COMP_ID, id.sender_comp_id().as_str());
        if let Some(sub_id) = id.sender_sub_id() {
            header.set(tags::SENDER_SUB_ID, sub_id);
        }
        if let Some(location_id) = id.sender_location_id() {
            header.set(tags::SENDER_LOCATION_ID, location_id);
        }
        header.set(tags::TARGET_COMP_ID, id.target_comp_id().as_str());
        if let Some(sub_id) = id.target_sub_id() {
            header.set(tags::TARGET_SUB_ID, sub_id);
        }
        if let Some(location_id) = id.target_location_id() {
            header.set(tags::TARGET_LOCATION_ID, location_id);
        }
        header.set_u64(tags::MSG_SEQ_NUM, seq);
        header.set(tags::SENDING_TIME, Timestamp::now().format_millis().as_str());
    }

    fn comp_ids_match(&self, message: &Message) -> bool {
        let header = message.header();
        header.get(tags::SENDER_COMP_ID) == Some(self.id.target_comp_id().as_str())
            && header.get(tags::TARGET_COMP_ID) == Some(self.id.sender_comp_id().as_str())
    }

    fn sending_time_ok(&self, message: &Message) -> bool {
        message
            .header()
            .get(tags::SENDING_TIME)
            .and_then(Timestamp::parse)
            .is_some_and(|sent| Timestamp::now().abs_diff(sent) <= self.config.max_latency)
    }
}

fn remote(state: &SessionState) -> String {
    state
        .responder()
        .map_or_else(|| "-".to_string(), |r| r.remote_address())
}

/// Marks a message as a possible duplicate, keeping its original SendingTime.
fn mark_poss_dup(message: &mut Message) {
    let header = message.header_mut();
    let orig = header.get(tags::SENDING_TIME).map(str::to_string);
    header.set_bool(tags::POSS_DUP_FLAG, true);
    if let Some(orig) = orig {
        header.set(tags::ORIG_SENDING_TIME, orig);
    }
    header.set(tags::SENDING_TIME, Timestamp::now().format_millis().as_str());
}

/// Parses a stored frame, returning it only if it is an application message.
fn replayable(frame: &[u8]) -> Option<Message> {
    parse_message(frame, false)
        .ok()
        .filter(|message| message.msg_type().is_app())
}

/// Extracts MsgSeqNum from a frame that failed structural validation.
fn scan_seq_num(bytes: &[u8]) -> Option<u64> {
    bytes
        .split(|&b| b == SOH)
        .find_map(|field| field.strip_prefix(b"34="))
        .and_then(|value| std::str::from_utf8(value).ok())
        .and_then(|value| value.parse().ok())
}
