/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Heartbeat and TestRequest management.
//!
//! This module handles FIX session heartbeat logic including:
//! - Deciding when a Heartbeat is due
//! - Escalating silence into TestRequests with a growing delay
//! - Detecting a dead counterparty
//!
//! Time is read from `tokio::time`, so a paused runtime drives it in tests.
//! An interval of zero disables every check.

use std::time::Duration;
use tokio::time::Instant;

/// Heartbeat manager for a FIX session.
#[derive(Debug)]
pub struct HeartbeatManager {
    /// Heartbeat interval.
    interval: Duration,
    /// Time of the last message written.
    last_sent: Instant,
    /// Time of the last message read.
    last_received: Instant,
    /// TestRequests sent since the last inbound message.
    test_request_counter: u32,
    /// ID of the most recent unanswered TestRequest.
    pending_test_request: Option<String>,
    /// Extra fraction of the interval before each TestRequest.
    delay_multiplier: f64,
    /// Silence, as a multiple of the interval, that counts as a timeout.
    timeout_multiplier: f64,
}

impl HeartbeatManager {
    /// Creates a new heartbeat manager.
    ///
    /// # Arguments
    /// * `interval` - The heartbeat interval
    /// * `delay_multiplier` - TestRequest delay as a fraction of the interval
    /// * `timeout_multiplier` - Silence tolerated, in intervals
    #[must_use]
    pub fn new(interval: Duration, delay_multiplier: f64, timeout_multiplier: f64) -> Self {
        let now = Instant::now();
        Self {
            interval,
            last_sent: now,
            last_received: now,
            test_request_counter: 0,
            pending_test_request: None,
            delay_multiplier,
            timeout_multiplier,
        }
    }

    /// Records that a message was sent.
    #[inline]
    pub fn on_message_sent(&mut self) {
        self.last_sent = Instant::now();
    }

    /// Records that a message was received; any traffic proves liveness.
    #[inline]
    pub fn on_message_received(&mut self) {
        self.last_received = Instant::now();
        self.test_request_counter = 0;
    }

    /// Clears the pending TestRequest if a Heartbeat answers it.
    pub fn on_heartbeat(&mut self, test_req_id: Option<&str>) {
        if test_req_id.is_some() && self.pending_test_request.as_deref() == test_req_id {
            self.pending_test_request = None;
        }
    }

    /// Records a TestRequest sent with the given ID.
    pub fn on_test_request_sent(&mut self, test_req_id: String) {
        self.pending_test_request = Some(test_req_id);
        self.test_request_counter += 1;
        self.last_sent = Instant::now();
    }

    /// Returns true if a Heartbeat should be sent.
    #[must_use]
    pub fn should_send_heartbeat(&self) -> bool {
        self.enabled()
            && self.test_request_counter == 0
            && self.last_sent.elapsed() >= self.interval
    }

    /// Returns true if a TestRequest should be sent.
    #[must_use]
    pub fn should_send_test_request(&self) -> bool {
        let factor = (1.0 + self.delay_multiplier) * f64::from(self.test_request_counter + 1);
        self.enabled() && self.last_received.elapsed() >= self.interval.mul_f64(factor)
    }

    /// Returns true if the counterparty has been silent too long.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.enabled()
            && self.last_received.elapsed() >= self.interval.mul_f64(self.timeout_multiplier)
    }

    /// Returns the ID of the unanswered TestRequest, if any.
    #[must_use]
    pub fn pending_test_request(&self) -> Option<&str> {
        self.pending_test_request.as_deref()
    }

    /// Returns the number of TestRequests sent since the last inbound message.
    #[must_use]
    pub const fn test_request_counter(&self) -> u32 {
        self.test_request_counter
    }

    /// Returns the time since the last received message.
    #[must_use]
    pub fn time_since_last_received(&self) -> Duration {
        self.last_received.elapsed()
    }

    /// Returns the time since the last sent message.
    #[must_use]
    pub fn time_since_last_sent(&self) -> Duration {
        self.last_sent.elapsed()
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Adopts a new interval, e.g. the counterparty's HeartBtInt.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Resets timers and TestRequest tracking to "now".
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.last_sent = now;
        self.last_received = now;
        self.test_request_counter = 0;
        self.pending_test_request = None;
    }

    fn enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

/// Generates a unique TestReqID.
#[must_use]
pub fn generate_test_req_id() -> String {
    format!("TEST{}", chrono::Utc::now().format("%Y%m%d-%H:%M:%S%.9f"))
}
