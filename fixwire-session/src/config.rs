/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session configuration.
//!
//! This module provides configuration options for FIX sessions.

use crate::id::SessionId;
use fixwire_core::error::SessionError;
use fixwire_core::types::CompId;
use std::time::Duration;

/// Which side opens the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    /// Waits for the counterparty's Logon.
    #[default]
    Acceptor,
    /// Sends the first Logon.
    Initiator,
}

/// What to do with a message that failed structural parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GarbledPolicy {
    /// Log and drop without advancing sequence numbers.
    Drop,
    /// Send a session Reject when the message is in sequence, and advance.
    #[default]
    Reject,
}

/// Configuration for a FIX session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session identity.
    pub session_id: SessionId,
    /// Acceptor or initiator.
    pub connection_type: ConnectionType,
    /// Heartbeat interval; zero disables heartbeats.
    pub heartbeat_interval: Duration,
    /// Whether to reset sequence numbers on logon.
    pub reset_on_logon: bool,
    /// Whether to reset sequence numbers on logout.
    pub reset_on_logout: bool,
    /// Whether to reset sequence numbers on disconnect.
    pub reset_on_disconnect: bool,
    /// Logon timeout duration.
    pub logon_timeout: Duration,
    /// Logout timeout duration.
    pub logout_timeout: Duration,
    /// Whether to validate incoming message checksums.
    pub validate_checksum: bool,
    /// Whether inbound CompIDs must match the identity.
    pub check_comp_id: bool,
    /// Whether inbound SendingTime must be within `max_latency`.
    pub check_latency: bool,
    /// Largest tolerated SendingTime skew.
    pub max_latency: Duration,
    /// Handling of messages that failed structural parsing.
    pub garbled_policy: GarbledPolicy,
    /// Extra fraction of the interval to wait before each TestRequest.
    pub test_request_delay_multiplier: f64,
    /// Multiple of the interval without traffic after which the peer is dead.
    pub heartbeat_timeout_multiplier: f64,
    /// Whether ResendRequests name an explicit end instead of 0 (infinity).
    pub closed_resend_interval: bool,
    /// Whether outgoing application messages are kept for resend.
    pub persist_messages: bool,
    /// DefaultApplVerID sent on FIXT logons.
    pub default_appl_ver_id: Option<String>,
}

impl SessionConfig {
    /// Creates a new session configuration with default settings.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            connection_type: ConnectionType::Acceptor,
            heartbeat_interval: Duration::from_secs(30),
            reset_on_logon: false,
            reset_on_logout: false,
            reset_on_disconnect: false,
            logon_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(2),
            validate_checksum: true,
            check_comp_id: true,
            check_latency: true,
            max_latency: Duration::from_secs(120),
            garbled_policy: GarbledPolicy::Reject,
            test_request_delay_multiplier: 0.5,
            heartbeat_timeout_multiplier: 2.4,
            closed_resend_interval: true,
            persist_messages: true,
            default_appl_ver_id: None,
        }
    }

    /// Sets the connection type.
    #[must_use]
    pub const fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = connection_type;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets whether to reset sequence numbers on logon.
    #[must_use]
    pub const fn with_reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets the garbled-message policy.
    #[must_use]
    pub const fn with_garbled_policy(mut self, policy: GarbledPolicy) -> Self {
        self.garbled_policy = policy;
        self
    }

    /// Returns true if this side sends the first Logon.
    #[must_use]
    pub fn is_initiator(&self) -> bool {
        self.connection_type == ConnectionType::Initiator
    }

    /// Returns the heartbeat interval in whole seconds, as carried by HeartBtInt.
    #[must_use]
    pub const fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs()
    }
}

/// Builder for session configuration.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    begin_string: Option<String>,
    sender_comp_id: Option<String>,
    target_comp_id: Option<String>,
    sender_sub_id: Option<String>,
    sender_location_id: Option<String>,
    target_sub_id: Option<String>,
    target_location_id: Option<String>,
    qualifier: Option<String>,
    connection_type: ConnectionType,
    heartbeat_interval: Option<Duration>,
    reset_on_logon: bool,
    reset_on_logout: bool,
    reset_on_disconnect: bool,
    logon_timeout: Option<Duration>,
    logout_timeout: Option<Duration>,
    validate_checksum: Option<bool>,
    check_comp_id: Option<bool>,
    check_latency: Option<bool>,
    max_latency: Option<Duration>,
    garbled_policy: GarbledPolicy,
    test_request_delay_multiplier: Option<f64>,
    heartbeat_timeout_multiplier: Option<f64>,
    closed_resend_interval: Option<bool>,
    persist_messages: Option<bool>,
    default_appl_ver_id: Option<String>,
}

impl SessionConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the FIX version.
    #[must_use]
    pub fn begin_string(mut self, version: impl Into<String>) -> Self {
        self.begin_string = Some(version.into());
        self
    }

    /// Sets the sender CompID.
    #[must_use]
    pub fn sender_comp_id(mut self, id: impl Into<String>) -> Self {
        self.sender_comp_id = Some(id.into());
        self
    }

    /// Sets the target CompID.
    #[must_use]
    pub fn target_comp_id(mut self, id: impl Into<String>) -> Self {
        self.target_comp_id = Some(id.into());
        self
    }

    /// Sets the sender SubID.
    #[must_use]
    pub fn sender_sub_id(mut self, id: impl Into<String>) -> Self {
        self.sender_sub_id = Some(id.into());
        self
    }

    /// Sets the sender LocationID.
    #[must_use]
    pub fn sender_location_id(mut self, id: impl Into<String>) -> Self {
        self.sender_location_id = Some(id.into());
        self
    }

    /// Sets the target SubID.
    #[must_use]
    pub fn target_sub_id(mut self, id: impl Into<String>) -> Self {
        self.target_sub_id = Some(id.into());
        self
    }

    /// Sets the target LocationID.
    #[must_use]
    pub fn target_location_id(mut self, id: impl Into<String>) -> Self {
        self.target_location_id = Some(id.into());
        self
    }

    /// Sets the session qualifier.
    #[must_use]
    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Sets acceptor or initiator.
    #[must_use]
    pub const fn connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = connection_type;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets whether to reset on logon.
    #[must_use]
    pub const fn reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets whether to reset on logout.
    #[must_use]
    pub const fn reset_on_logout(mut self, reset: bool) -> Self {
        self.reset_on_logout = reset;
        self
    }

    /// Sets whether to reset on disconnect.
    #[must_use]
    pub const fn reset_on_disconnect(mut self, reset: bool) -> Self {
        self.reset_on_disconnect = reset;
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub const fn logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = Some(timeout);
        self
    }

    /// Sets the logout timeout.
    #[must_use]
    pub const fn logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = Some(timeout);
        self
    }

    /// Sets whether inbound checksums are validated.
    #[must_use]
    pub const fn validate_checksum(mut self, validate: bool) -> Self {
        self.validate_checksum = Some(validate);
        self
    }

    /// Sets whether inbound CompIDs are checked.
    #[must_use]
    pub const fn check_comp_id(mut self, check: bool) -> Self {
        self.check_comp_id = Some(check);
        self
    }

    /// Sets whether inbound SendingTime is checked.
    #[must_use]
    pub const fn check_latency(mut self, check: bool) -> Self {
        self.check_latency = Some(check);
        self
    }

    /// Sets the largest tolerated SendingTime skew.
    #[must_use]
    pub const fn max_latency(mut self, latency: Duration) -> Self {
        self.max_latency = Some(latency);
        self
    }

    /// Sets the garbled-message policy.
    #[must_use]
    pub const fn garbled_policy(mut self, policy: GarbledPolicy) -> Self {
        self.garbled_policy = policy;
        self
    }

    /// Sets the TestRequest delay multiplier.
    #[must_use]
    pub fn test_request_delay_multiplier(mut self, multiplier: f64) -> Self {
        self.test_request_delay_multiplier = Some(multiplier);
        self
    }

    /// Sets the heartbeat timeout multiplier.
    #[must_use]
    pub fn heartbeat_timeout_multiplier(mut self, multiplier: f64) -> Self {
        self.heartbeat_timeout_multiplier = Some(multiplier);
        self
    }

    /// Sets whether ResendRequests name an explicit end.
    #[must_use]
    pub const fn closed_resend_interval(mut self, closed: bool) -> Self {
        self.closed_resend_interval = Some(closed);
        self
    }

    /// Sets whether outgoing application messages are persisted.
    #[must_use]
    pub const fn persist_messages(mut self, persist: bool) -> Self {
        self.persist_messages = Some(persist);
        self
    }

    /// Sets the DefaultApplVerID for FIXT logons.
    #[must_use]
    pub fn default_appl_ver_id(mut self, id: impl Into<String>) -> Self {
        self.default_appl_ver_id = Some(id.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if a CompID is missing or longer
    /// than 32 bytes, the BeginString is not a FIX version, or a multiplier
    /// is not positive.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let begin_string = self.begin_string.unwrap_or_else(|| "FIX.4.4".to_string());
        if !begin_string.starts_with("FIX") {
            return Err(SessionError::Configuration(format!(
                "invalid begin string '{begin_string}'"
            )));
        }
        let sender = comp_id("sender_comp_id", self.sender_comp_id)?;
        let target = comp_id("target_comp_id", self.target_comp_id)?;

        let mut session_id = SessionId::new(begin_string, sender, target);
        if let Some(v) = self.sender_sub_id {
            session_id = session_id.with_sender_sub_id(v);
        }
        if let Some(v) = self.sender_location_id {
            session_id = session_id.with_sender_location_id(v);
        }
        if let Some(v) = self.target_sub_id {
            session_id = session_id.with_target_sub_id(v);
        }
        if let Some(v) = self.target_location_id {
            session_id = session_id.with_target_location_id(v);
        }
        if let Some(v) = self.qualifier {
            session_id = session_id.with_qualifier(v);
        }

        let mut config = SessionConfig::new(session_id);
        config.connection_type = self.connection_type;
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval = interval;
        }
        config.reset_on_logon = self.reset_on_logon;
        config.reset_on_logout = self.reset_on_logout;
        config.reset_on_disconnect = self.reset_on_disconnect;
        if let Some(timeout) = self.logon_timeout {
            config.logon_timeout = timeout;
        }
        if let Some(timeout) = self.logout_timeout {
            config.logout_timeout = timeout;
        }
        if let Some(validate) = self.validate_checksum {
            config.validate_checksum = validate;
        }
        if let Some(check) = self.check_comp_id {
            config.check_comp_id = check;
        }
        if let Some(check) = self.check_latency {
            config.check_latency = check;
        }
        if let Some(latency) = self.max_latency {
            config.max_latency = latency;
        }
        config.garbled_policy = self.garbled_policy;
        if let Some(m) = self.test_request_delay_multiplier {
            config.test_request_delay_multiplier = positive("test_request_delay_multiplier", m, true)?;
        }
        if let Some(m) = self.heartbeat_timeout_multiplier {
            config.heartbeat_timeout_multiplier = positive("heartbeat_timeout_multiplier", m, false)?;
        }
        if let Some(closed) = self.closed_resend_interval {
            config.closed_resend_interval = closed;
        }
        if let Some(persist) = self.persist_messages {
            config.persist_messages = persist;
        }
        config.default_appl_ver_id = self.default_appl_ver_id;

        Ok(config)
    }
}

fn comp_id(name: &str, value: Option<String>) -> Result<CompId, SessionError> {
    let value = value.ok_or_else(|| SessionError::Configuration(format!("{name} is required")))?;
    CompId::new(&value)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SessionError::Configuration(format!("{name} '{value}' is empty or too long")))
}

fn positive(name: &str, value: f64, allow_zero: bool) -> Result<f64, SessionError> {
    if value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0)) {
        Ok(value)
    } else {
        Err(SessionError::Configuration(format!(
            "{name} must be positive, got {value}"
        )))
    }
}
