/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session identity.
//!
//! A [`SessionId`] names a logical counterparty relationship independently of
//! the transport connection that currently carries it.

use fixwire_core::message::Message;
use fixwire_core::tags;
use fixwire_core::types::CompId;
use std::fmt;

/// Unique identifier for a FIX session, seen from our side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId {
    begin_string: String,
    sender_comp_id: CompId,
    sender_sub_id: Option<String>,
    sender_location_id: Option<String>,
    target_comp_id: CompId,
    target_sub_id: Option<String>,
    target_location_id: Option<String>,
    qualifier: Option<String>,
}

impl SessionId {
    /// Creates a new session ID.
    ///
    /// # Arguments
    /// * `begin_string` - The FIX version string
    /// * `sender_comp_id` - Our CompID
    /// * `target_comp_id` - The counterparty CompID
    #[must_use]
    pub fn new(begin_string: impl Into<String>, sender_comp_id: CompId, target_comp_id: CompId) -> Self {
        Self {
            begin_string: begin_string.into(),
            sender_comp_id,
            sender_sub_id: None,
            sender_location_id: None,
            target_comp_id,
            target_sub_id: None,
            target_location_id: None,
            qualifier: None,
        }
    }

    /// Builds the identity an inbound message addresses: its target is our
    /// sender and its sender is our target.
    ///
    /// Returns `None` if BeginString or either CompID is missing or too long.
    #[must_use]
    pub fn from_inbound(message: &Message) -> Option<Self> {
        let header = message.header();
        let begin_string = header.get(tags::BEGIN_STRING)?;
        let sender = CompId::new(header.get(tags::TARGET_COMP_ID)?)?;
        let target = CompId::new(header.get(tags::SENDER_COMP_ID)?)?;
        let owned = |tag| header.get(tag).map(str::to_string);

        Some(Self {
            begin_string: begin_string.to_string(),
            sender_comp_id: sender,
            sender_sub_id: owned(tags::TARGET_SUB_ID),
            sender_location_id: owned(tags::TARGET_LOCATION_ID),
            target_comp_id: target,
            target_sub_id: owned(tags::SENDER_SUB_ID),
            target_location_id: owned(tags::SENDER_LOCATION_ID),
            qualifier: None,
        })
    }

    /// Sets the sender sub ID.
    #[must_use]
    pub fn with_sender_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.sender_sub_id = Some(sub_id.into());
        self
    }

    /// Sets the sender location ID.
    #[must_use]
    pub fn with_sender_location_id(mut self, location_id: impl Into<String>) -> Self {
        self.sender_location_id = Some(location_id.into());
        self
    }

    /// Sets the target sub ID.
    #[must_use]
    pub fn with_target_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.target_sub_id = Some(sub_id.into());
        self
    }

    /// Sets the target location ID.
    #[must_use]
    pub fn with_target_location_id(mut self, location_id: impl Into<String>) -> Self {
        self.target_location_id = Some(location_id.into());
        self
    }

    /// Sets a qualifier distinguishing otherwise identical sessions.
    #[must_use]
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// The BeginString.
    #[must_use]
    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }

    /// Our CompID.
    #[must_use]
    pub const fn sender_comp_id(&self) -> &CompId {
        &self.sender_comp_id
    }

    /// The counterparty CompID.
    #[must_use]
    pub const fn target_comp_id(&self) -> &CompId {
        &self.target_comp_id
    }

    /// Our SubID.
    #[must_use]
    pub fn sender_sub_id(&self) -> Option<&str> {
        self.sender_sub_id.as_deref()
    }

    /// Our LocationID.
    #[must_use]
    pub fn sender_location_id(&self) -> Option<&str> {
        self.sender_location_id.as_deref()
    }

    /// The counterparty SubID.
    #[must_use]
    pub fn target_sub_id(&self) -> Option<&str> {
        self.target_sub_id.as_deref()
    }

    /// The counterparty LocationID.
    #[must_use]
    pub fn target_location_id(&self) -> Option<&str> {
        self.target_location_id.as_deref()
    }

    /// The session qualifier.
    #[must_use]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Returns true for FIXT transport sessions.
    #[must_use]
    pub fn is_fixt(&self) -> bool {
        self.begin_string.starts_with("FIXT")
    }
}

fn write_party(
    f: &mut fmt::Formatter<'_>,
    comp_id: &CompId,
    sub_id: Option<&str>,
    location_id: Option<&str>,
) -> fmt::Result {
    write!(f, "{comp_id}")?;
    if sub_id.is_some() || location_id.is_some() {
        write!(f, "/{}", sub_id.unwrap_or_default())?;
    }
    if let Some(location_id) = location_id {
        write!(f, "/{location_id}")?;
    }
    Ok(())
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.begin_string)?;
        write_party(
            f,
            &self.sender_comp_id,
            self.sender_sub_id(),
            self.sender_location_id(),
        )?;
        write!(f, "->")?;
        write_party(
            f,
            &self.target_comp_id,
            self.target_sub_id(),
            self.target_location_id(),
        )?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, ":{qualifier}")?;
        }
        Ok(())
    }
}
