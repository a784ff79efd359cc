/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Engine builder for fluent configuration.
//!
//! This module provides a builder API for configuring FIX engines.

use crate::connection::ConnectionSettings;
use crate::dispatcher::{DEFAULT_DISPATCH_QUEUE_DEPTH, DEFAULT_POLL_INTERVAL, DispatchMode, Dispatcher};
use crate::engine::{Engine, EngineContext};
use crate::timer::DEFAULT_TIMER_INTERVAL;
use fixwire_core::error::SessionError;
use fixwire_session::{
    Application, DynamicSessionProvider, NoOpApplication, Session, SessionConfig, SessionProvider,
    SessionRegistry, StaticSessionProvider,
};
use fixwire_store::{MemoryStoreFactory, MessageStoreFactory};
use fixwire_tagvalue::Charset;
use fixwire_tagvalue::frame::{DEFAULT_MAX_BODY_LENGTH, DEFAULT_MAX_UNDECODED};
use fixwire_transport::{DEFAULT_DRAIN_TIMEOUT, WriteMode};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builder for configuring a FIX engine.
pub struct EngineBuilder {
    /// Application callback handler.
    application: Arc<dyn Application>,
    /// Preconfigured sessions.
    sessions: Vec<SessionConfig>,
    /// Template for sessions created on demand.
    dynamic_template: Option<SessionConfig>,
    store_factory: Arc<dyn MessageStoreFactory>,
    dispatch_mode: DispatchMode,
    dispatch_queue_depth: usize,
    poll_interval: Duration,
    timer_interval: Duration,
    max_undecoded: usize,
    max_message_size: usize,
    write_mode: WriteMode,
    drain_timeout: Duration,
    charset: Charset,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("sessions", &self.sessions.len())
            .field("dynamic", &self.dynamic_template.is_some())
            .field("dispatch_mode", &self.dispatch_mode)
            .field("write_mode", &self.write_mode)
            .field("charset", &self.charset)
            .finish_non_exhaustive()
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Creates a new engine builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            application: Arc::new(NoOpApplication),
            sessions: Vec::new(),
            dynamic_template: None,
            store_factory: Arc::new(MemoryStoreFactory),
            dispatch_mode: DispatchMode::default(),
            dispatch_queue_depth: DEFAULT_DISPATCH_QUEUE_DEPTH,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timer_interval: DEFAULT_TIMER_INTERVAL,
            max_undecoded: DEFAULT_MAX_UNDECODED,
            max_message_size: DEFAULT_MAX_BODY_LENGTH,
            write_mode: WriteMode::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            charset: Charset::default(),
        }
    }

    /// Sets the application callback handler.
    #[must_use]
    pub fn with_application(mut self, application: Arc<dyn Application>) -> Self {
        self.application = application;
        self
    }

    /// Adds a session configuration.
    #[must_use]
    pub fn add_session(mut self, config: SessionConfig) -> Self {
        self.sessions.push(config);
        self
    }

    /// Accepts unknown identities matching `template`, whose CompIDs may be
    /// `*`. Without a template only added sessions are accepted.
    #[must_use]
    pub fn with_dynamic_sessions(mut self, template: SessionConfig) -> Self {
        self.dynamic_template = Some(template);
        self
    }

    /// Sets the factory creating each session's message store.
    #[must_use]
    pub fn with_store_factory(mut self, factory: Arc<dyn MessageStoreFactory>) -> Self {
        self.store_factory = factory;
        self
    }

    #[must_use]
    pub const fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Sets the depth of each dispatch worker's queue.
    #[must_use]
    pub const fn with_dispatch_queue_depth(mut self, depth: usize) -> Self {
        self.dispatch_queue_depth = depth;
        self
    }

    /// Sets how long a worker waits on its queue before rechecking for stop.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the session timer period.
    #[must_use]
    pub const fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval = interval;
        self
    }

    /// Sets the garbage tolerance of each connection's frame decoder.
    #[must_use]
    pub const fn with_max_undecoded(mut self, max: usize) -> Self {
        self.max_undecoded = max;
        self
    }

    /// Sets the largest accepted BodyLength.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    #[must_use]
    pub const fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Sets how long queued frames may take to flush when a connection closes.
    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Sets the charset used to encode outbound messages.
    #[must_use]
    pub const fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Returns the configured sessions.
    #[must_use]
    pub fn sessions(&self) -> &[SessionConfig] {
        &self.sessions
    }

    #[must_use]
    pub const fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch_mode
    }

    #[must_use]
    pub const fn timer_interval(&self) -> Duration {
        self.timer_interval
    }

    #[must_use]
    pub const fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Returns the application handler.
    #[must_use]
    pub fn application(&self) -> Arc<dyn Application> {
        Arc::clone(&self.application)
    }

    /// Creates every configured session and starts the engine's timer.
    ///
    /// # Errors
    /// `SessionError::Configuration` if two sessions share an identity, or a
    /// store error if a session's store cannot be created.
    pub async fn build(self) -> Result<Engine, SessionError> {
        let registry = Arc::new(SessionRegistry::new());
        for config in self.sessions {
            let id = config.session_id.clone();
            if registry.get(&id).is_some() {
                return Err(SessionError::Configuration(format!(
                    "duplicate session {id}"
                )));
            }
            let store = self.store_factory.create(&id.to_string())?;
            let session = Session::new(config, store, self.application.clone())
                .with_charset(self.charset);
            registry.register(Arc::new(session));
            self.application.on_create(&id).await;
            info!(session = %id, "session created");
        }

        let provider: Arc<dyn SessionProvider> = match self.dynamic_template {
            Some(template) => Arc::new(DynamicSessionProvider::new(
                template,
                self.store_factory.clone(),
                self.application.clone(),
            )),
            None => Arc::new(StaticSessionProvider),
        };
        let context = EngineContext {
            registry,
            provider,
            dispatcher: Dispatcher::new(
                self.dispatch_mode,
                self.dispatch_queue_depth,
                self.poll_interval,
            ),
            settings: ConnectionSettings {
                max_undecoded: self.max_undecoded,
                max_message_size: self.max_message_size,
                write_mode: self.write_mode,
                drain_timeout: self.drain_timeout,
            },
        };
        Ok(Engine::start(context, self.timer_interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixwire_session::SessionConfigBuilder;

    fn config(target: &str) -> SessionConfig {
        SessionConfigBuilder::new()
            .sender_comp_id("SERVER")
            .target_comp_id(target)
            .build()
            .unwrap()
    }

    #[test]
    fn test_engine_builder_default() {
        let builder = EngineBuilder::new();
        assert!(builder.sessions().is_empty());
        assert_eq!(builder.dispatch_mode(), DispatchMode::SingleThreaded);
        assert_eq!(builder.timer_interval(), Duration::from_secs(1));
        assert_eq!(builder.write_mode(), WriteMode::default());
    }

    #[tokio::test]
    async fn test_engine_builder_registers_sessions() {
        let engine = EngineBuilder::new()
            .add_session(config("A"))
            .add_session(config("B"))
            .with_dispatch_mode(DispatchMode::PerSession)
            .build()
            .await
            .unwrap();

        assert_eq!(engine.registry().len(), 2);
        engine.stop(Duration::ZERO).await;
    }

    #[tokio::test]
    async fn test_engine_builder_rejects_duplicate_identity() {
        let err = EngineBuilder::new()
            .add_session(config("A"))
            .add_session(config("A"))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }
}
