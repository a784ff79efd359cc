/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Resolution of inbound identities to sessions.
//!
//! An acceptor resolves the identity addressed by a connection's first Logon
//! through a [`SessionProvider`]. [`StaticSessionProvider`] accepts only
//! preconfigured sessions; [`DynamicSessionProvider`] creates sessions on
//! demand from a template.

use crate::application::Application;
use crate::config::SessionConfig;
use crate::id::SessionId;
use crate::registry::SessionRegistry;
use crate::session::Session;
use async_trait::async_trait;
use fixwire_store::MessageStoreFactory;
use std::sync::Arc;
use tracing::{info, warn};

/// CompID value in a template that matches any identity.
pub const WILDCARD: &str = "*";

/// Resolves an identity to a session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Returns the session for `id`, or `None` if the identity is unknown.
    async fn get_session(&self, id: &SessionId, registry: &SessionRegistry) -> Option<Arc<Session>>;
}

/// Provider that only knows sessions registered up front.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticSessionProvider;

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn get_session(&self, id: &SessionId, registry: &SessionRegistry) -> Option<Arc<Session>> {
        registry.get(id)
    }
}

/// Provider that creates and registers sessions for unknown identities
/// matching a template.
///
/// The template's CompIDs may be [`WILDCARD`]; its BeginString must match
/// exactly. Every other setting of a created session is copied from the
/// template.
pub struct DynamicSessionProvider {
    template: SessionConfig,
    store_factory: Arc<dyn MessageStoreFactory>,
    application: Arc<dyn Application>,
}

impl std::fmt::Debug for DynamicSessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicSessionProvider")
            .field("template", &self.template.session_id)
            .finish_non_exhaustive()
    }
}

impl DynamicSessionProvider {
    /// Creates a provider.
    ///
    /// # Arguments
    /// * `template` - Settings for created sessions; CompIDs may be `*`
    /// * `store_factory` - Creates one store per new session
    /// * `application` - Callbacks shared by every created session
    #[must_use]
    pub fn new(
        template: SessionConfig,
        store_factory: Arc<dyn MessageStoreFactory>,
        application: Arc<dyn Application>,
    ) -> Self {
        Self {
            template,
            store_factory,
            application,
        }
    }

    /// Returns true if `id` may be created from the template.
    #[must_use]
    pub fn matches(&self, id: &SessionId) -> bool {
        let template = &self.template.session_id;
        let comp_id_matches = |pattern: &str, value: &str| pattern == WILDCARD || pattern == value;

        template.begin_string() == id.begin_string()
            && comp_id_matches(template.sender_comp_id().as_str(), id.sender_comp_id().as_str())
            && comp_id_matches(template.target_comp_id().as_str(), id.target_comp_id().as_str())
    }
}

#[async_trait]
impl SessionProvider for DynamicSessionProvider {
    async fn get_session(&self, id: &SessionId, registry: &SessionRegistry) -> Option<Arc<Session>> {
        if let Some(session) = registry.get(id) {
            return Some(session);
        }
        if !self.matches(id) {
            return None;
        }

        let store = match self.store_factory.create(&id.to_string()) {
            Ok(store) => store,
            Err(err) => {
                warn!(session = %id, %err, "failed to create store for dynamic session");
                return None;
            }
        };
        let mut config = self.template.clone();
        config.session_id = id.clone();
        let created = Arc::new(Session::new(config, store, self.application.clone()));

        let session = registry.get_or_register(created.clone());
        if Arc::ptr_eq(&session, &created) {
            info!(session = %id, "created dynamic session");
            self.application.on_create(id).await;
        }
        Some(session)
    }
}
