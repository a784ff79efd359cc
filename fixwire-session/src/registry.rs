/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Registry of known sessions, keyed by identity.

use crate::id::SessionId;
use crate::session::Session;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Concurrent map of identities to sessions.
///
/// One registry is shared by an engine's connections, dispatcher and timer.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under its identity, replacing any previous entry.
    ///
    /// Returns the replaced session, if any.
    pub fn register(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let id = session.id().clone();
        self.sessions.write().insert(id, session)
    }

    /// Registers `session` unless its identity is already known, returning
    /// whichever session ends up registered.
    pub fn get_or_register(&self, session: Arc<Session>) -> Arc<Session> {
        let mut sessions = self.sessions.write();
        sessions
            .entry(session.id().clone())
            .or_insert(session)
            .clone()
    }

    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    /// Snapshot of all registered sessions.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::NoOpApplication;
    use crate::config::SessionConfigBuilder;
    use fixwire_store::MemoryStore;

    fn session(target: &str) -> Arc<Session> {
        let config = SessionConfigBuilder::new()
            .sender_comp_id("SERVER")
            .target_comp_id(target)
            .build()
            .unwrap();
        Arc::new(Session::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(NoOpApplication),
        ))
    }

    #[test]
    fn test_register_and_get() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        let a = session("A");
        let id = a.id().clone();
        assert!(registry.register(a.clone()).is_none());
        registry.register(session("B"));

        assert_eq!(registry.len(), 2);
        assert!(Arc::ptr_eq(&registry.get(&id).unwrap(), &a));
        assert_eq!(registry.sessions().len(), 2);

        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_or_register_keeps_existing() {
        let registry = SessionRegistry::new();
        let first = session("A");
        let kept = registry.get_or_register(first.clone());
        assert!(Arc::ptr_eq(&kept, &first));

        let kept = registry.get_or_register(session("A"));
        assert!(Arc::ptr_eq(&kept, &first));
        assert_eq!(registry.len(), 1);
    }
}
