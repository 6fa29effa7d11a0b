//! Session registry
//!
//! Maps [`SessionKey`]s to running sessions. Sessions never touch the
//! registry themselves: they report their end through [`SessionLifecycle`],
//! and the owner of the registry removes them.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use rtcsip_sip_core::{Request, Response};

use crate::errors::{Result, SessionError};
use crate::events::SessionEvent;
use crate::session::SessionHandle;
use crate::types::SessionKey;

/// Hooks a session calls at the edges of its life
pub trait SessionLifecycle: Send + Sync + 'static {
    /// An incoming session sent 180 and can be answered
    fn incoming_session_ready(
        &self,
        handle: SessionHandle,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    );

    /// The session closed; called exactly once
    fn session_destroyed(&self, key: &SessionKey);
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the session created by `create` unless `key` is taken
    pub(crate) fn insert_with(
        &self,
        key: SessionKey,
        create: impl FnOnce() -> SessionHandle,
    ) -> Result<SessionHandle> {
        match self.sessions.entry(key) {
            Entry::Occupied(entry) => Err(SessionError::AlreadyExists {
                key: entry.key().to_string(),
            }),
            Entry::Vacant(entry) => {
                let handle = create();
                debug!("Registered session {}", entry.key());
                entry.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    pub fn get(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Session an in-call request belongs to
    pub fn find_for_request(&self, request: &Request) -> Option<SessionHandle> {
        SessionKey::for_request(request)
            .iter()
            .find_map(|key| self.get(key))
    }

    /// Session a response belongs to
    pub fn find_for_response(&self, response: &Response) -> Option<SessionHandle> {
        SessionKey::for_response(response)
            .iter()
            .find_map(|key| self.get(key))
    }

    pub fn remove(&self, key: &SessionKey) -> Option<SessionHandle> {
        let removed = self.sessions.remove(key).map(|(_, handle)| handle);
        if removed.is_some() {
            debug!("Unregistered session {}", key);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionInput;
    use crate::types::{Direction, SessionStatus};
    use tokio::sync::watch;

    fn handle(key: &SessionKey) -> SessionHandle {
        let (inputs, _) = mpsc::unbounded_channel::<SessionInput>();
        let (_, status) = watch::channel(SessionStatus::Null);
        SessionHandle::new(key.clone(), Direction::Outgoing, inputs, status)
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new("call-1", "tag-a");
        registry.insert_with(key.clone(), || handle(&key)).unwrap();

        let mut created = false;
        let err = registry
            .insert_with(key.clone(), || {
                created = true;
                handle(&key)
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists { .. }));
        assert!(!created);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_by_either_tag() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new("call-2", "caller");
        registry.insert_with(key.clone(), || handle(&key)).unwrap();

        let by_from = SessionKey::candidates("call-2", Some("caller"), Some("callee"));
        let by_to = SessionKey::candidates("call-2", Some("callee"), Some("caller"));
        assert!(by_from.iter().any(|k| registry.get(k).is_some()));
        assert!(by_to.iter().any(|k| registry.get(k).is_some()));

        assert!(registry.remove(&key).is_some());
        assert!(registry.remove(&key).is_none());
        assert!(registry.is_empty());
    }
}
