//! Session persistence.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::error::SessionError;
use crate::id::SessionId;

/// Session data as stored between requests.
pub type SessionData = Map<String, Value>;

/// Backing store for session data.
///
/// Stores outlive every request; only the data written through
/// [`SessionStore::save`] survives from one request to the next.
pub trait SessionStore: Send + Sync {
    /// Load the data for `id`, or `None` if the session is unknown.
    fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError>;

    /// Persist the data for `id`.
    fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError>;

    /// Forget `id`.
    fn destroy(&self, id: &SessionId) -> Result<(), SessionError>;
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, SessionData>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SessionId, SessionData>>, SessionError> {
        self.sessions
            .lock()
            .map_err(|_| SessionError::Store("session store lock poisoned".to_string()))
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        Ok(self.guard()?.get(id).cloned())
    }

    fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError> {
        self.guard()?.insert(id.clone(), data.clone());
        Ok(())
    }

    fn destroy(&self, id: &SessionId) -> Result<(), SessionError> {
        self.guard()?.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySessionStore::new();
        let id = SessionId::new("abc");
        assert!(store.load(&id).unwrap().is_none());

        let mut data = SessionData::new();
        data.insert("user".to_string(), Value::from("alice"));
        store.save(&id, &data).unwrap();
        assert_eq!(store.load(&id).unwrap(), Some(data));
        assert_eq!(store.len(), 1);

        store.destroy(&id).unwrap();
        assert!(store.is_empty());
    }
}
