use std::collections::BTreeMap;

use super::{Session, SessionId, SessionStore, SessionStoreError, SessionSummary};

/// Keeps sessions in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: BTreeMap<SessionId, Session>,
    next_id: SessionId,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: SessionId) -> Result<Option<Session>, SessionStoreError> {
        Ok(self.sessions.get(&id).cloned())
    }

    fn put(&mut self, id: SessionId, session: &Session) -> Result<(), SessionStoreError> {
        self.sessions.insert(id, session.clone());
        self.next_id = self.next_id.max(id + 1);
        Ok(())
    }

    fn delete(&mut self, id: SessionId) -> Result<bool, SessionStoreError> {
        Ok(self.sessions.remove(&id).is_some())
    }

    fn list(&self) -> Result<Vec<SessionSummary>, SessionStoreError> {
        Ok(self
            .sessions
            .iter()
            .map(|(id, session)| SessionSummary::of(*id, session))
            .collect())
    }

    fn next_id(&mut self) -> Result<SessionId, SessionStoreError> {
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;

    #[test]
    fn put_get_delete() {
        let mut store = MemorySessionStore::new();
        let session = Session::new("one", &Config::default());

        store.put(7, &session).expect("put");
        assert_eq!(store.get(7).expect("get"), Some(session));
        assert!(store.delete(7).expect("delete"));
        assert!(!store.delete(7).expect("delete again"));
        assert_eq!(store.get(7).expect("get"), None);
    }

    #[test]
    fn next_id_skips_ids_already_stored() {
        let mut store = MemorySessionStore::new();
        store
            .put(4, &Session::new("x", &Config::default()))
            .expect("put");
        assert_eq!(store.next_id().expect("id"), 5);
        assert_eq!(store.next_id().expect("id"), 6);
    }
}
