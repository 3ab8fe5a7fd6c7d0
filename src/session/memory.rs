//! In-process session store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Session, SessionError, SessionId, SessionStore};

/// Sessions held in a process-local map. Lost on restart and not shared
/// between instances.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .filter(|session| !session.is_expired(Utc::now()))
            .cloned())
    }

    async fn save(&self, id: &SessionId, session: Session) -> Result<(), SessionError> {
        self.sessions.write().await.insert(id.clone(), session);
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> Result<(), SessionError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn cycle_key(&self, id: &SessionId) -> Result<SessionId, SessionError> {
        let mut sessions = self.sessions.write().await;
        let new_id = SessionId::generate();
        if let Some(session) = sessions.remove(id) {
            sessions.insert(new_id.clone(), session);
        }
        Ok(new_id)
    }

    async fn clear_expired(&self) -> Result<usize, SessionError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "Cleared expired sessions");
        }
        Ok(removed)
    }

    async fn consume_oauth_state(
        &self,
        id: &SessionId,
        returned: &str,
    ) -> Result<bool, SessionError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .get_mut(id)
            .filter(|session| !session.is_expired(Utc::now()))
            .is_some_and(|session| session.oauth.consume_state(returned)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_expired_sessions_are_invisible() {
        let store = MemorySessionStore::new();
        let id = SessionId::generate();
        store.save(&id, Session::new(Duration::seconds(-1))).await.unwrap();

        assert!(store.load(&id).await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_clear_expired_keeps_live_sessions() {
        let store = MemorySessionStore::new();
        let live = SessionId::generate();
        store.save(&live, Session::new(Duration::hours(1))).await.unwrap();
        for _ in 0..3 {
            store
                .save(&SessionId::generate(), Session::new(Duration::seconds(-10)))
                .await
                .unwrap();
        }

        assert_eq!(store.clear_expired().await.unwrap(), 3);
        assert_eq!(store.len().await, 1);
        assert!(store.load(&live).await.unwrap().is_some());
        assert_eq!(store.clear_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_consumers_get_state_once() {
        let store = std::sync::Arc::new(MemorySessionStore::new());
        let id = SessionId::generate();
        let mut session = Session::new(Duration::hours(1));
        session.oauth.set_state("csrf");
        store.save(&id, session).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move { store.consume_oauth_state(&id, "csrf").await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(store.load(&id).await.unwrap().unwrap().oauth.state().is_none());
    }

    #[tokio::test]
    async fn test_consume_oauth_state_mismatch_keeps_state() {
        let store = MemorySessionStore::new();
        let id = SessionId::generate();
        let mut session = Session::new(Duration::hours(1));
        session.oauth.set_state("csrf");
        store.save(&id, session).await.unwrap();

        assert!(!store.consume_oauth_state(&id, "forged").await.unwrap());
        assert!(
            !store
                .consume_oauth_state(&SessionId::generate(), "csrf")
                .await
                .unwrap()
        );
        assert_eq!(
            store.load(&id).await.unwrap().unwrap().oauth.state(),
            Some("csrf")
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemorySessionStore::new();
        let id = SessionId::generate();
        store.save(&id, Session::new(Duration::hours(1))).await.unwrap();
        store.remove(&id).await.unwrap();
        assert!(store.is_empty().await);
    }
}
