//! Per-session conversation state
//!
//! Each session's history sits behind its own async mutex. A query holds the
//! lock for its whole read → generate → commit cycle, so two queries on the
//! same session run one after the other and never splice their messages.
//! History lives in memory only and is gone after a restart.

use crate::memory::ConversationState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// Session used when a caller does not name one: a single shared history.
pub const DEFAULT_SESSION: &str = "default";

pub type SessionHandle = Arc<Mutex<ConversationState>>;

pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(session_id) {
                return handle.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(session_id, "Creating conversation session");
                Arc::new(Mutex::new(ConversationState::new()))
            })
            .clone()
    }

    /// Copy of a session's committed history.
    pub async fn snapshot(&self, session_id: &str) -> Option<ConversationState> {
        let handle = self.sessions.read().await.get(session_id).cloned()?;
        let state = handle.lock().await;
        Some(state.clone())
    }

    /// Drops the session. Waits for an in-flight query on it to finish, then
    /// empties its history; the next query under the same id starts fresh.
    /// Returns false when the session does not exist.
    pub async fn clear(&self, session_id: &str) -> bool {
        let Some(handle) = self.sessions.write().await.remove(session_id) else {
            return false;
        };
        handle.lock().await.clear();
        info!(session_id, "Cleared conversation session");
        true
    }

    pub async fn clear_all(&self) {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for handle in sessions.values() {
            handle.lock().await.clear();
        }
        sessions.clear();
        info!(count, "Cleared all conversation sessions");
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    #[tokio::test]
    async fn test_same_id_shares_state() {
        let store = SessionStore::new();
        let a = store.get_or_create("s1").await;
        let b = store.get_or_create("s1").await;
        assert!(Arc::ptr_eq(&a, &b));

        a.lock().await.push(Message::user_prompt("hello"));
        assert_eq!(store.snapshot("s1").await.unwrap().len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        store
            .get_or_create("s1")
            .await
            .lock()
            .await
            .push(Message::user_prompt("one"));
        store.get_or_create("s2").await;

        assert_eq!(store.snapshot("s1").await.unwrap().len(), 1);
        assert!(store.snapshot("s2").await.unwrap().is_empty());
        assert!(store.snapshot("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_releases_the_entry() {
        let store = SessionStore::new();
        for i in 0..5 {
            store.get_or_create(&format!("s{}", i)).await;
        }
        assert_eq!(store.len().await, 5);

        assert!(store.clear("s3").await);
        assert_eq!(store.len().await, 4);
        assert!(!store.clear("s3").await);

        let fresh = store.get_or_create("s3").await;
        assert!(fresh.lock().await.is_empty());
        assert_eq!(store.len().await, 5);
    }

    #[tokio::test]
    async fn test_clear_waits_for_in_flight_query() {
        let store = Arc::new(SessionStore::new());
        let handle = store.get_or_create("s1").await;
        let mut guard = handle.lock().await;

        let clearing = tokio::spawn({
            let store = store.clone();
            async move { store.clear("s1").await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!clearing.is_finished());

        guard.push(Message::user_prompt("late commit"));
        drop(guard);

        assert!(clearing.await.unwrap());
        assert!(handle.lock().await.is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = SessionStore::new();
        store
            .get_or_create(DEFAULT_SESSION)
            .await
            .lock()
            .await
            .push(Message::user_prompt("one"));

        assert!(store.clear(DEFAULT_SESSION).await);
        assert!(store.snapshot(DEFAULT_SESSION).await.is_none());
        assert!(!store.clear("missing").await);

        store.clear_all().await;
        assert!(store.is_empty().await);
    }
}
