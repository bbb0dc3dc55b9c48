use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::error::{RepositoryError, RepositoryResult};
use super::session_repository::{BoxFuture, SessionChange, SessionStore};
use crate::chat::models::{ChatSession, SessionPatch};

const CHANGE_CAPACITY: usize = 256;

/// Process-local session store, used by tests and `--ephemeral` runs.
#[derive(Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, ChatSession>>>,
    changes: broadcast::Sender<SessionChange>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    fn notify(&self, change: SessionChange) {
        let _ = self.changes.send(change);
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self, session: ChatSession) -> BoxFuture<'static, RepositoryResult<String>> {
        let store = self.clone();
        Box::pin(async move {
            let id = session.id.clone();
            {
                let mut sessions = store.sessions.lock();
                if sessions.contains_key(&id) {
                    return Err(RepositoryError::Conflict(id));
                }
                sessions.insert(id.clone(), session);
            }
            store.notify(SessionChange::Created(id.clone()));
            Ok(id)
        })
    }

    fn get(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<ChatSession>>> {
        let sessions = self.sessions.clone();
        let id = id.to_string();
        Box::pin(async move { Ok(sessions.lock().get(&id).cloned()) })
    }

    fn update(&self, id: &str, patch: SessionPatch) -> BoxFuture<'static, RepositoryResult<()>> {
        let store = self.clone();
        let id = id.to_string();
        Box::pin(async move {
            {
                let mut sessions = store.sessions.lock();
                let session = sessions
                    .get_mut(&id)
                    .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
                session.apply(patch);
            }
            store.notify(SessionChange::Updated(id));
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let store = self.clone();
        let id = id.to_string();
        Box::pin(async move {
            let removed = store.sessions.lock().remove(&id).is_some();
            if removed {
                store.notify(SessionChange::Deleted(id));
            }
            Ok(())
        })
    }

    fn list_recent(&self, limit: usize) -> BoxFuture<'static, RepositoryResult<Vec<ChatSession>>> {
        let sessions = self.sessions.clone();
        Box::pin(async move {
            let mut all: Vec<ChatSession> = sessions.lock().values().cloned().collect();
            all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            all.truncate(limit);
            Ok(all)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::Turn;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemorySessionStore::new();
        let session = ChatSession::new("New Chat", None, None);
        let id = store.create(session.clone()).await.unwrap();

        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let store = InMemorySessionStore::new();
        let session = ChatSession::new("New Chat", None, None);
        store.create(session.clone()).await.unwrap();
        let err = store.create(session).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemorySessionStore::new();
        let err = store
            .update("nope", SessionPatch::title("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let store = InMemorySessionStore::new();
        let mut rx = store.subscribe();
        let id = store
            .create(ChatSession::new("New Chat", None, None))
            .await
            .unwrap();
        store
            .update(&id, SessionPatch::messages(vec![Turn::user("hi")]))
            .await
            .unwrap();
        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), SessionChange::Created(id.clone()));
        assert_eq!(rx.recv().await.unwrap(), SessionChange::Updated(id.clone()));
        assert_eq!(rx.recv().await.unwrap(), SessionChange::Deleted(id));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_list_recent_orders_by_updated_at() {
        let store = InMemorySessionStore::new();
        let mut older = ChatSession::new("older", None, None);
        older.updated_at = older.updated_at - chrono::Duration::seconds(60);
        let newer = ChatSession::new("newer", None, None);
        store.create(older).await.unwrap();
        store.create(newer).await.unwrap();

        let recent = store.list_recent(10).await.unwrap();
        let titles: Vec<_> = recent.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["newer", "older"]);
        assert_eq!(store.list_recent(1).await.unwrap().len(), 1);
    }
}
