use std::future::Future;
use std::pin::Pin;

use tokio::sync::broadcast;

use super::error::RepositoryResult;
use crate::chat::models::{ChatSession, SessionPatch};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Change notification published after a write lands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionChange {
    Created(String),
    Updated(String),
    Deleted(String),
}

impl SessionChange {
    pub fn session_id(&self) -> &str {
        match self {
            SessionChange::Created(id) | SessionChange::Updated(id) | SessionChange::Deleted(id) => {
                id
            }
        }
    }
}

/// Repository trait for chat session persistence.
///
/// Every write is a single-key operation. Readers observe writes through
/// `subscribe`, which is what live queries are built on.
pub trait SessionStore: Send + Sync + 'static {
    /// Insert a new session and return its id. Fails with `Conflict` if the id exists.
    fn create(&self, session: ChatSession) -> BoxFuture<'static, RepositoryResult<String>>;

    fn get(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<ChatSession>>>;

    /// Read-modify-write of one record. Fails with `NotFound` if it is missing.
    fn update(&self, id: &str, patch: SessionPatch) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Remove a session. Deleting a missing id is not an error.
    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Most recently updated sessions first.
    fn list_recent(&self, limit: usize) -> BoxFuture<'static, RepositoryResult<Vec<ChatSession>>>;

    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;
}
