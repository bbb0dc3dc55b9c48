use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::error::RepositoryResult;
use super::session_repository::SessionStore;
use crate::chat::models::ChatSession;

/// Live view of one session record.
///
/// Yields the current record immediately, then a fresh read after every
/// change to that id. `Ok(None)` means the session does not exist (or was
/// deleted). After the first read the stream keeps only a weak handle, so it
/// ends once every other owner of the store has dropped it.
pub fn watch_session(
    store: Arc<dyn SessionStore>,
    id: impl Into<String>,
) -> BoxStream<'static, RepositoryResult<Option<ChatSession>>> {
    let id = id.into();
    Box::pin(async_stream::stream! {
        // Subscribe before the first read so no write slips between them.
        let mut changes = store.subscribe();
        yield store.get(&id).await;

        let weak = Arc::downgrade(&store);
        drop(store);

        loop {
            match changes.recv().await {
                Ok(change) if change.session_id() != id => continue,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(session_id = %id, skipped, "Live query lagged, re-reading");
                }
                Err(RecvError::Closed) => break,
            }
            let Some(store) = weak.upgrade() else {
                break;
            };
            yield store.get(&id).await;
        }
    })
}
