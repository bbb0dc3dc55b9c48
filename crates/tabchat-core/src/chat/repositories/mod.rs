pub mod error;
pub mod in_memory_repository;
pub mod live_query;
pub mod session_repository;
pub mod session_sqlite_repository;

pub use error::{RepositoryError, RepositoryResult};
pub use in_memory_repository::InMemorySessionStore;
pub use live_query::watch_session;
pub use session_repository::{BoxFuture, SessionChange, SessionStore};
pub use session_sqlite_repository::SessionSqliteStore;
