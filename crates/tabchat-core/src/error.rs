use thiserror::Error;

use crate::chat::repositories::RepositoryError;

/// Errors surfaced synchronously by `ChatEngine` operations.
///
/// Failures inside a running generation never show up here. They end as an
/// assistant turn describing the problem.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage failure: {0}")]
    Storage(#[from] RepositoryError),

    #[error("session {0} is already generating")]
    Busy(String),

    #[error("message index {index} is not valid here (session has {len} messages)")]
    InvalidIndex { index: usize, len: usize },

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("no session is open")]
    Unbound,
}

pub type EngineResult<T> = Result<T, EngineError>;
