use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::settings::models::ProviderConfig;

/// Repository error type - abstracts over specific implementation errors
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum RepositoryError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Path error: {0}")]
    PathError(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait ProviderRepository: Send + Sync + 'static {
    /// Load all provider configurations from storage
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<ProviderConfig>>>;

    /// Save all provider configurations to storage
    fn save_all(&self, providers: Vec<ProviderConfig>) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Get the storage path (for diagnostics)
    fn storage_path(&self) -> String;
}
