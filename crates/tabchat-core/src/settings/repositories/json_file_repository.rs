use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::provider_repository::{
    BoxFuture, ProviderRepository, RepositoryError, RepositoryResult,
};
use crate::config::AppPaths;
use crate::settings::models::ProviderConfig;

pub(crate) fn app_paths() -> RepositoryResult<AppPaths> {
    AppPaths::from_config_dir()
        .ok_or_else(|| RepositoryError::PathError("Cannot determine config directory".into()))
}

/// Read a JSON document, returning `None` when the file does not exist yet.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> RepositoryResult<Option<T>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Write atomically using temp file + rename.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> RepositoryResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, json).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

/// Providers stored as a JSON array in `providers.json`.
pub struct JsonFileRepository {
    file_path: PathBuf,
}

impl JsonFileRepository {
    pub fn new() -> RepositoryResult<Self> {
        Ok(Self::with_path(app_paths()?.providers_file()))
    }

    /// Create repository with custom path (for testing)
    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl ProviderRepository for JsonFileRepository {
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<ProviderConfig>>> {
        let path = self.file_path.clone();
        Box::pin(async move { Ok(read_json(&path).await?.unwrap_or_default()) })
    }

    fn save_all(&self, providers: Vec<ProviderConfig>) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.file_path.clone();
        Box::pin(async move { write_json_atomic(&path, &providers).await })
    }

    fn storage_path(&self) -> String {
        self.file_path.to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::with_path(dir.path().join("providers.json"));
        assert!(repo.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("providers.json");
        let repo = JsonFileRepository::with_path(path.clone());
        let providers = vec![
            ProviderConfig::new("openai", "OpenAI", "openai").with_api_key("sk-1"),
            ProviderConfig::new("local", "Ollama", "ollama").with_enabled(false),
        ];
        repo.save_all(providers.clone()).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(repo.load_all().await.unwrap(), providers);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        tokio::fs::write(&path, "not json").await.unwrap();
        let err = JsonFileRepository::with_path(path).load_all().await.unwrap_err();
        assert!(matches!(err, RepositoryError::SerializationError(_)));
    }
}
