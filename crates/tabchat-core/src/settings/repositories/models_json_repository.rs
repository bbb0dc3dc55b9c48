use std::path::PathBuf;

use super::json_file_repository::{app_paths, read_json, write_json_atomic};
use super::models_repository::ModelsRepository;
use super::provider_repository::{BoxFuture, RepositoryResult};
use crate::settings::models::LlmModel;

pub struct JsonModelsRepository {
    file_path: PathBuf,
}

impl JsonModelsRepository {
    pub fn new() -> RepositoryResult<Self> {
        Ok(Self::with_path(app_paths()?.models_file()))
    }

    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl ModelsRepository for JsonModelsRepository {
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<LlmModel>>> {
        let path = self.file_path.clone();
        Box::pin(async move { Ok(read_json(&path).await?.unwrap_or_default()) })
    }

    fn save_all(&self, models: Vec<LlmModel>) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.file_path.clone();
        Box::pin(async move { write_json_atomic(&path, &models).await })
    }
}
