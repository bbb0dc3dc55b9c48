use std::path::PathBuf;

use super::general_settings_repository::GeneralSettingsRepository;
use super::json_file_repository::{app_paths, read_json, write_json_atomic};
use super::provider_repository::{BoxFuture, RepositoryResult};
use crate::settings::models::GeneralSettingsModel;

pub struct GeneralSettingsJsonRepository {
    file_path: PathBuf,
}

impl GeneralSettingsJsonRepository {
    pub fn new() -> RepositoryResult<Self> {
        Ok(Self::with_path(app_paths()?.general_settings_file()))
    }

    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl GeneralSettingsRepository for GeneralSettingsJsonRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<GeneralSettingsModel>> {
        let path = self.file_path.clone();
        Box::pin(async move { Ok(read_json(&path).await?.unwrap_or_default()) })
    }

    fn save(&self, settings: GeneralSettingsModel) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.file_path.clone();
        Box::pin(async move { write_json_atomic(&path, &settings).await })
    }
}
