use std::sync::Arc;

use parking_lot::Mutex;

use super::general_settings_repository::GeneralSettingsRepository;
use super::models_repository::ModelsRepository;
use super::provider_repository::{BoxFuture, ProviderRepository, RepositoryResult};
use crate::settings::models::{GeneralSettingsModel, LlmModel, ProviderConfig};

#[derive(Default)]
struct Documents {
    providers: Vec<ProviderConfig>,
    models: Vec<LlmModel>,
    general: GeneralSettingsModel,
}

/// Backs all three settings documents with process memory.
#[derive(Clone, Default)]
pub struct InMemorySettingsRepository {
    documents: Arc<Mutex<Documents>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProviderRepository for InMemorySettingsRepository {
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<ProviderConfig>>> {
        let documents = self.documents.clone();
        Box::pin(async move { Ok(documents.lock().providers.clone()) })
    }

    fn save_all(&self, providers: Vec<ProviderConfig>) -> BoxFuture<'static, RepositoryResult<()>> {
        let documents = self.documents.clone();
        Box::pin(async move {
            documents.lock().providers = providers;
            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        "memory".to_string()
    }
}

impl ModelsRepository for InMemorySettingsRepository {
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<LlmModel>>> {
        let documents = self.documents.clone();
        Box::pin(async move { Ok(documents.lock().models.clone()) })
    }

    fn save_all(&self, models: Vec<LlmModel>) -> BoxFuture<'static, RepositoryResult<()>> {
        let documents = self.documents.clone();
        Box::pin(async move {
            documents.lock().models = models;
            Ok(())
        })
    }
}

impl GeneralSettingsRepository for InMemorySettingsRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<GeneralSettingsModel>> {
        let documents = self.documents.clone();
        Box::pin(async move { Ok(documents.lock().general.clone()) })
    }

    fn save(&self, settings: GeneralSettingsModel) -> BoxFuture<'static, RepositoryResult<()>> {
        let documents = self.documents.clone();
        Box::pin(async move {
            documents.lock().general = settings;
            Ok(())
        })
    }
}
