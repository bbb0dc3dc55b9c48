use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{error, info};

use crate::config::AppPaths;
use crate::settings::models::{
    GeneralSettingsModel, GeneralSettingsPatch, LlmModel, ModelsModel, ProviderConfig,
    ProvidersModel,
};
use crate::settings::repositories::{
    GeneralSettingsJsonRepository, GeneralSettingsRepository, InMemorySettingsRepository,
    JsonFileRepository, JsonModelsRepository, ModelsRepository, ProviderRepository,
    RepositoryError,
};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings persistence failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("model {model_id} is already registered for provider {provider_id}")]
    DuplicateModel {
        provider_id: String,
        model_id: String,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Provider, model-registry and general settings, cached in memory and
/// written through to their repositories.
///
/// Every mutation applies to the cache first, then persists the new document.
/// Locks are released before any await.
pub struct SettingsStore {
    providers: RwLock<ProvidersModel>,
    models: RwLock<ModelsModel>,
    general: RwLock<GeneralSettingsModel>,
    provider_repo: Arc<dyn ProviderRepository>,
    models_repo: Arc<dyn ModelsRepository>,
    general_repo: Arc<dyn GeneralSettingsRepository>,
}

impl SettingsStore {
    pub fn new(
        provider_repo: Arc<dyn ProviderRepository>,
        models_repo: Arc<dyn ModelsRepository>,
        general_repo: Arc<dyn GeneralSettingsRepository>,
    ) -> Self {
        Self {
            providers: RwLock::new(ProvidersModel::new()),
            models: RwLock::new(ModelsModel::new()),
            general: RwLock::new(GeneralSettingsModel::default()),
            provider_repo,
            models_repo,
            general_repo,
        }
    }

    /// Settings that live only for this process.
    pub fn in_memory() -> Self {
        let repo = Arc::new(InMemorySettingsRepository::new());
        Self::new(repo.clone(), repo.clone(), repo)
    }

    /// JSON-file settings under `paths`. Call `load` before use.
    pub fn json_at(paths: &AppPaths) -> Self {
        Self::new(
            Arc::new(JsonFileRepository::with_path(paths.providers_file())),
            Arc::new(JsonModelsRepository::with_path(paths.models_file())),
            Arc::new(GeneralSettingsJsonRepository::with_path(
                paths.general_settings_file(),
            )),
        )
    }

    /// Replace the cache with what the repositories hold.
    pub async fn load(&self) -> SettingsResult<()> {
        let providers = self.provider_repo.load_all().await?;
        let models = self.models_repo.load_all().await?;
        let general = self.general_repo.load().await?;
        info!(
            providers = providers.len(),
            models = models.len(),
            path = %self.provider_repo.storage_path(),
            "Loaded settings"
        );
        self.providers.write().replace_all(providers);
        self.models.write().replace_all(models);
        *self.general.write() = general;
        Ok(())
    }

    pub fn providers(&self) -> Vec<ProviderConfig> {
        self.providers.read().providers().to_vec()
    }

    pub fn provider(&self, id: &str) -> Option<ProviderConfig> {
        self.providers.read().get(id).cloned()
    }

    pub async fn upsert_provider(&self, config: ProviderConfig) -> SettingsResult<()> {
        let snapshot = {
            let mut providers = self.providers.write();
            providers.upsert(config);
            providers.providers().to_vec()
        };
        self.save_providers(snapshot).await
    }

    /// Returns false if no provider had that id.
    pub async fn remove_provider(&self, id: &str) -> SettingsResult<bool> {
        let snapshot = {
            let mut providers = self.providers.write();
            if !providers.remove(id) {
                return Ok(false);
            }
            providers.providers().to_vec()
        };
        self.save_providers(snapshot).await?;
        Ok(true)
    }

    pub async fn set_provider_enabled(&self, id: &str, enabled: bool) -> SettingsResult<()> {
        let snapshot = {
            let mut providers = self.providers.write();
            let provider = providers
                .get_mut(id)
                .ok_or_else(|| SettingsError::UnknownProvider(id.to_string()))?;
            provider.enabled = enabled;
            providers.providers().to_vec()
        };
        self.save_providers(snapshot).await
    }

    pub fn models(&self) -> Vec<LlmModel> {
        self.models.read().models().to_vec()
    }

    pub fn model_for(&self, provider_id: &str, model_id: &str) -> Option<LlmModel> {
        self.models.read().find_pair(provider_id, model_id).cloned()
    }

    /// Register a (provider, model) pair. The provider must exist.
    pub async fn add_model(&self, provider_id: &str, model_id: &str) -> SettingsResult<LlmModel> {
        if self.provider(provider_id).is_none() {
            return Err(SettingsError::UnknownProvider(provider_id.to_string()));
        }
        let model = LlmModel::new(provider_id, model_id);
        let snapshot = {
            let mut models = self.models.write();
            if !models.add_model(model.clone()) {
                return Err(SettingsError::DuplicateModel {
                    provider_id: provider_id.to_string(),
                    model_id: model_id.to_string(),
                });
            }
            models.models().to_vec()
        };
        self.save_models(snapshot).await?;
        Ok(model)
    }

    pub async fn set_model_enabled(&self, id: &str, enabled: bool) -> SettingsResult<()> {
        let snapshot = {
            let mut models = self.models.write();
            let mut model = models
                .get_model(id)
                .cloned()
                .ok_or_else(|| SettingsError::UnknownModel(id.to_string()))?;
            model.enabled = enabled;
            models.update_model(model);
            models.models().to_vec()
        };
        self.save_models(snapshot).await
    }

    pub async fn delete_model(&self, id: &str) -> SettingsResult<bool> {
        let snapshot = {
            let mut models = self.models.write();
            if !models.delete_model(id) {
                return Ok(false);
            }
            models.models().to_vec()
        };
        self.save_models(snapshot).await?;
        Ok(true)
    }

    pub fn general(&self) -> GeneralSettingsModel {
        self.general.read().clone()
    }

    pub async fn update_general(
        &self,
        patch: GeneralSettingsPatch,
    ) -> SettingsResult<GeneralSettingsModel> {
        let snapshot = {
            let mut general = self.general.write();
            general.apply(patch);
            general.clone()
        };
        if let Err(e) = self.general_repo.save(snapshot.clone()).await {
            error!(error = ?e, "Failed to save general settings, changes will be lost on restart");
            return Err(e.into());
        }
        Ok(snapshot)
    }

    async fn save_providers(&self, providers: Vec<ProviderConfig>) -> SettingsResult<()> {
        self.provider_repo.save_all(providers).await.map_err(|e| {
            error!(error = ?e, "Failed to save providers, changes will be lost on restart");
            e.into()
        })
    }

    async fn save_models(&self, models: Vec<LlmModel>) -> SettingsResult<()> {
        self.models_repo.save_all(models).await.map_err(|e| {
            error!(error = ?e, "Failed to save models, changes will be lost on restart");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_model_requires_provider_and_rejects_duplicates() {
        let settings = SettingsStore::in_memory();
        let err = settings.add_model("openai", "gpt-4o").await.unwrap_err();
        assert!(matches!(err, SettingsError::UnknownProvider(_)));

        settings
            .upsert_provider(ProviderConfig::new("openai", "OpenAI", "openai"))
            .await
            .unwrap();
        let model = settings.add_model("openai", "gpt-4o").await.unwrap();
        assert_eq!(model.id, "openai-gpt-4o");

        let err = settings.add_model("openai", "gpt-4o").await.unwrap_err();
        assert!(matches!(err, SettingsError::DuplicateModel { .. }));
        assert_eq!(settings.models().len(), 1);
    }

    #[tokio::test]
    async fn test_toggles() {
        let settings = SettingsStore::in_memory();
        settings
            .upsert_provider(ProviderConfig::new("p", "P", "openai"))
            .await
            .unwrap();
        settings.add_model("p", "m").await.unwrap();

        settings.set_provider_enabled("p", false).await.unwrap();
        settings.set_model_enabled("p-m", false).await.unwrap();
        assert!(!settings.provider("p").unwrap().enabled);
        assert!(!settings.model_for("p", "m").unwrap().enabled);

        assert!(matches!(
            settings.set_provider_enabled("x", true).await,
            Err(SettingsError::UnknownProvider(_))
        ));
        assert!(matches!(
            settings.set_model_enabled("x", true).await,
            Err(SettingsError::UnknownModel(_))
        ));
    }

    #[tokio::test]
    async fn test_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let open = || SettingsStore::json_at(&paths);

        let settings = open();
        settings
            .upsert_provider(ProviderConfig::new("openai", "OpenAI", "openai"))
            .await
            .unwrap();
        settings.add_model("openai", "gpt-4o").await.unwrap();
        settings
            .update_general(
                GeneralSettingsPatch::default()
                    .chat(Some("openai".into()), Some("gpt-4o".into())),
            )
            .await
            .unwrap();

        let reloaded = open();
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.providers().len(), 1);
        assert!(reloaded.model_for("openai", "gpt-4o").is_some());
        assert_eq!(
            reloaded.general().chat_llm_model_id.as_deref(),
            Some("gpt-4o")
        );
    }

    #[tokio::test]
    async fn test_remove_provider() {
        let settings = SettingsStore::in_memory();
        settings
            .upsert_provider(ProviderConfig::new("p", "P", "openai"))
            .await
            .unwrap();
        assert!(settings.remove_provider("p").await.unwrap());
        assert!(!settings.remove_provider("p").await.unwrap());
        assert!(settings.provider("p").is_none());
    }
}
