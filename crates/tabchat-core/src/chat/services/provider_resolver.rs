use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::completion::CompletionProvider;
use super::provider_registry::{ProviderError, ProviderRegistry};
use crate::settings::SettingsStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no {0} provider configured")]
    NotConfigured(&'static str),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("provider {0} is disabled")]
    ProviderDisabled(String),

    #[error("no model configured for provider {0}")]
    MissingModel(String),

    #[error("model {model_id} of provider {provider_id} is disabled")]
    ModelDisabled {
        provider_id: String,
        model_id: String,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Turns (provider id, model id) pairs from settings into live providers.
#[derive(Clone)]
pub struct ProviderResolver {
    settings: Arc<SettingsStore>,
    registry: Arc<ProviderRegistry>,
}

impl ProviderResolver {
    pub fn new(settings: Arc<SettingsStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self { settings, registry }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Provider for chat replies: the session's own pair when it names a
    /// provider, otherwise the global chat default.
    pub fn resolve_chat(
        &self,
        session_provider_id: Option<&str>,
        session_model_id: Option<&str>,
    ) -> Result<Arc<dyn CompletionProvider>, ConfigurationError> {
        if let Some(provider_id) = non_empty(session_provider_id) {
            return self.resolve(provider_id, non_empty(session_model_id));
        }
        let general = self.settings.general();
        let provider_id = non_empty(general.chat_llm_provider_id.as_deref())
            .ok_or(ConfigurationError::NotConfigured("chat"))?;
        self.resolve(provider_id, non_empty(general.chat_llm_model_id.as_deref()))
    }

    /// Provider for title generation, from the global title defaults only.
    pub fn resolve_title(&self) -> Result<Arc<dyn CompletionProvider>, ConfigurationError> {
        let general = self.settings.general();
        let provider_id = non_empty(general.title_llm_provider_id.as_deref())
            .ok_or(ConfigurationError::NotConfigured("title"))?;
        self.resolve(provider_id, non_empty(general.title_llm_model_id.as_deref()))
    }

    /// Resolve one pair. A missing model falls back to the provider's
    /// default model. A pair registered in the model registry as disabled
    /// is refused; unregistered pairs are allowed.
    pub fn resolve(
        &self,
        provider_id: &str,
        model_id: Option<&str>,
    ) -> Result<Arc<dyn CompletionProvider>, ConfigurationError> {
        let provider = self
            .settings
            .provider(provider_id)
            .ok_or_else(|| ConfigurationError::ProviderNotFound(provider_id.to_string()))?;
        if !provider.enabled {
            return Err(ConfigurationError::ProviderDisabled(provider_id.to_string()));
        }

        let model_id = model_id
            .map(str::to_string)
            .or_else(|| provider.default_model.clone())
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ConfigurationError::MissingModel(provider_id.to_string()))?;

        if let Some(model) = self.settings.model_for(provider_id, &model_id)
            && !model.enabled
        {
            return Err(ConfigurationError::ModelDisabled {
                provider_id: provider_id.to_string(),
                model_id,
            });
        }

        debug!(provider_id = %provider_id, model = %model_id, "Resolved provider");
        Ok(self.registry.build(&provider, &model_id)?)
    }
}
