use std::fmt;

use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// A configured LLM endpoint.
///
/// `kind` selects the client implementation in the provider registry
/// (`openai`, `anthropic`, `gemini`, `mistral`, `ollama`, `echo`, ...).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            api_key: None,
            base_url: None,
            default_model: None,
            enabled: true,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The API key, treating a blank string as unset.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}

// Keeps keys out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProvidersModel {
    providers: Vec<ProviderConfig>,
}

impl ProvidersModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by id. Returns true when an existing entry was replaced.
    pub fn upsert(&mut self, config: ProviderConfig) -> bool {
        if let Some(existing) = self.providers.iter_mut().find(|p| p.id == config.id) {
            *existing = config;
            true
        } else {
            self.providers.push(config);
            false
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let initial_len = self.providers.len();
        self.providers.retain(|p| p.id != id);
        self.providers.len() < initial_len
    }

    pub fn get(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ProviderConfig> {
        self.providers.iter_mut().find(|p| p.id == id)
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Replace all providers (used when loading from disk)
    pub fn replace_all(&mut self, providers: Vec<ProviderConfig>) {
        self.providers = providers;
    }
}
