use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::completion::CompletionProvider;
use super::echo_provider::EchoProvider;
use super::rig_provider::{RigCompletionProvider, RigKind};
use crate::settings::models::ProviderConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("unsupported provider kind: {0}")]
    UnsupportedKind(String),

    #[error("API key not configured for provider {0}")]
    MissingApiKey(String),

    #[error("base URL not configured for provider {0}")]
    MissingBaseUrl(String),

    #[error("failed to build provider {provider_id}: {message}")]
    Build {
        provider_id: String,
        message: String,
    },
}

/// Builds a provider instance for one (provider config, model id) pair.
pub type ProviderConstructor = Arc<
    dyn Fn(&ProviderConfig, &str) -> Result<Arc<dyn CompletionProvider>, ProviderError>
        + Send
        + Sync,
>;

/// Maps a provider `kind` string to the code that instantiates it.
///
/// The set of kinds is closed at construction time; anything unregistered is
/// `UnsupportedKind`.
#[derive(Clone)]
pub struct ProviderRegistry {
    constructors: HashMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// rig-backed kinds plus the offline `echo` kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for key in [
            "openai",
            "anthropic",
            "gemini",
            "google",
            "mistral",
            "groq",
            "ollama",
            "openai-compatible",
        ] {
            registry.register(key, |config, model| {
                let kind = RigKind::from_key(&config.kind)
                    .ok_or_else(|| ProviderError::UnsupportedKind(config.kind.clone()))?;
                let provider = RigCompletionProvider::new(kind, config, model)?;
                Ok(Arc::new(provider) as Arc<dyn CompletionProvider>)
            });
        }
        registry.register("echo", |_config, model| {
            Ok(Arc::new(EchoProvider::new(model)) as Arc<dyn CompletionProvider>)
        });
        registry
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&ProviderConfig, &str) -> Result<Arc<dyn CompletionProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(kind.into(), Arc::new(constructor));
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn build(
        &self,
        config: &ProviderConfig,
        model_id: &str,
    ) -> Result<Arc<dyn CompletionProvider>, ProviderError> {
        let constructor = self
            .constructors
            .get(&config.kind)
            .ok_or_else(|| ProviderError::UnsupportedKind(config.kind.clone()))?;
        debug!(provider_id = %config.id, kind = %config.kind, model = %model_id, "Building provider");
        constructor(config, model_id)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_kinds() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(
            registry.kinds(),
            vec![
                "anthropic",
                "echo",
                "gemini",
                "google",
                "groq",
                "mistral",
                "ollama",
                "openai",
                "openai-compatible",
            ]
        );
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let registry = ProviderRegistry::with_defaults();
        let config = ProviderConfig::new("x", "X", "carrier-pigeon");
        assert!(matches!(
            registry.build(&config, "m"),
            Err(ProviderError::UnsupportedKind(kind)) if kind == "carrier-pigeon"
        ));
    }

    #[test]
    fn test_echo_builds_without_key() {
        let registry = ProviderRegistry::with_defaults();
        let provider = registry
            .build(&ProviderConfig::new("offline", "Offline", "echo"), "echo-1")
            .unwrap();
        assert_eq!(provider.name(), "echo");
        assert_eq!(provider.model_id(), "echo-1");
    }

    #[test]
    fn test_openai_compatible_builds_from_base_url() {
        let registry = ProviderRegistry::with_defaults();
        let config = ProviderConfig::new("local", "Local", "openai-compatible")
            .with_base_url("http://localhost:1234/v1");
        let provider = registry.build(&config, "qwen2.5").unwrap();
        assert_eq!(provider.name(), "OpenAI-compatible");
        assert_eq!(provider.model_id(), "qwen2.5");
    }

    #[test]
    fn test_rig_kind_requires_key() {
        let registry = ProviderRegistry::with_defaults();
        let config = ProviderConfig::new("anthropic", "Anthropic", "anthropic");
        assert!(matches!(
            registry.build(&config, "claude"),
            Err(ProviderError::MissingApiKey(_))
        ));
    }
}
