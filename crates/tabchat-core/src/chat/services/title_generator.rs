use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::completion::StructuredRequest;
use super::provider_resolver::ProviderResolver;
use crate::chat::models::SessionPatch;
use crate::chat::repositories::SessionStore;
use crate::config::EngineConfig;

const MAX_TITLE_CHARS: usize = 100;

fn title_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" }
        },
        "required": ["title"]
    })
}

fn title_prompt(max_words: usize, content: &str) -> String {
    format!(
        "Generate a short, concise title (at most {max_words} words) for this chat. \
         Reply with the title only.\nContent to consider:\n{content}"
    )
}

/// Clean a generated title: strip quotes, keep the first line, cap the
/// word count and length. Returns `None` when nothing usable is left.
pub fn clean_title(raw_title: &str, max_words: usize) -> Option<String> {
    let first_line = raw_title
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .lines()
        .next()?;
    let cleaned = first_line
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.is_empty() {
        None
    } else if cleaned.chars().count() > MAX_TITLE_CHARS {
        let truncated: String = cleaned.chars().take(MAX_TITLE_CHARS - 3).collect();
        Some(format!("{truncated}..."))
    } else {
        Some(cleaned)
    }
}

/// Writes an automatic title onto a session after its first message.
#[derive(Clone)]
pub struct TitleGenerator {
    store: Arc<dyn SessionStore>,
    resolver: ProviderResolver,
    fallback_title: String,
    temperature: f64,
    max_words: usize,
}

impl TitleGenerator {
    pub fn new(store: Arc<dyn SessionStore>, resolver: ProviderResolver, config: &EngineConfig) -> Self {
        Self {
            store,
            resolver,
            fallback_title: config.title_fallback.clone(),
            temperature: config.title_temperature,
            max_words: config.title_max_words,
        }
    }

    /// Generate and store a title. Never fails: any problem stores the
    /// fallback title instead. Returns the title that was written.
    pub async fn generate(&self, session_id: &str) -> String {
        let title = match self.request_title(session_id).await {
            Ok(title) => {
                info!(session_id = %session_id, title = %title, "Generated session title");
                title
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %format!("{e:#}"), "Title generation failed");
                self.fallback_title.clone()
            }
        };

        if let Err(e) = self
            .store
            .update(session_id, SessionPatch::title(title.clone()))
            .await
        {
            warn!(session_id = %session_id, error = ?e, "Failed to store session title");
        }
        title
    }

    async fn request_title(&self, session_id: &str) -> Result<String> {
        let provider = self
            .resolver
            .resolve_title()
            .context("title provider unavailable")?;

        let session = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| anyhow!("session {session_id} not found"))?;
        let content = session
            .messages
            .iter()
            .map(|turn| turn.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        debug!(session_id = %session_id, provider = provider.name(), "Requesting title");
        let value = provider
            .generate_structured(StructuredRequest {
                prompt: title_prompt(self.max_words, &content),
                schema: title_schema(),
                temperature: self.temperature,
            })
            .await?;

        let raw = value
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("reply has no title field"))?;
        clean_title(raw, self.max_words).ok_or_else(|| anyhow!("reply title is empty"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::{ChatSession, Turn};
    use crate::chat::repositories::InMemorySessionStore;
    use crate::chat::services::ProviderRegistry;
    use crate::settings::SettingsStore;
    use crate::settings::models::{GeneralSettingsPatch, ProviderConfig};

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("\"Rust Lifetimes\"", 5).as_deref(), Some("Rust Lifetimes"));
        assert_eq!(
            clean_title("one two three four five six", 5).as_deref(),
            Some("one two three four five")
        );
        assert_eq!(clean_title("First\nSecond", 5).as_deref(), Some("First"));
        assert_eq!(clean_title("   ", 5), None);
        assert_eq!(clean_title("\"\"", 5), None);
    }

    #[test]
    fn test_clean_title_caps_length() {
        let long_word = "x".repeat(150);
        let title = clean_title(&long_word, 5).unwrap();
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
        assert!(title.ends_with("..."));
    }

    async fn setup(title_provider: Option<&str>) -> (Arc<InMemorySessionStore>, TitleGenerator, String) {
        let settings = Arc::new(SettingsStore::in_memory());
        settings
            .upsert_provider(ProviderConfig::new("offline", "Offline", "echo"))
            .await
            .unwrap();
        if let Some(provider) = title_provider {
            settings
                .update_general(
                    GeneralSettingsPatch::default().title(Some(provider.into()), Some("echo-1".into())),
                )
                .await
                .unwrap();
        }
        let store = Arc::new(InMemorySessionStore::new());
        let mut session = ChatSession::new("New Chat", None, None);
        session.messages.push(Turn::user("Explain borrow checking in Rust please"));
        let id = store.create(session).await.unwrap();

        let resolver = ProviderResolver::new(settings, Arc::new(ProviderRegistry::with_defaults()));
        let generator = TitleGenerator::new(store.clone(), resolver, &EngineConfig::default());
        (store, generator, id)
    }

    #[tokio::test]
    async fn test_generates_title_from_content() {
        let (store, generator, id) = setup(Some("offline")).await;
        let title = generator.generate(&id).await;
        assert_eq!(title, "Explain borrow checking in Rust");
        assert_eq!(store.get(&id).await.unwrap().unwrap().title, title);
    }

    #[tokio::test]
    async fn test_falls_back_without_title_provider() {
        let (store, generator, id) = setup(None).await;
        assert_eq!(generator.generate(&id).await, "Chat (auto-title failed)");
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().title,
            "Chat (auto-title failed)"
        );
    }

    #[tokio::test]
    async fn test_deleted_session_does_not_panic() {
        let (store, generator, id) = setup(Some("offline")).await;
        store.delete(&id).await.unwrap();
        assert_eq!(generator.generate(&id).await, "Chat (auto-title failed)");
        assert!(store.get(&id).await.unwrap().is_none());
    }
}
