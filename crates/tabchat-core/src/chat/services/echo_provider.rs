use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::completion::{
    CompletionError, CompletionProvider, CompletionRequest, FragmentStream, StructuredRequest,
};
use crate::chat::models::Turn;

const DEFAULT_DELAY: Duration = Duration::from_millis(15);

/// Offline provider that streams the last user message back word by word.
///
/// Registered under the `echo` kind so the engine can be driven without
/// network access.
pub struct EchoProvider {
    model_id: String,
    delay: Duration,
}

impl EchoProvider {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            delay: DEFAULT_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn last_user_text(history: &[Turn]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|turn| turn.is_user())
        .map(|turn| turn.content.as_str())
}

fn first_words(text: &str, count: usize) -> String {
    text.split_whitespace()
        .take(count)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl CompletionProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, CompletionError> {
        let text = last_user_text(&request.history)
            .ok_or_else(|| CompletionError::InvalidRequest("no user turn to answer".into()))?
            .to_string();
        let delay = self.delay;
        let cancel = request.cancel;

        Ok(Box::pin(async_stream::stream! {
            for word in text.split_inclusive(' ') {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                yield Ok(word.to_string());
            }
        }))
    }

    async fn generate_structured(
        &self,
        request: StructuredRequest,
    ) -> Result<Value, CompletionError> {
        let source = request
            .prompt
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default();
        let filler = first_words(source, 5);

        let properties = request
            .schema
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| CompletionError::InvalidRequest("schema has no properties".into()))?;
        let object: Map<String, Value> = properties
            .keys()
            .map(|key| (key.clone(), Value::String(filler.clone())))
            .collect();
        Ok(Value::Object(object))
    }
}
