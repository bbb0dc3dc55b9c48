use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::chat::models::Turn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,
}

/// Incremental text fragments, in emission order.
pub type FragmentStream = BoxStream<'static, Result<String, CompletionError>>;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Full committed history. The last turn is the user turn being answered.
    pub history: Vec<Turn>,
    /// Observed between fragments. Once cancelled, the stream ends without
    /// emitting further fragments.
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub prompt: String,
    /// JSON schema of the object the model must return.
    pub schema: Value,
    pub temperature: f64,
}

/// A remote (or local) LLM endpoint bound to one model.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    fn model_id(&self) -> &str;

    /// Open a streaming completion. The answer is the concatenation of the
    /// fragments the stream yields.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, CompletionError>;

    /// One-shot completion constrained to a JSON object.
    async fn generate_structured(&self, request: StructuredRequest)
    -> Result<Value, CompletionError>;
}

/// Parse a model reply that should be a single JSON object.
///
/// Tolerates markdown code fences and prose around the object.
pub fn parse_json_object(raw: &str) -> Result<Value, CompletionError> {
    let trimmed = raw.trim();
    let (start, end) = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(CompletionError::InvalidResponse(format!(
                "no JSON object in reply: {}",
                preview(trimmed)
            )));
        }
    };
    let value: Value = serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(CompletionError::InvalidResponse("reply is not an object".into()))
    }
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}
