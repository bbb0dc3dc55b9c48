use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use rig::OneOrMany;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::message::{AssistantContent, Text};
use rig::completion::{Message, Prompt};
use rig::message::UserContent;
use rig::streaming::StreamingPrompt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::completion::{
    CompletionError, CompletionProvider, CompletionRequest, FragmentStream, StructuredRequest,
    parse_json_object,
};
use super::provider_registry::ProviderError;
use crate::chat::models::{Role, Turn};
use crate::settings::models::ProviderConfig;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const ANTHROPIC_MAX_TOKENS: u64 = 4096;

/// Backends served by rig clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RigKind {
    OpenAI,
    Anthropic,
    Gemini,
    Mistral,
    Groq,
    Ollama,
    /// Any server speaking the OpenAI chat-completions protocol at `base_url`.
    OpenAICompatible,
}

impl RigKind {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "openai" => Some(Self::OpenAI),
            "anthropic" => Some(Self::Anthropic),
            "gemini" | "google" => Some(Self::Gemini),
            "mistral" => Some(Self::Mistral),
            "groq" => Some(Self::Groq),
            "ollama" => Some(Self::Ollama),
            "openai-compatible" => Some(Self::OpenAICompatible),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RigKind::OpenAI => "OpenAI",
            RigKind::Anthropic => "Anthropic",
            RigKind::Gemini => "Google Gemini",
            RigKind::Mistral => "Mistral",
            RigKind::Groq => "Groq",
            RigKind::Ollama => "Ollama",
            RigKind::OpenAICompatible => "OpenAI-compatible",
        }
    }

    fn requires_api_key(&self) -> bool {
        !matches!(self, RigKind::Ollama | RigKind::OpenAICompatible)
    }

    fn requires_base_url(&self) -> bool {
        matches!(self, RigKind::OpenAICompatible)
    }
}

/// Enum-based agent wrapper for multi-provider support
enum AgentClient {
    Anthropic(Agent<rig::providers::anthropic::completion::CompletionModel>),
    OpenAI(Agent<rig::providers::openai::responses_api::ResponsesCompletionModel>),
    Gemini(Agent<rig::providers::gemini::completion::CompletionModel>),
    Mistral(Agent<rig::providers::mistral::completion::CompletionModel>),
    Groq(Agent<rig::providers::groq::CompletionModel>),
    Ollama(Agent<rig::providers::ollama::CompletionModel>),
    OpenAICompatible(Agent<rig::providers::openai::completion::CompletionModel>),
}

impl AgentClient {
    fn build(
        kind: RigKind,
        provider: &ProviderConfig,
        model: &str,
        preamble: &str,
        temperature: Option<f64>,
    ) -> Result<Self> {
        let api_key = || {
            provider.api_key().map(str::to_string).ok_or_else(|| {
                anyhow!("API key not configured for {} provider", kind.display_name())
            })
        };

        match kind {
            RigKind::Anthropic => {
                let key = api_key()?;
                let client = rig::providers::anthropic::Client::new(&key)?;
                let mut builder = client
                    .agent(model)
                    .preamble(preamble)
                    .max_tokens(ANTHROPIC_MAX_TOKENS);
                if let Some(t) = temperature {
                    builder = builder.temperature(t);
                }
                Ok(AgentClient::Anthropic(builder.build()))
            }
            RigKind::OpenAI => {
                let key = api_key()?;
                let client = match provider.base_url() {
                    Some(url) => rig::providers::openai::Client::builder()
                        .api_key(&key)
                        .base_url(url)
                        .build()?,
                    None => rig::providers::openai::Client::new(&key)?,
                };
                let mut builder = client.agent(model).preamble(preamble);
                if let Some(t) = temperature {
                    builder = builder.temperature(t);
                }
                Ok(AgentClient::OpenAI(builder.build()))
            }
            RigKind::Gemini => {
                let key = api_key()?;
                let client = rig::providers::gemini::Client::new(&key)?;
                let mut builder = client.agent(model).preamble(preamble);
                if let Some(t) = temperature {
                    builder = builder.temperature(t);
                }
                Ok(AgentClient::Gemini(builder.build()))
            }
            RigKind::Mistral => {
                let key = api_key()?;
                let client = rig::providers::mistral::Client::new(&key)?;
                let mut builder = client.agent(model).preamble(preamble);
                if let Some(t) = temperature {
                    builder = builder.temperature(t);
                }
                Ok(AgentClient::Mistral(builder.build()))
            }
            RigKind::Groq => {
                let key = api_key()?;
                let client = rig::providers::groq::Client::new(&key)?;
                let mut builder = client.agent(model).preamble(preamble);
                if let Some(t) = temperature {
                    builder = builder.temperature(t);
                }
                Ok(AgentClient::Groq(builder.build()))
            }
            RigKind::Ollama => {
                let url = provider.base_url().unwrap_or(DEFAULT_OLLAMA_URL).to_string();
                let client = rig::providers::ollama::Client::builder()
                    .api_key(rig::client::Nothing)
                    .base_url(&url)
                    .build()?;
                let mut builder = client.agent(model).preamble(preamble);
                if let Some(t) = temperature {
                    builder = builder.temperature(t);
                }
                Ok(AgentClient::Ollama(builder.build()))
            }
            RigKind::OpenAICompatible => {
                let url = provider.base_url().map(str::to_string).ok_or_else(|| {
                    anyhow!("base URL not configured for {} provider", kind.display_name())
                })?;
                // Local servers usually accept any key.
                let key = provider.api_key().unwrap_or_default().to_string();
                let client = rig::providers::openai::Client::builder()
                    .api_key(&key)
                    .base_url(&url)
                    .build()?
                    .completions_api();
                let mut builder = client.agent(model).preamble(preamble);
                if let Some(t) = temperature {
                    builder = builder.temperature(t);
                }
                Ok(AgentClient::OpenAICompatible(builder.build()))
            }
        }
    }
}

fn to_rig_message(turn: &Turn) -> Message {
    match turn.role {
        Role::User => Message::User {
            content: OneOrMany::one(UserContent::Text(Text {
                text: turn.content.clone(),
            })),
        },
        Role::Assistant => Message::Assistant {
            id: None,
            content: OneOrMany::one(AssistantContent::Text(Text {
                text: turn.content.clone(),
            })),
        },
    }
}

/// Turns the agent's multi-turn stream into text fragments, stopping as soon
/// as the token fires.
macro_rules! text_fragments {
    ($stream:expr, $cancel:expr) => {{
        let mut stream = $stream;
        let cancel: CancellationToken = $cancel;
        let fragments: FragmentStream = Box::pin(async_stream::stream! {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    item = stream.next() => item,
                };
                match item {
                    Some(Ok(rig::agent::MultiTurnStreamItem::StreamAssistantItem(
                        rig::streaming::StreamedAssistantContent::Text(text),
                    ))) => yield Ok(text.text),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        yield Err(CompletionError::Transport(e.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        });
        fragments
    }};
}

macro_rules! open_stream {
    ($agent:expr, $prompt:expr, $history:expr) => {
        $agent
            .stream_prompt($prompt)
            .with_history($history)
            .multi_turn(10)
            .await
    };
}

/// `CompletionProvider` backed by a rig agent. A fresh agent is built per
/// request so the system prompt can change between calls.
pub struct RigCompletionProvider {
    kind: RigKind,
    provider: ProviderConfig,
    model_id: String,
}

impl RigCompletionProvider {
    pub fn new(
        kind: RigKind,
        provider: &ProviderConfig,
        model_id: &str,
    ) -> Result<Self, ProviderError> {
        if kind.requires_api_key() && provider.api_key().is_none() {
            return Err(ProviderError::MissingApiKey(provider.id.clone()));
        }
        if kind.requires_base_url() && provider.base_url().is_none() {
            return Err(ProviderError::MissingBaseUrl(provider.id.clone()));
        }
        Ok(Self {
            kind,
            provider: provider.clone(),
            model_id: model_id.to_string(),
        })
    }

    fn agent(&self, preamble: &str, temperature: Option<f64>) -> Result<AgentClient, CompletionError> {
        AgentClient::build(self.kind, &self.provider, &self.model_id, preamble, temperature)
            .map_err(|e| CompletionError::Transport(format!("{e:#}")))
    }
}

#[async_trait]
impl CompletionProvider for RigCompletionProvider {
    fn name(&self) -> &str {
        self.kind.display_name()
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, CompletionError> {
        let Some((last, earlier)) = request.history.split_last() else {
            return Err(CompletionError::InvalidRequest("empty history".into()));
        };
        if !last.is_user() {
            return Err(CompletionError::InvalidRequest(
                "history must end with a user turn".into(),
            ));
        }
        let prompt = to_rig_message(last);
        let history: Vec<Message> = earlier.iter().map(to_rig_message).collect();

        debug!(
            provider = self.name(),
            model = %self.model_id,
            history_len = history.len(),
            "Opening completion stream"
        );

        let agent = self.agent(&request.system_prompt, None)?;
        let cancel = request.cancel;
        let fragments = match agent {
            AgentClient::Anthropic(agent) => {
                text_fragments!(open_stream!(agent, prompt, history), cancel)
            }
            AgentClient::OpenAI(agent) => {
                text_fragments!(open_stream!(agent, prompt, history), cancel)
            }
            AgentClient::Gemini(agent) => {
                text_fragments!(open_stream!(agent, prompt, history), cancel)
            }
            AgentClient::Mistral(agent) => {
                text_fragments!(open_stream!(agent, prompt, history), cancel)
            }
            AgentClient::Groq(agent) => {
                text_fragments!(open_stream!(agent, prompt, history), cancel)
            }
            AgentClient::Ollama(agent) => {
                text_fragments!(open_stream!(agent, prompt, history), cancel)
            }
            AgentClient::OpenAICompatible(agent) => {
                text_fragments!(open_stream!(agent, prompt, history), cancel)
            }
        };
        Ok(fragments)
    }

    async fn generate_structured(
        &self,
        request: StructuredRequest,
    ) -> Result<Value, CompletionError> {
        let preamble = format!(
            "Respond with a single JSON object that conforms to this JSON schema. \
             Output only the JSON object, without markdown or commentary.\n{}",
            request.schema
        );
        let agent = self.agent(&preamble, Some(request.temperature))?;
        let prompt = request.prompt;

        let reply = match agent {
            AgentClient::Anthropic(agent) => agent.prompt(&prompt).await,
            AgentClient::OpenAI(agent) => agent.prompt(&prompt).await,
            AgentClient::Gemini(agent) => agent.prompt(&prompt).await,
            AgentClient::Mistral(agent) => agent.prompt(&prompt).await,
            AgentClient::Groq(agent) => agent.prompt(&prompt).await,
            AgentClient::Ollama(agent) => agent.prompt(&prompt).await,
            AgentClient::OpenAICompatible(agent) => agent.prompt(&prompt).await,
        }
        .map_err(|e| CompletionError::Transport(e.to_string()))?;

        parse_json_object(&reply)
    }
}
