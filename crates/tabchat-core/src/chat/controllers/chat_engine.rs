use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chat::models::{
    ActiveSessionState, ChatSession, SessionBinding, SessionPatch, StreamManager,
    StreamManagerEvent, StreamStatus, StreamTicket, Turn,
};
use crate::chat::repositories::{RepositoryResult, SessionStore, watch_session};
use crate::chat::services::{
    CompletionError, CompletionProvider, CompletionRequest, ProviderRegistry, ProviderResolver,
    TitleGenerator,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::settings::SettingsStore;

/// How a generation cycle ended and what was committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub session_id: String,
    pub status: StreamStatus,
    /// Content of the committed assistant turn.
    pub content: String,
    /// False when the assistant turn could not be written (e.g. the session
    /// was deleted mid-stream).
    pub persisted: bool,
}

/// Handle to a running generation and, after a first message, its title task.
///
/// Dropping the handle does not cancel anything; use `ChatEngine::stop`.
#[derive(Debug)]
pub struct GenerationTask {
    session_id: String,
    generation: JoinHandle<GenerationOutcome>,
    title: Option<JoinHandle<String>>,
}

impl GenerationTask {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn generates_title(&self) -> bool {
        self.title.is_some()
    }

    /// Wait for the assistant turn to be committed.
    pub async fn finished(self) -> GenerationOutcome {
        join_generation(self.session_id, self.generation).await
    }

    /// Wait for the assistant turn and for the title task, if one was started.
    pub async fn finished_with_title(self) -> (GenerationOutcome, Option<String>) {
        let GenerationTask {
            session_id,
            generation,
            title,
        } = self;
        let outcome = join_generation(session_id, generation).await;
        let title = match title {
            Some(handle) => handle.await.ok(),
            None => None,
        };
        (outcome, title)
    }
}

async fn join_generation(
    session_id: String,
    handle: JoinHandle<GenerationOutcome>,
) -> GenerationOutcome {
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Generation task failed");
            GenerationOutcome {
                session_id,
                status: StreamStatus::Error(e.to_string()),
                content: String::new(),
                persisted: false,
            }
        }
    }
}

struct EngineState {
    binding: SessionBinding,
    streams: StreamManager,
}

impl EngineState {
    /// Rebind (empty id unbinds) and drop stopped flags nobody can see.
    fn bind(&mut self, chat_id: String) {
        self.binding.chat_id = chat_id;
        self.streams.retain_stopped(self.binding.bound_id());
    }
}

/// Everything a generation needs, captured when its stream is registered.
struct GenerationPlan {
    session_id: String,
    ticket: StreamTicket,
    system_prompt: String,
    provider_id: Option<String>,
    model_id: Option<String>,
    history: Vec<Turn>,
}

struct EngineInner {
    store: Arc<dyn SessionStore>,
    settings: Arc<SettingsStore>,
    resolver: ProviderResolver,
    titles: TitleGenerator,
    config: EngineConfig,
    state: Mutex<EngineState>,
    state_tx: watch::Sender<ActiveSessionState>,
}

/// Orchestrates submit, stream, commit, stop, regenerate and delete over a
/// `SessionStore`, and publishes `ActiveSessionState` for the UI.
///
/// Cheap to clone. The state lock is never held across an await.
#[derive(Clone)]
pub struct ChatEngine {
    inner: Arc<EngineInner>,
}

impl ChatEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        settings: Arc<SettingsStore>,
        registry: Arc<ProviderRegistry>,
        config: EngineConfig,
    ) -> Self {
        let resolver = ProviderResolver::new(settings.clone(), registry);
        let titles = TitleGenerator::new(store.clone(), resolver.clone(), &config);
        let state = EngineState {
            binding: SessionBinding::default(),
            streams: StreamManager::new(config.event_capacity),
        };
        let (state_tx, _) = watch::channel(ActiveSessionState::default());
        Self {
            inner: Arc::new(EngineInner {
                store,
                settings,
                resolver,
                titles,
                config,
                state: Mutex::new(state),
                state_tx,
            }),
        }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.inner.settings
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ActiveSessionState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ActiveSessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamManagerEvent> {
        self.inner.state.lock().streams.subscribe()
    }

    pub fn is_generating(&self, session_id: &str) -> bool {
        self.inner.state.lock().streams.is_streaming(session_id)
    }

    fn bound_session_id(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .binding
            .bound_id()
            .map(str::to_string)
    }

    /// Mirror the input box.
    pub fn set_user_message(&self, text: impl Into<String>) {
        let text = text.into();
        self.inner.update(|state| state.binding.user_message = text);
    }

    /// Override the system prompt for subsequent generations. `None` restores
    /// the configured default.
    pub fn set_system_prompt(&self, prompt: Option<String>) {
        let prompt = prompt.filter(|p| !p.trim().is_empty());
        self.inner.update(|state| state.binding.system_prompt = prompt);
    }

    /// Select the provider/model for the bound session (and for sessions
    /// created from here on). Persisted on the bound session.
    pub async fn set_chat_model(
        &self,
        provider_id: Option<String>,
        model_id: Option<String>,
    ) -> EngineResult<()> {
        let bound = self.inner.update(|state| {
            state.binding.chat_provider_id = provider_id.clone();
            state.binding.chat_model_id = model_id.clone();
            state.binding.bound_id().map(str::to_string)
        });
        if let Some(session_id) = bound {
            self.inner
                .store
                .update(&session_id, SessionPatch::chat_model(provider_id, model_id))
                .await?;
        }
        Ok(())
    }

    /// Create an empty session and bind it.
    pub async fn new_session(&self) -> EngineResult<String> {
        let (provider_id, model_id) = {
            let state = self.inner.state.lock();
            (
                state.binding.chat_provider_id.clone(),
                state.binding.chat_model_id.clone(),
            )
        };
        let (provider_id, model_id) = match provider_id {
            Some(provider_id) => (Some(provider_id), model_id),
            None => {
                let general = self.inner.settings.general();
                (general.chat_llm_provider_id, general.chat_llm_model_id)
            }
        };

        let session = ChatSession::new(
            self.inner.config.new_chat_title.clone(),
            provider_id.clone(),
            model_id.clone(),
        );
        let session_id = self.inner.store.create(session).await?;
        info!(session_id = %session_id, "Created chat session");

        self.inner.update(|state| {
            state.bind(session_id.clone());
            state.binding.chat_provider_id = provider_id;
            state.binding.chat_model_id = model_id;
        });
        Ok(session_id)
    }

    /// Bind an existing session. Streams of other sessions keep running but
    /// stay invisible in the active state.
    pub async fn switch_session(&self, session_id: &str) -> EngineResult<()> {
        let session = self.load_session(session_id).await?;
        self.inner.update(|state| {
            state.bind(session.id);
            state.binding.chat_provider_id = session.chat_provider_id;
            state.binding.chat_model_id = session.chat_model_id;
        });
        debug!(session_id = %session_id, "Switched session");
        Ok(())
    }

    /// Unbind; the next submit creates a new session.
    pub fn close_session(&self) {
        self.inner.update(|state| state.bind(String::new()));
    }

    /// Delete a session, stopping its stream if one is running.
    pub async fn delete_session(&self, session_id: &str) -> EngineResult<()> {
        self.inner.update(|state| {
            state.streams.stop_stream(session_id);
        });
        self.inner.store.delete(session_id).await?;
        self.inner.update(|state| {
            state.streams.forget(session_id);
            if state.binding.chat_id == session_id {
                state.bind(String::new());
            }
        });
        info!(session_id = %session_id, "Deleted chat session");
        Ok(())
    }

    pub async fn session(&self, session_id: &str) -> EngineResult<Option<ChatSession>> {
        Ok(self.inner.store.get(session_id).await?)
    }

    pub async fn list_recent(&self, limit: Option<usize>) -> EngineResult<Vec<ChatSession>> {
        let limit = limit.unwrap_or(self.inner.config.recent_limit);
        Ok(self.inner.store.list_recent(limit).await?)
    }

    /// Live view of one session record.
    pub fn watch_session(
        &self,
        session_id: &str,
    ) -> BoxStream<'static, RepositoryResult<Option<ChatSession>>> {
        watch_session(self.inner.store.clone(), session_id)
    }

    /// Send `draft` as a user turn and start streaming the reply.
    ///
    /// Blank input is a no-op (`Ok(None)`). The user turn is persisted before
    /// this returns; the assistant turn is committed by the returned task.
    pub async fn submit(&self, draft: &str) -> EngineResult<Option<GenerationTask>> {
        if draft.trim().is_empty() {
            debug!("Ignoring blank submit");
            return Ok(None);
        }

        let (session_id, created) = match self.bound_session_id() {
            Some(session_id) => (session_id, false),
            None => (self.new_session().await?, true),
        };

        let ticket = self.inner.begin_stream(&session_id)?;
        let session = match self.inner.append_user_turn(&session_id, draft).await {
            Ok(session) => session,
            Err(e) => {
                self.inner.abort_stream(&session_id, &ticket, &e);
                if created {
                    self.discard_session(&session_id).await;
                }
                return Err(e);
            }
        };

        self.inner.update(|state| {
            if state.binding.chat_id == session_id {
                state.binding.user_message.clear();
            }
        });

        let title = (session.messages.len() == 1).then(|| self.spawn_title(&session_id));
        let plan = self.inner.plan(session, ticket);
        let generation = tokio::spawn(self.inner.clone().run_generation(plan));

        Ok(Some(GenerationTask {
            session_id,
            generation,
            title,
        }))
    }

    /// Signal the bound session's stream to stop. The generation task commits
    /// the partial text. Returns false if nothing was streaming.
    pub fn stop(&self) -> bool {
        self.inner.update(|state| match state.binding.bound_id() {
            Some(session_id) => {
                let session_id = session_id.to_string();
                state.streams.stop_stream(&session_id)
            }
            None => false,
        })
    }

    pub fn stop_session(&self, session_id: &str) -> bool {
        self.inner
            .update(|state| state.streams.stop_stream(session_id))
    }

    /// Signal every running stream. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        self.inner.update(|state| state.streams.stop_all())
    }

    /// Drop the assistant turn at `index` and everything after it, then
    /// generate a new reply to the remaining history.
    pub async fn regenerate_from(&self, index: usize) -> EngineResult<GenerationTask> {
        let session_id = self.bound_session_id().ok_or(EngineError::Unbound)?;
        if self.is_generating(&session_id) {
            return Err(EngineError::Busy(session_id));
        }

        let session = self.load_session(&session_id).await?;
        let len = session.messages.len();
        match session.messages.get(index) {
            Some(turn) if turn.is_assistant() => {}
            _ => return Err(EngineError::InvalidIndex { index, len }),
        }

        let ticket = self.inner.begin_stream(&session_id)?;
        let mut session = session;
        session.messages.truncate(index);
        if let Err(e) = self
            .inner
            .store
            .update(&session_id, SessionPatch::messages(session.messages.clone()))
            .await
        {
            let e = EngineError::from(e);
            self.inner.abort_stream(&session_id, &ticket, &e);
            return Err(e);
        }
        info!(session_id = %session_id, index, "Regenerating from message");

        let plan = self.inner.plan(session, ticket);
        let generation = tokio::spawn(self.inner.clone().run_generation(plan));
        Ok(GenerationTask {
            session_id,
            generation,
            title: None,
        })
    }

    /// Remove the turn at `index` and everything after it.
    pub async fn delete_from(&self, index: usize) -> EngineResult<()> {
        let session_id = self.bound_session_id().ok_or(EngineError::Unbound)?;
        if self.is_generating(&session_id) {
            return Err(EngineError::Busy(session_id));
        }

        let mut session = self.load_session(&session_id).await?;
        let len = session.messages.len();
        if index > len {
            return Err(EngineError::InvalidIndex { index, len });
        }
        session.messages.truncate(index);
        self.inner
            .store
            .update(&session_id, SessionPatch::messages(session.messages))
            .await?;
        debug!(session_id = %session_id, index, removed = len - index, "Deleted messages");
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> EngineResult<ChatSession> {
        self.inner
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(session_id.to_string()))
    }

    /// Remove a session this engine created for a submit that never got its
    /// user turn stored.
    async fn discard_session(&self, session_id: &str) {
        if let Err(e) = self.inner.store.delete(session_id).await {
            warn!(session_id = %session_id, error = ?e, "Failed to remove empty session");
        }
        self.inner.update(|state| {
            if state.binding.chat_id == session_id {
                state.bind(String::new());
            }
        });
    }

    fn spawn_title(&self, session_id: &str) -> JoinHandle<String> {
        let titles = self.inner.titles.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move { titles.generate(&session_id).await })
    }
}

impl EngineInner {
    /// Mutate state under the lock and publish the new projection.
    fn update<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut *state);
        self.state_tx
            .send_replace(state.binding.project(&state.streams));
        result
    }

    fn begin_stream(&self, session_id: &str) -> EngineResult<StreamTicket> {
        self.update(|state| state.streams.register_stream(session_id))
            .ok_or_else(|| EngineError::Busy(session_id.to_string()))
    }

    /// Roll back a registered stream whose setup failed before generation.
    fn abort_stream(&self, session_id: &str, ticket: &StreamTicket, cause: &EngineError) {
        warn!(session_id = %session_id, error = %cause, "Aborting generation before it started");
        self.update(|state| {
            state.streams.finalize_stream(
                session_id,
                ticket.generation,
                StreamStatus::Error(cause.to_string()),
            )
        });
    }

    async fn append_user_turn(&self, session_id: &str, text: &str) -> EngineResult<ChatSession> {
        let mut session = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(session_id.to_string()))?;
        session.messages.push(Turn::user(text));
        self.store
            .update(session_id, SessionPatch::messages(session.messages.clone()))
            .await?;
        Ok(session)
    }

    fn plan(&self, session: ChatSession, ticket: StreamTicket) -> GenerationPlan {
        let system_prompt = self
            .state
            .lock()
            .binding
            .system_prompt
            .clone()
            .unwrap_or_else(|| self.config.system_prompt.clone());
        GenerationPlan {
            session_id: session.id,
            ticket,
            system_prompt,
            provider_id: session.chat_provider_id,
            model_id: session.chat_model_id,
            history: session.messages,
        }
    }

    async fn run_generation(self: Arc<Self>, plan: GenerationPlan) -> GenerationOutcome {
        let GenerationPlan {
            session_id,
            ticket,
            system_prompt,
            provider_id,
            model_id,
            history,
        } = plan;

        let provider = match self
            .resolver
            .resolve_chat(provider_id.as_deref(), model_id.as_deref())
        {
            Ok(provider) => provider,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Chat provider unavailable");
                let content = self.config.chat_unavailable_message.clone();
                return self
                    .commit(session_id, &ticket, history, content, StreamStatus::Error(e.to_string()))
                    .await;
            }
        };

        info!(
            session_id = %session_id,
            provider = provider.name(),
            model = provider.model_id(),
            turns = history.len(),
            "Starting generation"
        );

        let request = CompletionRequest {
            system_prompt,
            history: history.clone(),
            cancel: ticket.cancel.clone(),
        };
        let status = self.consume(&session_id, &ticket, provider, request).await;

        let partial = self
            .state
            .lock()
            .streams
            .active_message(&session_id)
            .unwrap_or_default()
            .to_string();
        let content = match &status {
            StreamStatus::Cancelled if partial.is_empty() => self.config.stopped_placeholder.clone(),
            StreamStatus::Error(e) if partial.is_empty() => format!("Error: {e}"),
            _ => partial,
        };

        self.commit(session_id, &ticket, history, content, status).await
    }

    /// Apply fragments until the stream ends, fails or is cancelled.
    async fn consume(
        &self,
        session_id: &str,
        ticket: &StreamTicket,
        provider: Arc<dyn CompletionProvider>,
        request: CompletionRequest,
    ) -> StreamStatus {
        let cancel = ticket.cancel.clone();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamStatus::Cancelled,
            opened = provider.stream_completion(request) => opened,
        };
        let mut fragments = match opened {
            Ok(fragments) => fragments,
            Err(CompletionError::Cancelled) => return StreamStatus::Cancelled,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to open completion stream");
                return StreamStatus::Error(e.to_string());
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamStatus::Cancelled,
                next = fragments.next() => next,
            };
            match next {
                Some(Ok(text)) => {
                    let applied = self.update(|state| {
                        state
                            .streams
                            .append_text(session_id, ticket.generation, &text)
                    });
                    if !applied {
                        return StreamStatus::Cancelled;
                    }
                }
                Some(Err(CompletionError::Cancelled)) => return StreamStatus::Cancelled,
                Some(Err(e)) => {
                    warn!(session_id = %session_id, error = %e, "Completion stream failed");
                    return StreamStatus::Error(e.to_string());
                }
                None if cancel.is_cancelled() => return StreamStatus::Cancelled,
                None => return StreamStatus::Completed,
            }
        }
    }

    /// Persist `history + assistant turn`, then close the stream.
    async fn commit(
        &self,
        session_id: String,
        ticket: &StreamTicket,
        mut history: Vec<Turn>,
        content: String,
        status: StreamStatus,
    ) -> GenerationOutcome {
        history.push(Turn::assistant(content.clone()));
        let persisted = match self
            .store
            .update(&session_id, SessionPatch::messages(history))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(session_id = %session_id, error = ?e, "Failed to persist assistant turn");
                false
            }
        };

        self.update(|state| {
            state
                .streams
                .finalize_stream(&session_id, ticket.generation, status.clone());
            state.streams.retain_stopped(state.binding.bound_id());
        });
        info!(
            session_id = %session_id,
            status = ?status,
            chars = content.len(),
            persisted,
            "Generation finished"
        );

        GenerationOutcome {
            session_id,
            status,
            content,
            persisted,
        }
    }
}
