//! Streaming chat session engine.
//!
//! `ChatEngine` turns submitted text into persisted multi-turn sessions,
//! streams assistant replies from a `CompletionProvider`, and publishes the
//! in-flight state for a UI to render.

pub mod chat;
pub mod config;
pub mod error;
pub mod settings;

pub use chat::controllers::{ChatEngine, GenerationOutcome, GenerationTask};
pub use chat::models::{
    ActiveSessionState, ChatSession, Role, SessionPatch, StreamManagerEvent, StreamStatus, Turn,
};
pub use chat::repositories::{InMemorySessionStore, SessionSqliteStore, SessionStore};
pub use chat::services::{
    CompletionError, CompletionProvider, CompletionRequest, ProviderRegistry, StructuredRequest,
};
pub use config::{AppPaths, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use settings::{SettingsError, SettingsStore};
