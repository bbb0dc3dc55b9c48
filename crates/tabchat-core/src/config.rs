use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "tabchat";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const NEW_CHAT_TITLE: &str = "New Chat";
pub const TITLE_FALLBACK: &str = "Chat (auto-title failed)";
pub const CHAT_UNAVAILABLE_MESSAGE: &str = "Error: Chat LLM not configured or available.";
pub const STOPPED_PLACEHOLDER: &str = "(generation stopped)";

/// Tunables for `ChatEngine` and its title generator.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Used when the bound session has no system prompt override.
    pub system_prompt: String,
    pub new_chat_title: String,
    pub title_fallback: String,
    pub title_temperature: f64,
    pub title_max_words: usize,
    /// Assistant turn committed when no chat provider can be resolved.
    pub chat_unavailable_message: String,
    /// Assistant turn committed when the user stops before any text arrived.
    pub stopped_placeholder: String,
    pub recent_limit: usize,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            new_chat_title: NEW_CHAT_TITLE.to_string(),
            title_fallback: TITLE_FALLBACK.to_string(),
            title_temperature: 0.4,
            title_max_words: 5,
            chat_unavailable_message: CHAT_UNAVAILABLE_MESSAGE.to_string(),
            stopped_placeholder: STOPPED_PLACEHOLDER.to_string(),
            recent_limit: 50,
            event_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

/// On-disk locations of the settings documents and the session database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<platform config dir>/tabchat`
    pub fn from_config_dir() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join(APP_DIR_NAME)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn providers_file(&self) -> PathBuf {
        self.root.join("providers.json")
    }

    pub fn models_file(&self) -> PathBuf {
        self.root.join("models.json")
    }

    pub fn general_settings_file(&self) -> PathBuf {
        self.root.join("general_settings.json")
    }

    pub fn sessions_db(&self) -> PathBuf {
        self.root.join("sessions.db")
    }
}
