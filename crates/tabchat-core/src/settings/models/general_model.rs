use serde::{Deserialize, Serialize};

pub const GLOBAL_SETTINGS_ID: &str = "global";

fn global_id() -> String {
    GLOBAL_SETTINGS_ID.to_string()
}

/// Process-wide defaults: which provider/model answers chats and which one
/// writes titles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettingsModel {
    #[serde(default = "global_id")]
    pub id: String,
    #[serde(default)]
    pub chat_llm_provider_id: Option<String>,
    #[serde(default)]
    pub chat_llm_model_id: Option<String>,
    #[serde(default)]
    pub title_llm_provider_id: Option<String>,
    #[serde(default)]
    pub title_llm_model_id: Option<String>,
}

impl Default for GeneralSettingsModel {
    fn default() -> Self {
        Self {
            id: global_id(),
            chat_llm_provider_id: None,
            chat_llm_model_id: None,
            title_llm_provider_id: None,
            title_llm_model_id: None,
        }
    }
}

impl GeneralSettingsModel {
    pub fn apply(&mut self, patch: GeneralSettingsPatch) {
        if let Some(value) = patch.chat_llm_provider_id {
            self.chat_llm_provider_id = value;
        }
        if let Some(value) = patch.chat_llm_model_id {
            self.chat_llm_model_id = value;
        }
        if let Some(value) = patch.title_llm_provider_id {
            self.title_llm_provider_id = value;
        }
        if let Some(value) = patch.title_llm_model_id {
            self.title_llm_model_id = value;
        }
    }
}

/// Partial update. `Some(None)` clears a field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneralSettingsPatch {
    pub chat_llm_provider_id: Option<Option<String>>,
    pub chat_llm_model_id: Option<Option<String>>,
    pub title_llm_provider_id: Option<Option<String>>,
    pub title_llm_model_id: Option<Option<String>>,
}

impl GeneralSettingsPatch {
    pub fn chat(mut self, provider_id: Option<String>, model_id: Option<String>) -> Self {
        self.chat_llm_provider_id = Some(provider_id);
        self.chat_llm_model_id = Some(model_id);
        self
    }

    pub fn title(mut self, provider_id: Option<String>, model_id: Option<String>) -> Self {
        self.title_llm_provider_id = Some(provider_id);
        self.title_llm_model_id = Some(model_id);
        self
    }
}
