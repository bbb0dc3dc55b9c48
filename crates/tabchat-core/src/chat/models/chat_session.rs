use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::turn::Turn;

/// Current time truncated to millisecond precision, the resolution every
/// store persists timestamps with.
pub fn timestamp_now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// A persisted conversation thread.
///
/// `messages` only ever holds committed turns. Text that is still streaming
/// lives in the engine's stream state until the stream ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub messages: Vec<Turn>,
    #[serde(default)]
    pub forked_chat_ids: Option<Vec<String>>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub title: String,
    #[serde(default)]
    pub chat_model_id: Option<String>,
    #[serde(default)]
    pub chat_provider_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Create an empty session with a fresh id.
    pub fn new(
        title: impl Into<String>,
        chat_provider_id: Option<String>,
        chat_model_id: Option<String>,
    ) -> Self {
        let now = timestamp_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            messages: Vec::new(),
            forked_chat_ids: None,
            project_id: None,
            tags: Vec::new(),
            title: title.into(),
            chat_model_id,
            chat_provider_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update. `updated_at` moves only when the message list changes.
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(messages) = patch.messages {
            self.messages = messages;
            self.updated_at = timestamp_now();
        }
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(model_id) = patch.chat_model_id {
            self.chat_model_id = model_id;
        }
        if let Some(provider_id) = patch.chat_provider_id {
            self.chat_provider_id = provider_id;
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Partial field set for `SessionStore::update`.
///
/// `None` leaves a field untouched. The provider/model fields are doubly
/// optional so a patch can clear them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionPatch {
    pub messages: Option<Vec<Turn>>,
    pub title: Option<String>,
    pub chat_model_id: Option<Option<String>>,
    pub chat_provider_id: Option<Option<String>>,
}

impl SessionPatch {
    pub fn messages(messages: Vec<Turn>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn chat_model(provider_id: Option<String>, model_id: Option<String>) -> Self {
        Self {
            chat_provider_id: Some(provider_id),
            chat_model_id: Some(model_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_none()
            && self.title.is_none()
            && self.chat_model_id.is_none()
            && self.chat_provider_id.is_none()
    }
}
