use super::stream_manager::StreamManager;

/// Snapshot of the UI-facing session state.
///
/// `generating` is true exactly while the bound session owns an open stream
/// (and thereby a cancellation handle). `active_message` is the partial text
/// of that stream and is empty otherwise.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActiveSessionState {
    /// Bound session id. Empty when no session is bound.
    pub chat_id: String,
    pub user_message: String,
    pub active_message: String,
    pub generating: bool,
    pub stopped_by_user: bool,
    pub chat_model_id: Option<String>,
    pub chat_provider_id: Option<String>,
    pub system_prompt: Option<String>,
}

impl ActiveSessionState {
    pub fn is_bound(&self) -> bool {
        !self.chat_id.is_empty()
    }
}

/// The part of the active state owned by the UI binding rather than by a stream.
#[derive(Clone, Debug, Default)]
pub(crate) struct SessionBinding {
    pub chat_id: String,
    pub user_message: String,
    pub chat_model_id: Option<String>,
    pub chat_provider_id: Option<String>,
    pub system_prompt: Option<String>,
}

impl SessionBinding {
    pub fn bound_id(&self) -> Option<&str> {
        (!self.chat_id.is_empty()).then_some(self.chat_id.as_str())
    }

    /// Overlay the bound session's stream, if any, onto the binding.
    pub fn project(&self, streams: &StreamManager) -> ActiveSessionState {
        let active = self
            .bound_id()
            .and_then(|id| streams.active_message(id));
        ActiveSessionState {
            chat_id: self.chat_id.clone(),
            user_message: self.user_message.clone(),
            active_message: active.unwrap_or_default().to_string(),
            generating: active.is_some(),
            stopped_by_user: self
                .bound_id()
                .is_some_and(|id| streams.was_stopped_by_user(id)),
            chat_model_id: self.chat_model_id.clone(),
            chat_provider_id: self.chat_provider_id.clone(),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_only_shows_bound_stream() {
        let mut streams = StreamManager::new(8);
        let ticket = streams.register_stream("other").unwrap();
        streams.append_text("other", ticket.generation, "partial");

        let binding = SessionBinding {
            chat_id: "mine".into(),
            ..SessionBinding::default()
        };
        let state = binding.project(&streams);
        assert!(!state.generating);
        assert_eq!(state.active_message, "");

        let binding = SessionBinding {
            chat_id: "other".into(),
            ..SessionBinding::default()
        };
        let state = binding.project(&streams);
        assert!(state.generating);
        assert_eq!(state.active_message, "partial");
    }

    #[test]
    fn test_unbound_state() {
        let state = SessionBinding::default().project(&StreamManager::new(8));
        assert!(!state.is_bound());
        assert!(!state.generating);
    }
}
