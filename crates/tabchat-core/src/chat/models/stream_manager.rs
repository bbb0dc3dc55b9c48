use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Status of a stream lifecycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    Active,
    Completed,
    Cancelled,
    Error(String),
}

impl StreamStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamStatus::Active)
    }
}

/// Per-session in-flight generation.
///
/// `active_message` accumulates every fragment applied so far. The entry
/// exists exactly while the session is generating, so holding one is what
/// "having a cancellation handle" means.
#[derive(Debug)]
pub struct StreamState {
    pub status: StreamStatus,
    pub active_message: String,
    generation: u64,
    cancel: CancellationToken,
    started_at: Instant,
}

/// Events emitted by StreamManager for decoupled UI updates.
/// Each variant is tagged with `conversation_id` so subscribers can filter.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamManagerEvent {
    StreamStarted {
        conversation_id: String,
    },
    TextChunk {
        conversation_id: String,
        text: String,
    },
    StreamEnded {
        conversation_id: String,
        status: StreamStatus,
    },
}

impl StreamManagerEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            StreamManagerEvent::StreamStarted { conversation_id }
            | StreamManagerEvent::TextChunk {
                conversation_id, ..
            }
            | StreamManagerEvent::StreamEnded {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// Handle returned when a stream is registered. The generation number
/// guards against a late writer touching a newer stream for the same session.
#[derive(Clone, Debug)]
pub struct StreamTicket {
    pub generation: u64,
    pub cancel: CancellationToken,
}

/// Stream lifecycle bookkeeping keyed by session id.
///
/// At most one stream per session. Streams of different sessions are
/// independent, so switching sessions never mixes their partial text.
pub struct StreamManager {
    streams: HashMap<String, StreamState>,
    stopped_by_user: HashSet<String>,
    next_generation: u64,
    events: broadcast::Sender<StreamManagerEvent>,
}

impl StreamManager {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            streams: HashMap::new(),
            stopped_by_user: HashSet::new(),
            next_generation: 0,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamManagerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StreamManagerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Register a stream for a session. Returns `None` if one is already open.
    pub fn register_stream(&mut self, conv_id: &str) -> Option<StreamTicket> {
        if self.streams.contains_key(conv_id) {
            debug!(conv_id = %conv_id, "Refusing to register a second stream");
            return None;
        }

        self.next_generation += 1;
        let ticket = StreamTicket {
            generation: self.next_generation,
            cancel: CancellationToken::new(),
        };
        self.stopped_by_user.remove(conv_id);
        self.streams.insert(
            conv_id.to_string(),
            StreamState {
                status: StreamStatus::Active,
                active_message: String::new(),
                generation: ticket.generation,
                cancel: ticket.cancel.clone(),
                started_at: Instant::now(),
            },
        );

        self.emit(StreamManagerEvent::StreamStarted {
            conversation_id: conv_id.to_string(),
        });
        Some(ticket)
    }

    /// Append a fragment to the session's partial text.
    ///
    /// Returns false, without applying anything, once the stream has been
    /// cancelled or replaced.
    pub fn append_text(&mut self, conv_id: &str, generation: u64, text: &str) -> bool {
        let Some(state) = self.streams.get_mut(conv_id) else {
            return false;
        };
        if state.generation != generation || state.cancel.is_cancelled() {
            return false;
        }
        state.active_message.push_str(text);
        self.emit(StreamManagerEvent::TextChunk {
            conversation_id: conv_id.to_string(),
            text: text.to_string(),
        });
        true
    }

    pub fn active_message(&self, conv_id: &str) -> Option<&str> {
        self.streams
            .get(conv_id)
            .map(|state| state.active_message.as_str())
    }

    /// Signal cancellation. The owning task performs the commit.
    /// Returns false when nothing was streaming or it was already stopped.
    pub fn stop_stream(&mut self, conv_id: &str) -> bool {
        let Some(state) = self.streams.get_mut(conv_id) else {
            return false;
        };
        if state.cancel.is_cancelled() {
            return false;
        }
        state.cancel.cancel();
        state.status = StreamStatus::Cancelled;
        self.stopped_by_user.insert(conv_id.to_string());
        debug!(
            conv_id = %conv_id,
            chars = state.active_message.len(),
            "Stream stop requested"
        );
        true
    }

    /// Remove the stream and emit `StreamEnded`. Returns the partial text.
    pub fn finalize_stream(
        &mut self,
        conv_id: &str,
        generation: u64,
        status: StreamStatus,
    ) -> Option<String> {
        match self.streams.get(conv_id) {
            Some(state) if state.generation == generation => {}
            _ => {
                warn!(conv_id = %conv_id, generation, "finalize_stream called but no stream found");
                return None;
            }
        }
        let state = self.streams.remove(conv_id)?;
        debug!(
            conv_id = %conv_id,
            status = ?status,
            elapsed_ms = state.started_at.elapsed().as_millis() as u64,
            "Stream finalized"
        );
        self.emit(StreamManagerEvent::StreamEnded {
            conversation_id: conv_id.to_string(),
            status,
        });
        Some(state.active_message)
    }

    pub fn is_streaming(&self, conv_id: &str) -> bool {
        self.streams.contains_key(conv_id)
    }

    pub fn has_active_streams(&self) -> bool {
        !self.streams.is_empty()
    }

    pub fn was_stopped_by_user(&self, conv_id: &str) -> bool {
        self.stopped_by_user.contains(conv_id)
    }

    /// Drop the stopped flag, e.g. when the session is deleted.
    pub fn forget(&mut self, conv_id: &str) {
        self.stopped_by_user.remove(conv_id);
    }

    /// Drop the stopped flags of sessions that are neither `keep` nor
    /// still streaming.
    pub fn retain_stopped(&mut self, keep: Option<&str>) {
        let streams = &self.streams;
        self.stopped_by_user
            .retain(|id| keep == Some(id.as_str()) || streams.contains_key(id));
    }

    /// Signal every open stream (shutdown).
    pub fn stop_all(&mut self) -> usize {
        let keys: Vec<String> = self.streams.keys().cloned().collect();
        keys.iter().filter(|key| self.stop_stream(key)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_stream_per_session() {
        let mut manager = StreamManager::new(16);
        assert!(manager.register_stream("a").is_some());
        assert!(manager.register_stream("a").is_none());
        assert!(manager.register_stream("b").is_some());
        assert!(manager.is_streaming("a"));
        assert!(manager.is_streaming("b"));
    }

    #[test]
    fn test_append_after_stop_is_ignored() {
        let mut manager = StreamManager::new(16);
        let ticket = manager.register_stream("a").unwrap();
        assert!(manager.append_text("a", ticket.generation, "Once"));
        assert!(manager.stop_stream("a"));
        assert!(ticket.cancel.is_cancelled());
        assert!(!manager.append_text("a", ticket.generation, " upon"));
        assert_eq!(manager.active_message("a"), Some("Once"));
        assert!(manager.was_stopped_by_user("a"));
    }

    #[test]
    fn test_stop_twice_is_noop() {
        let mut manager = StreamManager::new(16);
        manager.register_stream("a").unwrap();
        assert!(manager.stop_stream("a"));
        assert!(!manager.stop_stream("a"));
        assert!(!manager.stop_stream("missing"));
    }

    #[test]
    fn test_stale_generation_cannot_finalize() {
        let mut manager = StreamManager::new(16);
        let first = manager.register_stream("a").unwrap();
        manager.finalize_stream("a", first.generation, StreamStatus::Completed);
        let second = manager.register_stream("a").unwrap();
        assert!(
            manager
                .finalize_stream("a", first.generation, StreamStatus::Completed)
                .is_none()
        );
        assert!(manager.is_streaming("a"));
        assert!(!manager.append_text("a", first.generation, "late"));
        assert!(manager.append_text("a", second.generation, "ok"));
    }

    #[test]
    fn test_events_in_order() {
        let mut manager = StreamManager::new(16);
        let mut rx = manager.subscribe();
        let ticket = manager.register_stream("a").unwrap();
        manager.append_text("a", ticket.generation, "Hi");
        let partial = manager.finalize_stream("a", ticket.generation, StreamStatus::Completed);
        assert_eq!(partial.as_deref(), Some("Hi"));

        assert_eq!(
            rx.try_recv().unwrap(),
            StreamManagerEvent::StreamStarted {
                conversation_id: "a".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StreamManagerEvent::TextChunk {
                conversation_id: "a".into(),
                text: "Hi".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StreamManagerEvent::StreamEnded {
                conversation_id: "a".into(),
                status: StreamStatus::Completed
            }
        );
    }

    #[test]
    fn test_register_clears_stopped_flag() {
        let mut manager = StreamManager::new(16);
        let ticket = manager.register_stream("a").unwrap();
        manager.stop_stream("a");
        manager.finalize_stream("a", ticket.generation, StreamStatus::Cancelled);
        assert!(manager.was_stopped_by_user("a"));
        manager.register_stream("a").unwrap();
        assert!(!manager.was_stopped_by_user("a"));
    }

    #[test]
    fn test_retain_stopped_keeps_bound_and_streaming() {
        let mut manager = StreamManager::new(16);
        for id in ["bound", "idle", "running"] {
            manager.register_stream(id).unwrap();
            manager.stop_stream(id);
        }
        for id in ["bound", "idle"] {
            let generation = manager.streams[id].generation;
            manager.finalize_stream(id, generation, StreamStatus::Cancelled);
        }

        manager.retain_stopped(Some("bound"));
        assert!(manager.was_stopped_by_user("bound"));
        assert!(manager.was_stopped_by_user("running"));
        assert!(!manager.was_stopped_by_user("idle"));

        manager.retain_stopped(None);
        assert!(!manager.was_stopped_by_user("bound"));
        assert!(manager.was_stopped_by_user("running"));
    }

    #[test]
    fn test_stop_all() {
        let mut manager = StreamManager::new(16);
        manager.register_stream("a").unwrap();
        manager.register_stream("b").unwrap();
        assert_eq!(manager.stop_all(), 2);
        assert_eq!(manager.stop_all(), 0);
    }
}
