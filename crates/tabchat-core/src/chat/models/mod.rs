pub mod active_session;
pub mod chat_session;
pub mod stream_manager;
pub mod turn;

pub use active_session::ActiveSessionState;
pub(crate) use active_session::SessionBinding;
pub use chat_session::{ChatSession, SessionPatch, timestamp_now};
pub use stream_manager::{StreamManager, StreamManagerEvent, StreamState, StreamStatus, StreamTicket};
pub use turn::{Role, Turn};
