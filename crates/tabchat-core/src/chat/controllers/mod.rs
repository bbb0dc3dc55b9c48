pub mod chat_engine;

pub use chat_engine::{ChatEngine, GenerationOutcome, GenerationTask};
