use std::io::Write;

use anyhow::Result;
use tabchat_core::{ChatEngine, GenerationTask, Role, StreamManagerEvent, StreamStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::commands::{self, Command};

pub struct Repl {
    engine: ChatEngine,
    /// Session ids from the last `/sessions` listing.
    listed: Vec<String>,
}

impl Repl {
    pub fn new(engine: ChatEngine) -> Self {
        Self {
            engine,
            listed: Vec::new(),
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("tabchat {} (/help for commands)", env!("CARGO_PKG_VERSION"));

        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };

            match self.handle(commands::parse(&line)).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => println!("error: {e:#}"),
            }
        }

        let stopped = self.engine.stop_all();
        debug!(stopped, "REPL finished");
        Ok(())
    }

    /// Returns false when the REPL should exit.
    async fn handle(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Empty => {}
            Command::Say(text) => {
                let mut events = self.engine.subscribe_events();
                if let Some(task) = self.engine.submit(&text).await? {
                    self.stream_reply(task, &mut events).await;
                }
            }
            Command::New => {
                let id = self.engine.new_session().await?;
                println!("new session {id}");
            }
            Command::Sessions => self.list_sessions().await?,
            Command::Switch(target) => {
                let id = self.resolve_target(&target);
                self.engine.switch_session(&id).await?;
                self.print_history().await?;
            }
            Command::Delete(target) => {
                let id = match target {
                    Some(target) => self.resolve_target(&target),
                    None => self.engine.state().chat_id,
                };
                if id.is_empty() {
                    println!("no session selected");
                } else {
                    self.engine.delete_session(&id).await?;
                    println!("deleted {id}");
                }
            }
            Command::History => self.print_history().await?,
            Command::Regenerate(index) => {
                let mut events = self.engine.subscribe_events();
                let task = self.engine.regenerate_from(index).await?;
                self.stream_reply(task, &mut events).await;
            }
            Command::DeleteFrom(index) => {
                self.engine.delete_from(index).await?;
                self.print_history().await?;
            }
            Command::Model {
                provider_id,
                model_id,
            } => {
                if self.engine.settings().provider(&provider_id).is_none() {
                    println!("unknown provider {provider_id}");
                } else {
                    self.engine
                        .set_chat_model(Some(provider_id), model_id)
                        .await?;
                }
            }
            Command::System(prompt) => self.engine.set_system_prompt(prompt),
            Command::Help => println!("{}", commands::HELP),
            Command::Quit => return Ok(false),
            Command::Invalid(message) => println!("{message}"),
        }
        Ok(true)
    }

    /// Print fragments as they arrive; Ctrl-C stops the stream.
    async fn stream_reply(
        &self,
        task: GenerationTask,
        events: &mut tokio::sync::broadcast::Receiver<StreamManagerEvent>,
    ) {
        let session_id = task.session_id().to_string();
        let mut printed = false;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(StreamManagerEvent::TextChunk { conversation_id, text })
                        if conversation_id == session_id =>
                    {
                        print!("{text}");
                        let _ = std::io::stdout().flush();
                        printed = true;
                    }
                    Ok(StreamManagerEvent::StreamEnded { conversation_id, .. })
                        if conversation_id == session_id => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dropped stream events");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    self.engine.stop_session(&session_id);
                }
            }
        }

        let outcome = task.finished().await;
        if !printed {
            print!("{}", outcome.content);
        }
        match outcome.status {
            StreamStatus::Cancelled => println!("\n[stopped]"),
            StreamStatus::Error(e) => println!("\n[error: {e}]"),
            _ => println!(),
        }
    }

    async fn list_sessions(&mut self) -> Result<()> {
        let sessions = self.engine.list_recent(None).await?;
        let current = self.engine.state().chat_id;
        self.listed = sessions.iter().map(|s| s.id.clone()).collect();

        if sessions.is_empty() {
            println!("no sessions yet");
        }
        for (n, session) in sessions.iter().enumerate() {
            let marker = if session.id == current { '*' } else { ' ' };
            println!(
                "{marker}{:>3}  {}  ({} messages, {})",
                n + 1,
                session.title,
                session.message_count(),
                session.updated_at.format("%Y-%m-%d %H:%M")
            );
        }
        Ok(())
    }

    async fn print_history(&self) -> Result<()> {
        let state = self.engine.state();
        let Some(session) = self.engine.session(&state.chat_id).await? else {
            println!("no session selected");
            return Ok(());
        };
        println!("== {} ==", session.title);
        for (index, turn) in session.messages.iter().enumerate() {
            let who = match turn.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            println!("[{index}] {who}: {}", turn.content);
        }
        if state.generating {
            println!("... {}", state.active_message);
        }
        Ok(())
    }

    fn resolve_target(&self, target: &str) -> String {
        target
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|n| self.listed.get(n))
            .cloned()
            .unwrap_or_else(|| target.to_string())
    }
}
