//! Terminal front-end for the tabchat session engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tabchat_core::settings::models::{GeneralSettingsPatch, ProviderConfig};
use tabchat_core::{
    AppPaths, ChatEngine, EngineConfig, InMemorySessionStore, ProviderRegistry,
    SessionSqliteStore, SessionStore, SettingsStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod repl;

const OFFLINE_PROVIDER_ID: &str = "echo";
const OFFLINE_MODEL_ID: &str = "echo";

#[derive(Parser)]
#[command(name = "tabchat")]
#[command(version, about = "Multi-session LLM chat in the terminal")]
struct Args {
    /// Directory for settings and the session database
    #[arg(long, env = "TABCHAT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// System prompt for this run
    #[arg(long)]
    system_prompt: Option<String>,

    /// Use the built-in echo provider instead of configured providers
    #[arg(long)]
    offline: bool,

    /// Keep sessions in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Resume a session by id
    #[arg(long, short = 's')]
    session: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let paths = match &args.data_dir {
        Some(dir) => AppPaths::new(dir),
        None => AppPaths::from_config_dir().context("cannot determine config directory")?,
    };
    info!(root = %paths.root().display(), "Starting tabchat");

    let settings = Arc::new(load_settings(&paths, args.offline).await?);

    let store: Arc<dyn SessionStore> = if args.ephemeral {
        Arc::new(InMemorySessionStore::new())
    } else {
        Arc::new(
            SessionSqliteStore::open(&paths.sessions_db())
                .await
                .context("failed to open session database")?,
        )
    };

    let mut config = EngineConfig::default();
    if let Some(prompt) = &args.system_prompt {
        config = config.with_system_prompt(prompt.clone());
    }

    let engine = ChatEngine::new(
        store,
        settings,
        Arc::new(ProviderRegistry::with_defaults()),
        config,
    );
    if let Some(session_id) = &args.session {
        engine
            .switch_session(session_id)
            .await
            .with_context(|| format!("cannot resume session {session_id}"))?;
    }

    repl::Repl::new(engine).run().await
}

async fn load_settings(paths: &AppPaths, offline: bool) -> Result<SettingsStore> {
    if !offline {
        let settings = SettingsStore::json_at(paths);
        settings.load().await.context("failed to load settings")?;
        return Ok(settings);
    }

    let settings = SettingsStore::in_memory();
    settings
        .upsert_provider(
            ProviderConfig::new(OFFLINE_PROVIDER_ID, "Echo", "echo")
                .with_default_model(OFFLINE_MODEL_ID),
        )
        .await?;
    let pair = || {
        (
            Some(OFFLINE_PROVIDER_ID.to_string()),
            Some(OFFLINE_MODEL_ID.to_string()),
        )
    };
    let (chat_provider, chat_model) = pair();
    let (title_provider, title_model) = pair();
    settings
        .update_general(
            GeneralSettingsPatch::default()
                .chat(chat_provider, chat_model)
                .title(title_provider, title_model),
        )
        .await?;
    Ok(settings)
}
