use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::error::{RepositoryError, RepositoryResult};
use super::session_repository::{BoxFuture, SessionChange, SessionStore};
use crate::chat::models::{ChatSession, SessionPatch, Turn, timestamp_now};
use crate::config::AppPaths;

const CHANGE_CAPACITY: usize = 256;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Migrations applied in order. Each entry is (version, sql).
/// Append new versions; never edit an applied entry.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS chat_sessions (
        id               TEXT    PRIMARY KEY,
        title            TEXT    NOT NULL DEFAULT '',
        messages         TEXT    NOT NULL DEFAULT '[]',
        chat_model_id    TEXT,
        chat_provider_id TEXT,
        tags             TEXT    NOT NULL DEFAULT '[]',
        project_id       TEXT,
        forked_chat_ids  TEXT,
        created_at       INTEGER NOT NULL DEFAULT 0,
        updated_at       INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_chat_sessions_updated_at
        ON chat_sessions (updated_at DESC);",
)];

const SELECT_COLUMNS: &str = "SELECT id, title, messages, chat_model_id, chat_provider_id, tags,
        project_id, forked_chat_ids, created_at, updated_at
     FROM chat_sessions";

/// SQLite-backed session store.
///
/// Uses WAL journal mode so list queries do not block on background writes.
/// `SqlitePool` is internally reference-counted and cheap to clone.
#[derive(Clone)]
pub struct SessionSqliteStore {
    pool: SqlitePool,
    changes: broadcast::Sender<SessionChange>,
}

impl SessionSqliteStore {
    /// Open (or create) the database at the platform config path.
    pub async fn open_default() -> RepositoryResult<Self> {
        let paths = AppPaths::from_config_dir().ok_or_else(|| RepositoryError::InitializationError {
            message: "Cannot find config directory".into(),
        })?;
        Self::open(&paths.sessions_db()).await
    }

    /// Open (or create) the database at `db_path`.
    pub async fn open(db_path: &Path) -> RepositoryResult<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!(path = %db_path.display(), "Opened SQLite session database");

        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self { pool, changes })
    }

    /// Create the schema_version table if absent, then apply any pending migrations.
    async fn run_migrations(pool: &SqlitePool) -> RepositoryResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO schema_version (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version)",
        )
        .execute(pool)
        .await?;

        let current: i64 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                info!(version, "Applying schema migration");
                // One statement per query call.
                for statement in sql.split(';') {
                    let trimmed = statement.trim();
                    if !trimmed.is_empty() {
                        sqlx::query(trimmed).execute(pool).await?;
                    }
                }
                sqlx::query("UPDATE schema_version SET version = ?")
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }

    pub fn db_path() -> Option<PathBuf> {
        AppPaths::from_config_dir().map(|paths| paths.sessions_db())
    }

    fn notify(&self, change: SessionChange) {
        let _ = self.changes.send(change);
    }
}

fn timestamp_from_millis(id: &str, millis: i64) -> RepositoryResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| RepositoryError::CorruptRecord {
        id: id.to_string(),
        message: format!("timestamp {millis} out of range"),
    })
}

fn session_from_row(row: &SqliteRow) -> RepositoryResult<ChatSession> {
    let id: String = row.get("id");
    let messages: Vec<Turn> = serde_json::from_str(row.get::<&str, _>("messages"))?;
    let tags: Vec<String> = serde_json::from_str(row.get::<&str, _>("tags"))?;
    let forked_chat_ids = row
        .get::<Option<String>, _>("forked_chat_ids")
        .map(|raw| serde_json::from_str::<Vec<String>>(&raw))
        .transpose()?;
    let created_at = timestamp_from_millis(&id, row.get("created_at"))?;
    let updated_at = timestamp_from_millis(&id, row.get("updated_at"))?;

    Ok(ChatSession {
        title: row.get("title"),
        messages,
        chat_model_id: row.get("chat_model_id"),
        chat_provider_id: row.get("chat_provider_id"),
        tags,
        project_id: row.get("project_id"),
        forked_chat_ids,
        created_at,
        updated_at,
        id,
    })
}

/// JSON column values for an insert.
struct EncodedSession {
    messages: String,
    tags: String,
    forked_chat_ids: Option<String>,
}

impl EncodedSession {
    fn encode(session: &ChatSession) -> RepositoryResult<Self> {
        Ok(Self {
            messages: serde_json::to_string(&session.messages)?,
            tags: serde_json::to_string(&session.tags)?,
            forked_chat_ids: session
                .forked_chat_ids
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        })
    }
}

impl SessionStore for SessionSqliteStore {
    fn create(&self, session: ChatSession) -> BoxFuture<'static, RepositoryResult<String>> {
        let store = self.clone();
        Box::pin(async move {
            let encoded = EncodedSession::encode(&session)?;
            let result = sqlx::query(
                "INSERT INTO chat_sessions
                    (id, title, messages, chat_model_id, chat_provider_id, tags,
                     project_id, forked_chat_ids, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .bind(&session.id)
            .bind(&session.title)
            .bind(&encoded.messages)
            .bind(&session.chat_model_id)
            .bind(&session.chat_provider_id)
            .bind(&encoded.tags)
            .bind(&session.project_id)
            .bind(&encoded.forked_chat_ids)
            .bind(session.created_at.timestamp_millis())
            .bind(session.updated_at.timestamp_millis())
            .execute(&store.pool)
            .await;

            match result {
                Ok(_) => {}
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    return Err(RepositoryError::Conflict(session.id));
                }
                Err(e) => return Err(e.into()),
            }

            debug!(session_id = %session.id, "Session created");
            store.notify(SessionChange::Created(session.id.clone()));
            Ok(session.id)
        })
    }

    fn get(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<ChatSession>>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        Box::pin(async move {
            let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
                .bind(&id)
                .fetch_optional(&pool)
                .await?;
            row.as_ref().map(session_from_row).transpose()
        })
    }

    fn update(&self, id: &str, patch: SessionPatch) -> BoxFuture<'static, RepositoryResult<()>> {
        let store = self.clone();
        let id = id.to_string();
        Box::pin(async move {
            let messages = patch
                .messages
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let updated_at = messages
                .as_ref()
                .map(|_| timestamp_now().timestamp_millis());
            let (set_model, chat_model_id) = match patch.chat_model_id {
                Some(value) => (true, value),
                None => (false, None),
            };
            let (set_provider, chat_provider_id) = match patch.chat_provider_id {
                Some(value) => (true, value),
                None => (false, None),
            };

            // Single statement: a deferred read-then-write transaction fails
            // with SQLITE_BUSY when another writer commits in between.
            let result = sqlx::query(
                "UPDATE chat_sessions SET
                    title            = COALESCE(?2, title),
                    messages         = COALESCE(?3, messages),
                    updated_at       = COALESCE(?4, updated_at),
                    chat_model_id    = CASE WHEN ?5 THEN ?6 ELSE chat_model_id END,
                    chat_provider_id = CASE WHEN ?7 THEN ?8 ELSE chat_provider_id END
                 WHERE id = ?1",
            )
            .bind(&id)
            .bind(&patch.title)
            .bind(&messages)
            .bind(updated_at)
            .bind(set_model)
            .bind(&chat_model_id)
            .bind(set_provider)
            .bind(&chat_provider_id)
            .execute(&store.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound(id));
            }

            store.notify(SessionChange::Updated(id));
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let store = self.clone();
        let id = id.to_string();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
                .bind(&id)
                .execute(&store.pool)
                .await?;
            if result.rows_affected() > 0 {
                debug!(session_id = %id, "Session deleted");
                store.notify(SessionChange::Deleted(id));
            }
            Ok(())
        })
    }

    fn list_recent(&self, limit: usize) -> BoxFuture<'static, RepositoryResult<Vec<ChatSession>>> {
        let pool = self.pool.clone();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Box::pin(async move {
            let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY updated_at DESC LIMIT ?"))
                .bind(limit)
                .fetch_all(&pool)
                .await?;
            rows.iter().map(session_from_row).collect()
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}
