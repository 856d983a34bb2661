//! Database module for settings, API keys, and speech history.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Provides async operations for:
//! - JSON-valued key/value settings
//! - API key storage and rotation across exhausted quotas
//! - Generated clip history with retention trimming
//!
//! # Example
//!
//! ```ignore
//! use elevenlabs_tts::db::{init_db, history};
//!
//! let pool = init_db("sqlite:tts.db").await?;
//! let recent = history(&pool, 10).await?;
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

/// Settings key holding the index of the API key in use.
pub const ACTIVE_KEY_INDEX: &str = "active_key_index";

/// Characters kept in a history preview.
const PREVIEW_CHARS: usize = 100;

/// Build a SQLite database URL from a path.
pub fn db_url(path: &Path) -> String {
    format!("sqlite:{}", path.display())
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

// ============================================================================
// Settings
// ============================================================================

/// Read a JSON-encoded setting.
///
/// A value that no longer parses as `T` is treated as missing.
pub async fn get_config<T: DeserializeOwned>(pool: &SqlitePool, key: &str) -> sqlx::Result<Option<T>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM config WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(value,)| match serde_json::from_str(&value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(target: "db", key, error = %e, "Ignoring unparseable setting");
            None
        }
    }))
}

/// Store a setting as JSON, replacing any previous value.
pub async fn set_config<T: Serialize + ?Sized>(
    pool: &SqlitePool,
    key: &str,
    value: &T,
) -> sqlx::Result<()> {
    let encoded = serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    sqlx::query("INSERT OR REPLACE INTO config (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(encoded)
        .execute(pool)
        .await?;
    Ok(())
}

// ============================================================================
// API keys
// ============================================================================

/// A stored provider API key with its quota state.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ApiKey {
    pub id: i64,
    pub label: String,
    pub api_key: String,
    pub character_count: i64,
    pub character_limit: i64,
    pub exhausted: bool,
    pub created_at: String,
}

impl ApiKey {
    /// Key with everything but the last four characters hidden.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}", "*".repeat(chars.len() - 4), tail)
    }
}

pub async fn add_api_key(pool: &SqlitePool, label: &str, api_key: &str) -> sqlx::Result<i64> {
    let result = sqlx::query("INSERT INTO api_keys (label, api_key) VALUES (?, ?)")
        .bind(label)
        .bind(api_key)
        .execute(pool)
        .await?;
    info!(target: "db", label, "Added API key");
    Ok(result.last_insert_rowid())
}

/// All keys in insertion order.
pub async fn list_api_keys(pool: &SqlitePool) -> sqlx::Result<Vec<ApiKey>> {
    sqlx::query_as(
        "SELECT id, label, api_key, character_count, character_limit, exhausted, created_at \
         FROM api_keys ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

/// Returns whether a key was deleted.
pub async fn delete_api_key(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_api_key_exhausted(pool: &SqlitePool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE api_keys SET exhausted = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    warn!(target: "db", id, "API key marked exhausted");
    Ok(())
}

/// Record quota usage reported by the provider.
pub async fn update_api_key_quota(
    pool: &SqlitePool,
    id: i64,
    character_count: i64,
    character_limit: i64,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE api_keys SET character_count = ?, character_limit = ?, exhausted = ? WHERE id = ?",
    )
    .bind(character_count)
    .bind(character_limit)
    .bind(character_count >= character_limit)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Pick the key to use for the next request.
///
/// Starting at the stored index, the first key that is not exhausted wins
/// and becomes the new stored index. When every key is exhausted the first
/// key is returned anyway.
pub async fn active_api_key(pool: &SqlitePool) -> sqlx::Result<Option<ApiKey>> {
    let keys = list_api_keys(pool).await?;
    if keys.is_empty() {
        return Ok(None);
    }

    let stored = get_config::<usize>(pool, ACTIVE_KEY_INDEX).await?.unwrap_or(0);
    let start = stored % keys.len();
    for offset in 0..keys.len() {
        let index = (start + offset) % keys.len();
        if !keys[index].exhausted {
            if index != stored {
                debug!(target: "db", from = stored, to = index, "Rotating API key");
                set_config(pool, ACTIVE_KEY_INDEX, &index).await?;
            }
            return Ok(Some(keys[index].clone()));
        }
    }

    Ok(keys.into_iter().next())
}

// ============================================================================
// History
// ============================================================================

/// One generated clip.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub text_preview: String,
    pub full_text: String,
    pub audio_file: String,
    pub voice_name: String,
    pub model_id: String,
    pub text_hash: String,
    pub thumbnail_url: String,
    pub created_at: String,
}

impl HistoryEntry {
    pub fn audio_path(&self) -> PathBuf {
        PathBuf::from(&self.audio_file)
    }

    /// Whether the clip is still on disk.
    pub fn file_exists(&self) -> bool {
        !self.audio_file.is_empty() && self.audio_path().is_file()
    }
}

/// Fields of a history row before insertion.
#[derive(Debug, Clone, Default)]
pub struct NewHistory<'a> {
    pub text: &'a str,
    pub audio_file: &'a str,
    pub voice_name: &'a str,
    pub model_id: &'a str,
    pub text_hash: &'a str,
    pub thumbnail_url: &'a str,
}

/// History retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Keep(u32),
    Unlimited,
}

/// First hundred characters of `text`, with an ellipsis when truncated.
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Insert a history row and trim older rows per `retention`.
pub async fn add_history(
    pool: &SqlitePool,
    entry: &NewHistory<'_>,
    retention: Retention,
) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO history (text_preview, full_text, audio_file, voice_name,
                             model_id, text_hash, thumbnail_url)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(preview(entry.text))
    .bind(entry.text)
    .bind(entry.audio_file)
    .bind(entry.voice_name)
    .bind(entry.model_id)
    .bind(entry.text_hash)
    .bind(entry.thumbnail_url)
    .execute(&mut *tx)
    .await?;
    let id = result.last_insert_rowid();

    if let Retention::Keep(max) = retention {
        let trimmed = sqlx::query(
            "DELETE FROM history WHERE id NOT IN \
             (SELECT id FROM history ORDER BY created_at DESC, id DESC LIMIT ?)",
        )
        .bind(i64::from(max))
        .execute(&mut *tx)
        .await?;
        if trimmed.rows_affected() > 0 {
            debug!(target: "db", removed = trimmed.rows_affected(), "Trimmed history");
        }
    }

    tx.commit().await?;
    Ok(id)
}

/// Most recent history rows, newest first.
pub async fn history(pool: &SqlitePool, limit: u32) -> sqlx::Result<Vec<HistoryEntry>> {
    sqlx::query_as("SELECT * FROM history ORDER BY created_at DESC, id DESC LIMIT ?")
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await
}

/// Every history row, newest first.
pub async fn all_history(pool: &SqlitePool) -> sqlx::Result<Vec<HistoryEntry>> {
    sqlx::query_as("SELECT * FROM history ORDER BY created_at DESC, id DESC")
        .fetch_all(pool)
        .await
}

/// Newest history row for a text hash.
pub async fn history_by_hash(pool: &SqlitePool, text_hash: &str) -> sqlx::Result<Option<HistoryEntry>> {
    sqlx::query_as(
        "SELECT * FROM history WHERE text_hash = ? ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(text_hash)
    .fetch_optional(pool)
    .await
}

pub async fn history_count(pool: &SqlitePool) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM history")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Returns the number of rows removed.
pub async fn clear_history(pool: &SqlitePool) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM history").execute(pool).await?;
    Ok(result.rows_affected())
}

/// Drop history rows whose audio file is gone. Returns the number removed.
pub async fn cleanup_orphaned_history(pool: &SqlitePool) -> sqlx::Result<u64> {
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, audio_file FROM history")
        .fetch_all(pool)
        .await?;

    let mut removed = 0;
    for (id, audio_file) in rows {
        if !audio_file.is_empty() && !Path::new(&audio_file).exists() {
            sqlx::query("DELETE FROM history WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await?;
            removed += 1;
        }
    }

    if removed > 0 {
        info!(target: "db", removed, "Removed orphaned history entries");
    }
    Ok(removed)
}

/// Total size in bytes of the clips history still points at.
pub async fn cache_size(pool: &SqlitePool) -> sqlx::Result<u64> {
    let entries = all_history(pool).await?;
    Ok(entries
        .iter()
        .filter_map(|entry| std::fs::metadata(entry.audio_path()).ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum())
}
