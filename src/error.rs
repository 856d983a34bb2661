//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors ([`PlayerError`], [`EngineError`],
//!   [`SpeechError`], ...) for detailed handling
//!
//! # Example
//!
//! ```ignore
//! use elevenlabs_tts::error::{Error, Result};
//!
//! async fn open_store(path: &Path) -> Result<SqlitePool> {
//!     db::init_db(&db::db_url(path))
//!         .await
//!         .with_context(format!("opening {}", path.display()))
//! }
//! ```

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::mpris::MprisError;
use crate::player::{EngineError, PlayerError, PlaylistError};
use crate::speech::SpeechError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Metadata reading/writing error
    #[error("Metadata error for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// Player state machine error
    #[error(transparent)]
    Player(#[from] PlayerError),

    /// Streaming engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Playlist configuration error
    #[error(transparent)]
    Playlist(#[from] PlaylistError),

    /// Speech generation error
    #[error(transparent)]
    Speech(#[from] SpeechError),

    /// Session bus error
    #[error("Bus error: {0}")]
    Bus(#[from] zbus::Error),

    /// MPRIS service error
    #[error(transparent)]
    Mpris(#[from] MprisError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// File not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a metadata error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, zbus::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Bus(e).context(ctx))
    }
}
