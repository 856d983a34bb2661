//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `play`: speaking, replaying history, and playing files in a session
//! - `history`: listing and pruning generated clips
//! - `keys`: managing provider API keys

mod history;
mod keys;
mod play;

use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::config::{self, Config};
use crate::db;
use crate::error::{Result, ResultExt};
use crate::player::LoopStatus;

pub use history::cmd_history;
pub use keys::cmd_keys;
pub use play::{cmd_play, cmd_replay, cmd_speak};

/// ElevenLabs text-to-speech with media player controls
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Loop status for the session: None, Track or Playlist
    #[arg(long = "loop", global = true, value_name = "STATUS")]
    pub loop_status: Option<LoopStatus>,

    /// Shuffle the playlist
    #[arg(long, global = true)]
    pub shuffle: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, env = "ELEVENLABS_TTS_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Speak text (or the current primary selection) and play it
    Speak {
        /// Text to speak; the primary selection is used when omitted
        text: Option<String>,
    },
    /// Play every clip from history that is still on disk
    Replay,
    /// Play audio files or directories (.mp3, .wav)
    Play {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show generated clips
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
        /// Delete all history entries
        #[arg(long)]
        clear: bool,
        /// Drop entries whose audio file no longer exists
        #[arg(long)]
        prune: bool,
    },
    /// Manage provider API keys
    Keys {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand)]
pub enum KeyAction {
    /// List stored keys with their quota
    List,
    /// Store a new key
    Add { label: String, key: String },
    /// Delete a key by id
    Remove { id: i64 },
    /// Fetch current quota for every key from the provider
    Refresh,
}

/// Run the command selected on the command line.
///
/// With no subcommand the current selection is spoken.
pub fn run_command(args: &Cli) -> anyhow::Result<()> {
    let config = config::load(args.config.as_deref());
    // first run: leave an editable file with the defaults
    if args.config.is_none()
        && config::config_path().is_some_and(|path| !path.exists())
        && let Err(e) = config::save(&config)
    {
        warn!(target: "cli", error = %e, "Could not write default config");
    }
    let rt = Runtime::new()?;

    match &args.command {
        None => cmd_speak(&rt, &config, args, None),
        Some(Commands::Speak { text }) => cmd_speak(&rt, &config, args, text.as_deref()),
        Some(Commands::Replay) => cmd_replay(&rt, &config, args),
        Some(Commands::Play { paths }) => cmd_play(&rt, &config, args, paths),
        Some(Commands::History {
            limit,
            clear,
            prune,
        }) => cmd_history(&rt, &config, *limit, *clear, *prune),
        Some(Commands::Keys { action }) => cmd_keys(&rt, &config, action),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Open (creating if needed) the history and key store.
pub(crate) async fn open_store(config: &Config) -> Result<SqlitePool> {
    let path = config.cache.database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(format!("creating {}", parent.display()))?;
    }
    debug!(target: "cli", db = %path.display(), "Opening store");
    db::init_db(&db::db_url(&path))
        .await
        .with_context(format!("opening {}", path.display()))
}
