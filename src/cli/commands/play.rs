//! Speaking, replaying, and playing files.

use anyhow::{Context, bail};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{Cli, open_store};
use crate::config::Config;
use crate::db;
use crate::metadata::{self, CLIP_ALBUM, TrackOverrides, clip_artist, clip_title};
use crate::model::Track;
use crate::mpris;
use crate::player::{
    DispatchOutcome, Dispatcher, EngineAdapter, PlayerSession, Playlist, SymphoniaEngine,
};
use crate::scanner;
use crate::selection;
use crate::speech::{ClipResolver, ElevenLabsClient};

/// Speak `text`, or the primary selection, and play the clip
pub fn cmd_speak(rt: &Runtime, config: &Config, args: &Cli, text: Option<&str>) -> anyhow::Result<()> {
    let (clip, text) = rt.block_on(async {
        let text = match text {
            Some(text) => text.to_string(),
            None => selection::selected_text()
                .await
                .context("No text given and nothing selected")?,
        };

        let pool = open_store(config).await?;
        let client = ElevenLabsClient::new(&config.speech)?;
        let resolver = ClipResolver::new(
            pool,
            client,
            config.speech.clone(),
            config.cache.clip_dir(),
            config.cache.retention(),
        );
        let clip = resolver.resolve(&text).await?;
        anyhow::Ok((clip, text))
    })?;

    let overrides = TrackOverrides {
        name: Some(clip_title(text.trim())),
        artists: Some(vec![clip_artist(&config.speech.voice_name)]),
        album: Some(CLIP_ALBUM.to_string()),
        ..TrackOverrides::default()
    };
    let track = metadata::build_track(&clip.path, &config.player.bus_suffix, &overrides)?;
    info!(target: "cli", path = %clip.path.display(), cached = clip.cached, "Playing clip");

    run_session(rt, config, args, vec![track])
}

/// Play every history clip still on disk
pub fn cmd_replay(rt: &Runtime, config: &Config, args: &Cli) -> anyhow::Result<()> {
    let entries = rt.block_on(async {
        let pool = open_store(config).await?;
        anyhow::Ok(db::all_history(&pool).await?)
    })?;

    let total = entries.len();
    let tracks: Vec<Track> = entries
        .iter()
        .filter(|entry| entry.file_exists())
        .filter_map(|entry| build(&entry.audio_path(), config))
        .collect();

    if tracks.is_empty() {
        bail!("No clips in history to replay");
    }
    info!(target: "cli", tracks = tracks.len(), missing = total - tracks.len(), "Replaying history");

    run_session(rt, config, args, tracks)
}

/// Play audio files and directories
pub fn cmd_play(rt: &Runtime, config: &Config, args: &Cli, paths: &[PathBuf]) -> anyhow::Result<()> {
    let files = rt.block_on(scanner::collect(paths.to_vec()));
    let tracks: Vec<Track> = files
        .iter()
        .filter_map(|path| build(path, config))
        .collect();

    if tracks.is_empty() {
        bail!("No playable .mp3 or .wav files found");
    }
    info!(target: "cli", tracks = tracks.len(), "Playing files");

    run_session(rt, config, args, tracks)
}

fn build(path: &std::path::Path, config: &Config) -> Option<Track> {
    match metadata::build_track(path, &config.player.bus_suffix, &TrackOverrides::default()) {
        Ok(track) => Some(track),
        Err(e) => {
            warn!(target: "cli", path = %path.display(), error = %e, "Skipping file");
            None
        }
    }
}

/// Run a player session on the bus until it ends or Ctrl-C.
///
/// The bus connection is made first so nothing plays without it. The
/// output stream is not `Send`, so the session is driven on this thread
/// with `block_on`; only the signal forwarder runs on the worker pool.
fn run_session(rt: &Runtime, config: &Config, args: &Cli, tracks: Vec<Track>) -> anyhow::Result<()> {
    let options = config
        .player
        .session_options(args.loop_status, args.shuffle)?;
    let poll_interval = options.poll_interval;

    let service = rt.block_on(mpris::MprisService::connect(&config.player))?;

    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let engine = SymphoniaEngine::new(signal_tx)?;
    let session = PlayerSession::new(
        Playlist::new(tracks),
        EngineAdapter::new(engine),
        event_tx,
        options,
    )?;
    let (dispatcher, handle) = Dispatcher::new(session, signal_rx, poll_interval);

    let outcome = rt.block_on(service.serve(dispatcher, handle, event_rx, interrupted()))?;

    match outcome {
        DispatchOutcome::Interrupted => info!(target: "cli", "Stopped by user"),
        DispatchOutcome::Ended(exit) => info!(target: "cli", ?exit, "Playback finished"),
        DispatchOutcome::Disconnected => warn!(target: "cli", "Session inputs closed"),
    }
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(target: "cli", error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
