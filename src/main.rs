//! ElevenLabs TTS - speak selected text and control playback from any
//! media-player applet.
//!
//! Text is turned into speech through the ElevenLabs API, cached on disk,
//! and played in a session published on the session bus as an MPRIS
//! player, so desktop media keys and widgets can pause, seek, and skip it.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod metadata;
pub mod model;
pub mod mpris;
pub mod player;
pub mod scanner;
pub mod selection;
pub mod speech;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("elevenlabs_tts=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
