//! Playback control plane.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Bus interfaces (mpris module)                  │
//! │        method calls → SessionHandle, reads ← PlayerSnapshot     │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ mpsc request + oneshot ack
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                Dispatcher (single owner of state)               │
//! │   PlayerSession ─ Playlist ─ EngineAdapter<StreamingEngine>     │
//! │   serializes commands, engine signals, and position polling     │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ crossbeam commands
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              SymphoniaEngine (decoder thread + cpal)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod audio;
mod decoder;
mod dispatch;
mod engine;
mod playlist;
mod resampler;
mod session;
mod state;

pub use audio::SymphoniaEngine;
pub use decoder::AudioDecoder;
pub use dispatch::{DispatchOutcome, Dispatcher, Request, SessionHandle};
pub use engine::{
    EngineAdapter, EngineError, EngineSignal, StreamingEngine, micros_to_seconds,
    seconds_to_micros,
};
pub use playlist::{CurrentTrackInfo, PlaybackInfo, Playlist, PlaylistError, RepeatMode};
pub use session::{Command, PlayerSession, SessionOptions};
pub use state::{
    LoopStatus, MetadataSnapshot, PlaybackStatus, PlayerEvent, PlayerSnapshot, Property,
    PropertyChange, SessionExit, format_micros,
};

/// Errors from the player session and its handle.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("playlist is empty")]
    EmptyPlaylist,

    #[error("invalid loop status: {0} (expected None, Track or Playlist)")]
    InvalidLoopStatus(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("player session is no longer running")]
    ChannelClosed,
}
