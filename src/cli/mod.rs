//! Command-line interface for elevenlabs-tts.
//!
//! Speaking, replaying and playing files all end in a media-player session
//! published on the session bus; `history` and `keys` manage the store.

mod commands;

pub use commands::{Cli, Commands, KeyAction, run_command};
