//! Streaming engine abstraction and the adapter the session drives.
//!
//! The [`StreamingEngine`] trait is the seam between the player session and
//! whatever actually decodes and outputs audio. [`EngineAdapter`] wraps an
//! engine and owns the policy that is independent of the backend:
//!
//! - unit conversion between engine seconds and protocol microseconds
//! - volume kept non-negative, mute remembering the stored level
//! - end-of-stream reported at most once per loaded track
//! - halting playback when the engine reports an error

use std::path::PathBuf;

use tracing::{debug, error};

/// Errors raised by a streaming engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Audio output error: {0}")]
    Output(String),

    #[error("Invalid media URI: {0}")]
    InvalidUri(String),

    #[error("No media loaded")]
    NoMedia,

    #[error("Engine channel closed")]
    ChannelClosed,
}

impl EngineError {
    pub fn missing_file(path: PathBuf) -> Self {
        EngineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        ))
    }
}

/// Asynchronous notifications from an engine.
#[derive(Debug)]
pub enum EngineSignal {
    EndOfStream,
    Error(EngineError),
}

/// Backend capable of playing one audio resource at a time.
///
/// Times are in seconds. Volume may exceed 1.0 for amplification.
pub trait StreamingEngine {
    fn set_uri(&mut self, uri: &str) -> Result<(), EngineError>;
    fn play(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self) -> Result<(), EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
    /// Seek to an absolute position.
    fn seek(&mut self, seconds: f64) -> Result<(), EngineError>;
    /// Current position, if the engine can report one.
    fn position(&self) -> Option<f64>;
    /// Duration of the loaded resource, if known.
    fn duration(&self) -> Option<f64>;
    fn set_volume(&mut self, level: f64);
    fn volume(&self) -> f64;
}

pub fn seconds_to_micros(seconds: f64) -> i64 {
    (seconds * 1_000_000.0).round() as i64
}

pub fn micros_to_seconds(micros: i64) -> f64 {
    micros as f64 / 1_000_000.0
}

/// Wraps a [`StreamingEngine`] with protocol units and error policy.
pub struct EngineAdapter<E> {
    engine: E,
    /// Set on load/seek, cleared once end-of-stream is reported
    eos_armed: bool,
    /// Whether the last load succeeded
    loaded: bool,
    /// Volume to restore on unmute
    stored_volume: f64,
    muted: bool,
}

impl<E: StreamingEngine> EngineAdapter<E> {
    pub fn new(engine: E) -> Self {
        let stored_volume = engine.volume().max(0.0);
        Self {
            engine,
            eos_armed: false,
            loaded: false,
            stored_volume,
            muted: false,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Load a new resource.
    pub fn load(&mut self, uri: &str) -> Result<(), EngineError> {
        debug!(target: "player::engine", uri, "Loading");
        self.eos_armed = true;
        let result = self.engine.set_uri(uri);
        self.loaded = result.is_ok();
        self.halt_on_error(result)
    }

    /// Start or resume output. Fails with [`EngineError::NoMedia`] when
    /// the last load did not succeed.
    pub fn play(&mut self) -> Result<(), EngineError> {
        if !self.loaded {
            return Err(EngineError::NoMedia);
        }
        let result = self.engine.play();
        self.halt_on_error(result)
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        let result = self.engine.pause();
        self.halt_on_error(result)
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.engine.stop()
    }

    /// Seek to an absolute position in microseconds.
    pub fn seek_to(&mut self, micros: i64) -> Result<(), EngineError> {
        self.eos_armed = true;
        let result = self.engine.seek(micros_to_seconds(micros.max(0)));
        self.halt_on_error(result)
    }

    /// Seek relative to the current position, clamped at zero.
    ///
    /// Returns the new absolute position in microseconds.
    pub fn seek_by(&mut self, offset_micros: i64) -> Result<i64, EngineError> {
        let current = self.position_micros().unwrap_or(0);
        let target = current.saturating_add(offset_micros).max(0);
        self.seek_to(target)?;
        Ok(target)
    }

    pub fn position_micros(&self) -> Option<i64> {
        self.engine.position().map(seconds_to_micros)
    }

    /// Duration in microseconds, 0 when unknown.
    pub fn duration_micros(&self) -> i64 {
        self.engine.duration().map_or(0, seconds_to_micros).max(0)
    }

    /// Set the engine volume. Negative levels clamp to 0; levels above 1
    /// amplify.
    pub fn set_volume(&mut self, level: f64) {
        self.stored_volume = level.max(0.0);
        if !self.muted {
            self.engine.set_volume(self.stored_volume);
        }
    }

    pub fn volume(&self) -> f64 {
        self.stored_volume
    }

    pub fn mute(&mut self, muted: bool) {
        self.muted = muted;
        let level = if muted { 0.0 } else { self.stored_volume };
        self.engine.set_volume(level);
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Translate a raw engine signal into one the session should act on.
    ///
    /// End-of-stream passes through once per load; errors halt playback.
    pub fn translate(&mut self, signal: EngineSignal) -> Option<EngineSignal> {
        match signal {
            EngineSignal::EndOfStream if self.eos_armed => {
                self.eos_armed = false;
                Some(EngineSignal::EndOfStream)
            }
            EngineSignal::EndOfStream => {
                debug!(target: "player::engine", "Duplicate end of stream dropped");
                None
            }
            EngineSignal::Error(e) => {
                error!(target: "player::engine", error = %e, "Engine error, halting playback");
                self.halt();
                Some(EngineSignal::Error(e))
            }
        }
    }

    fn halt_on_error<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(e) = &result {
            error!(target: "player::engine", error = %e, "Engine command failed, halting playback");
            self.halt();
        }
        result
    }

    fn halt(&mut self) {
        self.eos_armed = false;
        if let Err(e) = self.engine.stop() {
            debug!(target: "player::engine", error = %e, "Stop after error also failed");
        }
    }
}
