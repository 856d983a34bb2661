//! Concrete streaming engine: symphonia decoding into a cpal output stream.
//!
//! ```text
//!   SymphoniaEngine (session thread)
//!         │ crossbeam commands
//!         ▼
//!   decoder thread ── AudioChunk ──► cpal output callback
//!         │
//!         └── EngineSignal (end of stream, errors) ──► dispatcher
//! ```
//!
//! Position is taken from the timestamp of the chunk the output callback is
//! currently playing. Every load, seek, and stop bumps a generation counter
//! so chunks decoded for an older position are discarded unplayed.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use super::decoder::AudioDecoder;
use super::engine::{EngineError, EngineSignal, StreamingEngine};
use super::resampler::Conformer;
use crate::model::path_from_uri;

const CHUNK_BUFFER: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OutputStatus {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// State shared between the engine, the decoder thread, and the callback.
#[derive(Debug)]
struct Shared {
    status: OutputStatus,
    position: Duration,
    duration: Option<Duration>,
    volume: f32,
    generation: u64,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            status: OutputStatus::Idle,
            position: Duration::ZERO,
            duration: None,
            volume: 1.0,
            generation: 0,
        }
    }
}

enum EngineCommand {
    Load(Box<AudioDecoder>),
    Play,
    Pause,
    Stop,
    Seek(f64),
    Shutdown,
}

/// Decoded samples already conformed to the device format.
struct AudioChunk {
    samples: Vec<f32>,
    timestamp: Duration,
    generation: u64,
}

/// Local file playback through the default output device.
pub struct SymphoniaEngine {
    shared: Arc<RwLock<Shared>>,
    commands: Sender<EngineCommand>,
    loaded: bool,
    _stream: Stream,
    decoder_thread: Option<JoinHandle<()>>,
}

impl SymphoniaEngine {
    /// Open the default output device and start the decoder thread.
    ///
    /// End-of-stream and asynchronous errors are reported on `signals`.
    pub fn new(signals: UnboundedSender<EngineSignal>) -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Output("no output device found".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::Output(e.to_string()))?;
        let output_rate = supported.sample_rate().0;
        let output_channels = supported.channels();
        info!(
            target: "player::audio",
            device = %device_name,
            rate = output_rate,
            channels = output_channels,
            "Audio output ready"
        );

        let config = StreamConfig {
            channels: output_channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(RwLock::new(Shared::default()));
        let (command_tx, command_rx) = unbounded();
        let (audio_tx, audio_rx) = bounded::<AudioChunk>(CHUNK_BUFFER);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, audio_rx, Arc::clone(&shared)),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, audio_rx, Arc::clone(&shared)),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, audio_rx, Arc::clone(&shared)),
            format => {
                return Err(EngineError::Output(format!(
                    "unsupported sample format: {format:?}"
                )));
            }
        }
        .map_err(|e| EngineError::Output(e.to_string()))?;
        stream.play().map_err(|e| EngineError::Output(e.to_string()))?;

        let thread_shared = Arc::clone(&shared);
        let decoder_thread = thread::Builder::new()
            .name("tts-decoder".to_string())
            .spawn(move || {
                let ctx = DecodeContext::new(output_rate, output_channels, signals);
                decoder_thread_main(ctx, thread_shared, command_rx, audio_tx);
            })
            .map_err(EngineError::Io)?;

        Ok(Self {
            shared,
            commands: command_tx,
            loaded: false,
            _stream: stream,
            decoder_thread: Some(decoder_thread),
        })
    }

    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::ChannelClosed)
    }
}

impl StreamingEngine for SymphoniaEngine {
    fn set_uri(&mut self, uri: &str) -> Result<(), EngineError> {
        self.loaded = false;
        let path = media_path(uri)?;
        let decoder = AudioDecoder::open(&path)?;
        {
            let mut shared = self.shared.write();
            shared.status = OutputStatus::Idle;
            shared.position = Duration::ZERO;
            shared.duration = decoder.duration();
            shared.generation += 1;
        }
        self.send(EngineCommand::Load(Box::new(decoder)))?;
        self.loaded = true;
        Ok(())
    }

    fn play(&mut self) -> Result<(), EngineError> {
        if !self.loaded {
            return Err(EngineError::NoMedia);
        }
        self.send(EngineCommand::Play)
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.shared.write().status = OutputStatus::Paused;
        self.send(EngineCommand::Pause)
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        {
            let mut shared = self.shared.write();
            shared.status = OutputStatus::Idle;
            shared.position = Duration::ZERO;
            shared.generation += 1;
        }
        self.send(EngineCommand::Stop)
    }

    fn seek(&mut self, seconds: f64) -> Result<(), EngineError> {
        if !self.loaded {
            return Err(EngineError::NoMedia);
        }
        {
            let mut shared = self.shared.write();
            shared.position = Duration::from_secs_f64(seconds.max(0.0));
            shared.generation += 1;
        }
        self.send(EngineCommand::Seek(seconds))
    }

    fn position(&self) -> Option<f64> {
        self.loaded
            .then(|| self.shared.read().position.as_secs_f64())
    }

    fn duration(&self) -> Option<f64> {
        self.shared.read().duration.map(|d| d.as_secs_f64())
    }

    fn set_volume(&mut self, level: f64) {
        self.shared.write().volume = level.max(0.0) as f32;
    }

    fn volume(&self) -> f64 {
        f64::from(self.shared.read().volume)
    }
}

impl Drop for SymphoniaEngine {
    fn drop(&mut self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
        if let Some(handle) = self.decoder_thread.take()
            && handle.join().is_err()
        {
            warn!(target: "player::audio", "Decoder thread panicked");
        }
    }
}

/// Resolve a `file://` URI to an existing local path.
fn media_path(uri: &str) -> Result<PathBuf, EngineError> {
    let path = path_from_uri(uri).ok_or_else(|| EngineError::InvalidUri(uri.to_string()))?;
    if !path.is_file() {
        return Err(EngineError::missing_file(path));
    }
    Ok(path)
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    audio_rx: Receiver<AudioChunk>,
    shared: Arc<RwLock<Shared>>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut current: Option<(AudioChunk, usize)> = None;

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let (status, volume, generation) = {
                let s = shared.read();
                (s.status, s.volume, s.generation)
            };
            if status != OutputStatus::Playing {
                data.fill(T::from_sample(0.0f32));
                return;
            }
            if let Some(position) = fill_output(data, &mut current, &audio_rx, generation, volume) {
                let mut s = shared.write();
                if s.generation == generation {
                    s.position = position;
                }
            }
        },
        |err| {
            error!(target: "player::audio", error = %err, "Audio stream error");
        },
        None,
    )
}

/// Copy queued samples into `data`, padding with silence on underrun.
///
/// Chunks from an older generation are dropped. Returns the timestamp of
/// the most recently started chunk, if one started.
fn fill_output<T>(
    data: &mut [T],
    current: &mut Option<(AudioChunk, usize)>,
    audio_rx: &Receiver<AudioChunk>,
    generation: u64,
    volume: f32,
) -> Option<Duration>
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let mut started = None;
    let mut written = 0;

    while written < data.len() {
        if current.as_ref().is_none_or(|(chunk, _)| chunk.generation != generation) {
            *current = None;
            match audio_rx.try_recv() {
                Ok(chunk) if chunk.generation != generation => continue,
                Ok(chunk) => {
                    started = Some(chunk.timestamp);
                    *current = Some((chunk, 0));
                }
                Err(_) => {
                    data[written..].fill(T::from_sample(0.0f32));
                    break;
                }
            }
        }

        if let Some((chunk, offset)) = current.as_mut() {
            let count = (chunk.samples.len() - *offset).min(data.len() - written);
            for (out, sample) in data[written..written + count]
                .iter_mut()
                .zip(&chunk.samples[*offset..*offset + count])
            {
                *out = T::from_sample(sample * volume);
            }
            *offset += count;
            written += count;
            if *offset >= chunk.samples.len() {
                *current = None;
            }
        }
    }
    started
}

/// Decoder-thread state.
struct DecodeContext {
    decoder: Option<Box<AudioDecoder>>,
    conformer: Option<Conformer>,
    output_rate: u32,
    output_channels: u16,
    /// Chunk waiting for room in the output queue
    pending: Option<AudioChunk>,
    /// Stream fully decoded, waiting for the output to play it out
    draining: bool,
    signals: UnboundedSender<EngineSignal>,
}

impl DecodeContext {
    fn new(output_rate: u32, output_channels: u16, signals: UnboundedSender<EngineSignal>) -> Self {
        Self {
            decoder: None,
            conformer: None,
            output_rate,
            output_channels,
            pending: None,
            draining: false,
            signals,
        }
    }

    fn signal(&self, signal: EngineSignal) {
        if self.signals.send(signal).is_err() {
            debug!(target: "player::audio", "Signal receiver gone");
        }
    }

    fn fail(&mut self, error: EngineError, shared: &RwLock<Shared>) {
        shared.write().status = OutputStatus::Idle;
        self.decoder = None;
        self.conformer = None;
        self.pending = None;
        self.draining = false;
        self.signal(EngineSignal::Error(error));
    }

    /// Returns whether the thread should keep running.
    fn handle_command(&mut self, command: EngineCommand, shared: &RwLock<Shared>) -> bool {
        match command {
            EngineCommand::Load(decoder) => {
                self.pending = None;
                self.draining = false;
                match Conformer::new(
                    decoder.sample_rate(),
                    decoder.channels(),
                    self.output_rate,
                    self.output_channels,
                ) {
                    Ok(conformer) => {
                        self.conformer = Some(conformer);
                        self.decoder = Some(decoder);
                    }
                    Err(e) => self.fail(e, shared),
                }
            }
            EngineCommand::Play => {
                if self.decoder.is_some() {
                    shared.write().status = OutputStatus::Playing;
                }
            }
            EngineCommand::Pause => shared.write().status = OutputStatus::Paused,
            EngineCommand::Stop => {
                shared.write().status = OutputStatus::Idle;
                self.rewind(0.0, shared);
            }
            EngineCommand::Seek(seconds) => self.rewind(seconds, shared),
            EngineCommand::Shutdown => return false,
        }
        true
    }

    fn rewind(&mut self, seconds: f64, shared: &RwLock<Shared>) {
        self.pending = None;
        self.draining = false;
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        match decoder.seek(seconds) {
            Ok(reached) => {
                shared.write().position = reached;
                if let Some(conformer) = self.conformer.as_mut() {
                    conformer.reset();
                }
            }
            Err(e) => self.fail(e, shared),
        }
    }

    /// Move one step of audio towards the output. Returns false once the
    /// output side has gone away.
    fn pump(&mut self, audio_tx: &Sender<AudioChunk>, shared: &RwLock<Shared>) -> bool {
        if let Some(chunk) = self.pending.take() {
            return match audio_tx.try_send(chunk) {
                Ok(()) => true,
                Err(TrySendError::Full(chunk)) => {
                    self.pending = Some(chunk);
                    thread::sleep(Duration::from_millis(5));
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            };
        }

        if self.draining {
            if audio_tx.is_empty() {
                self.draining = false;
                shared.write().status = OutputStatus::Idle;
                info!(target: "player::audio", "End of stream");
                self.signal(EngineSignal::EndOfStream);
            } else {
                thread::sleep(Duration::from_millis(10));
            }
            return true;
        }

        let (Some(decoder), Some(conformer)) = (self.decoder.as_mut(), self.conformer.as_mut())
        else {
            shared.write().status = OutputStatus::Idle;
            return true;
        };
        let generation = shared.read().generation;

        match decoder.decode_next() {
            Ok(Some(frame)) => {
                let samples = conformer.process(&frame.samples);
                if !samples.is_empty() {
                    self.pending = Some(AudioChunk {
                        samples,
                        timestamp: frame.timestamp,
                        generation,
                    });
                }
            }
            Ok(None) => {
                let tail = conformer.flush();
                let timestamp = decoder.duration().unwrap_or_else(|| shared.read().position);
                if !tail.is_empty() {
                    self.pending = Some(AudioChunk {
                        samples: tail,
                        timestamp,
                        generation,
                    });
                }
                self.draining = true;
            }
            Err(e) => {
                error!(target: "player::audio", error = %e, "Decode failed");
                self.fail(e, shared);
            }
        }
        true
    }
}

fn decoder_thread_main(
    mut ctx: DecodeContext,
    shared: Arc<RwLock<Shared>>,
    command_rx: Receiver<EngineCommand>,
    audio_tx: Sender<AudioChunk>,
) {
    loop {
        let playing = shared.read().status == OutputStatus::Playing;

        // Block while idle, poll while playing
        let command = if playing {
            command_rx.try_recv().ok()
        } else {
            match command_rx.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        };

        if let Some(command) = command
            && !ctx.handle_command(command, &shared)
        {
            break;
        }

        if shared.read().status == OutputStatus::Playing && !ctx.pump(&audio_tx, &shared) {
            break;
        }
    }
    debug!(target: "player::audio", "Decoder thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(samples: Vec<f32>, secs: u64, generation: u64) -> AudioChunk {
        AudioChunk {
            samples,
            timestamp: Duration::from_secs(secs),
            generation,
        }
    }

    #[test]
    fn test_media_path_rejects_non_file_uri() {
        assert!(matches!(
            media_path("https://example.com/a.mp3"),
            Err(EngineError::InvalidUri(_))
        ));
    }

    #[test]
    fn test_media_path_requires_existing_file() {
        assert!(matches!(
            media_path("file:///nonexistent/clip.mp3"),
            Err(EngineError::Io(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip one.mp3");
        std::fs::write(&path, b"x").unwrap();
        let uri = crate::model::uri_from_path(&path).unwrap();
        assert_eq!(media_path(&uri).unwrap(), path);
    }

    #[test]
    fn test_fill_output_copies_with_volume() {
        let (tx, rx) = bounded(4);
        tx.send(chunk(vec![1.0, 0.5], 3, 0)).unwrap();
        tx.send(chunk(vec![0.25], 4, 0)).unwrap();
        let mut current = None;
        let mut data = [0.0f32; 4];

        let started = fill_output(&mut data, &mut current, &rx, 0, 0.5);
        assert_eq!(data, [0.5, 0.25, 0.125, 0.0]);
        assert_eq!(started, Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_fill_output_skips_stale_generation() {
        let (tx, rx) = bounded(4);
        tx.send(chunk(vec![0.9, 0.9], 1, 1)).unwrap();
        tx.send(chunk(vec![0.1, 0.2], 7, 2)).unwrap();
        let mut current = None;
        let mut data = [0.0f32; 2];

        let started = fill_output(&mut data, &mut current, &rx, 2, 1.0);
        assert_eq!(data, [0.1, 0.2]);
        assert_eq!(started, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_fill_output_keeps_partial_chunk() {
        let (tx, rx) = bounded(4);
        tx.send(chunk(vec![0.1, 0.2, 0.3], 0, 0)).unwrap();
        let mut current = None;

        let mut first = [0.0f32; 2];
        fill_output(&mut first, &mut current, &rx, 0, 1.0);
        let mut second = [0.0f32; 2];
        let started = fill_output(&mut second, &mut current, &rx, 0, 1.0);

        assert_eq!(first, [0.1, 0.2]);
        assert_eq!(second, [0.3, 0.0]);
        assert_eq!(started, None);
    }
}
