//! Conforming decoded audio to the output device format.
//!
//! Generated speech is usually mono at 22.05/44.1kHz while output devices
//! run stereo at 48kHz. [`Conformer`] resamples with rubato and then maps
//! channels so the output callback only ever copies samples.

use rubato::{FftFixedIn, Resampler as _};

use super::engine::EngineError;

/// Input frames per resampler call.
const CHUNK_FRAMES: usize = 1024;

/// Sample rate converter over interleaved samples.
pub struct Resampler {
    inner: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Deinterleaved samples waiting for a full chunk
    pending: Vec<Vec<f32>>,
}

impl Resampler {
    /// Passes samples through untouched when the rates match.
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self, EngineError> {
        let channels = usize::from(channels.max(1));
        let inner = if input_rate == output_rate {
            None
        } else {
            let resampler = FftFixedIn::<f32>::new(
                input_rate as usize,
                output_rate as usize,
                CHUNK_FRAMES,
                2,
                channels,
            )
            .map_err(|e| EngineError::Output(format!("resampler setup failed: {e}")))?;
            tracing::debug!(
                target: "player::audio",
                input_rate,
                output_rate,
                channels,
                "Resampling enabled"
            );
            Some(resampler)
        };

        Ok(Self {
            inner,
            input_rate,
            output_rate,
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    pub fn needs_resampling(&self) -> bool {
        self.inner.is_some()
    }

    pub fn ratio(&self) -> f64 {
        self.output_rate as f64 / self.input_rate as f64
    }

    /// Feed interleaved samples, returning whatever full chunks produced.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(inner) = self.inner.as_mut() else {
            return input.to_vec();
        };

        for (i, sample) in input.iter().enumerate() {
            self.pending[i % self.channels].push(*sample);
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();
            match inner.process(&chunk, None) {
                Ok(resampled) => interleave_into(&resampled, usize::MAX, &mut output),
                Err(e) => tracing::warn!(target: "player::audio", error = %e, "Resampling failed"),
            }
        }
        output
    }

    /// Drain the partial chunk left at end of stream.
    pub fn flush(&mut self) -> Vec<f32> {
        let ratio = self.ratio();
        let Some(inner) = self.inner.as_mut() else {
            return Vec::new();
        };
        let remaining = self.pending[0].len();
        if remaining == 0 {
            return Vec::new();
        }

        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|ch| {
                let mut frames: Vec<f32> = std::mem::take(ch);
                frames.resize(CHUNK_FRAMES, 0.0);
                frames
            })
            .collect();

        let mut output = Vec::new();
        match inner.process(&chunk, None) {
            Ok(resampled) => {
                let keep = (remaining as f64 * ratio).ceil() as usize;
                interleave_into(&resampled, keep, &mut output);
            }
            Err(e) => tracing::warn!(target: "player::audio", error = %e, "Resampler flush failed"),
        }
        output
    }

    /// Forget buffered input (after a seek).
    pub fn reset(&mut self) {
        self.pending.iter_mut().for_each(Vec::clear);
        if let Some(inner) = self.inner.as_mut() {
            inner.reset();
        }
    }
}

fn interleave_into(planes: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
    let Some(first) = planes.first() else {
        return;
    };
    let frames = first.len().min(max_frames);
    output.reserve(frames * planes.len());
    for frame in 0..frames {
        output.extend(planes.iter().map(|ch| ch[frame]));
    }
}

/// Map interleaved samples between channel counts.
///
/// Mono is duplicated to every output channel, extra input channels are
/// dropped, and missing output channels repeat the last input channel.
pub fn remix(input: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return input.to_vec();
    }
    let frames = input.len() / from;
    let mut output = Vec::with_capacity(frames * to);
    for frame in input.chunks_exact(from) {
        for ch in 0..to {
            output.push(frame[ch.min(from - 1)]);
        }
    }
    output
}

/// Resampler plus channel mapping for one decoded stream.
pub struct Conformer {
    resampler: Resampler,
    source_channels: usize,
    output_channels: usize,
}

impl Conformer {
    pub fn new(
        source_rate: u32,
        source_channels: u16,
        output_rate: u32,
        output_channels: u16,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            resampler: Resampler::new(source_rate, output_rate, source_channels)?,
            source_channels: usize::from(source_channels.max(1)),
            output_channels: usize::from(output_channels.max(1)),
        })
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let resampled = self.resampler.process(input);
        remix(&resampled, self.source_channels, self.output_channels)
    }

    pub fn flush(&mut self) -> Vec<f32> {
        let resampled = self.resampler.flush();
        remix(&resampled, self.source_channels, self.output_channels)
    }

    pub fn reset(&mut self) {
        self.resampler.reset();
    }
}
