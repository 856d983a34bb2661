//! Audio decoding with symphonia (MP3 and WAV/PCM).

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::engine::EngineError;

/// One opened audio stream.
pub struct AudioDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    duration: Option<Duration>,
    time_base: Option<TimeBase>,
}

impl AudioDecoder {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| EngineError::UnsupportedFormat(e.to_string()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::UnsupportedFormat("no audio track".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| EngineError::Decode("unknown sample rate".to_string()))?;
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);
        let time_base = params.time_base;
        let duration = params.n_frames.map(|frames| match time_base {
            Some(tb) => time_to_duration(tb.calc_time(frames)),
            None => Duration::from_secs_f64(frames as f64 / sample_rate as f64),
        });

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| EngineError::Decode(e.to_string()))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
            time_base,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total duration, when the container reports a frame count.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Seek to an absolute position, clamped to the stream.
    ///
    /// Returns the position actually reached.
    pub fn seek(&mut self, seconds: f64) -> Result<Duration, EngineError> {
        let mut target = seconds.max(0.0);
        if let Some(duration) = self.duration {
            target = target.min(duration.as_secs_f64());
        }

        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(target),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| EngineError::Decode(format!("seek failed: {e}")))?;
        self.decoder.reset();

        Ok(self
            .time_base
            .map(|tb| time_to_duration(tb.calc_time(seeked.actual_ts)))
            .unwrap_or(Duration::from_secs_f64(target)))
    }

    /// Decode the next packet into interleaved f32 samples.
    ///
    /// Returns `Ok(None)` at end of stream.
    pub fn decode_next(&mut self) -> Result<Option<DecodedFrame>, EngineError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(EngineError::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let timestamp = self
                .time_base
                .map(|tb| time_to_duration(tb.calc_time(packet.ts())))
                .unwrap_or_default();

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                // corrupt frame, keep going
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(EngineError::Decode(e.to_string())),
            };

            return Ok(Some(DecodedFrame {
                samples: interleave(&decoded),
                timestamp,
            }));
        }
    }
}

/// Interleaved samples from one packet.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub samples: Vec<f32>,
    pub timestamp: Duration,
}

fn time_to_duration(time: Time) -> Duration {
    Duration::from_secs_f64(time.seconds as f64 + time.frac)
}

/// Interleave any decoded sample format as f32.
fn interleave(buffer: &AudioBufferRef<'_>) -> Vec<f32> {
    let frames = buffer.frames();
    if frames == 0 {
        return Vec::new();
    }
    let mut samples = SampleBuffer::<f32>::new(frames as u64, *buffer.spec());
    samples.copy_interleaved_ref(buffer.clone());
    samples.samples().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use symphonia::core::audio::{AudioBuffer, Channels, Signal, SignalSpec};

    #[test]
    fn test_open_missing_file() {
        let result = AudioDecoder::open(Path::new("/nonexistent/clip.mp3"));
        assert!(matches!(result, Err(EngineError::Io(_))));
    }

    #[test]
    fn test_open_non_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        assert!(AudioDecoder::open(&path).is_err());
    }

    fn stereo_buffer<S: symphonia::core::sample::Sample>(left: S, right: S) -> AudioBuffer<S> {
        let spec = SignalSpec::new(44_100, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let mut buffer = AudioBuffer::<S>::new(2, spec);
        buffer.render_reserved(Some(2));
        buffer.chan_mut(0).fill(left);
        buffer.chan_mut(1).fill(right);
        buffer
    }

    #[test]
    fn test_interleave_unsigned_formats() {
        let buffer = stereo_buffer::<u16>(32_768, u16::MAX);
        let samples = interleave(&AudioBufferRef::U16(Cow::Borrowed(&buffer)));
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0.0);
        assert!(samples[1] > 0.99);
        assert_eq!(samples[2], 0.0);

        let buffer = stereo_buffer::<u8>(128, 0);
        let samples = interleave(&AudioBufferRef::U8(Cow::Borrowed(&buffer)));
        assert_eq!(samples, vec![0.0, -1.0, 0.0, -1.0]);
    }

    #[test]
    fn test_interleave_signed_formats() {
        let buffer = stereo_buffer::<i8>(i8::MIN, 0);
        let samples = interleave(&AudioBufferRef::S8(Cow::Borrowed(&buffer)));
        assert_eq!(samples, vec![-1.0, 0.0, -1.0, 0.0]);

        let buffer = stereo_buffer::<i16>(0, i16::MIN);
        let samples = interleave(&AudioBufferRef::S16(Cow::Borrowed(&buffer)));
        assert_eq!(samples, vec![0.0, -1.0, 0.0, -1.0]);
    }
}
