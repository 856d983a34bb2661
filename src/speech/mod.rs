//! Text-to-speech generation and the clip cache.
//!
//! - [`SpeechSynthesizer`]: trait over the remote provider, mocked in tests
//! - [`ElevenLabsClient`]: the HTTP implementation
//! - [`ClipResolver`]: turns text into a local clip, reusing cached audio
//!   when the same text was spoken before

mod clips;
mod elevenlabs;

pub use clips::{ClipResolver, ResolvedClip};
pub use elevenlabs::{ElevenLabsClient, Quota};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::SpeechConfig;

/// Errors from speech generation.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("No API key configured (add one with `keys add`)")]
    MissingApiKey,

    #[error("No voice configured (set speech.voice_id in the config file)")]
    MissingVoice,

    #[error("Nothing to speak")]
    EmptyText,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("API key quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Voice parameters as fractions in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

/// One synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    pub model_id: String,
    pub settings: VoiceSettings,
}

impl SpeechRequest {
    /// Build a request from config, converting percentages to fractions.
    pub fn from_config(text: impl Into<String>, config: &SpeechConfig) -> Result<Self, SpeechError> {
        if config.voice_id.trim().is_empty() {
            return Err(SpeechError::MissingVoice);
        }
        Ok(Self {
            text: text.into(),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            settings: VoiceSettings {
                stability: percent(config.stability),
                similarity_boost: percent(config.similarity_boost),
            },
        })
    }
}

fn percent(value: u8) -> f32 {
    f32::from(value.min(100)) / 100.0
}

/// Remote speech provider.
///
/// Implement this trait to substitute a mock in tests.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Generate MP3 audio for `request` using `api_key`.
    async fn synthesize(&self, api_key: &str, request: &SpeechRequest) -> Result<Vec<u8>, SpeechError>;
}

/// Cache key for a text: hex SHA-256 of its UTF-8 bytes.
pub fn text_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_hash() {
        assert_eq!(
            text_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(text_hash("abc"), text_hash("abd"));
    }

    #[test]
    fn test_request_from_config() {
        let mut config = SpeechConfig::default();
        assert!(matches!(
            SpeechRequest::from_config("hi", &config),
            Err(SpeechError::MissingVoice)
        ));

        config.voice_id = "voice-1".into();
        let request = SpeechRequest::from_config("hi", &config).unwrap();
        assert_eq!(request.settings.stability, 0.5);
        assert_eq!(request.settings.similarity_boost, 0.75);
        assert_eq!(request.model_id, "eleven_multilingual_v2");
    }
}
