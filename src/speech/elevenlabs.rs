//! ElevenLabs HTTP client
//!
//! `POST {api_base}/text-to-speech/{voice_id}` with the key in the
//! `xi-api-key` header returns MP3 bytes; `GET {api_base}/user/subscription`
//! reports the key's character quota. Failures carry a JSON body of the
//! form `{"detail": {"status": "...", "message": "..."}}`, or sometimes a
//! plain string `detail`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{SpeechError, SpeechRequest, SpeechSynthesizer};
use crate::config::SpeechConfig;

/// Provider status values meaning the key has no characters left.
const QUOTA_STATUSES: &[&str] = &["quota_exceeded", "insufficient_quota"];

pub struct ElevenLabsClient {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct TtsBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettingsBody,
}

#[derive(Debug, Serialize)]
struct VoiceSettingsBody {
    stability: f32,
    similarity_boost: f32,
}

/// Character usage of one API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Quota {
    #[serde(default)]
    pub character_count: i64,
    #[serde(default = "default_character_limit")]
    pub character_limit: i64,
}

fn default_character_limit() -> i64 {
    10_000
}

impl Quota {
    pub fn is_exhausted(&self) -> bool {
        self.character_count >= self.character_limit
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object {
        status: Option<String>,
        message: Option<String>,
    },
    Text(String),
}

impl ElevenLabsClient {
    pub fn new(config: &SpeechConfig) -> Result<Self, SpeechError> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| SpeechError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Current quota for `api_key`.
    pub async fn quota(&self, api_key: &str) -> Result<Quota, SpeechError> {
        let response = self
            .http_client
            .get(format!("{}/user/subscription", self.base_url))
            .header("xi-api-key", api_key)
            .send()
            .await
            .map_err(|e| SpeechError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &text));
        }

        let quota: Quota = response
            .json()
            .await
            .map_err(|e| SpeechError::Network(e.to_string()))?;
        debug!(target: "speech", used = quota.character_count, limit = quota.character_limit, "Quota");
        Ok(quota)
    }

    fn endpoint(&self, voice_id: &str) -> String {
        format!(
            "{}/text-to-speech/{}",
            self.base_url,
            urlencoding::encode(voice_id)
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, api_key: &str, request: &SpeechRequest) -> Result<Vec<u8>, SpeechError> {
        let body = TtsBody {
            text: &request.text,
            model_id: &request.model_id,
            voice_settings: VoiceSettingsBody {
                stability: request.settings.stability,
                similarity_boost: request.settings.similarity_boost,
            },
        };

        info!(target: "speech", voice = %request.voice_id, chars = request.text.chars().count(), "Generating speech");

        let response = self
            .http_client
            .post(self.endpoint(&request.voice_id))
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &text));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Network(e.to_string()))?;
        debug!(target: "speech", bytes = bytes.len(), "Received audio");
        Ok(bytes.to_vec())
    }
}

/// Map a failed response to an error, preferring the provider's message.
fn api_error(status: u16, body: &str) -> SpeechError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail);

    let (detail_status, message) = match detail {
        Some(ErrorDetail::Object { status, message }) => (
            status,
            message.unwrap_or_else(|| "Unknown error".to_string()),
        ),
        Some(ErrorDetail::Text(text)) => (None, text),
        None => (None, body.chars().take(200).collect()),
    };

    let quota = detail_status
        .as_deref()
        .is_some_and(|s| QUOTA_STATUSES.contains(&s));
    if status == 401 && quota {
        return SpeechError::QuotaExceeded(message);
    }
    SpeechError::Api { status, message }
}
