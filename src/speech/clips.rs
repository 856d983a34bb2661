//! Resolving text to a local audio clip.

use std::path::PathBuf;

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::{SpeechError, SpeechRequest, SpeechSynthesizer, text_hash};
use crate::config::SpeechConfig;
use crate::db::{self, NewHistory, Retention};
use crate::metadata::{ClipTags, write_clip_tags};
use crate::model::uri_from_path;

/// A clip ready to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClip {
    pub path: PathBuf,
    pub uri: String,
    pub text_hash: String,
    /// Reused from an earlier generation
    pub cached: bool,
}

pub struct ClipResolver<S> {
    pool: SqlitePool,
    synthesizer: S,
    speech: SpeechConfig,
    cache_dir: PathBuf,
    retention: Retention,
}

impl<S: SpeechSynthesizer> ClipResolver<S> {
    pub fn new(
        pool: SqlitePool,
        synthesizer: S,
        speech: SpeechConfig,
        cache_dir: PathBuf,
        retention: Retention,
    ) -> Self {
        Self {
            pool,
            synthesizer,
            speech,
            cache_dir,
            retention,
        }
    }

    /// An earlier clip for exactly this text whose file still exists.
    pub async fn cached_clip(&self, text: &str) -> Result<Option<ResolvedClip>, SpeechError> {
        let hash = text_hash(text);
        let Some(entry) = db::history_by_hash(&self.pool, &hash).await? else {
            return Ok(None);
        };
        if !entry.file_exists() {
            debug!(target: "speech", file = %entry.audio_file, "Cached clip is gone");
            return Ok(None);
        }

        let path = entry.audio_path();
        Ok(Some(ResolvedClip {
            uri: uri_from_path(&path)?,
            path,
            text_hash: hash,
            cached: true,
        }))
    }

    /// Return the cached clip for `text`, or generate, tag, and record one.
    pub async fn resolve(&self, text: &str) -> Result<ResolvedClip, SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeechError::EmptyText);
        }

        if let Some(clip) = self.cached_clip(text).await? {
            info!(target: "speech", path = %clip.path.display(), "Using cached audio");
            return Ok(clip);
        }

        let request = SpeechRequest::from_config(text, &self.speech)?;
        let audio = self.synthesize_with_rotation(&request).await?;

        let hash = text_hash(text);
        std::fs::create_dir_all(&self.cache_dir)?;
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = self.cache_dir.join(format!("{timestamp}_{hash}.mp3"));
        std::fs::write(&path, &audio)?;
        info!(target: "speech", path = %path.display(), bytes = audio.len(), "Audio saved");

        let order_id = db::history_count(&self.pool).await? + 1;
        let tags = ClipTags {
            text,
            voice_name: &self.speech.voice_name,
            order_id,
            text_hash: &hash,
        };
        if let Err(e) = write_clip_tags(&path, &tags) {
            warn!(target: "speech", path = %path.display(), error = %e, "Failed to write clip tags");
        }

        let audio_file = path.to_string_lossy();
        db::add_history(
            &self.pool,
            &NewHistory {
                text,
                audio_file: &audio_file,
                voice_name: &self.speech.voice_name,
                model_id: &self.speech.model_id,
                text_hash: &hash,
                thumbnail_url: "",
            },
            self.retention,
        )
        .await?;

        Ok(ResolvedClip {
            uri: uri_from_path(&path)?,
            path,
            text_hash: hash,
            cached: false,
        })
    }

    /// Try the active key, moving on to the next one whenever a key
    /// reports its quota exhausted.
    async fn synthesize_with_rotation(&self, request: &SpeechRequest) -> Result<Vec<u8>, SpeechError> {
        let attempts = db::list_api_keys(&self.pool).await?.len().max(1);
        let mut last_error = SpeechError::MissingApiKey;

        for attempt in 0..attempts {
            let key = db::active_api_key(&self.pool)
                .await?
                .ok_or(SpeechError::MissingApiKey)?;
            // every key is exhausted; the first attempt still tries one
            if key.exhausted && attempt > 0 {
                break;
            }

            match self.synthesizer.synthesize(&key.api_key, request).await {
                Ok(audio) => return Ok(audio),
                Err(SpeechError::QuotaExceeded(message)) => {
                    warn!(target: "speech", key = %key.label, "Quota exhausted, rotating key");
                    db::mark_api_key_exhausted(&self.pool, key.id).await?;
                    last_error = SpeechError::QuotaExceeded(message);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }
}
