//! Test utilities and fixtures.
//!
//! Provides a temporary database, track fixtures, and a scriptable
//! [`MockEngine`] whose calls can be inspected through an [`EngineRecorder`].
//!
//! # Example
//!
//! ```ignore
//! let (engine, recorder) = MockEngine::new();
//! let mut adapter = EngineAdapter::new(engine);
//! adapter.load("file:///tmp/a.mp3").unwrap();
//! assert_eq!(recorder.calls(), vec![EngineCall::SetUri("file:///tmp/a.mp3".into())]);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::model::Track;
use crate::player::{EngineError, StreamingEngine};

/// Creates a migrated database in a temporary directory.
///
/// Keep the `TempDir` alive for the duration of the test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// A track at `file:///tmp/<name>.mp3` titled `name`.
pub fn make_track(name: &str, order_id: i64) -> Track {
    Track::new(format!("file:///tmp/{name}.mp3"))
        .with_name(name)
        .with_order_id(order_id)
}

/// One call received by a [`MockEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    SetUri(String),
    Play,
    Pause,
    Stop,
    Seek(f64),
    SetVolume(f64),
}

#[derive(Debug)]
struct MockState {
    calls: Vec<EngineCall>,
    position: Option<f64>,
    duration: Option<f64>,
    volume: f64,
    fail_loads: bool,
}

/// In-memory streaming engine that records every call.
#[derive(Debug)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

/// Test-side view of a [`MockEngine`] after it has been moved into an adapter.
#[derive(Debug, Clone)]
pub struct EngineRecorder {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> (Self, EngineRecorder) {
        let state = Arc::new(Mutex::new(MockState {
            calls: Vec::new(),
            position: None,
            duration: None,
            volume: 1.0,
            fail_loads: false,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            EngineRecorder { state },
        )
    }

    fn record(&self, call: EngineCall) {
        self.state.lock().calls.push(call);
    }
}

impl EngineRecorder {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn set_position(&self, position: Option<f64>) {
        self.state.lock().position = position;
    }

    pub fn set_duration(&self, duration: Option<f64>) {
        self.state.lock().duration = duration;
    }

    /// Make every subsequent `set_uri` fail.
    pub fn fail_loads(&self, fail: bool) {
        self.state.lock().fail_loads = fail;
    }
}

impl StreamingEngine for MockEngine {
    fn set_uri(&mut self, uri: &str) -> Result<(), EngineError> {
        self.record(EngineCall::SetUri(uri.to_string()));
        if self.state.lock().fail_loads {
            return Err(EngineError::InvalidUri(uri.to_string()));
        }
        Ok(())
    }

    fn play(&mut self) -> Result<(), EngineError> {
        self.record(EngineCall::Play);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.record(EngineCall::Pause);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.record(EngineCall::Stop);
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Seek(seconds));
        state.position = Some(seconds);
        Ok(())
    }

    fn position(&self) -> Option<f64> {
        self.state.lock().position
    }

    fn duration(&self) -> Option<f64> {
        self.state.lock().duration
    }

    fn set_volume(&mut self, level: f64) {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::SetVolume(level));
        state.volume = level;
    }

    fn volume(&self) -> f64 {
        self.state.lock().volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;
        let history = crate::db::history(&pool, 10).await.unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_make_track() {
        let track = make_track("intro", 4);
        assert_eq!(track.uri, "file:///tmp/intro.mp3");
        assert_eq!(track.name, "intro");
        assert_eq!(track.order_id, 4);
    }

    #[test]
    fn test_mock_engine_records_calls() {
        let (mut engine, recorder) = MockEngine::new();
        engine.set_uri("file:///tmp/a.mp3").unwrap();
        engine.play().unwrap();
        engine.seek(1.5).unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                EngineCall::SetUri("file:///tmp/a.mp3".into()),
                EngineCall::Play,
                EngineCall::Seek(1.5)
            ]
        );
        assert_eq!(engine.position(), Some(1.5));

        recorder.fail_loads(true);
        assert!(engine.set_uri("file:///tmp/b.mp3").is_err());
    }
}
