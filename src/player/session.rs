//! Player session state machine.
//!
//! [`PlayerSession`] is the single owner of the playlist, the engine
//! adapter, and the protocol-facing player state. Every transport command,
//! engine signal, and position poll goes through `&mut self`, so the
//! dispatcher that owns the session serializes all transitions.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace, warn};

use super::PlayerError;
use super::engine::{EngineAdapter, EngineError, EngineSignal, StreamingEngine};
use super::playlist::Playlist;
use super::state::{
    LoopStatus, MetadataSnapshot, PlaybackStatus, PlayerEvent, PlayerSnapshot, Property,
    PropertyChange, SessionExit, format_micros,
};
use crate::model::Track;

/// Initial settings for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub loop_status: LoopStatus,
    pub shuffle: bool,
    /// Engine volume, may exceed 1.0
    pub volume: f64,
    /// Position polling period
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            loop_status: LoopStatus::None,
            shuffle: false,
            volume: 1.0,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Transport and property commands accepted by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
    /// Relative offset in microseconds
    Seek(i64),
    SetPosition { track_id: String, position: i64 },
    SetLoopStatus(LoopStatus),
    SetShuffle(bool),
    SetVolume(f64),
}

/// The player state machine.
pub struct PlayerSession<E> {
    playlist: Playlist,
    adapter: EngineAdapter<E>,
    events: UnboundedSender<PlayerEvent>,
    status: PlaybackStatus,
    loop_status: LoopStatus,
    /// Protocol-facing volume in [0, 1]
    volume: f64,
    position: i64,
    duration: i64,
    metadata: MetadataSnapshot,
    polling: bool,
    last_emitted_position: i64,
    poll_step: i64,
    exit: Option<SessionExit>,
}

impl<E: StreamingEngine> PlayerSession<E> {
    /// Start a session, loading and playing the playlist's current track
    /// (or its first track when none is current).
    pub fn new(
        mut playlist: Playlist,
        mut adapter: EngineAdapter<E>,
        events: UnboundedSender<PlayerEvent>,
        options: SessionOptions,
    ) -> Result<Self, PlayerError> {
        playlist.set_repeat(options.loop_status.repeat_mode());
        playlist.set_shuffle(options.shuffle);

        let initial = match playlist.current().cloned() {
            Some(track) => track,
            None => playlist.next().ok_or(PlayerError::EmptyPlaylist)?,
        };

        adapter.set_volume(options.volume);
        adapter.load(&initial.uri)?;
        adapter.play()?;

        info!(target: "player::session", track = %initial.name, uri = %initial.uri, "Session started");

        let mut session = Self {
            playlist,
            adapter,
            events,
            status: PlaybackStatus::Playing,
            loop_status: options.loop_status,
            volume: options.volume.clamp(0.0, 1.0),
            position: 0,
            duration: 0,
            metadata: MetadataSnapshot::no_track(),
            polling: true,
            last_emitted_position: 0,
            poll_step: options.poll_interval.as_micros() as i64,
            exit: None,
        };
        session.set_track_state(&initial);
        Ok(session)
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn loop_status(&self) -> LoopStatus {
        self.loop_status
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Position in microseconds.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Duration in microseconds, 0 when unknown.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn metadata(&self) -> &MetadataSnapshot {
        &self.metadata
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn adapter(&self) -> &EngineAdapter<E> {
        &self.adapter
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Set once the session has ended on its own.
    pub fn exit(&self) -> Option<SessionExit> {
        self.exit
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            status: self.status,
            loop_status: self.loop_status,
            shuffle: self.playlist.shuffle(),
            volume: self.volume,
            position: self.position,
            metadata: self.metadata.clone(),
        }
    }

    pub fn apply(&mut self, command: Command) {
        trace!(target: "player::session", ?command, "Command");
        match command {
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::PlayPause => self.play_pause(),
            Command::Stop => self.stop(),
            Command::Next => self.next(),
            Command::Previous => self.previous(),
            Command::Seek(offset) => self.seek(offset),
            Command::SetPosition { track_id, position } => self.set_position(&track_id, position),
            Command::SetLoopStatus(status) => self.set_loop_status(status),
            Command::SetShuffle(shuffle) => self.set_shuffle(shuffle),
            Command::SetVolume(volume) => self.set_volume(volume),
        }
    }

    pub fn play(&mut self) {
        if self.status == PlaybackStatus::Playing {
            return;
        }
        if let Err(e) = self.adapter.play() {
            self.engine_failed(e);
            return;
        }
        self.polling = true;
        self.set_status(PlaybackStatus::Playing);
    }

    pub fn pause(&mut self) {
        if self.status != PlaybackStatus::Playing {
            return;
        }
        if let Err(e) = self.adapter.pause() {
            self.engine_failed(e);
            return;
        }
        self.polling = false;
        self.set_status(PlaybackStatus::Paused);
    }

    pub fn play_pause(&mut self) {
        if self.status == PlaybackStatus::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn stop(&mut self) {
        if self.status == PlaybackStatus::Stopped {
            return;
        }
        if let Err(e) = self.adapter.stop() {
            warn!(target: "player::session", error = %e, "Engine stop failed");
        }
        self.polling = false;
        self.position = 0;
        self.last_emitted_position = 0;
        self.set_status(PlaybackStatus::Stopped);
    }

    pub fn next(&mut self) {
        match self.playlist.next() {
            Some(track) => self.change_track(track),
            None => debug!(target: "player::session", "No next track"),
        }
    }

    pub fn previous(&mut self) {
        match self.playlist.previous() {
            Some(track) => self.change_track(track),
            None => debug!(target: "player::session", "No previous track"),
        }
    }

    /// Seek by a relative offset, clamped to the track bounds.
    pub fn seek(&mut self, offset: i64) {
        self.refresh_duration();
        let current = self.adapter.position_micros().unwrap_or(self.position);
        let target = self.clamp_position(current.saturating_add(offset));
        self.seek_absolute(target);
    }

    /// Seek to an absolute position on the named track.
    ///
    /// Stale track ids and out-of-range positions are ignored.
    pub fn set_position(&mut self, track_id: &str, position: i64) {
        if track_id != self.metadata.track_id {
            debug!(
                target: "player::session",
                requested = track_id,
                current = %self.metadata.track_id,
                "Ignoring SetPosition for non-current track"
            );
            return;
        }
        self.refresh_duration();
        if position < 0 || (self.duration > 0 && position > self.duration) {
            debug!(target: "player::session", position, duration = self.duration, "Ignoring out-of-range SetPosition");
            return;
        }
        self.seek_absolute(position);
    }

    pub fn set_loop_status(&mut self, status: LoopStatus) {
        if status == self.loop_status {
            return;
        }
        debug!(target: "player::session", from = %self.loop_status, to = %status, "Loop status");
        self.loop_status = status;
        self.playlist.set_repeat(status.repeat_mode());
        self.emit(PlayerEvent::changed(PropertyChange::LoopStatus(status)));
    }

    /// Set the loop status from its protocol name.
    pub fn set_loop_status_str(&mut self, status: &str) -> Result<(), PlayerError> {
        self.set_loop_status(status.parse()?);
        Ok(())
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        if shuffle == self.playlist.shuffle() {
            return;
        }
        self.playlist.set_shuffle(shuffle);
        self.emit(PlayerEvent::changed(PropertyChange::Shuffle(shuffle)));
    }

    /// Set the volume, clamped to [0, 1].
    pub fn set_volume(&mut self, volume: f64) {
        if volume.is_nan() {
            warn!(target: "player::session", "Ignoring NaN volume");
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        if volume == self.volume {
            return;
        }
        self.volume = volume;
        self.adapter.set_volume(volume);
        self.emit(PlayerEvent::changed(PropertyChange::Volume(volume)));
    }

    /// React to an asynchronous engine notification.
    pub fn handle_engine_signal(&mut self, signal: EngineSignal) {
        match self.adapter.translate(signal) {
            Some(EngineSignal::EndOfStream) => self.end_of_stream(),
            Some(EngineSignal::Error(e)) => self.engine_failed(e),
            None => {}
        }
    }

    /// Sample the engine position and publish it if it moved.
    pub fn poll_position(&mut self) {
        if !self.polling {
            return;
        }
        self.refresh_duration();
        let position = self
            .adapter
            .position_micros()
            .unwrap_or(self.position + self.poll_step);
        self.position = self.clamp_position(position);

        if self.position != self.last_emitted_position {
            self.last_emitted_position = self.position;
            self.emit(PlayerEvent::changed(PropertyChange::Position(self.position)));
        }
    }

    /// Stop the engine for teardown.
    pub fn shutdown(&mut self) {
        info!(target: "player::session", "Shutting down session");
        self.polling = false;
        if let Err(e) = self.adapter.stop() {
            warn!(target: "player::session", error = %e, "Engine stop failed during shutdown");
        }
        self.status = PlaybackStatus::Stopped;
    }

    fn end_of_stream(&mut self) {
        debug!(target: "player::session", loop_status = %self.loop_status, "End of stream");
        match self.loop_status {
            LoopStatus::Track => {
                if let Err(e) = self.adapter.seek_to(0).and_then(|_| self.adapter.play()) {
                    self.engine_failed(e);
                    return;
                }
                self.position = 0;
                self.last_emitted_position = 0;
                self.emit(PlayerEvent::Seeked(0));
                self.polling = true;
                self.set_status(PlaybackStatus::Playing);
            }
            LoopStatus::Playlist => match self.playlist.next() {
                Some(track) => {
                    self.change_track(track);
                    self.play();
                }
                None => {
                    warn!(target: "player::session", "Playlist exhausted while looping");
                    self.exit = Some(SessionExit::Exhausted);
                }
            },
            LoopStatus::None => {
                info!(target: "player::session", "Playback finished");
                self.exit = Some(SessionExit::Finished);
            }
        }
    }

    fn change_track(&mut self, track: Track) {
        info!(target: "player::session", track = %track.name, uri = %track.uri, "Track changed");
        let was_playing = self.status == PlaybackStatus::Playing;
        let resume = self.status != PlaybackStatus::Stopped;

        if was_playing && let Err(e) = self.adapter.stop() {
            warn!(target: "player::session", error = %e, "Engine stop failed");
        }
        let loaded = self.adapter.load(&track.uri);

        // publish the new track even if it failed to load, so metadata
        // and the trackid follow the playlist
        self.set_track_state(&track);
        self.emit(PlayerEvent::invalidated(Property::Position));
        self.emit(PlayerEvent::changed(PropertyChange::Metadata(self.metadata.clone())));

        if let Err(e) = loaded {
            self.engine_failed(e);
            return;
        }
        if resume {
            if let Err(e) = self.adapter.play() {
                self.engine_failed(e);
                return;
            }
            self.polling = true;
            self.set_status(PlaybackStatus::Playing);
        }
    }

    fn set_track_state(&mut self, track: &Track) {
        self.position = 0;
        self.last_emitted_position = 0;
        self.duration = track.length;
        self.metadata = MetadataSnapshot::from_track(track);
        self.refresh_duration();
    }

    fn seek_absolute(&mut self, target: i64) {
        if let Err(e) = self.adapter.seek_to(target) {
            self.engine_failed(e);
            return;
        }
        debug!(target: "player::session", position = %format_micros(target), "Seeked");
        self.position = target;
        self.last_emitted_position = target;
        self.emit(PlayerEvent::Seeked(target));
    }

    /// Pick up the engine duration when the track did not carry one.
    fn refresh_duration(&mut self) {
        if self.duration > 0 {
            return;
        }
        let duration = self.adapter.duration_micros();
        if duration > 0 {
            self.duration = duration;
            self.metadata.length = duration;
            self.emit(PlayerEvent::changed(PropertyChange::Metadata(self.metadata.clone())));
        }
    }

    fn clamp_position(&self, position: i64) -> i64 {
        if self.duration > 0 {
            position.clamp(0, self.duration)
        } else {
            position.max(0)
        }
    }

    fn engine_failed(&mut self, error: EngineError) {
        warn!(target: "player::session", error = %error, "Playback halted by engine error");
        self.polling = false;
        self.position = 0;
        self.last_emitted_position = 0;
        self.set_status(PlaybackStatus::Stopped);
    }

    fn set_status(&mut self, status: PlaybackStatus) {
        if status == self.status {
            return;
        }
        debug!(target: "player::session", from = %self.status, to = %status, "Playback status");
        self.status = status;
        self.emit(PlayerEvent::changed(PropertyChange::PlaybackStatus(status)));
    }

    fn emit(&self, event: PlayerEvent) {
        if self.events.send(event).is_err() {
            trace!(target: "player::session", "No notification listener");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::playlist::RepeatMode;
    use crate::test_utils::{EngineCall, EngineRecorder, MockEngine, make_track};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct Harness {
        session: PlayerSession<MockEngine>,
        recorder: EngineRecorder,
        events: UnboundedReceiver<PlayerEvent>,
    }

    impl Harness {
        fn new(tracks: Vec<Track>, options: SessionOptions) -> Self {
            let (engine, recorder) = MockEngine::new();
            let (tx, mut events) = mpsc::unbounded_channel();
            let session =
                PlayerSession::new(Playlist::new(tracks), EngineAdapter::new(engine), tx, options)
                    .unwrap();
            while events.try_recv().is_ok() {}
            recorder.clear_calls();
            Self { session, recorder, events }
        }

        fn with_tracks(names: &[(&str, i64)]) -> Self {
            let tracks = names.iter().map(|(n, o)| make_track(n, *o)).collect();
            Self::new(tracks, SessionOptions::default())
        }

        fn drain(&mut self) -> Vec<PlayerEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn status_change(status: PlaybackStatus) -> PlayerEvent {
        PlayerEvent::changed(PropertyChange::PlaybackStatus(status))
    }

    #[test]
    fn test_starts_playing_first_sorted_track() {
        let (engine, recorder) = MockEngine::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let playlist = Playlist::new(vec![make_track("a", 3), make_track("b", 5), make_track("c", -1)]);
        let session =
            PlayerSession::new(playlist, EngineAdapter::new(engine), tx, SessionOptions::default())
                .unwrap();

        assert_eq!(session.status(), PlaybackStatus::Playing);
        assert!(session.is_polling());
        assert_eq!(session.metadata().title, "b");
        let calls = recorder.calls();
        assert!(calls.contains(&EngineCall::SetUri("file:///tmp/b.mp3".into())));
        assert_eq!(calls.last(), Some(&EngineCall::Play));
    }

    #[test]
    fn test_empty_playlist_fails() {
        let (engine, _recorder) = MockEngine::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = PlayerSession::new(
            Playlist::default(),
            EngineAdapter::new(engine),
            tx,
            SessionOptions::default(),
        );
        assert!(matches!(result, Err(PlayerError::EmptyPlaylist)));
    }

    #[test]
    fn test_pause_play_transitions() {
        let mut h = Harness::with_tracks(&[("a", 1)]);

        h.session.pause();
        assert_eq!(h.session.status(), PlaybackStatus::Paused);
        assert!(!h.session.is_polling());
        assert_eq!(h.drain(), vec![status_change(PlaybackStatus::Paused)]);

        h.session.pause();
        assert!(h.drain().is_empty());

        h.session.play();
        assert_eq!(h.session.status(), PlaybackStatus::Playing);
        assert!(h.session.is_polling());
        assert_eq!(h.drain(), vec![status_change(PlaybackStatus::Playing)]);

        h.session.play();
        assert!(h.drain().is_empty());
        assert_eq!(h.recorder.calls(), vec![EngineCall::Pause, EngineCall::Play]);
    }

    #[test]
    fn test_play_pause_toggles() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.session.apply(Command::PlayPause);
        assert_eq!(h.session.status(), PlaybackStatus::Paused);
        h.session.apply(Command::PlayPause);
        assert_eq!(h.session.status(), PlaybackStatus::Playing);
    }

    #[test]
    fn test_stop_resets_position() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.recorder.set_position(Some(2.0));
        h.session.poll_position();
        h.drain();

        h.session.stop();
        assert_eq!(h.session.status(), PlaybackStatus::Stopped);
        assert_eq!(h.session.position(), 0);
        assert!(!h.session.is_polling());
        assert_eq!(h.drain(), vec![status_change(PlaybackStatus::Stopped)]);

        h.session.stop();
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_next_invalidates_position_before_metadata() {
        let mut h = Harness::with_tracks(&[("a", 2), ("b", 1)]);
        h.session.next();

        let events = h.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], PlayerEvent::invalidated(Property::Position));
        match &events[1] {
            PlayerEvent::PropertiesChanged { changed, invalidated } => {
                assert!(invalidated.is_empty());
                assert!(matches!(&changed[0], PropertyChange::Metadata(m) if m.title == "b"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            h.recorder.calls(),
            vec![
                EngineCall::Stop,
                EngineCall::SetUri("file:///tmp/b.mp3".into()),
                EngineCall::Play
            ]
        );
    }

    #[test]
    fn test_next_from_paused_resumes() {
        let mut h = Harness::with_tracks(&[("a", 2), ("b", 1)]);
        h.session.pause();
        h.drain();

        h.session.next();
        assert_eq!(h.session.status(), PlaybackStatus::Playing);
        assert_eq!(h.drain().last(), Some(&status_change(PlaybackStatus::Playing)));
    }

    #[test]
    fn test_next_while_stopped_stays_stopped() {
        let mut h = Harness::with_tracks(&[("a", 2), ("b", 1)]);
        h.session.stop();
        h.recorder.clear_calls();

        h.session.next();
        assert_eq!(h.session.status(), PlaybackStatus::Stopped);
        assert_eq!(h.recorder.calls(), vec![EngineCall::SetUri("file:///tmp/b.mp3".into())]);
    }

    #[test]
    fn test_next_at_end_is_noop() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.session.next();
        assert!(h.drain().is_empty());
        assert!(h.recorder.calls().is_empty());
        assert_eq!(h.session.metadata().title, "a");
    }

    #[test]
    fn test_previous_returns_to_earlier_track() {
        let mut h = Harness::with_tracks(&[("a", 2), ("b", 1)]);
        h.session.next();
        h.session.previous();
        assert_eq!(h.session.metadata().title, "a");

        h.drain();
        h.session.previous();
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_seek_clamps_to_track_bounds() {
        let tracks = vec![make_track("a", 1).with_length(10_000_000)];
        let mut h = Harness::new(tracks, SessionOptions::default());
        h.recorder.set_position(Some(4.0));

        h.session.seek(20_000_000);
        assert_eq!(h.session.position(), 10_000_000);
        assert_eq!(h.drain(), vec![PlayerEvent::Seeked(10_000_000)]);

        h.session.seek(-30_000_000);
        assert_eq!(h.session.position(), 0);
        assert_eq!(h.recorder.calls().last(), Some(&EngineCall::Seek(0.0)));
    }

    #[test]
    fn test_set_position_for_current_track() {
        let tracks = vec![make_track("a", 1).with_length(10_000_000)];
        let mut h = Harness::new(tracks, SessionOptions::default());
        let track_id = h.session.metadata().track_id.clone();

        h.session.set_position(&track_id, 3_000_000);
        assert_eq!(h.session.position(), 3_000_000);
        assert_eq!(h.drain(), vec![PlayerEvent::Seeked(3_000_000)]);

        h.session.set_position(&track_id, 11_000_000);
        assert_eq!(h.session.position(), 3_000_000);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_set_position_with_stale_track_id_is_ignored() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        let before = h.session.position();

        h.session.set_position("/org/mpris/MediaPlayer2/Track/stale", 1_000_000);
        assert_eq!(h.session.position(), before);
        assert!(h.drain().is_empty());
        assert!(h.recorder.calls().is_empty());
    }

    #[test]
    fn test_loop_status_mirrors_into_playlist() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.session.set_loop_status(LoopStatus::Playlist);
        assert_eq!(h.session.playlist().repeat(), RepeatMode::All);
        assert_eq!(
            h.drain(),
            vec![PlayerEvent::changed(PropertyChange::LoopStatus(LoopStatus::Playlist))]
        );

        h.session.set_loop_status(LoopStatus::Playlist);
        assert!(h.drain().is_empty());

        h.session.set_loop_status_str("Track").unwrap();
        assert_eq!(h.session.playlist().repeat(), RepeatMode::One);
    }

    #[test]
    fn test_invalid_loop_status_is_rejected() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        let err = h.session.set_loop_status_str("Forever").unwrap_err();
        assert!(matches!(err, PlayerError::InvalidLoopStatus(_)));
        assert_eq!(h.session.loop_status(), LoopStatus::None);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_shuffle_mirrors_into_playlist() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.session.set_shuffle(true);
        assert!(h.session.playlist().shuffle());
        assert_eq!(h.drain(), vec![PlayerEvent::changed(PropertyChange::Shuffle(true))]);
    }

    #[test]
    fn test_volume_clamped() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.session.set_volume(0.5);
        h.drain();

        h.session.set_volume(1.7);
        assert_eq!(h.session.volume(), 1.0);
        assert_eq!(h.drain(), vec![PlayerEvent::changed(PropertyChange::Volume(1.0))]);

        h.session.set_volume(3.0);
        assert!(h.drain().is_empty());

        h.session.set_volume(-0.2);
        assert_eq!(h.session.volume(), 0.0);
        assert_eq!(h.recorder.calls().last(), Some(&EngineCall::SetVolume(0.0)));
    }

    #[test]
    fn test_end_of_stream_loop_track_replays() {
        let mut h = Harness::with_tracks(&[("a", 2), ("b", 1)]);
        h.session.set_loop_status(LoopStatus::Track);
        h.drain();
        let history_before = h.session.playlist().history().len();

        h.session.handle_engine_signal(EngineSignal::EndOfStream);

        assert_eq!(h.recorder.calls(), vec![EngineCall::Seek(0.0), EngineCall::Play]);
        assert_eq!(h.session.playlist().current().unwrap().name, "a");
        assert_eq!(h.session.playlist().history().len(), history_before);
        assert_eq!(h.session.status(), PlaybackStatus::Playing);
        assert!(h.session.exit().is_none());
    }

    #[test]
    fn test_end_of_stream_loop_playlist_advances_and_wraps() {
        let mut h = Harness::with_tracks(&[("a", 2), ("b", 1)]);
        h.session.set_loop_status(LoopStatus::Playlist);

        h.session.handle_engine_signal(EngineSignal::EndOfStream);
        assert_eq!(h.session.metadata().title, "b");
        assert_eq!(h.session.status(), PlaybackStatus::Playing);

        h.session.handle_engine_signal(EngineSignal::EndOfStream);
        assert_eq!(h.session.metadata().title, "a");
        assert!(h.session.exit().is_none());
    }

    #[test]
    fn test_end_of_stream_without_loop_finishes() {
        let mut h = Harness::with_tracks(&[("a", 2), ("b", 1)]);
        h.session.handle_engine_signal(EngineSignal::EndOfStream);
        assert_eq!(h.session.exit(), Some(SessionExit::Finished));
    }

    #[test]
    fn test_engine_error_halts_session() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.session
            .handle_engine_signal(EngineSignal::Error(EngineError::Decode("corrupt".into())));

        assert_eq!(h.session.status(), PlaybackStatus::Stopped);
        assert!(!h.session.is_polling());
        assert_eq!(h.drain(), vec![status_change(PlaybackStatus::Stopped)]);
        assert!(h.session.exit().is_none());
    }

    #[test]
    fn test_failed_load_on_next_stops() {
        let mut h = Harness::with_tracks(&[("a", 2), ("b", 1)]);
        h.recorder.fail_loads(true);
        h.session.next();
        assert_eq!(h.session.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_failed_load_still_publishes_new_track() {
        let mut h = Harness::with_tracks(&[("a", 2), ("b", 1)]);
        let old_track_id = h.session.metadata().track_id.clone();
        h.recorder.fail_loads(true);
        h.session.next();

        let current = h.session.playlist().current().unwrap();
        assert_eq!(current.name, "b");
        assert_eq!(h.session.metadata().title, "b");
        assert_eq!(h.session.metadata().track_id, current.track_id);

        let events = h.drain();
        assert_eq!(events[0], PlayerEvent::invalidated(Property::Position));
        assert!(matches!(
            &events[1],
            PlayerEvent::PropertiesChanged { changed, .. }
                if matches!(&changed[0], PropertyChange::Metadata(m) if m.title == "b")
        ));
        assert_eq!(events[2], status_change(PlaybackStatus::Stopped));

        // the old trackid no longer matches
        h.session.set_position(&old_track_id, 500_000);
        assert_eq!(h.session.position(), 0);

        // nothing is loaded, so play cannot report Playing
        h.session.play();
        assert_eq!(h.session.status(), PlaybackStatus::Stopped);
        assert!(!h.recorder.calls().contains(&EngineCall::Play));
    }

    #[test]
    fn test_poll_emits_only_on_change() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.recorder.set_position(Some(1.5));

        h.session.poll_position();
        assert_eq!(
            h.drain(),
            vec![PlayerEvent::changed(PropertyChange::Position(1_500_000))]
        );

        h.session.poll_position();
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_poll_falls_back_to_estimate() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.session.poll_position();
        h.session.poll_position();
        assert_eq!(h.session.position(), 200_000);
    }

    #[test]
    fn test_poll_refreshes_unknown_duration() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        assert_eq!(h.session.duration(), 0);
        h.recorder.set_duration(Some(3.0));
        h.recorder.set_position(Some(0.5));

        h.session.poll_position();
        assert_eq!(h.session.duration(), 3_000_000);
        assert_eq!(h.session.metadata().length, 3_000_000);
        let events = h.drain();
        assert!(matches!(
            &events[0],
            PlayerEvent::PropertiesChanged { changed, .. }
                if matches!(&changed[0], PropertyChange::Metadata(m) if m.length == 3_000_000)
        ));
    }

    #[test]
    fn test_poll_is_idle_when_paused() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.session.pause();
        h.drain();
        h.recorder.set_position(Some(9.0));

        h.session.poll_position();
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_shutdown_stops_engine() {
        let mut h = Harness::with_tracks(&[("a", 1)]);
        h.session.shutdown();
        assert_eq!(h.recorder.calls(), vec![EngineCall::Stop]);
        assert_eq!(h.session.status(), PlaybackStatus::Stopped);
    }
}
