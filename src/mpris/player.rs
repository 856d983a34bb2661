//! `org.mpris.MediaPlayer2.Player`: transport control and playback state.
//!
//! Methods and property setters become [`Command`]s sent to the dispatcher;
//! property reads come from the latest published snapshot. Change
//! notifications are emitted only by the forwarder in the parent module,
//! so no property here emits on its own.

use std::collections::HashMap;

use zbus::zvariant::{ObjectPath, Value};
use zbus::{SignalContext, fdo, interface};

use super::metadata::metadata_map;
use crate::player::{Command, LoopStatus, PlayerError, SessionHandle};

pub struct PlayerInterface {
    session: SessionHandle,
}

impl PlayerInterface {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    async fn send(&self, command: Command) -> fdo::Result<()> {
        self.session.send(command).await.map_err(to_fdo)
    }
}

fn to_fdo(error: PlayerError) -> fdo::Error {
    match error {
        PlayerError::InvalidLoopStatus(_) => fdo::Error::InvalidArgs(error.to_string()),
        other => fdo::Error::Failed(other.to_string()),
    }
}

#[interface(name = "org.mpris.MediaPlayer2.Player")]
impl PlayerInterface {
    async fn play(&self) -> fdo::Result<()> {
        self.send(Command::Play).await
    }

    async fn pause(&self) -> fdo::Result<()> {
        self.send(Command::Pause).await
    }

    async fn play_pause(&self) -> fdo::Result<()> {
        self.send(Command::PlayPause).await
    }

    async fn stop(&self) -> fdo::Result<()> {
        self.send(Command::Stop).await
    }

    async fn next(&self) -> fdo::Result<()> {
        self.send(Command::Next).await
    }

    async fn previous(&self) -> fdo::Result<()> {
        self.send(Command::Previous).await
    }

    /// Relative seek in microseconds.
    async fn seek(&self, offset: i64) -> fdo::Result<()> {
        self.send(Command::Seek(offset)).await
    }

    async fn set_position(&self, track_id: ObjectPath<'_>, position: i64) -> fdo::Result<()> {
        self.send(Command::SetPosition {
            track_id: track_id.to_string(),
            position,
        })
        .await
    }

    fn open_uri(&self, _uri: &str) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("OpenUri is not supported".to_string()))
    }

    #[zbus(signal)]
    pub async fn seeked(ctxt: &SignalContext<'_>, position: i64) -> zbus::Result<()>;

    #[zbus(property(emits_changed_signal = "false"))]
    fn playback_status(&self) -> String {
        self.session.snapshot().status.as_str().to_string()
    }

    #[zbus(property(emits_changed_signal = "false"))]
    fn loop_status(&self) -> String {
        self.session.snapshot().loop_status.as_str().to_string()
    }

    #[zbus(property)]
    async fn set_loop_status(&mut self, value: String) -> fdo::Result<()> {
        let status: LoopStatus = value.parse().map_err(to_fdo)?;
        self.send(Command::SetLoopStatus(status)).await
    }

    #[zbus(property(emits_changed_signal = "false"))]
    fn shuffle(&self) -> bool {
        self.session.snapshot().shuffle
    }

    #[zbus(property)]
    async fn set_shuffle(&mut self, value: bool) -> fdo::Result<()> {
        self.send(Command::SetShuffle(value)).await
    }

    #[zbus(property(emits_changed_signal = "false"))]
    fn volume(&self) -> f64 {
        self.session.snapshot().volume
    }

    #[zbus(property)]
    async fn set_volume(&mut self, value: f64) -> fdo::Result<()> {
        self.send(Command::SetVolume(value)).await
    }

    #[zbus(property(emits_changed_signal = "false"))]
    fn metadata(&self) -> HashMap<String, Value<'static>> {
        metadata_map(&self.session.snapshot().metadata)
    }

    #[zbus(property(emits_changed_signal = "false"))]
    fn position(&self) -> i64 {
        self.session.snapshot().position
    }

    #[zbus(property(emits_changed_signal = "const"))]
    fn rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn set_rate(&mut self, _value: f64) {}

    #[zbus(property)]
    fn minimum_rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn maximum_rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn can_go_next(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_go_previous(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_play(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_pause(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_seek(&self) -> bool {
        true
    }

    #[zbus(property(emits_changed_signal = "const"))]
    fn can_control(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    use crate::player::{
        DispatchOutcome, Dispatcher, EngineAdapter, PlaybackStatus, PlayerSession, Playlist,
        SessionOptions,
    };
    use crate::test_utils::{MockEngine, make_track};

    fn spawn_player() -> (
        PlayerInterface,
        tokio::sync::oneshot::Sender<()>,
        tokio::task::JoinHandle<DispatchOutcome>,
    ) {
        let (engine, _recorder) = MockEngine::new();
        let (events, _) = mpsc::unbounded_channel();
        let session = PlayerSession::new(
            Playlist::new(vec![make_track("a", 2), make_track("b", 1)]),
            EngineAdapter::new(engine),
            events,
            SessionOptions::default(),
        )
        .unwrap();
        let (_signals, signal_rx) = mpsc::unbounded_channel();
        let (dispatcher, handle) = Dispatcher::new(session, signal_rx, Duration::from_millis(100));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(dispatcher.run(async {
            let _ = stop_rx.await;
        }));
        (PlayerInterface::new(handle), stop_tx, task)
    }

    #[tokio::test]
    async fn test_transport_methods_reach_session() {
        let (player, stop, task) = spawn_player();

        assert_eq!(player.playback_status(), "Playing");
        player.pause().await.unwrap();
        assert_eq!(player.playback_status(), "Paused");
        player.play_pause().await.unwrap();
        assert_eq!(player.playback_status(), "Playing");

        player.next().await.unwrap();
        assert_eq!(player.metadata()["xesam:title"], Value::from("b"));

        stop.send(()).unwrap();
        assert_eq!(task.await.unwrap(), DispatchOutcome::Interrupted);
        assert_eq!(player.session.snapshot().status, PlaybackStatus::Stopped);
    }

    #[tokio::test]
    async fn test_invalid_loop_status_is_rejected() {
        let (mut player, stop, _task) = spawn_player();

        let err = player.set_loop_status("Forever".into()).await.unwrap_err();
        assert!(matches!(err, fdo::Error::InvalidArgs(_)));
        assert_eq!(player.loop_status(), "None");

        player.set_loop_status("Track".into()).await.unwrap();
        assert_eq!(player.loop_status(), "Track");
        stop.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_volume_and_shuffle_setters() {
        let (mut player, stop, _task) = spawn_player();

        player.set_volume(1.7).await.unwrap();
        assert_eq!(player.volume(), 1.0);
        player.set_volume(0.25).await.unwrap();
        assert_eq!(player.volume(), 0.25);

        player.set_shuffle(true).await.unwrap();
        assert!(player.shuffle());
        stop.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_stale_set_position_is_ignored() {
        let (player, stop, _task) = spawn_player();

        let stale = ObjectPath::try_from("/org/mpris/MediaPlayer2/Track/old").unwrap();
        player.set_position(stale, 1_000).await.unwrap();
        assert_eq!(player.position(), 0);
        stop.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_methods_fail_after_session_ends() {
        let (player, stop, task) = spawn_player();
        stop.send(()).unwrap();
        task.await.unwrap();

        assert!(matches!(player.play().await, Err(fdo::Error::Failed(_))));
    }
}
