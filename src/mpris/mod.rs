//! MPRIS service on the session bus.
//!
//! Exposes the root and player interfaces at [`OBJECT_PATH`] under the
//! configured bus name, and turns [`PlayerEvent`]s from the session into
//! `PropertiesChanged` and `Seeked` signals. The forwarder here is the only
//! source of those signals.

mod metadata;
mod player;
mod root;

pub use metadata::{change_value, metadata_map};
pub use player::PlayerInterface;
pub use root::RootInterface;

use std::collections::HashMap;
use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zbus::fdo::Properties;
use zbus::names::InterfaceName;
use zbus::zvariant::Value;
use zbus::{Connection, SignalContext};

use crate::config::PlayerConfig;
use crate::player::{DispatchOutcome, Dispatcher, PlayerEvent, SessionHandle, StreamingEngine};

pub const OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";
pub const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";

#[derive(Debug, Error)]
pub enum MprisError {
    #[error("Session bus unavailable: {0}")]
    Connect(#[source] zbus::Error),

    #[error("Could not claim bus name {name}: {source}")]
    Name {
        name: String,
        #[source]
        source: zbus::Error,
    },

    #[error("Failed to register player object: {0}")]
    Register(#[source] zbus::Error),

    #[error("Failed to emit signal: {0}")]
    Signal(#[source] zbus::Error),
}

/// A session bus connection with the root interface in place.
///
/// Made before the player session exists, so a missing bus fails the
/// command before any audio starts. The bus name is claimed in
/// [`MprisService::serve`] once the player interface is registered too.
pub struct MprisService {
    connection: Connection,
    bus_name: String,
}

impl MprisService {
    pub async fn connect(config: &PlayerConfig) -> Result<Self, MprisError> {
        let connection = zbus::connection::Builder::session()
            .and_then(|b| {
                b.serve_at(
                    OBJECT_PATH,
                    RootInterface::new(&config.identity, &config.desktop_entry),
                )
            })
            .map_err(MprisError::Connect)?
            .build()
            .await
            .map_err(MprisError::Connect)?;
        debug!(target: "mpris", "Connected to session bus");
        Ok(Self {
            connection,
            bus_name: config.bus_name(),
        })
    }

    /// Register the player, claim the bus name, and run the dispatch loop
    /// until the session ends or `shutdown` resolves.
    ///
    /// The bus name is released only after the engine has stopped and every
    /// queued event has been emitted.
    pub async fn serve<E: StreamingEngine>(
        self,
        dispatcher: Dispatcher<E>,
        handle: SessionHandle,
        events: mpsc::UnboundedReceiver<PlayerEvent>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<DispatchOutcome, MprisError> {
        let Self {
            connection,
            bus_name,
        } = self;

        connection
            .object_server()
            .at(OBJECT_PATH, PlayerInterface::new(handle))
            .await
            .map_err(MprisError::Register)?;
        connection
            .request_name(bus_name.as_str())
            .await
            .map_err(|source| MprisError::Name {
                name: bus_name.clone(),
                source,
            })?;
        info!(target: "mpris", bus = %bus_name, path = OBJECT_PATH, "Registered on session bus");

        let forwarder = tokio::spawn(forward_events(connection.clone(), events));
        let outcome = dispatcher.run(shutdown).await;

        // the dispatcher dropped its session, closing the event channel
        match forwarder.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(target: "mpris", error = %e, "Signal forwarding stopped early"),
            Err(e) => warn!(target: "mpris", error = %e, "Signal forwarder panicked"),
        }

        if let Err(e) = connection.release_name(bus_name.as_str()).await {
            warn!(target: "mpris", bus = %bus_name, error = %e, "Failed to release bus name");
        }
        info!(target: "mpris", ?outcome, "Left session bus");
        Ok(outcome)
    }
}

/// Emit every event in order until the channel closes.
pub async fn forward_events(
    connection: Connection,
    mut events: mpsc::UnboundedReceiver<PlayerEvent>,
) -> Result<(), MprisError> {
    let ctxt = SignalContext::new(&connection, OBJECT_PATH).map_err(MprisError::Signal)?;

    while let Some(event) = events.recv().await {
        emit(&ctxt, &event).await?;
    }
    debug!(target: "mpris", "Event channel closed");
    Ok(())
}

async fn emit(ctxt: &SignalContext<'_>, event: &PlayerEvent) -> Result<(), MprisError> {
    match event {
        PlayerEvent::Seeked(position) => {
            debug!(target: "mpris", position, "Seeked");
            PlayerInterface::seeked(ctxt, *position)
                .await
                .map_err(MprisError::Signal)
        }
        PlayerEvent::PropertiesChanged {
            changed,
            invalidated,
        } => {
            let values: Vec<(&str, Value<'static>)> = changed
                .iter()
                .map(|c| (c.property().name(), change_value(c)))
                .collect();
            let changed_map: HashMap<&str, &Value<'_>> =
                values.iter().map(|(name, value)| (*name, value)).collect();
            let invalidated: Vec<&str> = invalidated.iter().map(|p| p.name()).collect();

            debug!(target: "mpris", changed = ?changed_map.keys(), ?invalidated, "PropertiesChanged");
            Properties::properties_changed(
                ctxt,
                InterfaceName::from_static_str_unchecked(PLAYER_INTERFACE),
                &changed_map,
                &invalidated,
            )
            .await
            .map_err(MprisError::Signal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use zbus::message::Type as MessageType;
    use zbus::zvariant::OwnedValue;
    use zbus::{Guid, Message, MessageStream};

    use crate::player::{EngineAdapter, PlayerSession, Playlist, SessionOptions};
    use crate::test_utils::{MockEngine, make_track};

    type ChangedBody = (String, HashMap<String, OwnedValue>, Vec<String>);

    /// Two ends of a peer-to-peer connection; no bus daemon needed.
    async fn connection_pair() -> (Connection, Connection) {
        let (client, server) = tokio::net::UnixStream::pair().unwrap();
        let guid = Guid::generate();
        futures::try_join!(
            zbus::connection::Builder::unix_stream(client).p2p().build(),
            zbus::connection::Builder::unix_stream(server)
                .server(guid)
                .unwrap()
                .p2p()
                .build(),
        )
        .unwrap()
    }

    fn session(
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> PlayerSession<MockEngine> {
        let (engine, _recorder) = MockEngine::new();
        PlayerSession::new(
            Playlist::new(vec![
                make_track("a", 2),
                make_track("b", 1).with_length(10_000_000),
            ]),
            EngineAdapter::new(engine),
            events,
            SessionOptions::default(),
        )
        .unwrap()
    }

    /// Signals received within `window`, skipping method replies.
    async fn signals(stream: &mut MessageStream, window: Duration) -> Vec<Message> {
        let mut out = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(message)) = tokio::time::timeout_at(deadline, stream.next()).await {
            let message = message.unwrap();
            if message.message_type() == MessageType::Signal {
                out.push(message);
            }
        }
        out
    }

    fn member(message: &Message) -> String {
        message.header().member().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_track_change_and_seek_signals_in_order() {
        let (client, server) = connection_pair().await;
        let mut stream = MessageStream::from(&client);

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut session = session(event_tx);
        while event_rx.try_recv().is_ok() {}
        let forwarder = tokio::spawn(forward_events(server.clone(), event_rx));

        session.next();
        session.seek(2_000_000);
        session.seek(1_000_000);
        drop(session);
        forwarder.await.unwrap().unwrap();

        let received = signals(&mut stream, Duration::from_millis(500)).await;
        let members: Vec<String> = received.iter().map(member).collect();
        assert_eq!(
            members,
            vec!["PropertiesChanged", "PropertiesChanged", "Seeked", "Seeked"]
        );

        let (interface, changed, invalidated): ChangedBody = received[0].body().deserialize().unwrap();
        assert_eq!(interface, PLAYER_INTERFACE);
        assert!(changed.is_empty());
        assert_eq!(invalidated, vec!["Position".to_string()]);

        let (_, mut changed, invalidated): ChangedBody = received[1].body().deserialize().unwrap();
        assert!(invalidated.is_empty());
        let metadata =
            HashMap::<String, OwnedValue>::try_from(changed.remove("Metadata").unwrap()).unwrap();
        let title = String::try_from(metadata.get("xesam:title").unwrap().try_clone().unwrap()).unwrap();
        assert_eq!(title, "b");

        // Seeked carries the absolute position, not the offset
        let positions: Vec<i64> = received[2..]
            .iter()
            .map(|m| m.body().deserialize::<i64>().unwrap())
            .collect();
        assert_eq!(positions, vec![2_000_000, 3_000_000]);
    }

    #[tokio::test]
    async fn test_property_set_emits_one_change_signal() {
        let (client, server) = connection_pair().await;
        let mut stream = MessageStream::from(&client);

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut session = session(event_tx);
        session.pause();
        while event_rx.try_recv().is_ok() {}

        let (_signals, signal_rx) = mpsc::unbounded_channel();
        let (dispatcher, handle) = Dispatcher::new(session, signal_rx, Duration::from_secs(60));
        server
            .object_server()
            .at(OBJECT_PATH, PlayerInterface::new(handle))
            .await
            .unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let dispatch = tokio::spawn(dispatcher.run(async {
            let _ = stop_rx.await;
        }));
        let forwarder = tokio::spawn(forward_events(server.clone(), event_rx));

        let set = |name: &'static str, value: Value<'static>| {
            let client = client.clone();
            async move {
                client
                    .call_method(
                        None::<&str>,
                        OBJECT_PATH,
                        Some("org.freedesktop.DBus.Properties"),
                        "Set",
                        &(PLAYER_INTERFACE, name, value),
                    )
                    .await
            }
        };
        set("Volume", Value::from(0.5)).await.unwrap();
        set("Volume", Value::from(0.5)).await.unwrap();
        // already the current value
        set("LoopStatus", Value::from("None")).await.unwrap();

        let changes: Vec<HashMap<String, OwnedValue>> = signals(&mut stream, Duration::from_millis(500))
            .await
            .iter()
            .filter(|m| member(m) == "PropertiesChanged")
            .map(|m| {
                let (_, changed, _): ChangedBody = m.body().deserialize().unwrap();
                changed
            })
            .collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(f64::try_from(changes[0]["Volume"].try_clone().unwrap()).unwrap(), 0.5);

        match set("LoopStatus", Value::from("Forever")).await {
            Err(zbus::Error::MethodError(name, _, _)) => {
                assert_eq!(name.as_str(), "org.freedesktop.DBus.Error.InvalidArgs");
            }
            other => panic!("expected InvalidArgs, got {other:?}"),
        }

        stop_tx.send(()).unwrap();
        dispatch.await.unwrap();
        forwarder.await.unwrap().unwrap();
    }
}
