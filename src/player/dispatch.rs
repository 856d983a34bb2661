//! Serialized dispatch loop for a player session.
//!
//! The [`Dispatcher`] owns the [`PlayerSession`] and is the only code that
//! mutates it. Bus method calls arrive as [`Request`]s through a
//! [`SessionHandle`], engine signals through their own channel, and the
//! position poll from an interval that only ticks while playing. After
//! every step the dispatcher publishes a fresh [`PlayerSnapshot`] for
//! property reads.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::PlayerError;
use super::engine::{EngineSignal, StreamingEngine};
use super::session::{Command, PlayerSession};
use super::state::{PlayerSnapshot, SessionExit};

const REQUEST_BUFFER: usize = 32;

/// A command plus the acknowledgement sent once it has been applied.
#[derive(Debug)]
pub struct Request {
    pub command: Command,
    pub ack: oneshot::Sender<()>,
}

/// Cloneable handle used by the bus interfaces.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    snapshot: watch::Receiver<PlayerSnapshot>,
}

impl SessionHandle {
    /// Apply a command and wait until the session has processed it.
    pub async fn send(&self, command: Command) -> Result<(), PlayerError> {
        let (ack, done) = oneshot::channel();
        self.requests
            .send(Request { command, ack })
            .await
            .map_err(|_| PlayerError::ChannelClosed)?;
        done.await.map_err(|_| PlayerError::ChannelClosed)
    }

    /// Latest published session state.
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot.borrow().clone()
    }
}

/// Why the dispatch loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The shutdown future resolved (Ctrl-C)
    Interrupted,
    /// The session ended on its own
    Ended(SessionExit),
    /// Every input channel closed
    Disconnected,
}

pub struct Dispatcher<E> {
    session: PlayerSession<E>,
    requests: mpsc::Receiver<Request>,
    signals: mpsc::UnboundedReceiver<EngineSignal>,
    snapshot: watch::Sender<PlayerSnapshot>,
    poll_interval: Duration,
}

impl<E: StreamingEngine> Dispatcher<E> {
    pub fn new(
        session: PlayerSession<E>,
        signals: mpsc::UnboundedReceiver<EngineSignal>,
        poll_interval: Duration,
    ) -> (Self, SessionHandle) {
        let (request_tx, requests) = mpsc::channel(REQUEST_BUFFER);
        let (snapshot, snapshot_rx) = watch::channel(session.snapshot());
        let handle = SessionHandle {
            requests: request_tx,
            snapshot: snapshot_rx,
        };
        let dispatcher = Self {
            session,
            requests,
            signals,
            snapshot,
            poll_interval,
        };
        (dispatcher, handle)
    }

    /// Run until the session ends, every input closes, or `shutdown`
    /// resolves. The engine is stopped before returning.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> DispatchOutcome {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(target: "player::dispatch", "Dispatch loop started");
        debug!(target: "player::dispatch", playlist = ?self.session.playlist().playback_info(), "Initial playlist");

        let outcome = loop {
            if let Some(exit) = self.session.exit() {
                break DispatchOutcome::Ended(exit);
            }
            let was_polling = self.session.is_polling();

            tokio::select! {
                _ = &mut shutdown => {
                    info!(target: "player::dispatch", "Interrupted");
                    break DispatchOutcome::Interrupted;
                }
                Some(request) = self.requests.recv() => {
                    self.session.apply(request.command);
                    self.publish();
                    // the caller may have gone away; nothing to do then
                    let _ = request.ack.send(());
                }
                Some(signal) = self.signals.recv() => {
                    self.session.handle_engine_signal(signal);
                    self.publish();
                }
                _ = ticker.tick(), if was_polling => {
                    self.session.poll_position();
                    self.publish();
                }
                else => {
                    debug!(target: "player::dispatch", "All inputs closed");
                    break DispatchOutcome::Disconnected;
                }
            }

            if !was_polling && self.session.is_polling() {
                ticker.reset();
            }
        };

        self.session.shutdown();
        self.publish();
        outcome
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.session.snapshot());
    }
}
