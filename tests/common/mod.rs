#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for lectern client integration tests.
//!
//! Provides a [`ScriptedFactory`] whose connect attempts either fail or hand
//! the client a channel-backed transport, plus a [`ServerConn`] the test uses
//! to push frames, inject errors and close the socket.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use lectern_client::{
    LecternError, LecternEvent, LecternMessage, PlayerState, Transport, TransportFactory,
};
use tokio::sync::{mpsc, oneshot};

// ── Transport ───────────────────────────────────────────────────────

/// Transport fed by a [`ServerConn`]. Dropping the server end closes it.
pub struct ChannelTransport {
    rx: mpsc::UnboundedReceiver<Result<String, String>>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn recv(&mut self) -> Option<Result<String, LecternError>> {
        self.rx
            .recv()
            .await
            .map(|item| item.map_err(LecternError::TransportReceive))
    }

    async fn close(&mut self) -> Result<(), LecternError> {
        self.rx.close();
        Ok(())
    }
}

/// Server side of one accepted connection.
pub struct ServerConn {
    tx: mpsc::UnboundedSender<Result<String, String>>,
}

impl ServerConn {
    /// Push a raw text frame.
    pub fn raw(&self, frame: &str) {
        let _ = self.tx.send(Ok(frame.to_string()));
    }

    /// Push a `PLAYER_STATE` frame.
    pub fn state(&self, state: &PlayerState) {
        self.raw(&LecternMessage::PlayerState(state.clone()).to_frame().unwrap());
    }

    /// Push a `NO_PLAYER` frame.
    pub fn no_player(&self) {
        self.raw(&LecternMessage::NoPlayer.to_frame().unwrap());
    }

    /// Make the client's next `recv` fail.
    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Err(reason.to_string()));
    }

    /// Close the connection.
    pub fn close(self) {}
}

// ── Factory ─────────────────────────────────────────────────────────

type FrameRx = mpsc::UnboundedReceiver<Result<String, String>>;

enum Script {
    Refuse,
    Accept(FrameRx),
    Hold(oneshot::Receiver<FrameRx>),
}

/// A connect attempt that stays pending until the test settles it.
pub struct HeldConnect {
    tx: oneshot::Sender<FrameRx>,
}

impl HeldConnect {
    /// Let the held attempt succeed.
    ///
    /// Returns `None` if the client already abandoned the attempt.
    pub fn accept(self) -> Option<ServerConn> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx.send(rx).ok().map(|()| ServerConn { tx })
    }
}

#[derive(Default)]
struct FactoryInner {
    scripts: VecDeque<Script>,
    urls: Vec<String>,
}

/// A [`TransportFactory`] that follows a script of connect outcomes.
///
/// Each connect consumes one scripted outcome; with the script empty every
/// connect is refused.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    inner: Arc<StdMutex<FactoryInner>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the next unscripted connect and return its server end.
    pub fn accept_next(&self) -> ServerConn {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap()
            .scripts
            .push_back(Script::Accept(rx));
        ServerConn { tx }
    }

    /// Keep the next unscripted connect pending until released.
    pub fn hold_next(&self) -> HeldConnect {
        let (tx, rx) = oneshot::channel();
        self.inner
            .lock()
            .unwrap()
            .scripts
            .push_back(Script::Hold(rx));
        HeldConnect { tx }
    }

    /// Refuse the next `n` unscripted connects.
    pub fn refuse_next(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        for _ in 0..n {
            inner.scripts.push_back(Script::Refuse);
        }
    }

    /// URLs of every connect attempt so far.
    pub fn urls(&self) -> Vec<String> {
        self.inner.lock().unwrap().urls.clone()
    }

    /// Number of connect attempts so far.
    pub fn connect_count(&self) -> usize {
        self.inner.lock().unwrap().urls.len()
    }
}

#[async_trait]
impl TransportFactory for ScriptedFactory {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, LecternError> {
        let script = {
            let mut inner = self.inner.lock().unwrap();
            inner.urls.push(url.to_string());
            inner.scripts.pop_front()
        };
        match script {
            Some(Script::Accept(rx)) => Ok(Box::new(ChannelTransport { rx })),
            Some(Script::Hold(held)) => match held.await {
                Ok(rx) => Ok(Box::new(ChannelTransport { rx })),
                Err(_) => Err(LecternError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    "held connect dropped",
                ))),
            },
            Some(Script::Refuse) | None => Err(LecternError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive the next event, failing the test after a long virtual timeout.
pub async fn next_event(rx: &mut mpsc::Receiver<LecternEvent>) -> LecternEvent {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Skip events until one matches `pred`, returning it and everything skipped.
pub async fn wait_for(
    rx: &mut mpsc::Receiver<LecternEvent>,
    pred: impl Fn(&LecternEvent) -> bool,
) -> (LecternEvent, Vec<LecternEvent>) {
    let mut skipped = Vec::new();
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return (event, skipped);
        }
        skipped.push(event);
    }
}

/// A named, buzzable player state.
pub fn player(name: &str, score: i64, active: bool, buzzed: bool) -> PlayerState {
    PlayerState {
        name: Some(name.to_string()),
        score,
        active,
        buzzed,
    }
}
