//! The lectern client: connection lifecycle, dispatch and rendering.
//!
//! [`LecternClient::start`] spawns one event loop task that owns the socket,
//! the reconnection state and the [`RenderEngine`]. Everything happens in that
//! task, one event at a time:
//!
//! - connect attempt finished (open, or failed, which counts as a close)
//! - inbound frame (dispatched in arrival order)
//! - socket error / close (reconnection policy)
//! - light-chase tick
//! - scheduled retry
//! - host visibility change (manual restart when not connected)
//! - shutdown
//!
//! # Example
//!
//! ```rust,ignore
//! let config = LecternConfig::from_env();
//! let display = SharedDisplay::new();
//! let (mut client, mut events) =
//!     LecternClient::start(config, WebSocketConnector::new(), display.clone());
//!
//! while let Some(event) = events.recv().await {
//!     if matches!(event, LecternEvent::ConnectionLost) {
//!         break;
//!     }
//!     println!("{}", display.snapshot());
//! }
//! client.shutdown().await;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::LecternConfig;
use crate::connection::{CloseOutcome, Reconnector};
use crate::dispatch::dispatch;
use crate::error::{LecternError, Result};
use crate::event::LecternEvent;
use crate::render::{ConnectionStatus, RenderEngine, RenderTarget};
use crate::transport::{Transport, TransportFactory};

type ConnectFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Transport>>> + Send>>;

/// Notifications from the page or application hosting the lectern.
#[derive(Debug, Clone, Copy)]
enum HostEvent {
    Visibility(bool),
}

// ── Shared state ────────────────────────────────────────────────────

/// State the event loop publishes for the handle.
struct ClientState {
    connected: AtomicBool,
    reconnect_attempts: AtomicU32,
    player_number: AtomicU32,
}

impl ClientState {
    fn new(player_number: u32) -> Self {
        Self {
            connected: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            player_number: AtomicU32::new(player_number),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running lectern client.
///
/// Created via [`LecternClient::start`]. Dropping the handle aborts the event
/// loop; call [`shutdown`](Self::shutdown) to close the socket first.
pub struct LecternClient {
    host_tx: mpsc::UnboundedSender<HostEvent>,
    state: Arc<ClientState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl LecternClient {
    /// Start the event loop and return a handle plus the event receiver.
    ///
    /// The loop connects immediately, using `factory` for this and every later
    /// connection, and draws on `target`.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<F, T>(
        config: LecternConfig,
        factory: F,
        target: T,
    ) -> (Self, mpsc::Receiver<LecternEvent>)
    where
        F: TransportFactory,
        T: RenderTarget + Send + 'static,
    {
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let state = Arc::new(ClientState::new(config.resolved_player_number()));
        let shutdown_timeout = config.shutdown_timeout;

        let event_loop = EventLoop {
            reconnector: Reconnector::new(config.max_reconnect_attempts, config.reconnect_delay),
            engine: RenderEngine::new(target, config.light_stage_interval),
            factory: Arc::new(factory),
            socket: None,
            connecting: None,
            events: event_tx,
            state: Arc::clone(&state),
            config,
        };
        let task = tokio::spawn(event_loop.run(host_rx, shutdown_rx));

        let client = Self {
            host_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };
        (client, event_rx)
    }

    /// Report a host visibility change.
    ///
    /// Becoming visible while the socket is not open restarts the connection,
    /// even after retries were exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`LecternError::NotRunning`] if the event loop has exited.
    pub fn set_visible(&self, visible: bool) -> Result<()> {
        self.host_tx
            .send(HostEvent::Visibility(visible))
            .map_err(|_| LecternError::NotRunning)
    }

    /// Returns `true` while a socket is open.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Retries since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.state.reconnect_attempts.load(Ordering::Acquire)
    }

    /// Player number used for the most recent connection.
    pub fn player_number(&self) -> u32 {
        self.state.player_number.load(Ordering::Acquire)
    }

    /// Close the socket and stop the event loop.
    ///
    /// The loop gets `shutdown_timeout` to close gracefully before it is
    /// aborted. The event receiver yields `None` afterwards.
    pub async fn shutdown(&mut self) {
        debug!("LecternClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("lectern loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("lectern loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("lectern loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for LecternClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LecternClient")
            .field("connected", &self.is_connected())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .field("player_number", &self.player_number())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for LecternClient {
    fn drop(&mut self) {
        // No executor is available to await a graceful close here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Event loop ──────────────────────────────────────────────────────

struct EventLoop<T> {
    config: LecternConfig,
    factory: Arc<dyn TransportFactory>,
    /// Open socket. `None` while connecting, waiting for a retry, or lost.
    socket: Option<Box<dyn Transport>>,
    /// In-flight connect attempt.
    connecting: Option<ConnectFuture>,
    reconnector: Reconnector,
    engine: RenderEngine<T>,
    events: mpsc::Sender<LecternEvent>,
    state: Arc<ClientState>,
}

impl<T: RenderTarget + Send + 'static> EventLoop<T> {
    async fn run(
        mut self,
        mut host_rx: mpsc::UnboundedReceiver<HostEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("lectern loop started");
        self.start();

        loop {
            let light_tick = self.engine.next_light_tick();
            let retry_at = self.reconnector.retry_at();

            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    self.close_socket().await;
                    self.emit_disconnected(Some("client shut down".into())).await;
                    break;
                }

                host = host_rx.recv() => {
                    match host {
                        Some(HostEvent::Visibility(true)) => self.on_visible(),
                        Some(HostEvent::Visibility(false)) => debug!("host hidden"),
                        // Handle dropped without shutdown; the task is being aborted.
                        None => {
                            self.close_socket().await;
                            break;
                        }
                    }
                }

                connected = wait_connect(&mut self.connecting) => {
                    self.connecting = None;
                    match connected {
                        Ok(transport) => self.on_open(transport),
                        Err(e) => {
                            warn!("lectern connect failed: {e}");
                            self.on_close(Some(format!("connect failed: {e}")));
                        }
                    }
                }

                incoming = recv_frame(&mut self.socket) => {
                    match incoming {
                        Some(Ok(frame)) => {
                            let event = dispatch(&frame, &mut self.engine, Instant::now());
                            self.emit(event);
                        }
                        Some(Err(e)) => {
                            error!("lectern socket error: {e}");
                            self.socket = None;
                            self.on_close(Some(e.to_string()));
                        }
                        None => {
                            info!("lectern socket closed");
                            self.socket = None;
                            self.on_close(None);
                        }
                    }
                }

                () = sleep_until_opt(light_tick) => {
                    self.engine.on_light_tick(Instant::now());
                }

                () = sleep_until_opt(retry_at) => {
                    if self.reconnector.take_due_retry(Instant::now()) {
                        self.start();
                    }
                }
            }
        }

        debug!("lectern loop exited");
    }

    /// Open a fresh connection, dropping whatever socket or attempt came before.
    fn start(&mut self) {
        self.reconnector.on_start();

        let player_number = self.config.resolved_player_number();
        self.state
            .player_number
            .store(player_number, Ordering::Release);
        let url = self.config.socket_url();

        if self.socket.take().is_some() {
            debug!("discarding previous lectern socket");
        }
        if self.connecting.take().is_some() {
            debug!("abandoning in-flight connect attempt");
        }

        info!(url = %url, player_number, "connecting lectern");
        self.engine.render_status(ConnectionStatus::Connecting);

        let factory = Arc::clone(&self.factory);
        self.connecting = Some(Box::pin(async move { factory.connect(&url).await }));
    }

    fn on_open(&mut self, transport: Box<dyn Transport>) {
        let player_number = self.config.resolved_player_number();
        info!(player_number, "lectern socket open");

        self.socket = Some(transport);
        self.reconnector.on_open();
        self.state.connected.store(true, Ordering::Release);
        self.state.reconnect_attempts.store(0, Ordering::Release);
        self.engine.render_status(ConnectionStatus::Connected);
        self.emit(LecternEvent::Connected { player_number });
    }

    fn on_close(&mut self, reason: Option<String>) {
        self.state.connected.store(false, Ordering::Release);
        self.emit(LecternEvent::Disconnected { reason });

        let now = Instant::now();
        match self.reconnector.on_close(now) {
            CloseOutcome::RetryScheduled { attempt, at } => {
                let max = self.reconnector.max_attempts();
                info!(attempt, max, "scheduling lectern reconnect");
                self.state
                    .reconnect_attempts
                    .store(attempt, Ordering::Release);
                self.engine
                    .render_status(ConnectionStatus::Reconnecting { attempt, max });
                self.emit(LecternEvent::ReconnectScheduled {
                    attempt,
                    max,
                    delay: at.saturating_duration_since(now),
                });
            }
            CloseOutcome::Exhausted => {
                error!(
                    attempts = self.reconnector.attempts(),
                    "max reconnection attempts reached"
                );
                self.engine.render_connection_lost();
                self.emit_always(LecternEvent::ConnectionLost);
            }
            CloseOutcome::StillExhausted => {
                debug!("manual restart failed, connection still lost");
                self.engine.render_status(ConnectionStatus::ConnectionLost);
            }
        }
    }

    fn on_visible(&mut self) {
        if self.socket.is_some() {
            debug!("host visible, lectern socket already open");
            return;
        }
        info!("host visible, restarting lectern connection");
        self.start();
        self.emit(LecternEvent::Restarted);
    }

    async fn close_socket(&mut self) {
        self.connecting = None;
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close().await {
                debug!("error closing lectern socket: {e}");
            }
        }
        self.state.connected.store(false, Ordering::Release);
    }

    /// Emit an event without blocking the loop; drops it if the channel is full.
    fn emit(&self, event: LecternEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("event channel full, dropping event: {dropped:?}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Emit an event that must not be dropped.
    ///
    /// When the channel is full the send is handed to a separate task so the
    /// loop keeps running.
    fn emit_always(&self, event: LecternEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    if events.send(event).await.is_err() {
                        debug!("event channel closed, receiver dropped");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Final event before the loop exits; waits for channel space.
    ///
    /// Must take `&mut self`: a `&self` held across the send would require
    /// `EventLoop: Sync`, which transports and targets are not.
    async fn emit_disconnected(&mut self, reason: Option<String>) {
        let event = LecternEvent::Disconnected { reason };
        if self.events.send(event).await.is_err() {
            debug!("event channel closed, receiver dropped");
        }
    }
}

async fn wait_connect(connecting: &mut Option<ConnectFuture>) -> Result<Box<dyn Transport>> {
    match connecting {
        Some(attempt) => attempt.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn recv_frame(socket: &mut Option<Box<dyn Transport>>) -> Option<Result<String>> {
    match socket {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::display::SharedDisplay;
    use crate::protocol::PlayerName;
    use async_trait::async_trait;
    use std::cell::Cell;
    use std::sync::Mutex as StdMutex;

    /// A transport that never yields and records whether it was closed.
    struct IdleTransport {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for IdleTransport {
        async fn recv(&mut self) -> Option<Result<String>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    struct IdleFactory {
        urls: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TransportFactory for IdleFactory {
        async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
            self.urls.lock().unwrap().push(url.to_string());
            Ok(Box::new(IdleTransport {
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    #[tokio::test]
    async fn connects_with_player_number_and_closes_on_shutdown() {
        let urls = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let factory = IdleFactory {
            urls: Arc::clone(&urls),
            closed: Arc::clone(&closed),
        };
        let config = LecternConfig::new("quiz.local:8080").with_player_number(4);
        let (mut client, mut events) = LecternClient::start(config, factory, SharedDisplay::new());

        let event = events.recv().await.unwrap();
        assert_eq!(event, LecternEvent::Connected { player_number: 4 });
        assert!(client.is_connected());
        assert_eq!(client.player_number(), 4);
        assert_eq!(
            urls.lock().unwrap().as_slice(),
            ["ws://quiz.local:8080/lecternsocket?player=4"]
        );

        client.shutdown().await;
        assert!(closed.load(Ordering::Relaxed));
        assert!(!client.is_connected());

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            LecternEvent::Disconnected {
                reason: Some("client shut down".into())
            }
        );
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn set_visible_after_shutdown_is_not_running() {
        let factory = IdleFactory {
            urls: Arc::new(StdMutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let (mut client, _events) =
            LecternClient::start(LecternConfig::new("h"), factory, SharedDisplay::new());
        client.shutdown().await;
        let err = client.set_visible(true).unwrap_err();
        assert!(matches!(err, LecternError::NotRunning));
    }

    #[tokio::test]
    async fn debug_output_mentions_state() {
        let factory = IdleFactory {
            urls: Arc::new(StdMutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let (mut client, _events) =
            LecternClient::start(LecternConfig::new("h"), factory, SharedDisplay::new());
        let debug = format!("{client:?}");
        assert!(debug.contains("LecternClient"));
        assert!(debug.contains("reconnect_attempts"));
        client.shutdown().await;
    }

    /// Counts setter calls in a `Cell`: `Send` but not `Sync`.
    #[derive(Default)]
    struct CountingTarget {
        calls: Cell<u32>,
    }

    impl CountingTarget {
        fn bump(&self) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    impl RenderTarget for CountingTarget {
        fn set_name(&mut self, _name: PlayerName<'_>) {
            self.bump();
        }
        fn set_no_player(&mut self, _no_player: bool) {
            self.bump();
        }
        fn set_score(&mut self, _text: &str, _negative: bool) {
            self.bump();
        }
        fn set_active(&mut self, _active: bool) {
            self.bump();
        }
        fn set_light(&mut self, _index: u8, _lit: bool) {
            self.bump();
        }
        fn set_status(&mut self, _status: ConnectionStatus) {
            self.bump();
        }
    }

    fn assert_send<F: Send>(_: &F) {}

    #[test]
    fn event_loop_future_is_send_for_non_sync_targets() {
        let (events, _event_rx) = mpsc::channel(1);
        let (_host_tx, host_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let config = LecternConfig::new("h");
        let event_loop = EventLoop {
            reconnector: Reconnector::new(config.max_reconnect_attempts, config.reconnect_delay),
            engine: RenderEngine::new(CountingTarget::default(), config.light_stage_interval),
            factory: Arc::new(IdleFactory {
                urls: Arc::new(StdMutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            }),
            socket: None,
            connecting: None,
            events,
            state: Arc::new(ClientState::new(0)),
            config,
        };
        let run = event_loop.run(host_rx, shutdown_rx);
        assert_send(&run);
    }

    #[tokio::test]
    async fn runs_with_a_non_sync_target() {
        let factory = IdleFactory {
            urls: Arc::new(StdMutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let (mut client, mut events) =
            LecternClient::start(LecternConfig::new("h"), factory, CountingTarget::default());
        assert_eq!(
            events.recv().await.unwrap(),
            LecternEvent::Connected { player_number: 0 }
        );
        client.shutdown().await;
    }
}
