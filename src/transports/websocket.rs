//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] wraps one connection; [`WebSocketConnector`] is the
//! [`TransportFactory`] the lectern client uses to open a fresh one on every
//! start. Both `ws://` and `wss://` URLs are supported; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! This module is only available with the `transport-websocket` feature
//! (enabled by default).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::LecternError;
use crate::transport::{Transport, TransportFactory};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: frames are only taken off the
/// stream when the future completes.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`LecternError::Io`] if the URL is invalid or the connection
    /// cannot be established. I/O error kinds are preserved; all other
    /// failures map to [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, LecternError> {
        tracing::debug!(url = %url, "connecting to lectern socket");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            LecternError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "lectern socket connected");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Connect like [`connect`](Self::connect), failing with
    /// [`LecternError::Timeout`] after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LecternError::Timeout`] if the deadline elapses, or any error
    /// [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, LecternError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| LecternError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn recv(&mut self) -> Option<Result<String, LecternError>> {
        if self.closed {
            return None;
        }
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(LecternError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite answers pings itself.
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), LecternError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| LecternError::TransportClose(e.to_string()))
    }
}

/// Opens a [`WebSocketTransport`] per start.
///
/// An optional connect timeout bounds each attempt; without one the attempt
/// lasts as long as the OS connect does.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    /// Create a connector with no connect timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every connect attempt by `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl TransportFactory for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, LecternError> {
        let transport = match self.connect_timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(url, timeout).await?,
            None => WebSocketTransport::connect(url).await?,
        };
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
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
    use futures_util::SinkExt;
    use tokio::net::TcpListener;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
        assert_send::<WebSocketConnector>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, LecternError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1/lecternsocket?player=0")
            .await
            .unwrap_err();
        assert!(matches!(err, LecternError::Io(_)));
    }

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the lectern URL to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}/lecternsocket?player=3")
    }

    #[tokio::test]
    async fn recv_receives_text_frames_in_order() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"message":"NO_PLAYER"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text("second".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"message":"NO_PLAYER"}"#
        );
        assert_eq!(transport.recv().await.unwrap().unwrap(), "second");
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "after_binary");
    }

    #[tokio::test]
    async fn double_close_is_idempotent_and_ends_recv() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn connector_opens_boxed_transport() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("via_factory".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_secs(5));
        let mut transport = connector.connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "via_factory");
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1/lecternsocket?player=0",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        // Hosts without a route fail fast instead of hanging.
        assert!(matches!(err, LecternError::Timeout | LecternError::Io(_)));
    }
}
