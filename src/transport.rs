//! Transport abstraction for the lectern socket.
//!
//! The lectern protocol is a one-way feed: the server pushes JSON text frames
//! and the client only listens. A [`Transport`] therefore exposes receive and
//! close, and the framing (WebSocket frames, test scripts, etc.) stays inside
//! the implementation.
//!
//! # Connection Setup
//!
//! Unlike a one-shot client, the lectern reconnects on its own, so it cannot be
//! handed a single pre-connected transport. Instead it receives a
//! [`TransportFactory`] and asks it for a fresh transport on every start.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use lectern_client::error::LecternError;
//! use lectern_client::transport::{Transport, TransportFactory};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn recv(&mut self) -> Option<Result<String, LecternError>> {
//!         // Receive the next JSON text frame; `None` on clean close.
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), LecternError> {
//!         Ok(())
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl TransportFactory for MyConnector {
//!     async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, LecternError> {
//!         let _ = url;
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::LecternError;

/// An inbound text frame channel from the game server.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the client polls
/// it inside `tokio::select!` next to timers. Dropping an unfinished `recv`
/// future must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Receive the next JSON text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame
    /// - `Some(Err(e))`: a transport error; the client treats it as a close
    /// - `None`: the connection closed
    async fn recv(&mut self) -> Option<Result<String, LecternError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources must be
    /// released regardless.
    async fn close(&mut self) -> Result<(), LecternError>;
}

/// Opens transports for the lectern client.
///
/// Called once per start (initial connect, scheduled retry, visibility
/// restart). An `Err` is treated exactly like a transport that closed before
/// opening.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    /// Connect to `url` and return an open transport.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, LecternError>;
}

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
    use std::collections::VecDeque;

    use super::*;

    struct Replay {
        frames: VecDeque<Result<String, LecternError>>,
    }

    #[async_trait]
    impl Transport for Replay {
        async fn recv(&mut self) -> Option<Result<String, LecternError>> {
            self.frames.pop_front()
        }

        async fn close(&mut self) -> Result<(), LecternError> {
            self.frames.clear();
            Ok(())
        }
    }

    struct ReplayFactory;

    #[async_trait]
    impl TransportFactory for ReplayFactory {
        async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, LecternError> {
            Ok(Box::new(Replay {
                frames: VecDeque::from([
                    Ok(url.to_string()),
                    Err(LecternError::TransportReceive("reset".into())),
                ]),
            }))
        }
    }

    #[test]
    fn factory_transports_are_usable_as_trait_objects() {
        let mut transport =
            tokio_test::block_on(ReplayFactory.connect("ws://host/lecternsocket?player=0"))
                .unwrap();

        let first = tokio_test::block_on(transport.recv()).unwrap().unwrap();
        assert_eq!(first, "ws://host/lecternsocket?player=0");
        assert!(matches!(
            tokio_test::block_on(transport.recv()),
            Some(Err(LecternError::TransportReceive(_)))
        ));
        assert!(tokio_test::block_on(transport.recv()).is_none());
    }

    #[test]
    fn close_drops_pending_frames() {
        let mut transport = tokio_test::block_on(ReplayFactory.connect("u")).unwrap();
        tokio_test::assert_ok!(tokio_test::block_on(transport.close()));
        assert!(tokio_test::block_on(transport.recv()).is_none());
    }
}
