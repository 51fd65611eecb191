//! # Lectern Client
//!
//! Display client for a trivia-game lectern (buzzer podium).
//!
//! The client keeps one WebSocket open to the game server at
//! `ws(s)://<host>/lecternsocket?player=<N>`, receives per-player state
//! frames and draws name, score, active status and a buzz light chase onto a
//! [`RenderTarget`].
//!
//! ## Features
//!
//! - **Resilient connection**: fixed-delay retries with a bounded attempt count,
//!   a terminal "connection lost" state, and manual restart on visibility
//! - **Idempotent rendering**: every render rewrites what it owns, so repeated
//!   state never leaves stale indicators or timers
//! - **Pluggable surfaces**: implement [`RenderTarget`] for any display and
//!   [`TransportFactory`] for any transport
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketConnector`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lectern_client::{LecternClient, LecternConfig, SharedDisplay, WebSocketConnector};
//!
//! let display = SharedDisplay::new();
//! let config = LecternConfig::new("game.local:8080").with_player_number(2);
//! let (mut client, mut events) =
//!     LecternClient::start(config, WebSocketConnector::new(), display.clone());
//!
//! while let Some(_event) = events.recv().await {
//!     println!("{}", display.snapshot());
//! }
//! ```

#[cfg(feature = "tokio-runtime")]
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod event;
pub mod protocol;
pub mod render;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
#[cfg(feature = "tokio-runtime")]
pub use client::LecternClient;
pub use config::LecternConfig;
pub use display::{DisplayState, NameDisplay, SharedDisplay};
pub use error::LecternError;
pub use event::LecternEvent;
pub use protocol::{LecternMessage, PlayerName, PlayerState};
pub use render::{ConnectionStatus, RenderEngine, RenderTarget};
pub use transport::{Transport, TransportFactory};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
