//! Transport implementations for the lectern socket.
//!
//! | Feature                | Transport              | Factory                |
//! |------------------------|------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] | [`WebSocketConnector`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), lectern_client::LecternError> {
//! use lectern_client::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:8080/lecternsocket?player=0").await?;
//! if let Some(Ok(frame)) = ws.recv().await {
//!     println!("server said: {frame}");
//! }
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
