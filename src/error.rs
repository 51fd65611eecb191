//! Error types for the lectern client.

use thiserror::Error;

/// Errors that can occur inside the lectern client.
///
/// None of these escape the event loop: transport faults feed the reconnection
/// policy and decode faults are logged and dropped. They surface directly only
/// from [`Transport`](crate::Transport) implementations, the decoder and the
/// client handle.
#[derive(Debug, Error)]
pub enum LecternError {
    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// Failed to close the transport cleanly.
    #[error("transport close error: {0}")]
    TransportClose(String),

    /// Failed to decode an inbound frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A `PLAYER_STATE` envelope arrived without a `text` payload.
    #[error("PLAYER_STATE message carries no payload")]
    MissingPayload,

    /// The client event loop is no longer running.
    #[error("lectern client is not running")]
    NotRunning,

    /// Connecting the transport timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred (includes failed connection attempts).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for lectern client operations.
pub type Result<T> = std::result::Result<T, LecternError>;
