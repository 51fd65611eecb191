//! Events emitted by the lectern client loop.

use std::time::Duration;

use crate::protocol::PlayerState;

/// Something the lectern client did or observed.
///
/// Events are informational: the display has already been updated when an
/// event is emitted. They are delivered on a bounded channel and dropped with
/// a warning when the consumer falls behind, except
/// [`ConnectionLost`](LecternEvent::ConnectionLost) and the final
/// [`Disconnected`](LecternEvent::Disconnected) on shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LecternEvent {
    /// A socket opened.
    Connected {
        /// Player number used in the socket URL.
        player_number: u32,
    },
    /// The socket (or a connection attempt) closed.
    Disconnected {
        /// Why, if known.
        reason: Option<String>,
    },
    /// A retry was scheduled after a close.
    ReconnectScheduled {
        /// Retry number, starting at 1.
        attempt: u32,
        /// Retry ceiling.
        max: u32,
        /// Delay until the retry starts.
        delay: Duration,
    },
    /// Retries are exhausted; the display shows "connection lost".
    ConnectionLost,
    /// The host became visible while disconnected and the client restarted.
    Restarted,
    /// A player state was rendered.
    PlayerStateRendered(PlayerState),
    /// The no-player state was rendered.
    NoPlayerRendered,
    /// A frame with an unknown `message` kind was ignored.
    UnknownMessage {
        /// The raw kind.
        kind: String,
    },
    /// A frame could not be decoded and was dropped.
    MalformedFrame {
        /// Decoder error text.
        error: String,
    },
}
