//! Client configuration.

use std::time::Duration;

use crate::connection::{socket_url, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY};
use crate::render::DEFAULT_STAGE_INTERVAL;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Environment variable holding the game server `host[:port]`.
pub const ENV_HOST: &str = "LECTERN_HOST";

/// Environment variable holding the lectern's player number.
pub const ENV_PLAYER: &str = "LECTERN_PLAYER";

/// Environment variable that switches to `wss://` when `1` or `true`.
pub const ENV_SECURE: &str = "LECTERN_SECURE";

/// Host used by [`LecternConfig::from_env`] when `LECTERN_HOST` is unset.
pub const DEFAULT_HOST: &str = "localhost:8080";

/// Configuration for a [`LecternClient`](crate::LecternClient).
///
/// Only the server host is required.
///
/// ```
/// use lectern_client::LecternConfig;
/// use std::time::Duration;
///
/// let config = LecternConfig::new("game.local:8080")
///     .with_player_number(3)
///     .with_reconnect_delay(Duration::from_secs(1));
/// assert_eq!(config.socket_url(), "ws://game.local:8080/lecternsocket?player=3");
/// assert_eq!(config.max_reconnect_attempts, 10);
/// ```
#[derive(Debug, Clone)]
pub struct LecternConfig {
    /// Game server `host[:port]`.
    pub host: String,
    /// Use `wss://` instead of `ws://`.
    pub secure: bool,
    /// Lectern index supplied by the host; `None` means player 0.
    pub player_number: Option<u32>,
    /// Retry ceiling. Defaults to **10**.
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each retry. Defaults to **3 seconds**.
    pub reconnect_delay: Duration,
    /// Delay between light-chase stages. Defaults to **1 second**.
    pub light_stage_interval: Duration,
    /// Capacity of the bounded event channel. Defaults to **64**, clamped to
    /// at least 1. When full, events are dropped with a warning except
    /// `ConnectionLost`.
    pub event_channel_capacity: usize,
    /// How long [`shutdown`](crate::LecternClient::shutdown) waits before
    /// aborting the loop. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl LecternConfig {
    /// Create a configuration for `host` with default values.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            secure: false,
            player_number: None,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            light_stage_interval: DEFAULT_STAGE_INTERVAL,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Build a configuration from `LECTERN_HOST`, `LECTERN_PLAYER` and
    /// `LECTERN_SECURE`.
    ///
    /// Missing or unparsable values fall back to the defaults (a bad player
    /// number is logged and treated as absent).
    pub fn from_env() -> Self {
        let host = std::env::var(ENV_HOST).unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let mut config = Self::new(host);
        config.player_number = std::env::var(ENV_PLAYER)
            .ok()
            .and_then(|raw| parse_player_number(&raw));
        config.secure = std::env::var(ENV_SECURE)
            .map(|raw| matches!(raw.trim(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(false);
        config
    }

    /// Connect over `wss://`. Defaults to **false**.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the lectern's player number. Defaults to **0** when never set.
    #[must_use]
    pub fn with_player_number(mut self, player_number: u32) -> Self {
        self.player_number = Some(player_number);
        self
    }

    /// Set the retry ceiling. Defaults to **10**; `0` gives up on the first close.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the fixed delay before each retry. Defaults to **3 seconds**,
    /// capped at [`MAX_RECONNECT_DELAY`](crate::connection::MAX_RECONNECT_DELAY).
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the delay between light-chase stages. Defaults to **1 second**,
    /// capped at [`MAX_STAGE_INTERVAL`](crate::render::MAX_STAGE_INTERVAL).
    #[must_use]
    pub fn with_light_stage_interval(mut self, interval: Duration) -> Self {
        self.light_stage_interval = interval;
        self
    }

    /// Set the event channel capacity. Defaults to **64**; values below 1
    /// are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set how long shutdown waits before aborting the loop. Defaults to
    /// **1 second**.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The player number to connect as (0 when the host supplied none).
    pub fn resolved_player_number(&self) -> u32 {
        self.player_number.unwrap_or(0)
    }

    /// `ws(s)://<host>/lecternsocket?player=<N>`.
    pub fn socket_url(&self) -> String {
        socket_url(&self.host, self.secure, self.resolved_player_number())
    }
}

fn parse_player_number(raw: &str) -> Option<u32> {
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!(value = raw, "ignoring invalid player number: {e}");
            None
        }
    }
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
    use super::*;

    #[test]
    fn defaults() {
        let config = LecternConfig::new("host:1");
        assert_eq!(config.player_number, None);
        assert_eq!(config.resolved_player_number(), 0);
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(config.light_stage_interval, Duration::from_millis(1000));
        assert_eq!(config.socket_url(), "ws://host:1/lecternsocket?player=0");
    }

    #[test]
    fn secure_url() {
        let config = LecternConfig::new("quiz.example")
            .with_secure(true)
            .with_player_number(7);
        assert_eq!(config.socket_url(), "wss://quiz.example/lecternsocket?player=7");
    }

    #[test]
    fn channel_capacity_clamped() {
        let config = LecternConfig::new("h").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn player_number_parsing() {
        assert_eq!(parse_player_number(" 4 "), Some(4));
        assert_eq!(parse_player_number("-1"), None);
        assert_eq!(parse_player_number("two"), None);
    }

    #[test]
    fn builder_methods() {
        let config = LecternConfig::new("h")
            .with_secure(true)
            .with_player_number(3)
            .with_max_reconnect_attempts(4)
            .with_reconnect_delay(Duration::from_millis(250))
            .with_light_stage_interval(Duration::from_millis(500))
            .with_event_channel_capacity(8)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert!(config.secure);
        assert_eq!(config.player_number, Some(3));
        assert_eq!(config.max_reconnect_attempts, 4);
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.light_stage_interval, Duration::from_millis(500));
        assert_eq!(config.event_channel_capacity, 8);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }
}
