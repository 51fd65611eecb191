//! Reconnection policy for the lectern socket.
//!
//! Retries use a fixed delay and a bounded attempt count. The counter resets
//! only when a socket actually opens. Once the ceiling is hit the client stops
//! retrying for good; an external restart (the host becoming visible again)
//! is the only way back.

use std::time::Duration;

use tokio::time::Instant;

/// Default retry ceiling.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default delay between a close and the next start.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Longest retry delay honoured; larger delays are capped to this.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Path of the lectern socket on the game server.
pub const SOCKET_PATH: &str = "/lecternsocket";

/// Build the socket URL for lectern `player`.
///
/// ```
/// use lectern_client::connection::socket_url;
///
/// assert_eq!(
///     socket_url("game.local:8080", false, 2),
///     "ws://game.local:8080/lecternsocket?player=2"
/// );
/// assert_eq!(
///     socket_url("game.example", true, 0),
///     "wss://game.example/lecternsocket?player=0"
/// );
/// ```
pub fn socket_url(host: &str, secure: bool, player: u32) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}{SOCKET_PATH}?player={player}")
}

/// What the client should do after a socket closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Start again at `at`; this is retry number `attempt`.
    RetryScheduled { attempt: u32, at: Instant },
    /// The ceiling was just reached. Show the terminal state.
    Exhausted,
    /// The ceiling was reached earlier and nothing has opened since.
    StillExhausted,
}

/// Attempt counter and the single pending retry.
#[derive(Debug, Clone)]
pub struct Reconnector {
    attempts: u32,
    max_attempts: u32,
    delay: Duration,
    retry_at: Option<Instant>,
    exhausted: bool,
}

impl Reconnector {
    /// Allow `max_attempts` retries, each `delay` after a close (capped at
    /// [`MAX_RECONNECT_DELAY`]).
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            delay: delay.min(MAX_RECONNECT_DELAY),
            retry_at: None,
            exhausted: false,
        }
    }

    /// A start is happening; it supersedes any pending retry.
    pub fn on_start(&mut self) {
        self.retry_at = None;
    }

    /// A socket opened.
    pub fn on_open(&mut self) {
        self.attempts = 0;
        self.exhausted = false;
    }

    /// A socket (or connection attempt) closed at `now`.
    pub fn on_close(&mut self, now: Instant) -> CloseOutcome {
        if let Some(at) = self.retry_at {
            return CloseOutcome::RetryScheduled {
                attempt: self.attempts,
                at,
            };
        }
        if self.attempts < self.max_attempts {
            if let Some(at) = now.checked_add(self.delay) {
                self.attempts += 1;
                self.retry_at = Some(at);
                return CloseOutcome::RetryScheduled {
                    attempt: self.attempts,
                    at,
                };
            }
            tracing::error!(delay = ?self.delay, "retry deadline out of range, giving up");
        }
        if self.exhausted {
            CloseOutcome::StillExhausted
        } else {
            self.exhausted = true;
            CloseOutcome::Exhausted
        }
    }

    /// When the pending retry fires, if one is scheduled.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Consume the pending retry if it is due at `now`.
    pub fn take_due_retry(&mut self, now: Instant) -> bool {
        match self.retry_at {
            Some(at) if at <= now => {
                self.retry_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
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

    const DELAY: Duration = DEFAULT_RECONNECT_DELAY;

    /// Close, wait for the retry, start again. Returns the close outcome.
    fn fail_once(r: &mut Reconnector, now: &mut Instant) -> CloseOutcome {
        let outcome = r.on_close(*now);
        if let CloseOutcome::RetryScheduled { at, .. } = outcome {
            *now = at;
            assert!(r.take_due_retry(*now));
            r.on_start();
        }
        outcome
    }

    #[test]
    fn retries_with_fixed_delay_up_to_ceiling() {
        let mut r = Reconnector::new(DEFAULT_MAX_RECONNECT_ATTEMPTS, DELAY);
        let start = Instant::now();
        let mut now = start;
        r.on_start();

        for expected in 1..=DEFAULT_MAX_RECONNECT_ATTEMPTS {
            let before = now;
            let outcome = fail_once(&mut r, &mut now);
            assert_eq!(
                outcome,
                CloseOutcome::RetryScheduled {
                    attempt: expected,
                    at: before + DELAY,
                }
            );
            assert!(r.attempts() <= r.max_attempts());
        }

        assert_eq!(r.on_close(now), CloseOutcome::Exhausted);
        assert_eq!(r.retry_at(), None);
        assert_eq!(r.attempts(), DEFAULT_MAX_RECONNECT_ATTEMPTS);
        assert_eq!(now, start + DELAY * DEFAULT_MAX_RECONNECT_ATTEMPTS);
    }

    #[test]
    fn exhaustion_reported_once_until_an_open() {
        let mut r = Reconnector::new(1, DELAY);
        let mut now = Instant::now();
        assert!(matches!(
            fail_once(&mut r, &mut now),
            CloseOutcome::RetryScheduled { attempt: 1, .. }
        ));
        assert_eq!(r.on_close(now), CloseOutcome::Exhausted);

        // Manual restart that fails again does not re-render the terminal state.
        r.on_start();
        assert_eq!(r.on_close(now), CloseOutcome::StillExhausted);
        assert!(r.is_exhausted());

        // Manual restart that opens resets everything.
        r.on_start();
        r.on_open();
        assert_eq!(r.attempts(), 0);
        assert!(!r.is_exhausted());
        assert!(matches!(
            r.on_close(now),
            CloseOutcome::RetryScheduled { attempt: 1, .. }
        ));
    }

    #[test]
    fn open_resets_counter() {
        let mut r = Reconnector::new(10, DELAY);
        let mut now = Instant::now();
        fail_once(&mut r, &mut now);
        fail_once(&mut r, &mut now);
        assert_eq!(r.attempts(), 2);
        r.on_open();
        assert_eq!(r.attempts(), 0);
    }

    #[test]
    fn only_one_retry_pending() {
        let mut r = Reconnector::new(10, DELAY);
        let now = Instant::now();
        let first = r.on_close(now);
        let second = r.on_close(now + Duration::from_millis(10));
        assert_eq!(first, second);
        assert_eq!(r.attempts(), 1);
    }

    #[test]
    fn retry_not_due_early() {
        let mut r = Reconnector::new(10, DELAY);
        let now = Instant::now();
        r.on_close(now);
        assert!(!r.take_due_retry(now + DELAY - Duration::from_millis(1)));
        assert!(r.take_due_retry(now + DELAY));
        assert!(!r.take_due_retry(now + DELAY));
    }

    #[test]
    fn start_cancels_pending_retry() {
        let mut r = Reconnector::new(10, DELAY);
        let now = Instant::now();
        r.on_close(now);
        r.on_start();
        assert_eq!(r.retry_at(), None);
        assert!(!r.take_due_retry(now + DELAY));
    }

    #[test]
    fn zero_ceiling_exhausts_on_first_close() {
        let mut r = Reconnector::new(0, DELAY);
        assert_eq!(r.on_close(Instant::now()), CloseOutcome::Exhausted);
    }

    #[test]
    fn huge_delay_is_capped_instead_of_overflowing() {
        let mut r = Reconnector::new(10, Duration::MAX);
        let now = Instant::now();
        assert_eq!(
            r.on_close(now),
            CloseOutcome::RetryScheduled {
                attempt: 1,
                at: now + MAX_RECONNECT_DELAY,
            }
        );
        assert!(!r.take_due_retry(now + DELAY));
    }
}
