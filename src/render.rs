//! Render engine: projects player state onto a [`RenderTarget`].
//!
//! Every render call rewrites all the regions it owns, so feeding the same
//! state twice leaves the target exactly as feeding it once. The only state the
//! engine keeps is the buzz light chase.
//!
//! # Light chase
//!
//! A buzz lights the nine lectern lights outward from the centre in five
//! stages, one per stage interval (1000 ms by default):
//!
//! | stage | lit    |
//! |-------|--------|
//! | 0     | 5      |
//! | 1     | 4..=6  |
//! | 2     | 3..=7  |
//! | 3     | 2..=8  |
//! | 4     | 1..=9  |
//!
//! Stage 0 lights immediately. After stage 4 the timer cancels itself and the
//! last pattern stays lit until the buzz clears; the chase does not loop.

use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::{PlayerName, PlayerState};

/// Number of lights on a lectern, addressed `1..=LIGHT_COUNT`.
pub const LIGHT_COUNT: u8 = 9;

/// Default delay between light-chase stages.
pub const DEFAULT_STAGE_INTERVAL: Duration = Duration::from_millis(1000);

/// Longest stage interval honoured; larger intervals are capped to this.
pub const MAX_STAGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Text shown in the name region when no player is assigned.
pub const NO_PLAYER_TEXT: &str = "No player assigned";

/// Text shown in the name region once reconnection gives up.
pub const CONNECTION_LOST_TEXT: &str = "Connection lost";

/// Inclusive light ranges per stage.
const LIGHT_STAGES: [(u8, u8); 5] = [(5, 5), (4, 6), (3, 7), (2, 8), (1, 9)];

/// Connection phase shown by the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// A connection attempt is in flight.
    #[default]
    Connecting,
    /// The socket is open.
    Connected,
    /// The socket closed and a retry is scheduled.
    Reconnecting {
        /// Retry number, starting at 1.
        attempt: u32,
        /// Retry ceiling.
        max: u32,
    },
    /// Retries are exhausted; only a visibility restart recovers.
    ConnectionLost,
}

/// The display surface a lectern draws on.
///
/// Implementations own the actual widgets (DOM nodes, terminal cells, LEDs).
/// The engine only calls these setters, so a recording implementation is
/// enough to test it.
pub trait RenderTarget {
    /// Show `name` in the name region. [`PlayerName::Absent`] means empty.
    fn set_name(&mut self, name: PlayerName<'_>);

    /// Toggle the "no-player" marker on the name region.
    fn set_no_player(&mut self, no_player: bool);

    /// Show the formatted score and toggle the "negative" marker.
    fn set_score(&mut self, text: &str, negative: bool);

    /// Toggle the active/answering indicator.
    fn set_active(&mut self, active: bool);

    /// Switch light `index` (`1..=LIGHT_COUNT`) on or off.
    fn set_light(&mut self, index: u8, lit: bool);

    /// Show the connection status.
    fn set_status(&mut self, status: ConnectionStatus);
}

/// Format a score with a currency prefix and thousands grouping.
///
/// ```
/// use lectern_client::render::format_score;
///
/// assert_eq!(format_score(1_000_000), "$1,000,000");
/// assert_eq!(format_score(-500), "-$500");
/// assert_eq!(format_score(0), "$0");
/// ```
pub fn format_score(score: i64) -> String {
    let digits = score.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    if score < 0 {
        grouped.push('-');
    }
    grouped.push('$');
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[derive(Debug)]
struct LightChase {
    running: bool,
    stage: usize,
    next_tick: Option<Instant>,
    interval: Duration,
}

/// Drives a [`RenderTarget`] from lectern messages.
#[derive(Debug)]
pub struct RenderEngine<T> {
    target: T,
    lights: LightChase,
}

impl<T: RenderTarget> RenderEngine<T> {
    /// Create an engine that advances the light chase every `stage_interval`
    /// (capped at [`MAX_STAGE_INTERVAL`]).
    pub fn new(target: T, stage_interval: Duration) -> Self {
        Self {
            target,
            lights: LightChase {
                running: false,
                stage: 0,
                next_tick: None,
                interval: stage_interval.min(MAX_STAGE_INTERVAL),
            },
        }
    }

    /// Render a player state received at `now`.
    pub fn render_player(&mut self, state: &PlayerState, now: Instant) {
        let name = state.player_name();
        self.target.set_name(name);
        self.target.set_no_player(name == PlayerName::Absent);

        self.target
            .set_score(&format_score(state.score), state.score < 0);
        self.target.set_active(state.active);

        if state.buzzed {
            self.start_lights(now);
        } else if self.lights.running {
            self.stop_lights();
        }
    }

    /// Render the "no player assigned" state.
    pub fn render_no_player(&mut self) {
        self.target.set_name(PlayerName::Absent);
        self.target.set_no_player(true);
        self.target.set_score(&format_score(0), false);
        self.target.set_active(false);
        self.stop_lights();
    }

    /// Show a connection status.
    pub fn render_status(&mut self, status: ConnectionStatus) {
        self.target.set_status(status);
    }

    /// Show the terminal "connection lost" state.
    pub fn render_connection_lost(&mut self) {
        self.target.set_status(ConnectionStatus::ConnectionLost);
        self.target.set_name(PlayerName::Text(CONNECTION_LOST_TEXT));
    }

    /// When the next light stage is due, if the chase timer is armed.
    pub fn next_light_tick(&self) -> Option<Instant> {
        self.lights.next_tick
    }

    /// Advance the light chase if a stage is due at `now`.
    ///
    /// Ticks that arrive after a stop, after the last stage, or early are
    /// ignored.
    pub fn on_light_tick(&mut self, now: Instant) {
        let Some(due) = self.lights.next_tick else {
            return;
        };
        if !self.lights.running || now < due {
            return;
        }
        self.show_stage(self.lights.stage);
        self.lights.stage += 1;
        self.lights.next_tick = if self.lights.stage < LIGHT_STAGES.len() {
            due.checked_add(self.lights.interval)
        } else {
            tracing::debug!("light chase finished");
            None
        };
    }

    /// Whether a buzz light chase is in progress (including a finished chase
    /// whose final pattern is still lit).
    pub fn lights_running(&self) -> bool {
        self.lights.running
    }

    /// Index of the next stage to light; 0 when idle.
    pub fn light_stage(&self) -> usize {
        self.lights.stage
    }

    /// Borrow the render target.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Consume the engine and return the render target.
    pub fn into_target(self) -> T {
        self.target
    }

    fn start_lights(&mut self, now: Instant) {
        if self.lights.running {
            return;
        }
        tracing::debug!("starting light chase");
        self.lights.running = true;
        self.lights.stage = 0;
        self.show_stage(0);
        self.lights.stage = 1;
        // An out-of-range deadline leaves the first stage lit with no timer.
        self.lights.next_tick = now.checked_add(self.lights.interval);
    }

    fn stop_lights(&mut self) {
        if self.lights.running {
            tracing::debug!(stage = self.lights.stage, "stopping light chase");
        }
        self.lights.next_tick = None;
        self.lights.running = false;
        self.lights.stage = 0;
        for index in 1..=LIGHT_COUNT {
            self.target.set_light(index, false);
        }
    }

    fn show_stage(&mut self, stage: usize) {
        let Some(&(first, last)) = LIGHT_STAGES.get(stage) else {
            return;
        };
        for index in 1..=LIGHT_COUNT {
            self.target
                .set_light(index, (first..=last).contains(&index));
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
    use crate::display::{DisplayState, NameDisplay};

    const STAGE: Duration = DEFAULT_STAGE_INTERVAL;

    fn engine() -> RenderEngine<DisplayState> {
        RenderEngine::new(DisplayState::default(), STAGE)
    }

    fn buzzed(buzzed: bool) -> PlayerState {
        PlayerState {
            name: Some("Alice".into()),
            score: 400,
            active: true,
            buzzed,
        }
    }

    /// Fire every due tick up to `at`, the way the client loop does.
    fn run_until(engine: &mut RenderEngine<DisplayState>, at: Instant) {
        while let Some(due) = engine.next_light_tick() {
            if due > at {
                break;
            }
            engine.on_light_tick(due);
        }
    }

    #[test]
    fn score_formatting() {
        assert_eq!(format_score(0), "$0");
        assert_eq!(format_score(999), "$999");
        assert_eq!(format_score(1000), "$1,000");
        assert_eq!(format_score(-500), "-$500");
        assert_eq!(format_score(-12_345), "-$12,345");
        assert_eq!(format_score(1_000_000), "$1,000,000");
        assert_eq!(format_score(i64::MIN), "-$9,223,372,036,854,775,808");
    }

    #[test]
    fn renders_negative_then_positive_score() {
        let mut engine = engine();
        let now = Instant::now();
        engine.render_player(
            &PlayerState {
                score: -500,
                ..buzzed(false)
            },
            now,
        );
        assert_eq!(engine.target().score_text, "-$500");
        assert!(engine.target().score_negative);

        engine.render_player(
            &PlayerState {
                score: 1_000_000,
                ..buzzed(false)
            },
            now,
        );
        assert_eq!(engine.target().score_text, "$1,000,000");
        assert!(!engine.target().score_negative);
    }

    #[test]
    fn renders_name_variants() {
        let mut engine = engine();
        let now = Instant::now();

        engine.render_player(
            &PlayerState {
                name: Some("data:image/png;base64,AAAA".into()),
                ..PlayerState::default()
            },
            now,
        );
        assert_eq!(
            engine.target().name,
            NameDisplay::Image("data:image/png;base64,AAAA".into())
        );
        assert!(!engine.target().no_player);

        engine.render_player(
            &PlayerState {
                name: Some("Alice".into()),
                ..PlayerState::default()
            },
            now,
        );
        assert_eq!(engine.target().name, NameDisplay::Text("Alice".into()));

        engine.render_player(&PlayerState::default(), now);
        assert_eq!(engine.target().name, NameDisplay::Empty);
        assert!(engine.target().no_player);
    }

    #[test]
    fn active_follows_flag() {
        let mut engine = engine();
        let now = Instant::now();
        engine.render_player(&buzzed(false), now);
        assert!(engine.target().active);
        engine.render_player(
            &PlayerState {
                active: false,
                ..buzzed(false)
            },
            now,
        );
        assert!(!engine.target().active);
    }

    #[test]
    fn rendering_twice_is_idempotent() {
        let start = Instant::now();
        let mut once = engine();
        once.render_player(&buzzed(true), start);

        let mut twice = engine();
        twice.render_player(&buzzed(true), start);
        twice.render_player(&buzzed(true), start + Duration::from_millis(300));

        assert_eq!(once.target(), twice.target());
        assert_eq!(once.next_light_tick(), twice.next_light_tick());
        assert_eq!(once.light_stage(), twice.light_stage());
    }

    #[test]
    fn light_chase_stage_timing() {
        let mut engine = engine();
        let start = Instant::now();
        engine.render_player(&buzzed(true), start);

        let expected: [&[u8]; 5] = [
            &[5],
            &[4, 5, 6],
            &[3, 4, 5, 6, 7],
            &[2, 3, 4, 5, 6, 7, 8],
            &[1, 2, 3, 4, 5, 6, 7, 8, 9],
        ];
        assert_eq!(engine.target().lit_lights(), expected[0]);

        for (k, lit) in expected.iter().enumerate().skip(1) {
            let at = start + STAGE * k as u32;
            // Just before the stage is due nothing changes.
            run_until(&mut engine, at - Duration::from_millis(1));
            assert_eq!(engine.target().lit_lights(), expected[k - 1]);
            run_until(&mut engine, at);
            assert_eq!(engine.target().lit_lights(), *lit);
        }

        // One-shot: the timer is gone and the final pattern stays lit.
        assert_eq!(engine.next_light_tick(), None);
        assert!(engine.lights_running());
        engine.on_light_tick(start + STAGE * 60);
        assert_eq!(engine.target().lit_lights(), expected[4]);
    }

    #[test]
    fn unbuzz_mid_chase_clears_lights() {
        let mut engine = engine();
        let start = Instant::now();
        engine.render_player(&buzzed(true), start);
        run_until(&mut engine, start + STAGE * 2);
        assert_eq!(engine.target().lit_lights(), vec![3, 4, 5, 6, 7]);

        engine.render_player(&buzzed(false), start + STAGE * 2);
        assert!(engine.target().lit_lights().is_empty());
        assert_eq!(engine.light_stage(), 0);
        assert!(!engine.lights_running());
        assert_eq!(engine.next_light_tick(), None);

        // A stale tick after the stop is ignored.
        engine.on_light_tick(start + STAGE * 3);
        assert!(engine.target().lit_lights().is_empty());
    }

    #[test]
    fn rebuzz_after_stop_restarts_from_stage_zero() {
        let mut engine = engine();
        let start = Instant::now();
        engine.render_player(&buzzed(true), start);
        run_until(&mut engine, start + STAGE * 4);
        engine.render_player(&buzzed(false), start + STAGE * 5);

        let again = start + STAGE * 6;
        engine.render_player(&buzzed(true), again);
        assert_eq!(engine.target().lit_lights(), vec![5]);
        assert_eq!(engine.next_light_tick(), Some(again + STAGE));
    }

    #[test]
    fn buzz_while_running_does_not_restart() {
        let mut engine = engine();
        let start = Instant::now();
        engine.render_player(&buzzed(true), start);
        run_until(&mut engine, start + STAGE);
        engine.render_player(&buzzed(true), start + STAGE + Duration::from_millis(500));
        assert_eq!(engine.target().lit_lights(), vec![4, 5, 6]);
        assert_eq!(engine.next_light_tick(), Some(start + STAGE * 2));
    }

    #[test]
    fn no_player_stops_chase_and_zeroes_score() {
        let mut engine = engine();
        let start = Instant::now();
        engine.render_player(
            &PlayerState {
                score: -200,
                ..buzzed(true)
            },
            start,
        );
        run_until(&mut engine, start + STAGE);

        engine.render_no_player();
        let display = engine.target();
        assert_eq!(display.name, NameDisplay::Empty);
        assert!(display.no_player);
        assert_eq!(display.score_text, "$0");
        assert!(!display.score_negative);
        assert!(!display.active);
        assert!(display.lit_lights().is_empty());
        assert!(!engine.lights_running());
        assert_eq!(engine.next_light_tick(), None);

        // Safe when nothing is running.
        engine.render_no_player();
        assert!(engine.target().lit_lights().is_empty());
    }

    #[test]
    fn connection_lost_replaces_name() {
        let mut engine = engine();
        engine.render_connection_lost();
        assert_eq!(engine.target().status, ConnectionStatus::ConnectionLost);
        assert_eq!(
            engine.target().name,
            NameDisplay::Text(CONNECTION_LOST_TEXT.into())
        );
    }

    #[test]
    fn huge_stage_interval_is_capped_instead_of_overflowing() {
        let mut engine = RenderEngine::new(DisplayState::default(), Duration::MAX);
        let now = Instant::now();
        engine.render_player(&buzzed(true), now);
        assert_eq!(engine.target().lit_lights(), vec![5]);
        assert_eq!(engine.next_light_tick(), Some(now + MAX_STAGE_INTERVAL));

        let due = now + MAX_STAGE_INTERVAL;
        engine.on_light_tick(due);
        assert_eq!(engine.target().lit_lights(), vec![4, 5, 6]);
        assert_eq!(engine.next_light_tick(), Some(due + MAX_STAGE_INTERVAL));
    }
}
