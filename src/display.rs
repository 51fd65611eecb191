//! In-memory render targets.
//!
//! [`DisplayState`] records what a lectern shows; [`SharedDisplay`] lets the
//! client loop draw on one while another task reads snapshots.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::PlayerName;
use crate::render::{ConnectionStatus, RenderTarget, LIGHT_COUNT, NO_PLAYER_TEXT};

/// Contents of the name region.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NameDisplay {
    /// Nothing shown (placeholder state).
    #[default]
    Empty,
    /// Plain text.
    Text(String),
    /// A signature image by data URI.
    Image(String),
}

/// Everything a lectern currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub name: NameDisplay,
    pub no_player: bool,
    pub score_text: String,
    pub score_negative: bool,
    pub active: bool,
    /// Light `i` is `lights[i - 1]`.
    pub lights: [bool; LIGHT_COUNT as usize],
    pub status: ConnectionStatus,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            name: NameDisplay::Empty,
            no_player: false,
            score_text: "$0".to_string(),
            score_negative: false,
            active: false,
            lights: [false; LIGHT_COUNT as usize],
            status: ConnectionStatus::default(),
        }
    }
}

impl DisplayState {
    /// 1-based indices of the lights that are on.
    pub fn lit_lights(&self) -> Vec<u8> {
        (1..=LIGHT_COUNT)
            .zip(self.lights.iter())
            .filter(|(_, lit)| **lit)
            .map(|(index, _)| index)
            .collect()
    }
}

impl RenderTarget for DisplayState {
    fn set_name(&mut self, name: PlayerName<'_>) {
        self.name = match name {
            PlayerName::Absent => NameDisplay::Empty,
            PlayerName::Text(text) => NameDisplay::Text(text.to_string()),
            PlayerName::Signature(uri) => NameDisplay::Image(uri.to_string()),
        };
    }

    fn set_no_player(&mut self, no_player: bool) {
        self.no_player = no_player;
    }

    fn set_score(&mut self, text: &str, negative: bool) {
        self.score_text.clear();
        self.score_text.push_str(text);
        self.score_negative = negative;
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn set_light(&mut self, index: u8, lit: bool) {
        let slot = usize::from(index)
            .checked_sub(1)
            .and_then(|i| self.lights.get_mut(i));
        if let Some(slot) = slot {
            *slot = lit;
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            NameDisplay::Empty if self.no_player => write!(f, "[{NO_PLAYER_TEXT}]")?,
            NameDisplay::Empty => write!(f, "[ ]")?,
            NameDisplay::Text(text) => write!(f, "[{text}]")?,
            NameDisplay::Image(uri) => write!(f, "[signature, {} bytes]", uri.len())?,
        }
        write!(f, " {}", self.score_text)?;
        if self.active {
            f.write_str(" ACTIVE")?;
        }
        f.write_str(" |")?;
        for lit in self.lights {
            f.write_str(if lit { "*" } else { "." })?;
        }
        f.write_str("| ")?;
        match self.status {
            ConnectionStatus::Connecting => f.write_str("connecting"),
            ConnectionStatus::Connected => f.write_str("connected"),
            ConnectionStatus::Reconnecting { attempt, max } => {
                write!(f, "reconnecting ({attempt}/{max})")
            }
            ConnectionStatus::ConnectionLost => f.write_str("connection lost"),
        }
    }
}

/// A [`DisplayState`] shared between the client loop and observers.
#[derive(Debug, Clone, Default)]
pub struct SharedDisplay(Arc<Mutex<DisplayState>>);

impl SharedDisplay {
    /// A shared display in its initial, connecting state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of what is currently shown.
    pub fn snapshot(&self) -> DisplayState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DisplayState> {
        // A panicked writer cannot leave a display half-updated in a way that
        // matters; keep drawing.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenderTarget for SharedDisplay {
    fn set_name(&mut self, name: PlayerName<'_>) {
        self.lock().set_name(name);
    }

    fn set_no_player(&mut self, no_player: bool) {
        self.lock().set_no_player(no_player);
    }

    fn set_score(&mut self, text: &str, negative: bool) {
        self.lock().set_score(text, negative);
    }

    fn set_active(&mut self, active: bool) {
        self.lock().set_active(active);
    }

    fn set_light(&mut self, index: u8, lit: bool) {
        self.lock().set_light(index, lit);
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.lock().set_status(status);
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
    fn out_of_range_lights_are_ignored() {
        let mut display = DisplayState::default();
        display.set_light(0, true);
        display.set_light(10, true);
        assert!(display.lit_lights().is_empty());
        display.set_light(1, true);
        display.set_light(9, true);
        assert_eq!(display.lit_lights(), vec![1, 9]);
    }

    #[test]
    fn display_line() {
        let mut display = DisplayState::default();
        display.set_name(PlayerName::Text("Alice"));
        display.set_score("-$500", true);
        display.set_active(true);
        display.set_light(5, true);
        display.set_status(ConnectionStatus::Reconnecting { attempt: 2, max: 10 });
        assert_eq!(
            display.to_string(),
            "[Alice] -$500 ACTIVE |....*....| reconnecting (2/10)"
        );

        display.set_name(PlayerName::Absent);
        display.set_no_player(true);
        assert!(display.to_string().starts_with("[No player assigned]"));
    }

    #[test]
    fn shared_display_snapshots_writes() {
        let shared = SharedDisplay::new();
        let mut writer = shared.clone();
        writer.set_score("$1,000", false);
        writer.set_status(ConnectionStatus::Connected);
        let snap = shared.snapshot();
        assert_eq!(snap.score_text, "$1,000");
        assert_eq!(snap.status, ConnectionStatus::Connected);
    }
}
