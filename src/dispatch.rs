//! Routes decoded frames to the render engine.

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::event::LecternEvent;
use crate::protocol::LecternMessage;
use crate::render::{RenderEngine, RenderTarget};

/// Characters of a malformed frame included in its warning.
const LOGGED_FRAME_CHARS: usize = 120;

/// Decode `frame` and apply it to `engine`.
///
/// Malformed frames are logged and leave the display untouched; unknown kinds
/// are logged and ignored. Returns the event describing what happened.
pub fn dispatch<T: RenderTarget>(
    frame: &str,
    engine: &mut RenderEngine<T>,
    now: Instant,
) -> LecternEvent {
    match LecternMessage::decode(frame) {
        Ok(LecternMessage::PlayerState(state)) => {
            debug!(
                score = state.score,
                active = state.active,
                buzzed = state.buzzed,
                "rendering player state"
            );
            engine.render_player(&state, now);
            LecternEvent::PlayerStateRendered(state)
        }
        Ok(LecternMessage::NoPlayer) => {
            debug!("rendering no-player state");
            engine.render_no_player();
            LecternEvent::NoPlayerRendered
        }
        Ok(LecternMessage::Unknown { kind }) => {
            debug!(kind = %kind, "ignoring unknown message");
            LecternEvent::UnknownMessage { kind }
        }
        Err(e) => {
            warn!(
                len = frame.len(),
                raw = excerpt(frame),
                "failed to decode lectern frame: {e}"
            );
            LecternEvent::MalformedFrame {
                error: e.to_string(),
            }
        }
    }
}

/// Leading part of `frame` for logs; signature data URIs run to kilobytes.
fn excerpt(frame: &str) -> &str {
    match frame.char_indices().nth(LOGGED_FRAME_CHARS) {
        Some((end, _)) => frame.get(..end).unwrap_or(frame),
        None => frame,
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
    use crate::render::DEFAULT_STAGE_INTERVAL;

    fn engine() -> RenderEngine<DisplayState> {
        RenderEngine::new(DisplayState::default(), DEFAULT_STAGE_INTERVAL)
    }

    #[test]
    fn player_state_frame_renders() {
        let mut engine = engine();
        let frame = r#"{"message":"PLAYER_STATE","text":"{\"name\":\"Alice\",\"score\":1200,\"buzzed\":true}"}"#;
        let event = dispatch(frame, &mut engine, Instant::now());
        assert!(matches!(event, LecternEvent::PlayerStateRendered(ref s) if s.score == 1200));
        assert_eq!(engine.target().name, NameDisplay::Text("Alice".into()));
        assert_eq!(engine.target().score_text, "$1,200");
        assert!(engine.lights_running());
    }

    #[test]
    fn no_player_frame_renders() {
        let mut engine = engine();
        let now = Instant::now();
        dispatch(
            r#"{"message":"PLAYER_STATE","text":"{\"score\":-5,\"buzzed\":true}"}"#,
            &mut engine,
            now,
        );
        let event = dispatch(r#"{"message":"NO_PLAYER"}"#, &mut engine, now);
        assert_eq!(event, LecternEvent::NoPlayerRendered);
        assert_eq!(engine.target().score_text, "$0");
        assert!(!engine.lights_running());
    }

    #[test]
    fn unknown_and_malformed_frames_leave_display_untouched() {
        let mut engine = engine();
        let now = Instant::now();
        dispatch(
            r#"{"message":"PLAYER_STATE","text":"{\"name\":\"Bob\",\"score\":300,\"active\":true}"}"#,
            &mut engine,
            now,
        );
        let before = engine.target().clone();

        let event = dispatch(r#"{"message":"REVEAL"}"#, &mut engine, now);
        assert_eq!(
            event,
            LecternEvent::UnknownMessage {
                kind: "REVEAL".into()
            }
        );

        for bad in [
            "",
            "not json",
            r#"{"message":"PLAYER_STATE","text":"{\"score\":"}"#,
            r#"{"message":"PLAYER_STATE"}"#,
            r#"["PLAYER_STATE"]"#,
        ] {
            let event = dispatch(bad, &mut engine, now);
            assert!(matches!(event, LecternEvent::MalformedFrame { .. }), "{bad}");
        }
        assert_eq!(engine.target(), &before);
    }

    #[test]
    fn malformed_signature_frames_are_logged_as_an_excerpt() {
        let frame = format!(
            r#"{{"message":"PLAYER_STATE","text":"{{\"name\":\"data:image/png;base64,{}"#,
            "é".repeat(20_000)
        );
        let mut engine = engine();
        let event = dispatch(&frame, &mut engine, Instant::now());
        assert!(matches!(event, LecternEvent::MalformedFrame { .. }));

        let logged = excerpt(&frame);
        assert_eq!(logged.chars().count(), LOGGED_FRAME_CHARS);
        assert!(frame.starts_with(logged));
        assert_eq!(excerpt("short"), "short");
    }
}
