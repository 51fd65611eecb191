#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol decoding tests against frames shaped like real game-server output
//! (`json.dumps` style spacing, payload JSON encoded inside `text`).

use lectern_client::protocol::{KIND_NO_PLAYER, KIND_PLAYER_STATE};
use lectern_client::{LecternError, LecternMessage, PlayerName, PlayerState};

// ════════════════════════════════════════════════════════════════════
// Fixtures
// ════════════════════════════════════════════════════════════════════

const SERVER_PLAYER_STATE: &str = r#"{"message": "PLAYER_STATE", "text": "{\"name\": \"Alice\", \"score\": 1200, \"active\": true, \"buzzed\": false}"}"#;

const SERVER_SIGNATURE_STATE: &str = r#"{"message": "PLAYER_STATE", "text": "{\"name\": \"data:image/png;base64,iVBORw0KGgo=\", \"score\": -400, \"active\": false, \"buzzed\": true}"}"#;

const SERVER_NO_PLAYER: &str = r#"{"message": "NO_PLAYER"}"#;

fn decode_state(frame: &str) -> PlayerState {
    match LecternMessage::decode(frame).unwrap() {
        LecternMessage::PlayerState(state) => state,
        other => panic!("expected PlayerState, got {other:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// Server fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn server_player_state_fixture() {
    let state = decode_state(SERVER_PLAYER_STATE);
    assert_eq!(
        state,
        PlayerState {
            name: Some("Alice".into()),
            score: 1200,
            active: true,
            buzzed: false,
        }
    );
    assert_eq!(state.player_name(), PlayerName::Text("Alice"));
}

#[test]
fn server_signature_fixture() {
    let state = decode_state(SERVER_SIGNATURE_STATE);
    assert_eq!(
        state.player_name(),
        PlayerName::Signature("data:image/png;base64,iVBORw0KGgo=")
    );
    assert_eq!(state.score, -400);
    assert!(state.buzzed);
}

#[test]
fn server_no_player_fixture() {
    assert_eq!(
        LecternMessage::decode(SERVER_NO_PLAYER).unwrap(),
        LecternMessage::NoPlayer
    );
}

#[test]
fn partial_payload_uses_defaults() {
    let state = decode_state(r#"{"message": "PLAYER_STATE", "text": "{}"}"#);
    assert_eq!(state, PlayerState::default());
    assert_eq!(state.player_name(), PlayerName::Absent);
}

#[test]
fn extra_fields_are_ignored() {
    let state = decode_state(
        r#"{"message": "PLAYER_STATE", "text": "{\"score\": 5, \"wager\": 100}", "seq": 9}"#,
    );
    assert_eq!(state.score, 5);
}

#[test]
fn encoded_frames_decode_back() {
    let state = PlayerState {
        name: Some("Zoë".into()),
        score: -1_000_000,
        active: true,
        buzzed: true,
    };
    let frame = LecternMessage::PlayerState(state.clone()).to_frame().unwrap();
    assert!(frame.contains(KIND_PLAYER_STATE));
    assert_eq!(decode_state(&frame), state);

    let frame = LecternMessage::NoPlayer.to_frame().unwrap();
    assert!(frame.contains(KIND_NO_PLAYER));
}

#[test]
fn score_out_of_range_is_rejected() {
    let err = LecternMessage::decode(
        r#"{"message": "PLAYER_STATE", "text": "{\"score\": 1e300}"}"#,
    )
    .unwrap_err();
    assert!(matches!(err, LecternError::Serialization(_)));
}
