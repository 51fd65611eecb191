//! Wire types for the lectern socket.
//!
//! The server sends JSON text frames shaped as an envelope:
//!
//! ```json
//! { "message": "PLAYER_STATE", "text": "{\"name\":\"Alice\",\"score\":400}" }
//! { "message": "NO_PLAYER" }
//! ```
//!
//! The `PLAYER_STATE` payload is itself JSON encoded into the `text` string.
//! An inline object is accepted as well.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{LecternError, Result};

/// Envelope kind carrying a [`PlayerState`] payload.
pub const KIND_PLAYER_STATE: &str = "PLAYER_STATE";

/// Envelope kind announcing that no player is assigned to this lectern.
pub const KIND_NO_PLAYER: &str = "NO_PLAYER";

/// Prefix that marks a player name as a captured signature image.
pub const SIGNATURE_PREFIX: &str = "data:image/png;base64";

/// Per-player state pushed by the server. Not retained between frames.
///
/// Every field is optional on the wire; `null` decodes the same as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Display name, or a PNG data URI of the player's signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Current score; negative scores are valid.
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: i64,
    /// The player may answer / is the answering player.
    #[serde(default, deserialize_with = "null_as_default")]
    pub active: bool,
    /// The player has buzzed in.
    #[serde(default, deserialize_with = "null_as_default")]
    pub buzzed: bool,
}

impl PlayerState {
    /// Classify the name field for rendering.
    pub fn player_name(&self) -> PlayerName<'_> {
        PlayerName::classify(self.name.as_deref())
    }
}

/// How a player name should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerName<'a> {
    /// No name (missing, `null` or empty).
    Absent,
    /// Plain display text.
    Text(&'a str),
    /// A signature image; the value is the full data URI.
    Signature(&'a str),
}

impl<'a> PlayerName<'a> {
    /// Classify a raw name value.
    pub fn classify(name: Option<&'a str>) -> Self {
        match name {
            None | Some("") => Self::Absent,
            Some(uri) if uri.starts_with(SIGNATURE_PREFIX) => Self::Signature(uri),
            Some(text) => Self::Text(text),
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LecternMessage {
    /// New state for the player this lectern represents.
    PlayerState(PlayerState),
    /// No player is assigned to this lectern.
    NoPlayer,
    /// A kind this client does not understand.
    Unknown {
        /// The raw `message` field.
        kind: String,
    },
}

#[derive(Deserialize)]
struct Envelope {
    message: String,
    #[serde(default)]
    text: Option<serde_json::Value>,
}

impl LecternMessage {
    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`LecternError::Serialization`] if the envelope or the
    /// `PLAYER_STATE` payload is not valid JSON of the expected shape, and
    /// [`LecternError::MissingPayload`] if a `PLAYER_STATE` frame has no
    /// `text`.
    pub fn decode(frame: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        match envelope.message.as_str() {
            KIND_PLAYER_STATE => {
                let state = match envelope.text {
                    None | Some(serde_json::Value::Null) => {
                        return Err(LecternError::MissingPayload)
                    }
                    Some(serde_json::Value::String(encoded)) => serde_json::from_str(&encoded)?,
                    Some(inline) => serde_json::from_value(inline)?,
                };
                Ok(Self::PlayerState(state))
            }
            KIND_NO_PLAYER => Ok(Self::NoPlayer),
            _ => Ok(Self::Unknown {
                kind: envelope.message,
            }),
        }
    }

    /// Encode as a server would send it, with the payload JSON-in-a-string.
    ///
    /// # Errors
    ///
    /// Returns [`LecternError::Serialization`] if encoding fails.
    pub fn to_frame(&self) -> Result<String> {
        let value = match self {
            Self::PlayerState(state) => serde_json::json!({
                "message": KIND_PLAYER_STATE,
                "text": serde_json::to_string(state)?
            }),
            Self::NoPlayer => serde_json::json!({ "message": KIND_NO_PLAYER }),
            Self::Unknown { kind } => serde_json::json!({ "message": kind }),
        };
        Ok(value.to_string())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
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
    fn signature_prefix_is_21_chars() {
        assert_eq!(SIGNATURE_PREFIX.len(), 21);
    }

    #[test]
    fn classify_names() {
        assert_eq!(
            PlayerName::classify(Some("data:image/png;base64,AAAA")),
            PlayerName::Signature("data:image/png;base64,AAAA")
        );
        assert_eq!(PlayerName::classify(Some("Alice")), PlayerName::Text("Alice"));
        assert_eq!(PlayerName::classify(None), PlayerName::Absent);
        assert_eq!(PlayerName::classify(Some("")), PlayerName::Absent);
        // Prefix must match exactly, not just start with "data:".
        assert_eq!(
            PlayerName::classify(Some("data:image/jpeg;base64,AAAA")),
            PlayerName::Text("data:image/jpeg;base64,AAAA")
        );
    }

    #[test]
    fn player_state_defaults_missing_and_null_fields() {
        let state: PlayerState =
            serde_json::from_str(r#"{"name":null,"score":null,"buzzed":true}"#).unwrap();
        assert_eq!(
            state,
            PlayerState {
                name: None,
                score: 0,
                active: false,
                buzzed: true,
            }
        );
    }

    #[test]
    fn decode_player_state_from_encoded_text() {
        let frame = r#"{"message":"PLAYER_STATE","text":"{\"name\":\"Alice\",\"score\":-500,\"active\":true}"}"#;
        let LecternMessage::PlayerState(state) = LecternMessage::decode(frame).unwrap() else {
            panic!("expected PlayerState");
        };
        assert_eq!(state.name.as_deref(), Some("Alice"));
        assert_eq!(state.score, -500);
        assert!(state.active);
        assert!(!state.buzzed);
    }

    #[test]
    fn decode_player_state_from_inline_object() {
        let frame = r#"{"message":"PLAYER_STATE","text":{"score":1000000}}"#;
        let msg = LecternMessage::decode(frame).unwrap();
        assert_eq!(
            msg,
            LecternMessage::PlayerState(PlayerState {
                score: 1_000_000,
                ..PlayerState::default()
            })
        );
    }

    #[test]
    fn decode_no_player_ignores_text() {
        let msg = LecternMessage::decode(r#"{"message":"NO_PLAYER","text":"whatever"}"#).unwrap();
        assert_eq!(msg, LecternMessage::NoPlayer);
    }

    #[test]
    fn decode_unknown_kind() {
        let msg = LecternMessage::decode(r#"{"message":"BUZZER_TEST"}"#).unwrap();
        assert_eq!(
            msg,
            LecternMessage::Unknown {
                kind: "BUZZER_TEST".into()
            }
        );
    }

    #[test]
    fn decode_rejects_malformed_envelope() {
        let err = LecternMessage::decode("{not json").unwrap_err();
        assert!(matches!(err, LecternError::Serialization(_)));
        let err = LecternMessage::decode(r#"{"text":"{}"}"#).unwrap_err();
        assert!(matches!(err, LecternError::Serialization(_)));
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let err = LecternMessage::decode(r#"{"message":"PLAYER_STATE","text":"{oops"}"#)
            .unwrap_err();
        assert!(matches!(err, LecternError::Serialization(_)));
        let err = LecternMessage::decode(r#"{"message":"PLAYER_STATE","text":"{\"score\":\"lots\"}"}"#)
            .unwrap_err();
        assert!(matches!(err, LecternError::Serialization(_)));
    }

    #[test]
    fn decode_rejects_missing_payload() {
        let err = LecternMessage::decode(r#"{"message":"PLAYER_STATE"}"#).unwrap_err();
        assert!(matches!(err, LecternError::MissingPayload));
    }

    #[test]
    fn to_frame_matches_server_shape() {
        let frame = LecternMessage::PlayerState(PlayerState {
            name: Some("Bob".into()),
            score: 200,
            active: false,
            buzzed: true,
        })
        .to_frame()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["message"], "PLAYER_STATE");
        assert!(value["text"].is_string());
        assert_eq!(
            LecternMessage::NoPlayer.to_frame().unwrap(),
            r#"{"message":"NO_PLAYER"}"#
        );
    }
}
