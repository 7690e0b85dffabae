//! Wire messages exchanged with clients.

use crate::game::{GameId, PlayerId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a client asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Action {
    /// Create a game and take its first slot.
    New,
    /// Take (or reclaim) a slot in an existing game.
    Join,
    /// Submit a move for a round.
    Play,
}

/// Inbound message: `{action, gameId, playerId, move, round}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMessage {
    /// `"new"`, `"join"` or `"play"`, any case.
    pub action: String,
    /// Target game; ignored for `new`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<GameId>,
    /// Persistent player identity.
    #[serde(alias = "userId")]
    pub player_id: PlayerId,
    /// Move name for `play`.
    #[serde(rename = "move", alias = "play", default, skip_serializing_if = "Option::is_none")]
    pub play: Option<String>,
    /// Round the move is meant for.
    #[serde(default)]
    pub round: u32,
}

impl PlayerMessage {
    /// Parses the action field.
    pub fn parsed_action(&self) -> Option<Action> {
        Action::from_str(self.action.trim()).ok()
    }

    /// Builds a `new` message.
    pub fn new_game(player_id: impl Into<PlayerId>) -> Self {
        Self {
            action: Action::New.to_string(),
            game_id: None,
            player_id: player_id.into(),
            play: None,
            round: 0,
        }
    }

    /// Builds a `join` message.
    pub fn join(game_id: impl Into<GameId>, player_id: impl Into<PlayerId>) -> Self {
        Self {
            action: Action::Join.to_string(),
            game_id: Some(game_id.into()),
            player_id: player_id.into(),
            play: None,
            round: 0,
        }
    }

    /// Builds a `play` message.
    pub fn play(
        game_id: impl Into<GameId>,
        player_id: impl Into<PlayerId>,
        play: impl Into<String>,
        round: u32,
    ) -> Self {
        Self {
            action: Action::Play.to_string(),
            game_id: Some(game_id.into()),
            player_id: player_id.into(),
            play: Some(play.into()),
            round,
        }
    }
}

/// Sent to the submitting client only when its request is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    /// Human-readable reason.
    pub error: String,
    /// Machine-readable reason, e.g. `"stale_round"`.
    pub kind: String,
    /// Game the request targeted, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<GameId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_play_message() {
        let raw = r#"{"action":"PLAY","gameId":"AB12C","playerId":"p1","move":"Rock","round":3}"#;
        let message: PlayerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.parsed_action(), Some(Action::Play));
        assert_eq!(message.game_id.as_deref(), Some("AB12C"));
        assert_eq!(message.play.as_deref(), Some("Rock"));
        assert_eq!(message.round, 3);
    }

    #[test]
    fn test_parse_new_message_with_aliases() {
        let raw = r#"{"action":"new","userId":"p1"}"#;
        let message: PlayerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.parsed_action(), Some(Action::New));
        assert_eq!(message.player_id, "p1");
        assert_eq!(message.round, 0);
    }

    #[test]
    fn test_unknown_action() {
        let message = PlayerMessage {
            action: "surrender".to_string(),
            ..PlayerMessage::new_game("p1")
        };
        assert_eq!(message.parsed_action(), None);
    }
}
