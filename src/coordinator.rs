//! Per-round state machine.
//!
//! ```text
//! Empty --first play--> OneSubmitted --second play--> Complete --score--> Empty (round + 1)
//! ```
//!
//! A second play by the same player is rejected with
//! [`GameError::AlreadyPlayed`] and the phase does not change. There is no
//! terminal phase.

use crate::game::{Address, Game, GameError, PlayerId, RoundRecord, SlotAssignment};
use crate::rules::Play;
use tracing::{debug, instrument};

/// Where the current round stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundPhase {
    /// No plays recorded.
    Empty,
    /// One player has played and the other has not.
    OneSubmitted {
        /// The player who played.
        by: PlayerId,
    },
    /// Both plays recorded; scoring is due.
    Complete,
}

impl RoundPhase {
    /// Derives the phase from a game's current round.
    pub fn of(game: &Game) -> Self {
        match game.play_count() {
            0 => RoundPhase::Empty,
            1 => game
                .players()
                .values()
                .find(|p| p.has_played(*game.round()))
                .map(|p| RoundPhase::OneSubmitted { by: p.id().clone() })
                .unwrap_or(RoundPhase::Empty),
            _ => RoundPhase::Complete,
        }
    }
}

/// What a successful play did to the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    /// The play was recorded; waiting for the opponent.
    Pending {
        /// Round the play was recorded for.
        round: u32,
    },
    /// The play completed the round, which has been scored and advanced.
    Resolved(RoundRecord),
}

/// Drives slot assignment and play submission against an in-memory [`Game`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnCoordinator;

impl TurnCoordinator {
    /// Puts a player into the game (or refreshes its address).
    ///
    /// # Errors
    ///
    /// [`GameError::GameFull`] for a third identity.
    #[instrument(skip(game, address), fields(game_id = %game.id()))]
    pub fn join(
        game: &mut Game,
        player_id: &str,
        address: Address,
    ) -> Result<SlotAssignment, GameError> {
        game.assign_slot(player_id, address)
    }

    /// Records a play and, if it completes the round, scores and advances it.
    ///
    /// # Errors
    ///
    /// Any rejection from [`Game::record_play`]; the game is untouched.
    #[instrument(skip(game), fields(game_id = %game.id()))]
    pub fn play(
        game: &mut Game,
        player_id: &str,
        play: Play,
        round: u32,
    ) -> Result<Turn, GameError> {
        game.record_play(player_id, play, round)?;

        match RoundPhase::of(game) {
            RoundPhase::Complete => {
                let record = game.score_round()?;
                game.apply_round(&record)?;
                Ok(Turn::Resolved(record))
            }
            phase => {
                debug!(?phase, "Waiting for opponent");
                Ok(Turn::Pending { round })
            }
        }
    }

    /// Parses a raw move and plays it.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidMove`] for an unknown move, otherwise as
    /// [`TurnCoordinator::play`].
    pub fn submit(
        game: &mut Game,
        player_id: &str,
        raw_move: &str,
        round: u32,
    ) -> Result<Turn, GameError> {
        let play =
            Play::parse(raw_move).ok_or_else(|| GameError::InvalidMove(raw_move.to_string()))?;
        Self::play(game, player_id, play, round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game() -> Game {
        let mut game = Game::new("RPS01".to_string());
        TurnCoordinator::join(&mut game, "a", "conn-a".to_string()).unwrap();
        TurnCoordinator::join(&mut game, "b", "conn-b".to_string()).unwrap();
        game
    }

    #[test]
    fn test_phase_progression() {
        let mut game = game();
        assert_eq!(RoundPhase::of(&game), RoundPhase::Empty);

        let turn = TurnCoordinator::submit(&mut game, "a", "rock", 1).unwrap();
        assert_eq!(turn, Turn::Pending { round: 1 });
        assert_eq!(
            RoundPhase::of(&game),
            RoundPhase::OneSubmitted { by: "a".to_string() }
        );
        assert_eq!(*game.round(), 1);
        assert_eq!(*game.play_count(), 1);

        let turn = TurnCoordinator::submit(&mut game, "b", "scissors", 1).unwrap();
        let Turn::Resolved(record) = turn else {
            panic!("second play should resolve the round");
        };
        assert_eq!(record.winner(), &Some("a".to_string()));
        assert_eq!(record.verb(), "smashes");
        assert_eq!(RoundPhase::of(&game), RoundPhase::Empty);
        assert_eq!(*game.round(), 2);
    }

    #[test]
    fn test_same_player_cannot_complete_round() {
        let mut game = game();
        TurnCoordinator::submit(&mut game, "a", "rock", 1).unwrap();
        let result = TurnCoordinator::submit(&mut game, "a", "paper", 1);
        assert_eq!(result, Err(GameError::AlreadyPlayed { round: 1 }));
        assert_eq!(
            RoundPhase::of(&game),
            RoundPhase::OneSubmitted { by: "a".to_string() }
        );
    }

    #[test]
    fn test_tie_advances_without_scoring() {
        let mut game = game();
        TurnCoordinator::submit(&mut game, "a", "rock", 1).unwrap();
        let Turn::Resolved(record) = TurnCoordinator::submit(&mut game, "b", "rock", 1).unwrap()
        else {
            panic!("expected resolution");
        };
        assert!(record.is_tie());
        assert_eq!(record.summary(), "Both played rock, tie");
        assert_eq!(*game.round(), 2);
        assert_eq!(*game.player("a").unwrap().score(), 0);
        assert_eq!(*game.player("b").unwrap().score(), 0);
    }

    #[test]
    fn test_rounds_continue_indefinitely() {
        let mut game = game();
        for round in 1..=5 {
            TurnCoordinator::submit(&mut game, "a", "paper", round).unwrap();
            TurnCoordinator::submit(&mut game, "b", "rock", round).unwrap();
        }
        assert_eq!(*game.round(), 6);
        assert_eq!(*game.player("a").unwrap().score(), 5);
        assert!(*game.player("a").unwrap().won_last_round());
    }
}
