//! Race-free play submission against a shared [`GameStore`].
//!
//! Submissions for the same game may be handled by independent processes
//! with nothing in common but the store. Every write is a conditional
//! update keyed on the round number and the submitter's play slot:
//!
//! 1. **First mover**: `round == r && play_count == 0 && submitter has not
//!    played` → record the play. Done; nothing is scored.
//! 2. **Second mover**: the first write fails because the opponent got
//!    there first. The submitter re-reads, scores the round from the stored
//!    opponent play plus its own, and writes the advance under
//!    `round == r && play_count == 1 && submitter has not played`.
//!
//! Both writes require the round to be unchanged, and the advance bumps it,
//! so at most one advance per round can succeed: the round is scored exactly
//! once no matter how submissions interleave. Stale rounds and repeat plays
//! are rejected after a re-read, with nothing written.

use crate::coordinator::{RoundPhase, Turn, TurnCoordinator};
use crate::game::{GameError, GameId, RoundRecord};
use crate::rules::Play;
use crate::store::{Condition, GameSnapshot, GameStore, Mutation, StoreError, UpdateOutcome};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Default number of read/write cycles before giving up on a contended round.
pub const DEFAULT_RESOLVE_ATTEMPTS: usize = 3;

/// Fewest read/write cycles that still let the loser of the first-write
/// race re-read and resolve the round.
pub const MIN_RESOLVE_ATTEMPTS: usize = 2;

/// Tagged result of an accepted play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// First mover: the play is recorded and the round awaits the opponent.
    Pending {
        /// Round the play was recorded for.
        round: u32,
        /// Game state after the write.
        snapshot: GameSnapshot,
    },
    /// Second mover: the round was scored and advanced by this caller, which
    /// is now solely responsible for announcing it.
    Resolved {
        /// The scored round.
        record: RoundRecord,
        /// Game state after the advance.
        snapshot: GameSnapshot,
    },
}

/// Why a submission was not accepted.
#[derive(Debug, Clone, derive_more::Display)]
pub enum ProtocolError {
    /// The submission broke a game rule. Nothing was written.
    #[display("{}", _0)]
    Rejected(GameError),

    /// No live game with this id.
    #[display("Game '{}' not found", _0)]
    GameNotFound(GameId),

    /// Store failure; the play may or may not have been recorded.
    #[display("{}", _0)]
    Store(StoreError),

    /// Conditional writes kept failing without a classifiable reason.
    #[display("Round {} of game '{}' still contended after {} attempts", round, game_id, attempts)]
    Contention {
        /// Game id.
        game_id: GameId,
        /// Round being submitted for.
        round: u32,
        /// Attempts made.
        attempts: usize,
    },
}

impl std::error::Error for ProtocolError {}

impl From<GameError> for ProtocolError {
    fn from(err: GameError) -> Self {
        Self::Rejected(err)
    }
}

impl From<StoreError> for ProtocolError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl ProtocolError {
    /// True for infrastructure failures. The caller must re-read the game
    /// before submitting again, never blindly retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Contention { .. })
    }
}

/// Submits plays through conditional store updates.
#[derive(Debug, Clone)]
pub struct Resolver {
    store: Arc<dyn GameStore>,
    max_attempts: usize,
}

impl Resolver {
    /// Creates a resolver over `store`.
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_RESOLVE_ATTEMPTS,
        }
    }

    /// Sets how many read/write cycles to attempt, never fewer than
    /// [`MIN_RESOLVE_ATTEMPTS`].
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(MIN_RESOLVE_ATTEMPTS);
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Submits `raw_move` by `player_id` for `round` of `game_id`.
    ///
    /// # Errors
    ///
    /// * [`ProtocolError::Rejected`] with [`GameError::InvalidMove`] before
    ///   the store is touched, or with `NotAMember`, `StaleRound` or
    ///   `AlreadyPlayed` after reading it.
    /// * [`ProtocolError::GameNotFound`] if the game does not exist.
    /// * [`ProtocolError::Store`] on store failure, without retrying.
    #[instrument(skip(self))]
    pub async fn submit(
        &self,
        game_id: &str,
        player_id: &str,
        raw_move: &str,
        round: u32,
    ) -> Result<Acceptance, ProtocolError> {
        let play =
            Play::parse(raw_move).ok_or_else(|| GameError::InvalidMove(raw_move.to_string()))?;

        for attempt in 1..=self.max_attempts {
            let snapshot = self
                .store
                .get(game_id)
                .await?
                .ok_or_else(|| ProtocolError::GameNotFound(game_id.to_string()))?;
            let game = snapshot.game();

            if let Err(e) = game.check_submission(player_id, round) {
                warn!(error = %e, "Submission rejected");
                return Err(e.into());
            }

            let phase = RoundPhase::of(game);
            debug!(attempt, ?phase, "Attempting conditional write");

            let accepted = match phase {
                RoundPhase::Empty => self.record_first(game_id, player_id, play, round).await?,
                RoundPhase::OneSubmitted { .. } => {
                    self.resolve_second(&snapshot, player_id, play, round).await?
                }
                RoundPhase::Complete => None,
            };

            if let Some(acceptance) = accepted {
                return Ok(acceptance);
            }
            debug!(attempt, "Condition failed, re-reading");
        }

        warn!(attempts = self.max_attempts, "Giving up on contended round");
        Err(ProtocolError::Contention {
            game_id: game_id.to_string(),
            round,
            attempts: self.max_attempts,
        })
    }

    /// First-mover write. `None` if someone else changed the round first.
    async fn record_first(
        &self,
        game_id: &str,
        player_id: &str,
        play: Play,
        round: u32,
    ) -> Result<Option<Acceptance>, StoreError> {
        let condition = Condition::new()
            .round_is(round)
            .play_count_is(0)
            .not_played_by(player_id);
        let mutation = Mutation::RecordPlay {
            player_id: player_id.to_string(),
            play,
        };

        match self.store.update(game_id, &condition, &mutation).await? {
            UpdateOutcome::Applied(snapshot) => {
                info!(game_id, player_id, round, "First play recorded");
                Ok(Some(Acceptance::Pending { round, snapshot }))
            }
            UpdateOutcome::ConditionFailed => Ok(None),
        }
    }

    /// Second-mover scoring and advance. `None` if the round moved on.
    async fn resolve_second(
        &self,
        snapshot: &GameSnapshot,
        player_id: &str,
        play: Play,
        round: u32,
    ) -> Result<Option<Acceptance>, ProtocolError> {
        let game_id = snapshot.game().id();
        let mut scratch = snapshot.game().clone();
        let record = match TurnCoordinator::play(&mut scratch, player_id, play, round)? {
            Turn::Resolved(record) => record,
            Turn::Pending { .. } => return Ok(None),
        };

        let condition = Condition::new()
            .round_is(round)
            .play_count_is(1)
            .not_played_by(player_id);
        let mutation = Mutation::AdvanceRound(record.clone());

        match self.store.update(game_id, &condition, &mutation).await? {
            UpdateOutcome::Applied(snapshot) => {
                info!(
                    game_id = %game_id,
                    player_id,
                    round,
                    summary = %record.summary(),
                    "Round resolved by second mover"
                );
                Ok(Some(Acceptance::Resolved { record, snapshot }))
            }
            UpdateOutcome::ConditionFailed => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Game;
    use crate::store::MemoryStore;

    async fn setup() -> Resolver {
        let store = MemoryStore::new();
        let mut game = Game::new("PROTO".to_string());
        game.assign_slot("a", "conn-a".to_string()).unwrap();
        game.assign_slot("b", "conn-b".to_string()).unwrap();
        store.put(&game).await.unwrap();
        Resolver::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_invalid_move_never_reads_store() {
        let resolver = Resolver::new(Arc::new(MemoryStore::new()));
        let result = resolver.submit("MISSING", "a", "banana", 1).await;
        assert!(matches!(
            result,
            Err(ProtocolError::Rejected(GameError::InvalidMove(_)))
        ));
    }

    #[tokio::test]
    async fn test_unknown_game() {
        let resolver = Resolver::new(Arc::new(MemoryStore::new()));
        let result = resolver.submit("MISSING", "a", "rock", 1).await;
        assert!(matches!(result, Err(ProtocolError::GameNotFound(_))));
    }

    #[tokio::test]
    async fn test_first_then_second_mover() {
        let resolver = setup().await;
        let first = resolver.submit("PROTO", "a", "rock", 1).await.unwrap();
        assert!(matches!(first, Acceptance::Pending { round: 1, .. }));

        let second = resolver.submit("PROTO", "b", "scissors", 1).await.unwrap();
        let Acceptance::Resolved { record, snapshot } = second else {
            panic!("second play should resolve");
        };
        assert_eq!(record.winner(), &Some("a".to_string()));
        assert_eq!(*snapshot.game().round(), 2);
        assert_eq!(*snapshot.game().play_count(), 0);
    }

    #[tokio::test]
    async fn test_repeat_play_rejected() {
        let resolver = setup().await;
        resolver.submit("PROTO", "a", "rock", 1).await.unwrap();
        let result = resolver.submit("PROTO", "a", "rock", 1).await;
        assert!(matches!(
            result,
            Err(ProtocolError::Rejected(GameError::AlreadyPlayed { round: 1 }))
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ProtocolError::Store(StoreError::new("boom")).is_retryable());
        assert!(!ProtocolError::Rejected(GameError::GameFull).is_retryable());
    }
}
