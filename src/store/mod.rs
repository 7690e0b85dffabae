//! Shared game store.
//!
//! The store is the only place game state lives between requests. Handlers
//! never hold it across calls; they read a [`GameSnapshot`], then write back
//! through [`GameStore::put`] or a conditional [`GameStore::update`], both of
//! which are atomic per game.

mod error;
mod memory;
mod models;
mod schema; // Diesel generated schema - internal use only
mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::{MIGRATIONS, SqliteStore};

use crate::game::{Address, Game, GameError, PlayerId, RoundRecord};
use crate::rules::Play;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use derive_getters::Getters;
use derive_new::new;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Retention window applied on creation and on every round advance.
pub const DEFAULT_TTL_DAYS: i64 = 30;

/// Returns the default retention window.
pub fn default_ttl() -> Duration {
    Duration::days(DEFAULT_TTL_DAYS)
}

/// A game as persisted, with its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// The game state.
    game: Game,
    /// When the store may drop the record.
    expires_at: DateTime<Utc>,
}

impl GameSnapshot {
    /// Wraps `game` with an expiry `ttl` from now.
    pub fn fresh(game: Game, ttl: Duration) -> Self {
        Self::new(game, Utc::now() + ttl)
    }

    /// Returns true if the record has outlived its retention window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Consumes the snapshot, returning the game.
    pub fn into_game(self) -> Game {
        self.game
    }

    /// Evaluates `condition` and applies `mutation` to a copy.
    ///
    /// Returns `None` if the condition does not hold or the mutation is
    /// rejected by the model, in which case nothing may be written. A round
    /// advance refreshes the expiry.
    #[instrument(skip(self), fields(game_id = %self.game.id()))]
    pub fn updated(
        &self,
        condition: &Condition,
        mutation: &Mutation,
        ttl: Duration,
    ) -> Option<Self> {
        if !condition.holds(&self.game) {
            debug!("Condition failed");
            return None;
        }

        let mut next = self.clone();
        if let Err(e) = mutation.apply(&mut next.game) {
            debug!(error = %e, "Mutation rejected");
            return None;
        }
        if matches!(mutation, Mutation::AdvanceRound(_)) {
            next.expires_at = Utc::now() + ttl;
        }
        Some(next)
    }
}

/// Precondition for a conditional update. Every check that is set must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition {
    round: Option<u32>,
    play_count: Option<u8>,
    not_played_by: Option<PlayerId>,
    slot_open_for: Option<PlayerId>,
}

impl Condition {
    /// A condition with no checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// The game's current round equals `round`.
    pub fn round_is(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    /// Exactly `count` plays are recorded for the current round.
    pub fn play_count_is(mut self, count: u8) -> Self {
        self.play_count = Some(count);
        self
    }

    /// `player_id` is a member with no play recorded for the current round.
    pub fn not_played_by(mut self, player_id: impl Into<PlayerId>) -> Self {
        self.not_played_by = Some(player_id.into());
        self
    }

    /// `player_id` already holds a slot, or a slot is still free.
    pub fn slot_open_for(mut self, player_id: impl Into<PlayerId>) -> Self {
        self.slot_open_for = Some(player_id.into());
        self
    }

    /// Checks the condition against `game`.
    pub fn holds(&self, game: &Game) -> bool {
        if self.round.is_some_and(|round| round != *game.round()) {
            return false;
        }
        if self.play_count.is_some_and(|count| count != *game.play_count()) {
            return false;
        }
        if let Some(player_id) = &self.not_played_by {
            match game.player(player_id) {
                Some(player) if !player.has_played(*game.round()) => {}
                _ => return false,
            }
        }
        if let Some(player_id) = &self.slot_open_for
            && game.player(player_id).is_none()
            && game.is_full()
        {
            return false;
        }
        true
    }
}

/// A change applied atomically by [`GameStore::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Assign a slot or refresh the member's address.
    AssignSlot {
        /// Joining player.
        player_id: PlayerId,
        /// Delivery address.
        address: Address,
    },
    /// Record a play for the current round and bump the play count.
    RecordPlay {
        /// Submitting player.
        player_id: PlayerId,
        /// The play.
        play: Play,
    },
    /// Score a resolved round and advance to the next one.
    AdvanceRound(RoundRecord),
}

impl Mutation {
    /// Applies the mutation to `game` through the model.
    ///
    /// # Errors
    ///
    /// Whatever the model rejects; `game` may be partially modified, so
    /// callers apply mutations to a copy.
    pub fn apply(&self, game: &mut Game) -> Result<(), GameError> {
        match self {
            Mutation::AssignSlot { player_id, address } => {
                game.assign_slot(player_id, address.clone()).map(|_| ())
            }
            Mutation::RecordPlay { player_id, play } => {
                let round = *game.round();
                game.record_play(player_id, *play, round)
            }
            Mutation::AdvanceRound(record) => game.apply_round(record),
        }
    }
}

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The condition held; carries the new state.
    Applied(GameSnapshot),
    /// The condition did not hold (or the game is gone). Nothing changed.
    ConditionFailed,
}

/// Read / replace / conditional-update access to game records.
///
/// Every operation is atomic for a single game. Implementations never retry
/// on their own; errors are returned as [`StoreError`].
#[async_trait]
pub trait GameStore: Send + Sync + std::fmt::Debug {
    /// Loads a game. Expired records read as `None`.
    async fn get(&self, game_id: &str) -> Result<Option<GameSnapshot>, StoreError>;

    /// Replaces the whole record, refreshing its expiry.
    async fn put(&self, game: &Game) -> Result<GameSnapshot, StoreError>;

    /// Applies `mutation` only if `condition` holds on the stored game.
    async fn update(
        &self,
        game_id: &str,
        condition: &Condition,
        mutation: &Mutation,
    ) -> Result<UpdateOutcome, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game() -> Game {
        let mut game = Game::new("COND1".to_string());
        game.assign_slot("a", "conn-a".to_string()).unwrap();
        game.assign_slot("b", "conn-b".to_string()).unwrap();
        game
    }

    #[test]
    fn test_empty_condition_holds() {
        assert!(Condition::new().holds(&game()));
    }

    #[test]
    fn test_round_condition() {
        let game = game();
        assert!(Condition::new().round_is(1).holds(&game));
        assert!(!Condition::new().round_is(2).holds(&game));
    }

    #[test]
    fn test_not_played_by_condition() {
        let mut game = game();
        let condition = Condition::new().round_is(1).not_played_by("a");
        assert!(condition.holds(&game));
        game.record_play("a", Play::Rock, 1).unwrap();
        assert!(!condition.holds(&game));
        assert!(Condition::new().not_played_by("b").holds(&game));
        assert!(!Condition::new().not_played_by("nobody").holds(&game));
    }

    #[test]
    fn test_slot_open_condition() {
        let game = game();
        assert!(Condition::new().slot_open_for("a").holds(&game));
        assert!(!Condition::new().slot_open_for("c").holds(&game));
    }

    #[test]
    fn test_failed_condition_leaves_snapshot_alone() {
        let snapshot = GameSnapshot::fresh(game(), default_ttl());
        let mutation = Mutation::RecordPlay {
            player_id: "a".to_string(),
            play: Play::Spock,
        };
        assert!(
            snapshot
                .updated(&Condition::new().round_is(7), &mutation, default_ttl())
                .is_none()
        );
        let next = snapshot
            .updated(&Condition::new().round_is(1), &mutation, default_ttl())
            .unwrap();
        assert_eq!(*next.game().play_count(), 1);
        assert_eq!(*snapshot.game().play_count(), 0);
    }

    #[test]
    fn test_expiry() {
        let snapshot = GameSnapshot::fresh(game(), Duration::seconds(-1));
        assert!(snapshot.is_expired(Utc::now()));
        let snapshot = GameSnapshot::fresh(game(), default_ttl());
        assert!(!snapshot.is_expired(Utc::now()));
    }
}
