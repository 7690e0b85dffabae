//! Game and player model.
//!
//! A [`Game`] owns its players, keyed by identity. Players never hold a
//! reference back to the game; the game id travels alongside them instead.

use crate::rules::{Outcome, Play};
use derive_getters::Getters;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Identifier of a game (short random token).
pub type GameId = String;

/// Identifier of a player, as supplied by the transport.
pub type PlayerId = String;

/// Volatile delivery address for a player (e.g. a connection id).
pub type Address = String;

/// Number of players in a full game.
pub const MAX_PLAYERS: usize = 2;

/// Default length of a generated game id.
pub const GAME_ID_LENGTH: usize = 5;

const GAME_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates a random game id of `len` characters from `0-9A-Z`.
pub fn generate_game_id(len: usize) -> GameId {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| GAME_ID_ALPHABET[rng.random_range(0..GAME_ID_ALPHABET.len())] as char)
        .collect()
}

/// Errors raised when a request violates the game rules.
///
/// None of these mutate state.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum GameError {
    /// The submitted move is not one of the five plays.
    #[display("Invalid move '{}'", _0)]
    InvalidMove(String),

    /// The player does not occupy a slot in the game.
    #[display("Player '{}' is not a member of this game", _0)]
    NotAMember(PlayerId),

    /// Both slots are taken.
    #[display("Unable to assign player, game is already full")]
    GameFull,

    /// The claimed round is not the game's current round.
    #[display("Round {} is stale, game is at round {}", claimed, current)]
    StaleRound {
        /// Round the client submitted for.
        claimed: u32,
        /// Authoritative round.
        current: u32,
    },

    /// The player already has a play recorded for this round.
    #[display("Already played in round {}", round)]
    AlreadyPlayed {
        /// The current round.
        round: u32,
    },

    /// Scoring was requested before both plays were in.
    #[display("Round {} has {} of 2 plays", round, plays)]
    RoundIncomplete {
        /// The current round.
        round: u32,
        /// Plays recorded so far.
        plays: u8,
    },
}

impl std::error::Error for GameError {}

impl GameError {
    /// Short machine-readable name, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            GameError::InvalidMove(_) => "invalid_move",
            GameError::NotAMember(_) => "not_a_member",
            GameError::GameFull => "game_full",
            GameError::StaleRound { .. } => "stale_round",
            GameError::AlreadyPlayed { .. } => "already_played",
            GameError::RoundIncomplete { .. } => "round_incomplete",
        }
    }
}

/// One of the two player positions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
pub enum Slot {
    /// First player (the game's creator).
    #[display("1")]
    One,
    /// Second player.
    #[display("2")]
    Two,
}

/// Result of a successful slot assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAssignment {
    /// A new player took the slot.
    Joined(Slot),
    /// An existing member reconnected; only the address changed.
    Reconnected(Slot),
}

impl SlotAssignment {
    /// The slot the player occupies.
    pub fn slot(&self) -> Slot {
        match self {
            SlotAssignment::Joined(slot) | SlotAssignment::Reconnected(slot) => *slot,
        }
    }
}

/// A participant in a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Identity supplied by the transport.
    id: PlayerId,
    /// Where notifications are delivered; changes on reconnect.
    address: Address,
    /// Position in the game.
    slot: Slot,
    /// Play recorded for the current round, cleared when the round resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    play: Option<Play>,
    /// Last round this player submitted a play for (0 = never).
    round: u32,
    /// Rounds won.
    score: u32,
    /// Whether this player won the previous round.
    won_last_round: bool,
}

impl Player {
    /// Creates a player who has not played yet.
    #[instrument(skip(id, address), fields(player_id = %id))]
    pub fn new(id: PlayerId, address: Address, slot: Slot) -> Self {
        Self {
            id,
            address,
            slot,
            play: None,
            round: 0,
            score: 0,
            won_last_round: false,
        }
    }

    /// Returns true if a play is recorded for `round`.
    pub fn has_played(&self, round: u32) -> bool {
        self.round >= round
    }
}

/// The resolution of one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    /// Round that was resolved.
    round: u32,
    /// Each player's play.
    plays: BTreeMap<PlayerId, Play>,
    /// Winning player, `None` on a tie.
    winner: Option<PlayerId>,
    /// Verb from the rule engine ("ties" on a tie).
    verb: String,
    /// Human-readable summary, e.g. "rock smashes scissors".
    summary: String,
}

impl RoundRecord {
    /// Returns true if the round was tied.
    pub fn is_tie(&self) -> bool {
        self.winner.is_none()
    }

    /// Returns the play made by `player_id`.
    pub fn play_of(&self, player_id: &str) -> Option<Play> {
        self.plays.get(player_id).copied()
    }

    /// Returns true if `player_id` won the round.
    pub fn won_by(&self, player_id: &str) -> bool {
        self.winner.as_deref() == Some(player_id)
    }
}

/// State of one game: the round counter, the plays recorded for it, and
/// at most two players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    /// Game identifier.
    id: GameId,
    /// Current round, starting at 1.
    round: u32,
    /// Plays recorded for the current round (0..=2).
    play_count: u8,
    /// Players keyed by identity.
    players: BTreeMap<PlayerId, Player>,
    /// Outcome of the previous round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_round: Option<RoundRecord>,
}

impl Game {
    /// Creates an empty game at round 1.
    #[instrument]
    pub fn new(id: GameId) -> Self {
        info!(game_id = %id, "Creating new game");
        Self {
            id,
            round: 1,
            play_count: 0,
            players: BTreeMap::new(),
            last_round: None,
        }
    }

    /// Returns the player with the given identity.
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    /// Returns the player who is not `player_id`.
    pub fn opponent(&self, player_id: &str) -> Option<&Player> {
        self.players.values().find(|p| p.id != player_id)
    }

    /// Returns true once both slots are taken.
    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    /// Players ordered by slot.
    pub fn players_by_slot(&self) -> Vec<&Player> {
        let mut players: Vec<_> = self.players.values().collect();
        players.sort_by_key(|p| p.slot);
        players
    }

    /// Assigns `player_id` to a free slot, or refreshes its address if it
    /// already holds one.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::GameFull`] when a third identity tries to join.
    #[instrument(skip(self, address), fields(game_id = %self.id))]
    pub fn assign_slot(
        &mut self,
        player_id: &str,
        address: Address,
    ) -> Result<SlotAssignment, GameError> {
        if let Some(player) = self.players.get_mut(player_id) {
            debug!(slot = %player.slot, "Player reconnected, updating address");
            player.address = address;
            return Ok(SlotAssignment::Reconnected(player.slot));
        }

        if self.is_full() {
            warn!("Game already has 2 players");
            return Err(GameError::GameFull);
        }

        let slot = if self.players.values().any(|p| p.slot == Slot::One) {
            Slot::Two
        } else {
            Slot::One
        };
        info!(%slot, "Assigning player to slot");
        self.players.insert(
            player_id.to_string(),
            Player::new(player_id.to_string(), address, slot),
        );
        Ok(SlotAssignment::Joined(slot))
    }

    /// Checks whether `player_id` may submit a play for `round`.
    ///
    /// # Errors
    ///
    /// [`GameError::NotAMember`], [`GameError::StaleRound`] or
    /// [`GameError::AlreadyPlayed`], in that order of precedence.
    pub fn check_submission(&self, player_id: &str, round: u32) -> Result<(), GameError> {
        let player = self
            .player(player_id)
            .ok_or_else(|| GameError::NotAMember(player_id.to_string()))?;

        if round != self.round {
            return Err(GameError::StaleRound {
                claimed: round,
                current: self.round,
            });
        }

        if player.has_played(self.round) {
            return Err(GameError::AlreadyPlayed { round: self.round });
        }

        Ok(())
    }

    /// Validates and records a raw move string.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidMove`] before anything else, then the errors of
    /// [`Game::record_play`].
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub fn submit_move(
        &mut self,
        player_id: &str,
        raw_move: &str,
        round: u32,
    ) -> Result<Play, GameError> {
        let play =
            Play::parse(raw_move).ok_or_else(|| GameError::InvalidMove(raw_move.to_string()))?;
        self.record_play(player_id, play, round)?;
        Ok(play)
    }

    /// Records `play` for `player_id` in `round` and bumps the play count.
    ///
    /// # Errors
    ///
    /// See [`Game::check_submission`].
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub fn record_play(&mut self, player_id: &str, play: Play, round: u32) -> Result<(), GameError> {
        self.check_submission(player_id, round)?;

        let current = self.round;
        if let Some(player) = self.players.get_mut(player_id) {
            player.play = Some(play);
            player.round = current;
        }
        self.play_count += 1;
        info!(round = current, play_count = self.play_count, "Play recorded");
        Ok(())
    }

    /// Scores the current round from the recorded plays without mutating.
    ///
    /// # Errors
    ///
    /// [`GameError::RoundIncomplete`] unless both players have played.
    #[instrument(skip(self), fields(game_id = %self.id, round = self.round))]
    pub fn score_round(&self) -> Result<RoundRecord, GameError> {
        let incomplete = GameError::RoundIncomplete {
            round: self.round,
            plays: self.play_count,
        };
        if usize::from(self.play_count) != MAX_PLAYERS {
            return Err(incomplete);
        }

        let players = self.players_by_slot();
        let [first, second] = players.as_slice() else {
            return Err(incomplete);
        };
        let (Some(first_play), Some(second_play)) = (first.play, second.play) else {
            return Err(incomplete);
        };

        let outcome = Outcome::between(first_play, second_play);
        let winner = match outcome {
            Outcome::Tie => None,
            Outcome::FirstWins(_) => Some(first.id.clone()),
            Outcome::SecondWins(_) => Some(second.id.clone()),
        };

        let record = RoundRecord {
            round: self.round,
            plays: BTreeMap::from([
                (first.id.clone(), first_play),
                (second.id.clone(), second_play),
            ]),
            winner,
            verb: outcome.verb().to_string(),
            summary: outcome.summary(first_play, second_play),
        };
        debug!(summary = %record.summary, "Round scored");
        Ok(record)
    }

    /// Applies a scored round: awards the point, advances the round by one,
    /// clears plays and resets the play count.
    ///
    /// # Errors
    ///
    /// [`GameError::StaleRound`] if `record` is for a different round, and
    /// [`GameError::NotAMember`] if it names a player outside the game.
    #[instrument(skip(self, record), fields(game_id = %self.id, round = record.round))]
    pub fn apply_round(&mut self, record: &RoundRecord) -> Result<(), GameError> {
        if record.round != self.round {
            return Err(GameError::StaleRound {
                claimed: record.round,
                current: self.round,
            });
        }
        if let Some(unknown) = record.plays.keys().find(|id| !self.players.contains_key(*id)) {
            return Err(GameError::NotAMember(unknown.clone()));
        }

        for player in self.players.values_mut() {
            let won = record.won_by(&player.id);
            if won {
                player.score += 1;
            }
            player.won_last_round = won;
            player.play = None;
            player.round = record.round;
        }
        self.round += 1;
        self.play_count = 0;
        self.last_round = Some(record.clone());

        info!(
            next_round = self.round,
            winner = ?record.winner,
            summary = %record.summary,
            "Round resolved"
        );
        Ok(())
    }
}
