//! Move resolution for rock, paper, scissors, lizard, spock.
//!
//! Each play beats exactly two others and loses to the remaining two. The
//! relation is a fixed table built at compile time and never mutated.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::instrument;

/// One of the five plays a player may submit.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Play {
    /// Rock.
    Rock,
    /// Paper.
    Paper,
    /// Scissors.
    Scissors,
    /// Lizard.
    Lizard,
    /// Spock.
    Spock,
}

/// Verb reported when both players submit the same play.
pub const TIE_VERB: &str = "ties";

/// Every winning pair, `(winner, loser, verb)`.
///
/// Ten entries: each unordered pair of distinct plays appears exactly once.
pub const BEATS: [(Play, Play, &str); 10] = [
    (Play::Scissors, Play::Paper, "cuts"),
    (Play::Scissors, Play::Lizard, "decapitates"),
    (Play::Paper, Play::Rock, "covers"),
    (Play::Paper, Play::Spock, "disproves"),
    (Play::Rock, Play::Lizard, "crushes"),
    (Play::Rock, Play::Scissors, "smashes"),
    (Play::Lizard, Play::Paper, "eats"),
    (Play::Lizard, Play::Spock, "poisons"),
    (Play::Spock, Play::Scissors, "beams up"),
    (Play::Spock, Play::Rock, "vaporizes"),
];

impl Play {
    /// Parses a submitted play, ignoring case and surrounding whitespace.
    ///
    /// Returns `None` for anything outside the five known plays.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::from_str(&raw.trim().to_lowercase()).ok()
    }

    /// Returns the verb if `self` beats `other`.
    pub fn beats(self, other: Play) -> Option<&'static str> {
        BEATS
            .iter()
            .find(|(winner, loser, _)| *winner == self && *loser == other)
            .map(|(_, _, verb)| *verb)
    }
}

/// Returns true iff `raw` names one of the five plays.
pub fn valid_play(raw: &str) -> bool {
    Play::parse(raw).is_some()
}

/// Resolves `first` against `second`.
///
/// Returns `(true, verb)` when `first` wins, `(false, "ties")` for equal
/// plays, and `(false, "")` when `first` loses. Callers that need the winner
/// check `resolve(b, a)` when this reports no win, or use [`Outcome::between`].
pub fn resolve(first: Play, second: Play) -> (bool, &'static str) {
    if first == second {
        return (false, TIE_VERB);
    }
    match first.beats(second) {
        Some(verb) => (true, verb),
        None => (false, ""),
    }
}

/// Result of one round, relative to the order the plays were given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Both plays were equal.
    Tie,
    /// The first play won.
    FirstWins(&'static str),
    /// The second play won.
    SecondWins(&'static str),
}

impl Outcome {
    /// Computes the outcome of `first` against `second`.
    #[instrument]
    pub fn between(first: Play, second: Play) -> Self {
        if first == second {
            return Outcome::Tie;
        }
        match resolve(first, second) {
            (true, verb) => Outcome::FirstWins(verb),
            // The table covers every distinct pair in one direction.
            _ => Outcome::SecondWins(resolve(second, first).1),
        }
    }

    /// Returns the verb describing the outcome.
    pub fn verb(&self) -> &'static str {
        match self {
            Outcome::Tie => TIE_VERB,
            Outcome::FirstWins(verb) | Outcome::SecondWins(verb) => verb,
        }
    }

    /// Human-readable line such as `"rock smashes scissors"`.
    pub fn summary(&self, first: Play, second: Play) -> String {
        match self {
            Outcome::Tie => format!("Both played {}, tie", first),
            Outcome::FirstWins(verb) => format!("{} {} {}", first, verb, second),
            Outcome::SecondWins(verb) => format!("{} {} {}", second, verb, first),
        }
    }
}
