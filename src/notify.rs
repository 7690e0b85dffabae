//! Per-player round notifications and their delivery.

use crate::game::{Address, Game, GameId, PlayerId};
use crate::rules::Play;
use async_trait::async_trait;
use derive_more::{Display, Error};
use derive_new::new;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, instrument, warn};

/// What one player sees after a round (or on joining).
///
/// "Your" and "their" fields are swapped between the two players' views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Round the game is now at.
    pub round: u32,
    /// Game id.
    pub game_id: GameId,
    /// This player's score.
    pub your_score: u32,
    /// Opponent's score.
    pub their_score: u32,
    /// Whether this player won the last round.
    pub winner: bool,
    /// This player's play in the last round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_move: Option<Play>,
    /// Opponent's play in the last round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub their_move: Option<Play>,
    /// Summary of the last round, shared by both players.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_summary: Option<String>,
    /// Whether an opponent holds the other slot.
    pub opponent_joined: bool,
}

impl PlayerView {
    /// Projects `game` from the point of view of `player_id`.
    ///
    /// Returns `None` if the player is not in the game.
    pub fn of(game: &Game, player_id: &str) -> Option<Self> {
        let player = game.player(player_id)?;
        let opponent = game.opponent(player_id);
        let last = game.last_round().as_ref();

        Some(Self {
            round: *game.round(),
            game_id: game.id().clone(),
            your_score: *player.score(),
            their_score: opponent.map(|o| *o.score()).unwrap_or(0),
            winner: last.is_some_and(|r| r.won_by(player_id)),
            your_move: last.and_then(|r| r.play_of(player_id)),
            their_move: last.and_then(|r| opponent.and_then(|o| r.play_of(o.id()))),
            round_summary: last.map(|r| r.summary().clone()),
            opponent_joined: opponent.is_some(),
        })
    }
}

/// A view addressed to one player.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Notification {
    /// Recipient.
    pub player_id: PlayerId,
    /// Delivery address at the time of composition.
    pub address: Address,
    /// Payload.
    pub view: PlayerView,
}

impl Notification {
    /// Composes the notification for `player_id`, if it is a member.
    pub fn for_player(game: &Game, player_id: &str) -> Option<Self> {
        let player = game.player(player_id)?;
        let view = PlayerView::of(game, player_id)?;
        Some(Self::new(player.id().clone(), player.address().clone(), view))
    }

    /// One notification per player, in slot order.
    #[instrument(skip(game), fields(game_id = %game.id(), round = game.round()))]
    pub fn for_all(game: &Game) -> Vec<Self> {
        game.players_by_slot()
            .into_iter()
            .filter_map(|p| Self::for_player(game, p.id()))
            .collect()
    }

    /// JSON payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the view cannot be encoded.
    pub fn payload(&self) -> Result<Vec<u8>, NotifyError> {
        serde_json::to_vec(&self.view)
            .map_err(|e| NotifyError::new(format!("Failed to encode view: {}", e)))
    }
}

/// Delivery failure with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Delivery error: {} at {}:{}", message, file, line)]
pub struct NotifyError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl NotifyError {
    /// Creates a new delivery error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Sends payloads to delivery addresses.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Sends `payload` to `address`.
    async fn send(&self, address: &str, payload: &[u8]) -> Result<(), NotifyError>;
}

/// Live connections keyed by address, each drained by its own writer task.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Address, mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `address`, returning the receiving end of its outbox.
    #[instrument(skip(self))]
    pub async fn register(&self, address: Address) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut connections = self.connections.write().await;
        connections.insert(address, tx);
        info!(connections = connections.len(), "Connection registered");
        rx
    }

    /// Forgets `address`.
    #[instrument(skip(self))]
    pub async fn unregister(&self, address: &str) {
        let mut connections = self.connections.write().await;
        connections.remove(address);
        info!(connections = connections.len(), "Connection removed");
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns true if nothing is registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Notifier for ConnectionRegistry {
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn send(&self, address: &str, payload: &[u8]) -> Result<(), NotifyError> {
        let connections = self.connections.read().await;
        let Some(tx) = connections.get(address) else {
            warn!("No connection for address");
            return Err(NotifyError::new(format!("No connection '{}'", address)));
        };
        tx.send(payload.to_vec())
            .map_err(|_| NotifyError::new(format!("Connection '{}' is closed", address)))?;
        debug!("Payload queued");
        Ok(())
    }
}
