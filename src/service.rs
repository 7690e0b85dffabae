//! Request handling: `new`, `join` and `play`.
//!
//! Each request is handled independently; all shared state goes through the
//! store. Notifications are delivered best-effort after the store write.

use crate::config::ServerConfig;
use crate::game::{GAME_ID_LENGTH, Game, GameError, GameId, generate_game_id};
use crate::message::{Action, PlayerMessage, Rejection};
use crate::notify::{Notification, Notifier};
use crate::protocol::{Acceptance, ProtocolError, Resolver};
use crate::store::{Condition, GameStore, Mutation, UpdateOutcome};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Default number of ids probed when creating a game.
pub const DEFAULT_GAME_ID_ATTEMPTS: usize = 3;

/// Why a request failed.
#[derive(Debug, Clone, derive_more::Display)]
pub enum ServiceError {
    /// The frame was not a valid message.
    #[display("Malformed message: {}", _0)]
    MalformedMessage(String),

    /// The action is not `new`, `join` or `play`.
    #[display("Unknown action '{}'", _0)]
    UnknownAction(String),

    /// A field the action needs was missing.
    #[display("Missing field '{}'", _0)]
    MissingField(&'static str),

    /// No free game id was found.
    #[display("Unable to find unused game id after {} attempts", _0)]
    IdSpaceExhausted(usize),

    /// Rejected or failed in the store layer.
    #[display("{}", _0)]
    Protocol(ProtocolError),
}

impl std::error::Error for ServiceError {}

impl From<ProtocolError> for ServiceError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<GameError> for ServiceError {
    fn from(err: GameError) -> Self {
        Self::Protocol(ProtocolError::Rejected(err))
    }
}

impl From<crate::store::StoreError> for ServiceError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::Protocol(ProtocolError::Store(err))
    }
}

impl ServiceError {
    /// Short machine-readable name, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::MalformedMessage(_) => "malformed_message",
            ServiceError::UnknownAction(_) => "unknown_action",
            ServiceError::MissingField(_) => "missing_field",
            ServiceError::IdSpaceExhausted(_) => "id_space_exhausted",
            ServiceError::Protocol(ProtocolError::Rejected(e)) => e.kind(),
            ServiceError::Protocol(ProtocolError::GameNotFound(_)) => "game_not_found",
            ServiceError::Protocol(ProtocolError::Store(_)) => "store_unavailable",
            ServiceError::Protocol(ProtocolError::Contention { .. }) => "contention",
        }
    }
}

/// Handles player requests against a store and a notifier.
#[derive(Debug, Clone)]
pub struct GameService {
    resolver: Resolver,
    notifier: Arc<dyn Notifier>,
    game_id_length: usize,
    game_id_attempts: usize,
}

impl GameService {
    /// Creates a service with default limits.
    #[instrument(skip_all)]
    pub fn new(store: Arc<dyn GameStore>, notifier: Arc<dyn Notifier>) -> Self {
        info!("Creating game service");
        Self {
            resolver: Resolver::new(store),
            notifier,
            game_id_length: GAME_ID_LENGTH,
            game_id_attempts: DEFAULT_GAME_ID_ATTEMPTS,
        }
    }

    /// Creates a service with limits taken from `config`.
    #[instrument(skip_all)]
    pub fn from_config(
        store: Arc<dyn GameStore>,
        notifier: Arc<dyn Notifier>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            resolver: Resolver::new(store).with_max_attempts(*config.resolve_attempts()),
            notifier,
            game_id_length: *config.game_id_length(),
            game_id_attempts: *config.game_id_attempts(),
        }
    }

    fn store(&self) -> &Arc<dyn GameStore> {
        self.resolver.store()
    }

    /// Dispatches one inbound message from `address`.
    ///
    /// Returns the notifications that were composed (and handed to the
    /// notifier). On error nothing was changed unless the error is a store
    /// failure, in which case the outcome is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] describing the rejection.
    #[instrument(skip(self, message), fields(action = %message.action, player_id = %message.player_id))]
    pub async fn handle(
        &self,
        address: &str,
        message: PlayerMessage,
    ) -> Result<Vec<Notification>, ServiceError> {
        let action = message
            .parsed_action()
            .ok_or_else(|| ServiceError::UnknownAction(message.action.clone()))?;

        match action {
            Action::New => self.new_game(&message.player_id, address).await,
            Action::Join => {
                let game_id = message
                    .game_id
                    .as_deref()
                    .ok_or(ServiceError::MissingField("gameId"))?;
                self.join_game(game_id, &message.player_id, address).await
            }
            Action::Play => {
                let game_id = message
                    .game_id
                    .as_deref()
                    .ok_or(ServiceError::MissingField("gameId"))?;
                let play = message
                    .play
                    .as_deref()
                    .ok_or(ServiceError::MissingField("move"))?;
                self.play(game_id, &message.player_id, play, message.round)
                    .await
            }
        }
    }

    /// Creates a game with the caller in slot 1 and sends it the game state.
    ///
    /// # Errors
    ///
    /// [`ServiceError::IdSpaceExhausted`] or a store failure.
    #[instrument(skip(self))]
    pub async fn new_game(
        &self,
        player_id: &str,
        address: &str,
    ) -> Result<Vec<Notification>, ServiceError> {
        let game_id = self.allocate_id().await?;
        let mut game = Game::new(game_id);
        game.assign_slot(player_id, address.to_string())?;
        let snapshot = self.store().put(&game).await?;

        info!(game_id = %snapshot.game().id(), "Game created");
        let notifications: Vec<_> = Notification::for_player(snapshot.game(), player_id)
            .into_iter()
            .collect();
        self.deliver(&notifications).await;
        Ok(notifications)
    }

    /// Takes a slot in `game_id`, or refreshes the caller's address if it
    /// already holds one. Both players receive the updated state.
    ///
    /// # Errors
    ///
    /// `GameNotFound`, [`GameError::GameFull`] or a store failure.
    #[instrument(skip(self))]
    pub async fn join_game(
        &self,
        game_id: &str,
        player_id: &str,
        address: &str,
    ) -> Result<Vec<Notification>, ServiceError> {
        let rejoining = self
            .store()
            .get(game_id)
            .await?
            .ok_or_else(|| ProtocolError::GameNotFound(game_id.to_string()))?
            .game()
            .player(player_id)
            .is_some();

        let condition = Condition::new().slot_open_for(player_id);
        let mutation = Mutation::AssignSlot {
            player_id: player_id.to_string(),
            address: address.to_string(),
        };

        let snapshot = match self.store().update(game_id, &condition, &mutation).await? {
            UpdateOutcome::Applied(snapshot) => snapshot,
            UpdateOutcome::ConditionFailed => {
                return match self.store().get(game_id).await? {
                    None => Err(ProtocolError::GameNotFound(game_id.to_string()).into()),
                    Some(_) => {
                        warn!("Join rejected, game full");
                        Err(GameError::GameFull.into())
                    }
                };
            }
        };

        let notifications: Vec<_> = if rejoining {
            debug!("Player reconnected");
            Notification::for_player(snapshot.game(), player_id)
                .into_iter()
                .collect()
        } else {
            info!("Player joined");
            Notification::for_all(snapshot.game())
        };
        self.deliver(&notifications).await;
        Ok(notifications)
    }

    /// Submits a move. When it completes the round, both players are sent
    /// the outcome; a first move produces no notifications.
    ///
    /// # Errors
    ///
    /// The protocol's rejection or failure.
    #[instrument(skip(self))]
    pub async fn play(
        &self,
        game_id: &str,
        player_id: &str,
        raw_move: &str,
        round: u32,
    ) -> Result<Vec<Notification>, ServiceError> {
        match self
            .resolver
            .submit(game_id, player_id, &raw_move.to_lowercase(), round)
            .await?
        {
            Acceptance::Pending { .. } => {
                debug!("Waiting for opponent");
                Ok(Vec::new())
            }
            Acceptance::Resolved { snapshot, .. } => {
                let notifications = Notification::for_all(snapshot.game());
                self.deliver(&notifications).await;
                Ok(notifications)
            }
        }
    }

    /// Sends a rejection to the submitting address only.
    #[instrument(skip(self, error), fields(kind = error.kind()))]
    pub async fn reject(&self, address: &str, game_id: Option<&str>, error: &ServiceError) {
        let rejection = Rejection {
            error: error.to_string(),
            kind: error.kind().to_string(),
            game_id: game_id.map(str::to_string),
        };
        match serde_json::to_vec(&rejection) {
            Ok(payload) => {
                if let Err(e) = self.notifier.send(address, &payload).await {
                    warn!(error = %e, "Failed to deliver rejection");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode rejection"),
        }
    }

    /// Hands each notification to the notifier. Failures are logged and do
    /// not undo anything.
    async fn deliver(&self, notifications: &[Notification]) {
        for notification in notifications {
            let payload = match notification.payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, player_id = %notification.player_id, "Skipping notification");
                    continue;
                }
            };
            if let Err(e) = self.notifier.send(&notification.address, &payload).await {
                warn!(error = %e, player_id = %notification.player_id, "Delivery failed");
            }
        }
    }

    /// Picks a game id not present in the store.
    #[instrument(skip(self))]
    async fn allocate_id(&self) -> Result<GameId, ServiceError> {
        for attempt in 1..=self.game_id_attempts {
            let id = generate_game_id(self.game_id_length);
            if self.store().get(&id).await?.is_none() {
                return Ok(id);
            }
            debug!(attempt, game_id = %id, "Game id collision");
        }
        warn!(attempts = self.game_id_attempts, "Game id space exhausted");
        Err(ServiceError::IdSpaceExhausted(self.game_id_attempts))
    }
}
