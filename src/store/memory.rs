//! In-process store.

use super::{Condition, GameSnapshot, GameStore, Mutation, StoreError, UpdateOutcome, default_ttl};
use crate::game::{Game, GameId};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Store backed by a shared map. Clones share the same records.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    games: Arc<Mutex<HashMap<GameId, GameSnapshot>>>,
    ttl: Duration,
}

impl MemoryStore {
    /// Creates an empty store with the default retention window.
    #[instrument]
    pub fn new() -> Self {
        Self::with_ttl(default_ttl())
    }

    /// Creates an empty store with the given retention window.
    #[instrument]
    pub fn with_ttl(ttl: Duration) -> Self {
        info!(ttl_seconds = ttl.num_seconds(), "Creating memory store");
        Self {
            games: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        let games = self.games.lock().await;
        games.values().filter(|s| !s.is_expired(now)).count()
    }

    /// Returns true if no live records exist.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    #[instrument(skip(self))]
    async fn get(&self, game_id: &str) -> Result<Option<GameSnapshot>, StoreError> {
        let mut games = self.games.lock().await;
        match games.get(game_id) {
            Some(snapshot) if snapshot.is_expired(Utc::now()) => {
                debug!("Dropping expired game");
                games.remove(game_id);
                Ok(None)
            }
            Some(snapshot) => Ok(Some(snapshot.clone())),
            None => {
                debug!("Game not found");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, game), fields(game_id = %game.id()))]
    async fn put(&self, game: &Game) -> Result<GameSnapshot, StoreError> {
        let snapshot = GameSnapshot::fresh(game.clone(), self.ttl);
        let mut games = self.games.lock().await;
        games.insert(game.id().clone(), snapshot.clone());
        debug!(round = game.round(), "Game stored");
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn update(
        &self,
        game_id: &str,
        condition: &Condition,
        mutation: &Mutation,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut games = self.games.lock().await;
        let Some(current) = games.get(game_id) else {
            return Ok(UpdateOutcome::ConditionFailed);
        };
        if current.is_expired(Utc::now()) {
            return Ok(UpdateOutcome::ConditionFailed);
        }

        match current.updated(condition, mutation, self.ttl) {
            Some(next) => {
                games.insert(game_id.to_string(), next.clone());
                Ok(UpdateOutcome::Applied(next))
            }
            None => Ok(UpdateOutcome::ConditionFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Play;

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        let game = Game::new("MEM01".to_string());
        store.put(&game).await.unwrap();
        let snapshot = store.get("MEM01").await.unwrap().unwrap();
        assert_eq!(snapshot.game(), &game);
        assert!(store.get("NOPE0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_game_reads_as_absent() {
        let store = MemoryStore::with_ttl(Duration::seconds(-1));
        store.put(&Game::new("OLD01".to_string())).await.unwrap();
        assert!(store.get("OLD01").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_conditional_update() {
        let store = MemoryStore::new();
        let mut game = Game::new("MEM02".to_string());
        game.assign_slot("a", "conn-a".to_string()).unwrap();
        store.put(&game).await.unwrap();

        let mutation = Mutation::RecordPlay {
            player_id: "a".to_string(),
            play: Play::Paper,
        };
        let condition = Condition::new().round_is(1).not_played_by("a");

        let first = store.update("MEM02", &condition, &mutation).await.unwrap();
        assert!(matches!(first, UpdateOutcome::Applied(_)));
        let second = store.update("MEM02", &condition, &mutation).await.unwrap();
        assert_eq!(second, UpdateOutcome::ConditionFailed);

        let stored = store.get("MEM02").await.unwrap().unwrap();
        assert_eq!(*stored.game().play_count(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_game() {
        let store = MemoryStore::new();
        let outcome = store
            .update("GHOST", &Condition::new(), &Mutation::AssignSlot {
                player_id: "a".to_string(),
                address: "x".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::ConditionFailed);
    }
}
