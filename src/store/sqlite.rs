//! SQLite-backed store.
//!
//! Every conditional update runs inside an immediate transaction, so the
//! read, the condition check and the write happen under one write lock even
//! when several processes share the database file.

use chrono::{Duration, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument, warn};

use super::models::GameRow;
use super::{
    Condition, GameSnapshot, GameStore, Mutation, StoreError, UpdateOutcome, default_ttl, schema,
};
use crate::game::Game;
use async_trait::async_trait;

/// Embedded schema migrations.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Game store persisted to a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: String,
    ttl: Duration,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `db_path` and applies
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or migrated.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: String) -> Result<Self, StoreError> {
        info!(path = %db_path, "Opening SQLite store");
        let store = Self {
            db_path,
            ttl: default_ttl(),
        };
        let mut conn = store.connection()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::new(format!("Migrations failed: {}", e)))?;
        Ok(store)
    }

    /// Sets the retention window.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, StoreError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path).map_err(|e| {
            StoreError::new(format!("Failed to connect to '{}': {}", self.db_path, e))
        })?;
        conn.batch_execute(&format!("PRAGMA busy_timeout = {};", BUSY_TIMEOUT_MS))?;
        Ok(conn)
    }

    /// Runs `f` with a fresh connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.connection()?;
            f(&mut conn)
        })
        .await?
    }

    /// Deletes expired games, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a database error occurs.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now().naive_utc();
        let removed = self
            .blocking(move |conn| {
                Ok(diesel::delete(schema::games::table.filter(schema::games::expires_at.le(now)))
                    .execute(conn)?)
            })
            .await?;
        info!(removed, "Expired games purged");
        Ok(removed)
    }
}

#[async_trait]
impl GameStore for SqliteStore {
    #[instrument(skip(self))]
    async fn get(&self, game_id: &str) -> Result<Option<GameSnapshot>, StoreError> {
        let id = game_id.to_string();
        let now = Utc::now().naive_utc();
        self.blocking(move |conn| {
            let row = schema::games::table
                .find(id.as_str())
                .filter(schema::games::expires_at.gt(now))
                .select(GameRow::as_select())
                .first::<GameRow>(conn)
                .optional()?;
            if row.is_none() {
                debug!(game_id = %id, "Game not found");
            }
            row.map(GameRow::into_snapshot).transpose()
        })
        .await
    }

    #[instrument(skip(self, game), fields(game_id = %game.id()))]
    async fn put(&self, game: &Game) -> Result<GameSnapshot, StoreError> {
        let snapshot = GameSnapshot::fresh(game.clone(), self.ttl);
        let row = GameRow::from_snapshot(&snapshot)?;
        self.blocking(move |conn| {
            diesel::replace_into(schema::games::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await?;
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
        let id = game_id.to_string();
        let condition = condition.clone();
        let mutation = mutation.clone();
        let ttl = self.ttl;

        self.blocking(move |conn| {
            conn.immediate_transaction::<_, StoreError, _>(|conn| {
                let now = Utc::now().naive_utc();
                let row = schema::games::table
                    .find(id.as_str())
                    .filter(schema::games::expires_at.gt(now))
                    .select(GameRow::as_select())
                    .first::<GameRow>(conn)
                    .optional()?;
                let Some(row) = row else {
                    warn!(game_id = %id, "Conditional update on missing game");
                    return Ok(UpdateOutcome::ConditionFailed);
                };

                let current = row.into_snapshot()?;
                let Some(next) = current.updated(&condition, &mutation, ttl) else {
                    return Ok(UpdateOutcome::ConditionFailed);
                };

                let next_row = GameRow::from_snapshot(&next)?;
                diesel::update(schema::games::table.find(id.as_str()))
                    .set((
                        schema::games::round.eq(next_row.round),
                        schema::games::snapshot.eq(&next_row.snapshot),
                        schema::games::expires_at.eq(next_row.expires_at),
                    ))
                    .execute(conn)?;
                Ok(UpdateOutcome::Applied(next))
            })
        })
        .await
    }
}
