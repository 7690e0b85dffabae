//! Database row model for persisted games.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use super::{GameSnapshot, StoreError, schema};

/// One row of the `games` table.
///
/// `snapshot` is the authoritative JSON encoding; `round` and `expires_at`
/// are copies kept for querying.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::games)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(super) struct GameRow {
    pub id: String,
    pub round: i32,
    pub snapshot: String,
    pub expires_at: NaiveDateTime,
}

impl GameRow {
    /// Encodes a snapshot as a row.
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Result<Self, StoreError> {
        let round = i32::try_from(*snapshot.game().round())
            .map_err(|e| StoreError::new(format!("Round out of range: {}", e)))?;
        Ok(Self {
            id: snapshot.game().id().clone(),
            round,
            snapshot: serde_json::to_string(snapshot)?,
            expires_at: snapshot.expires_at().naive_utc(),
        })
    }

    /// Decodes the row back into a snapshot.
    pub fn into_snapshot(self) -> Result<GameSnapshot, StoreError> {
        Ok(serde_json::from_str(&self.snapshot)?)
    }
}
