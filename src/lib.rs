//! rpsls - race-free round resolution for rock, paper, scissors, lizard, spock
//!
//! Two players submit moves independently, possibly to different processes
//! on different machines. The only shared state is a game record in a store
//! offering reads, whole-record writes and conditional updates. Each round is
//! scored exactly once however the two submissions interleave.
//!
//! # Architecture
//!
//! - **Rules**: the fixed five-way dominance table
//! - **Game**: round state and the two player slots
//! - **Coordinator**: the per-round state machine
//! - **Protocol**: first-mover / second-mover conditional writes
//! - **Store**: in-memory and SQLite game stores
//! - **Notify / Service / Server**: per-player views, request handling and
//!   the WebSocket transport
//!
//! # Example
//!
//! ```no_run
//! use rpsls::{Acceptance, Game, GameStore, MemoryStore, Resolver};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let mut game = Game::new("AB12C".to_string());
//! game.assign_slot("alice", "conn-1".to_string())?;
//! game.assign_slot("bob", "conn-2".to_string())?;
//! store.put(&game).await?;
//!
//! let resolver = Resolver::new(store);
//! resolver.submit("AB12C", "alice", "rock", 1).await?;
//! if let Acceptance::Resolved { record, .. } = resolver.submit("AB12C", "bob", "scissors", 1).await? {
//!     println!("{}", record.summary());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod coordinator;
mod game;
mod message;
mod notify;
mod protocol;
mod rules;
mod server;
mod service;
mod store;

// Crate-level exports - Rules
pub use rules::{BEATS, Outcome, Play, TIE_VERB, resolve, valid_play};

// Crate-level exports - Model
pub use game::{
    Address, GAME_ID_LENGTH, Game, GameError, GameId, MAX_PLAYERS, Player, PlayerId, RoundRecord,
    Slot, SlotAssignment, generate_game_id,
};

// Crate-level exports - Round state machine
pub use coordinator::{RoundPhase, Turn, TurnCoordinator};

// Crate-level exports - Store
pub use store::{
    Condition, DEFAULT_TTL_DAYS, GameSnapshot, GameStore, MIGRATIONS, MemoryStore, Mutation,
    SqliteStore, StoreError, UpdateOutcome, default_ttl,
};

// Crate-level exports - Resolution protocol
pub use protocol::{
    Acceptance, DEFAULT_RESOLVE_ATTEMPTS, MIN_RESOLVE_ATTEMPTS, ProtocolError, Resolver,
};

// Crate-level exports - Notifications
pub use notify::{ConnectionRegistry, Notification, Notifier, NotifyError, PlayerView};

// Crate-level exports - Wire messages
pub use message::{Action, PlayerMessage, Rejection};

// Crate-level exports - Service and transport
pub use server::{AppState, new_address, router, serve};
pub use service::{DEFAULT_GAME_ID_ATTEMPTS, GameService, ServiceError};

// Crate-level exports - Configuration
pub use config::{ConfigError, DB_PATH_ENV, MAX_GAME_TTL_DAYS, ServerConfig};
