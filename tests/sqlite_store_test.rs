//! Tests for the SQLite game store.

use std::sync::Arc;

use chrono::Duration;
use tempfile::NamedTempFile;

use rpsls::{
    Acceptance, Condition, Game, GameStore, Mutation, Play, Resolver, SqliteStore, UpdateOutcome,
};

/// Creates a temporary database file with schema applied, returns the file
/// handle (must stay in scope to keep the file alive) and a ready store.
fn setup_test_db() -> (NamedTempFile, SqliteStore) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let store = SqliteStore::open(db_path).expect("Failed to open store");
    (db_file, store)
}

fn two_player_game(id: &str) -> Game {
    let mut game = Game::new(id.to_string());
    game.assign_slot("alice", "conn-a".to_string())
        .expect("alice joins");
    game.assign_slot("bob", "conn-b".to_string())
        .expect("bob joins");
    game
}

#[tokio::test]
async fn test_put_and_get() {
    let (_db, store) = setup_test_db();
    let game = two_player_game("SQL01");
    store.put(&game).await.expect("Put failed");

    let loaded = store.get("SQL01").await.expect("Get failed");
    assert_eq!(loaded.expect("Game missing").into_game(), game);
}

#[tokio::test]
async fn test_get_missing() {
    let (_db, store) = setup_test_db();
    assert!(store.get("NOPE1").await.expect("Get failed").is_none());
}

#[tokio::test]
async fn test_put_replaces() {
    let (_db, store) = setup_test_db();
    let mut game = Game::new("SQL02".to_string());
    game.assign_slot("alice", "conn-a".to_string())
        .expect("alice joins");
    store.put(&game).await.expect("Put failed");

    game.assign_slot("bob", "conn-b".to_string())
        .expect("bob joins");
    store.put(&game).await.expect("Put failed");

    let loaded = store
        .get("SQL02")
        .await
        .expect("Get failed")
        .expect("Game missing")
        .into_game();
    assert!(loaded.is_full());
}

#[tokio::test]
async fn test_conditional_update() {
    let (_db, store) = setup_test_db();
    store.put(&two_player_game("SQL03")).await.expect("Put failed");

    let record = Mutation::RecordPlay {
        player_id: "alice".to_string(),
        play: Play::Lizard,
    };
    let first_move = Condition::new()
        .round_is(1)
        .play_count_is(0)
        .not_played_by("alice");

    let applied = store
        .update("SQL03", &first_move, &record)
        .await
        .expect("Update failed");
    let UpdateOutcome::Applied(snapshot) = applied else {
        panic!("First update should apply");
    };
    assert_eq!(*snapshot.game().play_count(), 1);

    let again = store
        .update("SQL03", &first_move, &record)
        .await
        .expect("Update failed");
    assert_eq!(again, UpdateOutcome::ConditionFailed);

    let stored = store
        .get("SQL03")
        .await
        .expect("Get failed")
        .expect("Game missing");
    assert_eq!(stored, snapshot);
}

#[tokio::test]
async fn test_update_missing_game_fails_condition() {
    let (_db, store) = setup_test_db();
    let outcome = store
        .update(
            "NOPE2",
            &Condition::new(),
            &Mutation::RecordPlay {
                player_id: "alice".to_string(),
                play: Play::Rock,
            },
        )
        .await
        .expect("Update failed");
    assert_eq!(outcome, UpdateOutcome::ConditionFailed);
}

#[tokio::test]
async fn test_expired_games_are_invisible_and_purged() {
    let (_db, store) = setup_test_db();
    let store = store.with_ttl(Duration::seconds(-1));
    store.put(&two_player_game("OLD01")).await.expect("Put failed");

    assert!(store.get("OLD01").await.expect("Get failed").is_none());
    assert_eq!(store.purge_expired().await.expect("Purge failed"), 1);
    assert_eq!(store.purge_expired().await.expect("Purge failed"), 0);
}

#[tokio::test]
async fn test_reopen_keeps_games() {
    let (db, store) = setup_test_db();
    store.put(&two_player_game("SQL04")).await.expect("Put failed");
    drop(store);

    let path = db.path().to_str().expect("Invalid path").to_string();
    let reopened = SqliteStore::open(path).expect("Reopen failed");
    assert!(reopened.get("SQL04").await.expect("Get failed").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_round_on_sqlite() {
    let (_db, store) = setup_test_db();
    store.put(&two_player_game("SQL05")).await.expect("Put failed");
    let resolver = Resolver::new(Arc::new(store.clone()));

    let a = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.submit("SQL05", "alice", "paper", 1).await })
    };
    let b = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.submit("SQL05", "bob", "spock", 1).await })
    };
    let a = a.await.expect("alice task").expect("alice accepted");
    let b = b.await.expect("bob task").expect("bob accepted");

    let resolved = [a, b]
        .iter()
        .filter(|acc| matches!(acc, Acceptance::Resolved { .. }))
        .count();
    assert_eq!(resolved, 1);

    let game = store
        .get("SQL05")
        .await
        .expect("Get failed")
        .expect("Game missing")
        .into_game();
    assert_eq!(*game.round(), 2);
    assert_eq!(*game.player("alice").expect("alice").score(), 1);
    assert_eq!(
        game.last_round().as_ref().map(|r| r.summary().as_str()),
        Some("paper disproves spock")
    );
}
