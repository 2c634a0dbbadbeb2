//! Long-term player statistics, written once per game at game over.

#[cfg(feature = "couch-store")]
pub mod couchdb;

use dashmap::{DashMap, DashSet};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::storage::StorageResult;

/// Per-game statistics of one authenticated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatsUpdate {
    /// Game the update belongs to; together with `account_id` it makes the update idempotent.
    pub game_id: Uuid,
    /// Durable account identifier.
    pub account_id: String,
    /// Whether the player won the game.
    pub won: bool,
    /// Correct answers during the game.
    pub correct_guesses: u32,
    /// Longest streak during the game.
    pub max_streak: u32,
    /// RFC 3339 timestamp of the game over.
    pub finished_at: String,
}

/// Append-only record of a song served to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongSeenRecord {
    /// Durable account identifier.
    pub account_id: String,
    /// Catalog song identifier.
    pub song_id: u64,
    /// Game in which the song was served.
    pub game_id: Uuid,
    /// RFC 3339 timestamp of the game over.
    pub seen_at: String,
}

/// Aggregated statistics of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerTotals {
    /// Games finished.
    pub games_played: u32,
    /// Games won.
    pub games_won: u32,
    /// Correct answers over all games.
    pub correct_guesses: u32,
    /// Best streak ever reached.
    pub max_streak: u32,
}

impl PlayerTotals {
    /// Fold one game into the totals.
    pub fn apply(&mut self, update: &GameStatsUpdate) {
        self.games_played += 1;
        if update.won {
            self.games_won += 1;
        }
        self.correct_guesses += update.correct_guesses;
        self.max_streak = self.max_streak.max(update.max_streak);
    }
}

/// Abstraction over the long-term statistics store.
pub trait StatsStore: Send + Sync {
    /// Apply a per-game update. Returns `false` when this `(game_id, account_id)`
    /// pair was already recorded.
    fn record_game(&self, update: GameStatsUpdate) -> BoxFuture<'static, StorageResult<bool>>;
    /// Append song-seen records.
    fn record_songs_seen(
        &self,
        records: Vec<SongSeenRecord>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Check that the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Process-local stats store used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    applied: DashSet<(Uuid, String)>,
    totals: DashMap<String, PlayerTotals>,
    seen: DashMap<String, Vec<SongSeenRecord>>,
}

impl MemoryStatsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals recorded for `account_id`.
    pub fn totals(&self, account_id: &str) -> Option<PlayerTotals> {
        self.totals.get(account_id).map(|entry| *entry)
    }

    /// Songs recorded as seen by `account_id`.
    pub fn songs_seen(&self, account_id: &str) -> Vec<SongSeenRecord> {
        self.seen
            .get(account_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

impl StatsStore for MemoryStatsStore {
    fn record_game(&self, update: GameStatsUpdate) -> BoxFuture<'static, StorageResult<bool>> {
        let fresh = self
            .applied
            .insert((update.game_id, update.account_id.clone()));
        if fresh {
            self.totals
                .entry(update.account_id.clone())
                .or_default()
                .apply(&update);
        }
        Box::pin(async move { Ok(fresh) })
    }

    fn record_songs_seen(
        &self,
        records: Vec<SongSeenRecord>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        for record in records {
            self.seen
                .entry(record.account_id.clone())
                .or_default()
                .push(record);
        }
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
