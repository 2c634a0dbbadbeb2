use futures::future::join_all;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::stats_store::{GameStatsUpdate, SongSeenRecord, StatsStore},
    dto::format_timestamp,
    services::victory::VictoryReport,
    state::player::Roster,
};

/// Everything written to the stats store for one finished game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsBatch {
    /// One update per authenticated player.
    pub updates: Vec<GameStatsUpdate>,
    /// Songs served to authenticated players.
    pub seen: Vec<SongSeenRecord>,
}

impl StatsBatch {
    /// Collect the records of a finished game. Players without an account are skipped.
    pub fn collect(
        game_id: Uuid,
        roster: &Roster,
        report: &VictoryReport,
        finished_at: OffsetDateTime,
    ) -> Self {
        let timestamp = format_timestamp(finished_at);
        let mut batch = Self::default();

        for player in roster.iter() {
            let Some(account_id) = &player.account_id else {
                continue;
            };
            batch.updates.push(GameStatsUpdate {
                game_id,
                account_id: account_id.clone(),
                won: report.is_winner(&player.id),
                correct_guesses: player.correct_count,
                max_streak: player.best_streak,
                finished_at: timestamp.clone(),
            });
            batch
                .seen
                .extend(player.songs_seen.iter().map(|song_id| SongSeenRecord {
                    account_id: account_id.clone(),
                    song_id: *song_id,
                    game_id,
                    seen_at: timestamp.clone(),
                }));
        }

        batch
    }

    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.seen.is_empty()
    }
}

/// Write a batch to the store. Failures are logged and never surfaced to players.
pub async fn persist(store: &dyn StatsStore, room: &str, batch: StatsBatch) {
    if batch.is_empty() {
        debug!(room = %room, "no authenticated players; skipping stats");
        return;
    }

    let StatsBatch { updates, seen } = batch;
    let accounts: Vec<String> = updates
        .iter()
        .map(|update| update.account_id.clone())
        .collect();
    let results = join_all(updates.into_iter().map(|update| store.record_game(update))).await;

    let mut recorded = 0usize;
    for (account, result) in accounts.iter().zip(results) {
        match result {
            Ok(true) => recorded += 1,
            Ok(false) => debug!(room = %room, account = %account, "game stats already recorded"),
            Err(err) => {
                warn!(room = %room, account = %account, error = %err, "failed to record game stats")
            }
        }
    }

    let seen_count = seen.len();
    if seen_count > 0 {
        if let Err(err) = store.record_songs_seen(seen).await {
            warn!(room = %room, error = %err, "failed to record seen songs");
        }
    }

    info!(
        room = %room,
        players = recorded,
        songs = seen_count,
        "game stats persisted"
    );
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        dao::{
            stats_store::MemoryStatsStore,
            storage::{StorageError, StorageResult},
        },
        services::victory::{RankingEntry, VictoryKind},
    };

    fn roster() -> Roster {
        let mut roster = Roster::new();
        roster.upsert("c1", "Asuka".into(), None, Some("acct-asuka".into()), false);
        roster.upsert("c2", "Guest".into(), None, None, false);
        for player in roster.iter_mut() {
            player.record_round(true, 5);
            player.songs_seen = vec![10, 11];
        }
        roster
    }

    fn report() -> VictoryReport {
        VictoryReport {
            kind: VictoryKind::Multiplayer,
            rankings: vec![
                RankingEntry {
                    player_id: "c1".into(),
                    name: "Asuka".into(),
                    score: 5,
                    rank: 1,
                    won: true,
                },
                RankingEntry {
                    player_id: "c2".into(),
                    name: "Guest".into(),
                    score: 5,
                    rank: 1,
                    won: true,
                },
            ],
            solo: None,
            winner_count: Some(1),
        }
    }

    #[test]
    fn anonymous_players_are_skipped() {
        let batch = StatsBatch::collect(
            Uuid::new_v4(),
            &roster(),
            &report(),
            OffsetDateTime::UNIX_EPOCH,
        );
        assert_eq!(batch.updates.len(), 1);
        let update = &batch.updates[0];
        assert_eq!(update.account_id, "acct-asuka");
        assert!(update.won);
        assert_eq!(update.correct_guesses, 1);
        assert_eq!(update.max_streak, 1);
        assert_eq!(update.finished_at, "1970-01-01T00:00:00Z");
        let songs: HashSet<u64> = batch.seen.iter().map(|record| record.song_id).collect();
        assert_eq!(songs, HashSet::from([10, 11]));
    }

    #[tokio::test]
    async fn persisting_twice_counts_once() {
        let store = MemoryStatsStore::new();
        let batch = StatsBatch::collect(
            Uuid::new_v4(),
            &roster(),
            &report(),
            OffsetDateTime::UNIX_EPOCH,
        );

        persist(&store, "ABC234", batch.clone()).await;
        persist(&store, "ABC234", batch).await;

        let totals = store.totals("acct-asuka").unwrap();
        assert_eq!(totals.games_played, 1);
        assert_eq!(totals.games_won, 1);
    }

    struct FailingStore;

    impl StatsStore for FailingStore {
        fn record_game(&self, _update: GameStatsUpdate) -> BoxFuture<'static, StorageResult<bool>> {
            Box::pin(async { Err(StorageError::Rejected("down".into())) })
        }

        fn record_songs_seen(
            &self,
            _records: Vec<SongSeenRecord>,
        ) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(StorageError::Rejected("down".into())) })
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let batch = StatsBatch::collect(
            Uuid::new_v4(),
            &roster(),
            &report(),
            OffsetDateTime::UNIX_EPOCH,
        );
        persist(&FailingStore, "ABC234", batch).await;
    }
}
