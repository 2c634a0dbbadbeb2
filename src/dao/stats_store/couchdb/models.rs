use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::stats_store::{GameStatsUpdate, PlayerTotals, SongSeenRecord};

pub const GAME_STATS_PREFIX: &str = "game-stats::";
pub const PLAYER_PREFIX: &str = "player::";
pub const SEEN_PREFIX: &str = "seen::";

pub fn game_stats_doc_id(game_id: Uuid, account_id: &str) -> String {
    format!("{GAME_STATS_PREFIX}{game_id}::{account_id}")
}

pub fn player_doc_id(account_id: &str) -> String {
    format!("{PLAYER_PREFIX}{account_id}")
}

pub fn seen_doc_id(record: &SongSeenRecord) -> String {
    format!(
        "{SEEN_PREFIX}{}::{}::{}",
        record.account_id, record.game_id, record.song_id
    )
}

/// Write-once document storing one game's update for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchGameStatsDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub update: GameStatsUpdate,
}

impl From<GameStatsUpdate> for CouchGameStatsDocument {
    fn from(update: GameStatsUpdate) -> Self {
        Self {
            id: game_stats_doc_id(update.game_id, &update.account_id),
            update,
        }
    }
}

/// Aggregated totals for an account, updated with optimistic `_rev` checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPlayerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub totals: PlayerTotals,
}

impl CouchPlayerDocument {
    pub fn empty(account_id: &str) -> Self {
        Self {
            id: player_doc_id(account_id),
            rev: None,
            totals: PlayerTotals::default(),
        }
    }
}

/// Append-only song-seen document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSeenDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub record: SongSeenRecord,
}

impl From<SongSeenRecord> for CouchSeenDocument {
    fn from(record: SongSeenRecord) -> Self {
        Self {
            id: seen_doc_id(&record),
            record,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BulkDocsRequest<T> {
    pub docs: Vec<T>,
}

/// Per-document result of `_bulk_docs`.
#[derive(Debug, Deserialize)]
pub struct BulkDocResult {
    pub id: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_stats_document_id_is_stable_per_game_and_account() {
        let game_id = Uuid::nil();
        let doc = CouchGameStatsDocument::from(GameStatsUpdate {
            game_id,
            account_id: "acct".into(),
            won: true,
            correct_guesses: 3,
            max_streak: 2,
            finished_at: "2026-01-01T00:00:00Z".into(),
        });
        assert_eq!(doc.id, format!("game-stats::{game_id}::acct"));

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["_id"], doc.id);
        assert_eq!(json["correct_guesses"], 3);
    }

    #[test]
    fn player_document_omits_missing_revision() {
        let json = serde_json::to_value(CouchPlayerDocument::empty("acct")).unwrap();
        assert!(json.get("_rev").is_none());
        assert_eq!(json["games_played"], 0);
    }
}
