//! Victory rules evaluated once the playlist is exhausted.
//!
//! A lone player plays against a score threshold derived from the maximum
//! reachable score; larger rooms rank players and reward the top positions.

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    services::scoring,
    state::{
        game::{Difficulty, PrecisionMode, ResponseMode, RoomSettings},
        player::Player,
    },
};

/// Rooms up to this size have a single winner.
pub const SMALL_LOBBY_CUTOFF: usize = 5;
/// Number of winners in rooms larger than [`SMALL_LOBBY_CUTOFF`].
pub const LARGE_LOBBY_WINNERS: usize = 3;
/// Solo threshold whenever exact-title precision is active.
pub const EXACT_TITLE_THRESHOLD_PERCENT: u32 = 40;

/// Which victory path produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VictoryKind {
    /// Single player against a threshold.
    Solo,
    /// Ranking among several players.
    Multiplayer,
}

/// Threshold metadata for solo games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SoloThreshold {
    /// Highest score reachable over the whole playlist.
    pub max_score: u32,
    /// Percentage of `max_score` required to win.
    pub threshold_percent: u32,
    /// Minimum score needed to win.
    pub required_score: u32,
}

/// Final standing of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RankingEntry {
    /// Connection identifier of the player.
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// Final score.
    pub score: u32,
    /// Competition rank starting at 1; tied scores share a rank.
    pub rank: usize,
    /// Whether this player won.
    pub won: bool,
}

/// Outcome emitted with the game-over event.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VictoryReport {
    /// Path that produced this report.
    pub kind: VictoryKind,
    /// Players sorted by score, best first.
    pub rankings: Vec<RankingEntry>,
    /// Present for solo games.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solo: Option<SoloThreshold>,
    /// Present for multiplayer games.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_count: Option<usize>,
}

impl VictoryReport {
    /// Whether the given player won.
    pub fn is_winner(&self, player_id: &str) -> bool {
        self.rankings
            .iter()
            .any(|entry| entry.player_id == player_id && entry.won)
    }
}

/// Percentage of the maximum score a solo player needs.
pub fn solo_threshold_percent(difficulty: Difficulty, precision: PrecisionMode) -> u32 {
    if precision == PrecisionMode::ExactTitle {
        return EXACT_TITLE_THRESHOLD_PERCENT;
    }
    match difficulty {
        Difficulty::Easy => 70,
        Difficulty::Medium => 60,
        Difficulty::Hard => 50,
    }
}

/// Compute the solo threshold for a playlist of `rounds` songs.
pub fn solo_threshold(
    rounds: usize,
    mode: ResponseMode,
    difficulty: Difficulty,
    precision: PrecisionMode,
) -> SoloThreshold {
    let max_score = rounds as u32 * scoring::points_per_correct(mode);
    let threshold_percent = solo_threshold_percent(difficulty, precision);
    let required_score = (max_score * threshold_percent).div_ceil(100);
    SoloThreshold {
        max_score,
        threshold_percent,
        required_score,
    }
}

/// Number of winners in a multiplayer room of `roster_size` players.
pub fn winner_count(roster_size: usize) -> usize {
    if roster_size <= SMALL_LOBBY_CUTOFF {
        1
    } else {
        LARGE_LOBBY_WINNERS
    }
}

/// Evaluate the final standings of a game.
pub fn evaluate<'a, I>(players: I, settings: &RoomSettings, rounds: usize) -> VictoryReport
where
    I: IntoIterator<Item = &'a Player>,
{
    let mut sorted: Vec<&Player> = players.into_iter().collect();
    // Stable sort keeps join order among equal scores.
    sorted.sort_by(|a, b| b.score.cmp(&a.score));

    let ranks = competition_ranks(&sorted);

    if sorted.len() == 1 {
        let threshold = solo_threshold(
            rounds,
            settings.response_mode,
            settings.difficulty,
            settings.precision,
        );
        let player = sorted[0];
        return VictoryReport {
            kind: VictoryKind::Solo,
            rankings: vec![RankingEntry {
                player_id: player.id.clone(),
                name: player.name.clone(),
                score: player.score,
                rank: 1,
                won: player.score >= threshold.required_score,
            }],
            solo: Some(threshold),
            winner_count: None,
        };
    }

    let winners = winner_count(sorted.len());
    let rankings = sorted
        .iter()
        .zip(ranks)
        .map(|(player, rank)| RankingEntry {
            player_id: player.id.clone(),
            name: player.name.clone(),
            score: player.score,
            rank,
            won: rank <= winners,
        })
        .collect();

    VictoryReport {
        kind: VictoryKind::Multiplayer,
        rankings,
        solo: None,
        winner_count: Some(winners),
    }
}

fn competition_ranks(sorted: &[&Player]) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(sorted.len());
    for (index, player) in sorted.iter().enumerate() {
        let rank = match index.checked_sub(1) {
            Some(prev) if sorted[prev].score == player.score => ranks[prev],
            _ => index + 1,
        };
        ranks.push(rank);
    }
    ranks
}
