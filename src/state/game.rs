use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::services::scoring;

/// Shortest guess phase a host can configure.
pub const MIN_GUESS_DURATION: Duration = Duration::from_secs(5);
/// Longest guess phase a host can configure.
pub const MAX_GUESS_DURATION: Duration = Duration::from_secs(60);

/// How a player submits an answer; each mode has its own point value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Typed answer checked by the fuzzy evaluator.
    FreeText,
    /// Pick among the target and three decoys.
    FourChoice,
    /// Pick among the target and one decoy.
    TwoChoice,
}

impl ResponseMode {
    /// Return the lower-valued of two modes so a player cannot claim more
    /// points than the room allows.
    pub fn capped_by(self, room_mode: ResponseMode) -> ResponseMode {
        if scoring::points_per_correct(self) <= scoring::points_per_correct(room_mode) {
            self
        } else {
            room_mode
        }
    }
}

/// Whether answers must name the exact entry or only its franchise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionMode {
    /// The franchise title (or any title/alias of the entry) is accepted.
    Franchise,
    /// Only the exact entry title or one of its aliases is accepted.
    ExactTitle,
}

/// Difficulty tier used both to filter songs and to pick the solo threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Well-known songs.
    Easy,
    /// Default tier.
    Medium,
    /// Obscure songs.
    Hard,
}

/// Kind of song within its franchise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SongType {
    /// Opening theme.
    Opening,
    /// Ending theme.
    Ending,
    /// Insert song.
    Insert,
}

/// Restrict the playlist to franchises the players have watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WatchedPool {
    /// No watch-list filtering.
    Off,
    /// Franchises watched by at least one player.
    Union,
    /// Franchises watched by every player with a linked account.
    Intersection,
}

/// Host-controlled room settings, fixed for the duration of a game.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
#[serde(default)]
pub struct RoomSettings {
    /// Number of rounds in the playlist.
    #[validate(range(min = 1, max = 50))]
    pub round_count: usize,
    /// Length of the guess phase (before the server-side buffer).
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "guess_duration_ms")]
    #[schema(value_type = u64)]
    #[validate(custom(function = "validate_guess_duration"))]
    pub guess_duration: Duration,
    /// Difficulty tier.
    pub difficulty: Difficulty,
    /// Song kinds eligible for selection.
    #[validate(length(min = 1))]
    pub song_types: Vec<SongType>,
    /// Answer precision.
    pub precision: PrecisionMode,
    /// Response mode offered to players.
    pub response_mode: ResponseMode,
    /// Optional tag or curated playlist name.
    #[validate(length(min = 1, max = 64))]
    pub tag: Option<String>,
    /// Optional decade filter such as `1990`.
    #[validate(custom(function = "validate_decade"))]
    pub decade: Option<u16>,
    /// Watch-list restriction.
    pub watched_only: WatchedPool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            round_count: 10,
            guess_duration: Duration::from_secs(20),
            difficulty: Difficulty::Medium,
            song_types: vec![SongType::Opening, SongType::Ending, SongType::Insert],
            precision: PrecisionMode::Franchise,
            response_mode: ResponseMode::FreeText,
            tag: None,
            decade: None,
            watched_only: WatchedPool::Off,
        }
    }
}

fn validate_guess_duration(value: &Duration) -> Result<(), ValidationError> {
    if (MIN_GUESS_DURATION..=MAX_GUESS_DURATION).contains(value) {
        return Ok(());
    }
    let mut err = ValidationError::new("guess_duration_range");
    err.message = Some(
        format!(
            "guess duration must be between {} and {} ms",
            MIN_GUESS_DURATION.as_millis(),
            MAX_GUESS_DURATION.as_millis()
        )
        .into(),
    );
    Err(err)
}

fn validate_decade(value: u16) -> Result<(), ValidationError> {
    if value % 10 == 0 && (1950..=2090).contains(&value) {
        return Ok(());
    }
    let mut err = ValidationError::new("decade_format");
    err.message = Some("decade must be a year ending in 0 between 1950 and 2090".into());
    Err(err)
}

/// One fixed playlist slot.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundItem {
    /// Catalog identifier of the song.
    pub song_id: u64,
    /// Media reference clients stream during the round.
    pub media_url: String,
    /// Exact entry title.
    pub title: String,
    /// Alternative titles for the entry.
    pub aliases: Vec<String>,
    /// Franchise title.
    pub franchise: String,
    /// Franchise identifier matched against watch lists.
    pub franchise_id: u64,
    /// Song kind.
    pub song_type: SongType,
    /// Release year, when known.
    pub year: Option<u16>,
    /// Guess phase length for this round.
    pub guess_duration: Duration,
}

impl RoundItem {
    /// The string a choice-mode player must pick, per precision mode.
    pub fn correct_target(&self, precision: PrecisionMode) -> &str {
        match precision {
            PrecisionMode::Franchise => &self.franchise,
            PrecisionMode::ExactTitle => &self.title,
        }
    }

    /// Answers accepted by the evaluator under `precision`.
    pub fn accepted_answers(&self, precision: PrecisionMode) -> Vec<&str> {
        let mut accepted = Vec::with_capacity(self.aliases.len() + 2);
        accepted.push(self.title.as_str());
        accepted.extend(self.aliases.iter().map(String::as_str));
        if precision == PrecisionMode::Franchise {
            accepted.push(self.franchise.as_str());
        }
        accepted
    }
}

/// Decoy choice sets computed once per round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct RoundChoices {
    /// Target plus three decoys, shuffled.
    pub four: Vec<String>,
    /// Target plus one decoy taken from `four`, shuffled.
    pub two: Vec<String>,
}
