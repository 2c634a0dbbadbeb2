use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::phase::PhaseView,
    services::victory::VictoryReport,
    state::{
        game::{ResponseMode, RoomSettings, RoundChoices, RoundItem, SongType},
        mode::RoundOutcome,
        player::{Player, Roster},
        state_machine::RoomStatus,
        votes::VoteKind,
    },
};

/// Public view of a player.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PlayerSummary {
    /// Connection identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Avatar reference.
    pub avatar: Option<String>,
    /// Score in the current game.
    pub score: u32,
    /// Consecutive correct answers.
    pub streak: u32,
    /// Whether the player hosts the room.
    pub is_host: bool,
    /// Lobby ready flag.
    pub ready: bool,
    /// Whether the player still takes part in the running or finished game.
    pub in_game: bool,
    /// Whether an answer was locked in this round.
    pub answered: bool,
    /// Correctness of the last revealed round.
    pub correct: Option<bool>,
    /// Points earned in the last revealed round.
    pub round_points: u32,
}

impl PlayerSummary {
    /// Build the summary of `player` within `roster`.
    pub fn new(player: &Player, roster: &Roster, game_active: bool) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            avatar: player.avatar.clone(),
            score: player.score,
            streak: player.streak,
            is_host: roster.is_host(&player.id),
            ready: player.ready,
            in_game: game_active && !roster.has_returned(&player.id),
            answered: player.has_answered(),
            correct: player.correct,
            round_points: player.round_points,
        }
    }

    /// Summaries of the whole roster in join order.
    pub fn roster(roster: &Roster, game_active: bool) -> Vec<Self> {
        roster
            .iter()
            .map(|player| Self::new(player, roster, game_active))
            .collect()
    }
}

/// Roster broadcast after every membership or readiness change.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RosterUpdate {
    /// Current host.
    pub host_id: Option<String>,
    /// Players in join order.
    pub players: Vec<PlayerSummary>,
}

/// Broadcast when a game begins.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GameStarted {
    /// Identifier of this game, used for stats.
    pub game_id: Uuid,
    /// Settings frozen for the game.
    pub settings: RoomSettings,
    /// Players with zeroed scores.
    pub players: Vec<PlayerSummary>,
    /// Playlist length.
    pub total_rounds: usize,
    /// Media of round 0, for prefetching.
    pub first_media_url: Option<String>,
    /// Delay before round 0 starts.
    pub intro_delay_ms: u64,
}

/// Broadcast when the guess phase of a round opens.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RoundStart {
    /// Round index starting at 0.
    pub round_index: usize,
    /// Playlist length.
    pub total_rounds: usize,
    /// Media to play.
    pub media_url: String,
    /// Advertised guess duration.
    pub guess_duration_ms: u64,
    /// Room response mode.
    pub response_mode: ResponseMode,
    /// Choice sets for the choice modes.
    pub choices: RoundChoices,
}

/// Song details disclosed at reveal time.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RevealedSong {
    /// Catalog identifier.
    pub song_id: u64,
    /// Entry title.
    pub title: String,
    /// Franchise title.
    pub franchise: String,
    /// Song kind.
    pub song_type: SongType,
    /// Release year.
    pub year: Option<u16>,
}

impl From<&RoundItem> for RevealedSong {
    fn from(item: &RoundItem) -> Self {
        Self {
            song_id: item.song_id,
            title: item.title.clone(),
            franchise: item.franchise.clone(),
            song_type: item.song_type,
            year: item.year,
        }
    }
}

/// One player's round result.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PlayerResult {
    /// Player identifier.
    pub player_id: String,
    /// Locked-in answer.
    pub answer: Option<String>,
    /// Whether it was accepted.
    pub correct: bool,
    /// Points earned.
    pub points: u32,
}

impl From<RoundOutcome> for PlayerResult {
    fn from(outcome: RoundOutcome) -> Self {
        Self {
            player_id: outcome.player_id,
            answer: outcome.answer,
            correct: outcome.correct,
            points: outcome.points,
        }
    }
}

/// Broadcast when a round's guess phase ends.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RoundReveal {
    /// Round index.
    pub round_index: usize,
    /// The answer.
    pub song: RevealedSong,
    /// Per-player results.
    pub results: Vec<PlayerResult>,
    /// Updated roster.
    pub players: Vec<PlayerSummary>,
    /// Reveal length.
    pub reveal_duration_ms: u64,
    /// Media of the next round, for prefetching.
    pub next_media_url: Option<String>,
}

/// Broadcast after every pause or skip vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct VoteUpdate {
    /// Which vote changed.
    pub kind: VoteKind,
    /// Votes cast.
    pub count: usize,
    /// Votes needed.
    pub required: usize,
    /// Whether a pause will happen at the next phase boundary.
    pub pending: bool,
}

/// Broadcast when the room enters or leaves the paused status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PauseState {
    /// Whether the room is paused.
    pub paused: bool,
    /// Round that starts after the pause.
    pub next_round_index: usize,
}

/// Broadcast when a paused room resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResumeCountdown {
    /// Countdown before the next round.
    pub countdown_ms: u64,
    /// Round that starts after the countdown.
    pub next_round_index: usize,
}

/// Broadcast once the playlist is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GameOver {
    /// Identifier of the finished game.
    pub game_id: Uuid,
    /// Final standings and victory metadata.
    pub report: VictoryReport,
    /// Final roster.
    pub players: Vec<PlayerSummary>,
}

/// Broadcast when a game is aborted back to the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoomCancelled {
    /// Human readable reason.
    pub reason: String,
}

/// Free-form message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TextMessage {
    /// Human readable message.
    pub message: String,
}

impl TextMessage {
    /// Wrap a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Broadcast when the host changes the settings.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SettingsUpdated {
    /// New settings.
    pub settings: RoomSettings,
}

/// Current vote counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct VoteTally {
    /// Pause votes.
    pub pause: usize,
    /// Skip votes.
    pub skip: usize,
    /// Votes needed for either quorum.
    pub required: usize,
}

/// Full room state for a client that just (re)connected.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SyncState {
    /// Room code.
    pub room: String,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Current host.
    pub host_id: Option<String>,
    /// Room settings.
    pub settings: RoomSettings,
    /// Roster.
    pub players: Vec<PlayerSummary>,
    /// Playlist length, 0 between games.
    pub total_rounds: usize,
    /// Last started round; `None` during the intro or between games.
    pub round_index: Option<usize>,
    /// Phase detail.
    pub phase: PhaseView,
    /// Whether a pause takes effect at the next boundary.
    pub pause_pending: bool,
    /// Vote counts.
    pub votes: VoteTally,
    /// Final standings while finished.
    pub report: Option<VictoryReport>,
}

/// Sent to a player right after joining.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Welcome {
    /// Identifier assigned to the connection.
    pub player_id: String,
    /// Current room state.
    pub state: SyncState,
}

/// Body of `POST /rooms`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
pub struct CreateRoomRequest {
    /// Initial settings; the configured defaults apply when omitted.
    #[validate(nested)]
    pub settings: Option<RoomSettings>,
}

/// Response of `POST /rooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CreateRoomResponse {
    /// Code players use to join.
    pub code: String,
}
