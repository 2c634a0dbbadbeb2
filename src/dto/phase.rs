use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::room::RevealedSong,
    state::game::{ResponseMode, RoundChoices},
};

/// Where a room currently is inside its game, shaped for a (re)connecting client.
///
/// Timed phases carry both the elapsed and the total duration so a client can
/// rebuild its countdown.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PhaseView {
    /// Between games.
    Lobby,
    /// The host started a game and the playlist is being resolved.
    Starting,
    /// Intro delay before round 0.
    Intro {
        /// Time already spent in the intro.
        elapsed_ms: u64,
        /// Total intro length.
        duration_ms: u64,
        /// Media of round 0, for prefetching.
        first_media_url: Option<String>,
    },
    /// Choices for the next round are being prepared.
    Loading {
        /// Round being prepared.
        round_index: usize,
    },
    /// Players may answer.
    Guess {
        /// Current round.
        round_index: usize,
        /// Media being played.
        media_url: String,
        /// Room response mode.
        response_mode: ResponseMode,
        /// Choice sets for the choice modes.
        choices: RoundChoices,
        /// Time already spent guessing.
        elapsed_ms: u64,
        /// Advertised guess duration.
        duration_ms: u64,
    },
    /// The answer is shown.
    Reveal {
        /// Current round.
        round_index: usize,
        /// Revealed song.
        song: RevealedSong,
        /// Time already spent in the reveal.
        elapsed_ms: u64,
        /// Reveal length.
        duration_ms: u64,
        /// Media of the next round, for prefetching.
        next_media_url: Option<String>,
    },
    /// The game is suspended between two rounds.
    Paused {
        /// Round that will start after the resume.
        next_round_index: usize,
    },
    /// Countdown after a resume.
    Resuming {
        /// Round that will start after the countdown.
        next_round_index: usize,
        /// Time already spent in the countdown.
        elapsed_ms: u64,
        /// Countdown length.
        duration_ms: u64,
    },
    /// Results are shown until every player returns to the lobby.
    Finished,
}
