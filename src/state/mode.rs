//! Game-mode strategy plugged into [`Room`](crate::state::room::Room).

use crate::{
    error::ServiceError,
    services::{
        answer, scoring,
        victory::{self, VictoryReport},
    },
    state::{
        game::{ResponseMode, RoomSettings, RoundItem},
        player::{Player, Roster},
    },
};

/// Longest answer accepted from a client.
pub const MAX_ANSWER_LENGTH: usize = 200;

/// Outcome of one player's round, sent with the reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Player identifier.
    pub player_id: String,
    /// Locked-in answer, `None` when the player never answered.
    pub answer: Option<String>,
    /// Whether the answer was accepted.
    pub correct: bool,
    /// Points earned this round.
    pub points: u32,
}

/// Mode-specific rules of a room: answer intake, scoring and victory.
pub trait ModeStrategy: Send + Sync + 'static {
    /// Record a submitted answer on `player`.
    fn handle_answer(
        &self,
        settings: &RoomSettings,
        player: &mut Player,
        value: &str,
        claimed_mode: ResponseMode,
    ) -> Result<(), ServiceError>;

    /// Score every player once the guess phase of `item` is over.
    fn on_round_end(
        &self,
        settings: &RoomSettings,
        item: &RoundItem,
        roster: &mut Roster,
    ) -> Vec<RoundOutcome>;

    /// Compute the final standings once the playlist is exhausted.
    fn check_victory(&self, settings: &RoomSettings, roster: &Roster, rounds: usize)
    -> VictoryReport;
}

/// Standard rules: fuzzy free-text or multiple-choice answers, fixed points
/// per mode, solo threshold or podium.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicMode;

impl ModeStrategy for ClassicMode {
    fn handle_answer(
        &self,
        settings: &RoomSettings,
        player: &mut Player,
        value: &str,
        claimed_mode: ResponseMode,
    ) -> Result<(), ServiceError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ServiceError::InvalidInput("answer must not be empty".into()));
        }
        if value.chars().count() > MAX_ANSWER_LENGTH {
            return Err(ServiceError::InvalidInput(format!(
                "answer must be at most {MAX_ANSWER_LENGTH} characters"
            )));
        }

        player.answer = Some(value.to_string());
        player.answer_mode = Some(claimed_mode.capped_by(settings.response_mode));
        Ok(())
    }

    fn on_round_end(
        &self,
        settings: &RoomSettings,
        item: &RoundItem,
        roster: &mut Roster,
    ) -> Vec<RoundOutcome> {
        let accepted = item.accepted_answers(settings.precision);

        roster
            .iter_mut()
            .map(|player| {
                let correct = answer::is_correct(player.answer.as_deref(), &accepted);
                let mode = player.answer_mode.unwrap_or(settings.response_mode);
                let points = scoring::points(mode, correct);
                player.record_round(correct, points);
                player.songs_seen.push(item.song_id);

                RoundOutcome {
                    player_id: player.id.clone(),
                    answer: player.answer.clone(),
                    correct,
                    points,
                }
            })
            .collect()
    }

    fn check_victory(
        &self,
        settings: &RoomSettings,
        roster: &Roster,
        rounds: usize,
    ) -> VictoryReport {
        victory::evaluate(roster.iter(), settings, rounds)
    }
}
