use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{
        room::{
            GameOver, GameStarted, PauseState, ResumeCountdown, RoomCancelled, RosterUpdate,
            RoundReveal, RoundStart, SettingsUpdated, SyncState, TextMessage, VoteUpdate, Welcome,
        },
        validation::{validate_display_name, validate_room_code},
    },
    state::game::{ResponseMode, RoomSettings},
};

/// First frame a client must send on the player socket.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema, Validate)]
pub struct JoinRequest {
    /// Room code; unknown codes create the room.
    #[validate(custom(function = "validate_room_code"))]
    pub room: String,
    /// Display name.
    #[validate(custom(function = "validate_display_name"))]
    pub name: String,
    /// Avatar reference.
    #[serde(default)]
    #[validate(length(max = 256))]
    pub avatar: Option<String>,
    /// Durable account identifier used for stats and watch lists.
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub account_id: Option<String>,
}

/// Messages accepted from player WebSocket clients.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room; only valid as the first frame.
    Join(JoinRequest),
    /// Host starts a game.
    StartGame,
    /// Answer the current round.
    SubmitAnswer {
        /// Typed answer or picked choice.
        value: String,
        /// Mode the answer was given in.
        mode: ResponseMode,
    },
    /// Toggle a pause vote, or resume a paused room.
    VotePause,
    /// Vote to skip the running phase.
    VoteSkip,
    /// Ask for the full room state.
    RequestSync,
    /// Leave the results screen and go back to the lobby.
    ReturnToLobby,
    /// Host aborts the game.
    CancelGame,
    /// Host ends the running phase.
    ForceEndRound,
    /// Host changes the room settings.
    UpdateSettings {
        /// New settings.
        settings: RoomSettings,
    },
    /// Toggle the lobby ready flag.
    SetReady {
        /// New ready flag.
        ready: bool,
    },
}

impl ClientMessage {
    /// Parse a text frame and validate its payload.
    pub fn from_json_str(text: &str) -> Result<Self, String> {
        let message: Self = serde_json::from_str(text).map_err(|err| err.to_string())?;
        match &message {
            ClientMessage::Join(join) => join.validate().map_err(|err| err.to_string())?,
            ClientMessage::UpdateSettings { settings } => {
                settings.validate().map_err(|err| err.to_string())?
            }
            _ => {}
        }
        Ok(message)
    }
}

/// Messages pushed to player WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to a successful join.
    Welcome(Welcome),
    /// Roster changed.
    Roster(RosterUpdate),
    /// Host changed the settings.
    SettingsUpdated(SettingsUpdated),
    /// A game began.
    GameStarted(GameStarted),
    /// Guess phase opened.
    RoundStart(RoundStart),
    /// Guess phase closed; answer and results.
    RoundReveal(RoundReveal),
    /// Vote tally changed.
    VoteUpdate(VoteUpdate),
    /// Room paused or resumed.
    PauseState(PauseState),
    /// Countdown before play continues.
    ResumeCountdown(ResumeCountdown),
    /// Final standings.
    GameOver(GameOver),
    /// Game aborted back to the lobby.
    RoomCancelled(RoomCancelled),
    /// Informational, non-fatal message.
    Notice(TextMessage),
    /// Human readable error.
    Error(TextMessage),
    /// Full room state, on request.
    SyncState(SyncState),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frame_is_parsed_and_validated() {
        let message =
            ClientMessage::from_json_str(r#"{"type":"join","room":"ABC234","name":"Rei"}"#)
                .unwrap();
        assert_eq!(
            message,
            ClientMessage::Join(JoinRequest {
                room: "ABC234".into(),
                name: "Rei".into(),
                avatar: None,
                account_id: None,
            })
        );

        assert!(ClientMessage::from_json_str(r#"{"type":"join","room":"ABC234","name":""}"#).is_err());
        assert!(ClientMessage::from_json_str(r#"{"type":"join","room":"no!","name":"Rei"}"#).is_err());
    }

    #[test]
    fn answer_frame_carries_mode() {
        let message = ClientMessage::from_json_str(
            r#"{"type":"submit_answer","value":"Evangelion","mode":"four_choice"}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            ClientMessage::SubmitAnswer {
                value: "Evangelion".into(),
                mode: ResponseMode::FourChoice,
            }
        );
    }

    #[test]
    fn unit_frames_parse() {
        assert_eq!(
            ClientMessage::from_json_str(r#"{"type":"vote_skip"}"#).unwrap(),
            ClientMessage::VoteSkip
        );
        assert!(ClientMessage::from_json_str(r#"{"type":"buzz"}"#).is_err());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let err = ClientMessage::from_json_str(
            r#"{"type":"update_settings","settings":{"round_count":0}}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn outbound_messages_are_tagged() {
        let json = serde_json::to_value(ServerMessage::Notice(TextMessage::new("backfilled")))
            .unwrap();
        assert_eq!(json["type"], "notice");
        assert_eq!(json["message"], "backfilled");
    }
}
