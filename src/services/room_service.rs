use std::time::Duration;

use tokio::time::interval;
use tracing::info;

use crate::{
    dto::room::{CreateRoomRequest, CreateRoomResponse, SyncState},
    dto::validation::normalize_room_code,
    error::ServiceError,
    state::SharedState,
};

/// Open a room under a fresh code. Players join it over the WebSocket.
pub fn create_room(state: &SharedState, request: CreateRoomRequest) -> CreateRoomResponse {
    let room = state.registry().create(request.settings);
    info!(room = %room.code(), "room opened over http");
    CreateRoomResponse {
        code: room.code().to_string(),
    }
}

/// How long a room created over HTTP may stay without players.
pub const ABANDONED_ROOM_GRACE: Duration = Duration::from_secs(5 * 60);
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically drop rooms nobody joined within [`ABANDONED_ROOM_GRACE`].
pub async fn run_room_reaper(state: SharedState) {
    let mut ticker = interval(REAP_INTERVAL);
    loop {
        ticker.tick().await;
        state.registry().reap_abandoned(ABANDONED_ROOM_GRACE);
    }
}

/// Snapshot of a live room.
pub async fn room_state(state: &SharedState, code: &str) -> Result<SyncState, ServiceError> {
    match state.registry().get(code) {
        Some(room) if !room.is_closed() => Ok(room.sync_state().await),
        _ => Err(ServiceError::NotFound(format!(
            "room `{}` not found",
            normalize_room_code(code)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::{AppConfig, PhaseTimings},
        dao::{
            song_provider::CatalogSongProvider, stats_store::MemoryStatsStore,
            watch_list::StaticWatchLists,
        },
        state::{AppState, RoomContext, game::RoomSettings},
    };

    fn state() -> SharedState {
        let ctx = Arc::new(RoomContext {
            provider: Arc::new(CatalogSongProvider::default()),
            watch_lists: Arc::new(StaticWatchLists::default()),
            stats: Arc::new(MemoryStatsStore::new()),
            timings: PhaseTimings::default(),
        });
        AppState::new(&AppConfig::default(), ctx)
    }

    #[tokio::test]
    async fn created_room_is_visible_with_its_settings() {
        let state = state();
        let settings = RoomSettings {
            round_count: 3,
            ..RoomSettings::default()
        };
        let created = create_room(
            &state,
            CreateRoomRequest {
                settings: Some(settings.clone()),
            },
        );

        let sync = room_state(&state, &created.code.to_lowercase()).await.unwrap();
        assert_eq!(sync.room, created.code);
        assert_eq!(sync.settings, settings);
        assert!(sync.players.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_forgets_rooms_created_but_never_joined() {
        let state = state();
        let created = create_room(&state, CreateRoomRequest::default());
        let reaper = tokio::spawn(run_room_reaper(state.clone()));

        tokio::time::sleep(ABANDONED_ROOM_GRACE + REAP_INTERVAL * 2).await;
        assert!(state.registry().is_empty());
        let err = room_state(&state, &created.code).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        reaper.abort();
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let err = room_state(&state(), "zzz999").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(message) if message.contains("ZZZ999")));
    }
}
