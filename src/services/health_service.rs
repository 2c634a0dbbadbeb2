use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the stats store and report whether the service runs degraded.
///
/// Rooms are unaffected by the stats store; only their persisted stats are.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.stats().health_check().await {
        Ok(()) => state.set_degraded(false),
        Err(err) => {
            warn!(error = %err, "stats store health check failed");
            state.set_degraded(true);
        }
    }

    let rooms = state.registry().len();
    if state.is_degraded() {
        HealthResponse::degraded(rooms)
    } else {
        HealthResponse::ok(rooms)
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
        state::{AppState, RoomContext},
    };

    #[tokio::test]
    async fn healthy_store_reports_ok_with_room_count() {
        let ctx = Arc::new(RoomContext {
            provider: Arc::new(CatalogSongProvider::default()),
            watch_lists: Arc::new(StaticWatchLists::default()),
            stats: Arc::new(MemoryStatsStore::new()),
            timings: PhaseTimings::default(),
        });
        let state = AppState::new(&AppConfig::default(), ctx);
        state.set_degraded(true);
        state.registry().create(None);

        let response = health_status(&state).await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.rooms, 1);
        assert!(!state.is_degraded());
    }
}
