use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Number of rooms currently alive.
    pub rooms: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(rooms: usize) -> Self {
        Self {
            status: "ok".to_string(),
            rooms,
        }
    }

    /// Create a health response indicating the stats store is unreachable.
    pub fn degraded(rooms: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            rooms,
        }
    }
}
