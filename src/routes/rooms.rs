use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::room::{CreateRoomRequest, CreateRoomResponse, SyncState},
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Routes for opening and inspecting rooms.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{code}", get(get_room))
}

/// Open a room under a fresh join code.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = CreateRoomResponse),
        (status = 400, description = "Invalid settings")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Json<CreateRoomResponse> {
    Json(room_service::create_room(&state, payload))
}

/// Current state of a live room.
#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Join code of the room")),
    responses(
        (status = 200, description = "Room state", body = SyncState),
        (status = 404, description = "No such room")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SyncState>, AppError> {
    let sync = room_service::room_state(&state, &code).await?;
    Ok(Json(sync))
}
