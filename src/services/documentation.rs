use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Beat Quiz Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::get_room,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::CreateRoomResponse,
            crate::dto::room::SyncState,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::state::game::RoomSettings,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room creation and inspection"),
        (name = "players", description = "WebSocket protocol spoken by player clients"),
    )
)]
pub struct ApiDoc;
