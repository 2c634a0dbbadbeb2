/// Fuzzy answer evaluation.
pub mod answer;
/// OpenAPI documentation generation.
pub mod documentation;
/// Playlist resolution for a starting game.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// HTTP-facing room operations.
pub mod room_service;
/// Per-round scoring rules.
pub mod scoring;
/// Stats collection and persistence at game over.
pub mod stats_service;
/// Background stats-store health polling.
pub mod storage_supervisor;
/// End-of-game rankings and winners.
pub mod victory;
/// WebSocket connection and message handling service.
pub mod websocket_service;
