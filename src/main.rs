//! Beat Quiz Back binary entrypoint wiring the room registry, REST and WebSocket layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beat_quiz_back::{
    config::AppConfig,
    dao::{
        song_provider::CatalogSongProvider,
        stats_store::{MemoryStatsStore, StatsStore},
        watch_list::StaticWatchLists,
    },
    routes,
    services::{room_service, storage_supervisor},
    state::{AppState, RoomContext, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();

    let provider = match CatalogSongProvider::load(config.catalog_path()) {
        Ok(provider) => {
            info!(songs = provider.len(), path = %config.catalog_path().display(), "song catalog loaded");
            provider
        }
        Err(err) => {
            warn!(error = %err, "failed to load song catalog; starting with an empty one");
            CatalogSongProvider::default()
        }
    };

    let ctx = Arc::new(RoomContext {
        provider: Arc::new(provider),
        watch_lists: Arc::new(StaticWatchLists::new(config.watch_lists())),
        stats: build_stats_store(),
        timings: config.timings(),
    });
    let app_state = AppState::new(&config, ctx);

    tokio::spawn(storage_supervisor::run(app_state.clone()));
    tokio::spawn(room_service::run_room_reaper(app_state.clone()));
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the stats backend: CouchDB when configured, in-memory otherwise.
#[cfg(feature = "couch-store")]
fn build_stats_store() -> Arc<dyn StatsStore> {
    use beat_quiz_back::dao::stats_store::couchdb::{CouchConfig, CouchStatsStore};

    match CouchConfig::from_env().and_then(CouchStatsStore::new) {
        Ok(store) => {
            info!("using CouchDB stats store");
            Arc::new(store)
        }
        Err(err) => {
            warn!(error = %err, "CouchDB stats store not configured; keeping stats in memory");
            Arc::new(MemoryStatsStore::new())
        }
    }
}

/// Pick the stats backend: CouchDB when configured, in-memory otherwise.
#[cfg(not(feature = "couch-store"))]
fn build_stats_store() -> Arc<dyn StatsStore> {
    info!("keeping stats in memory");
    Arc::new(MemoryStatsStore::new())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
