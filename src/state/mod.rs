pub mod game;
mod hub;
pub mod mode;
pub mod player;
pub mod registry;
pub mod room;
pub mod state_machine;
pub mod timer;
pub mod votes;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::{config::AppConfig, dao::stats_store::StatsStore, state::mode::ClassicMode};

pub use self::registry::RoomRegistry;
pub use self::room::{Room, RoomContext, StartOutcome};
pub use self::state_machine::{AbortError, ApplyError, PlanError};

pub type SharedState = Arc<AppState>;

/// Central application state: the room registry and the stats-store health flag.
pub struct AppState {
    registry: RoomRegistry,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: &AppConfig, ctx: Arc<RoomContext>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        let registry = RoomRegistry::new(ctx, ClassicMode, config.default_settings().clone());
        Arc::new(Self {
            registry,
            degraded: degraded_tx,
        })
    }

    /// Rooms alive in this process.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Long-term stats store shared by every room.
    pub fn stats(&self) -> Arc<dyn StatsStore> {
        self.registry.context().stats.clone()
    }

    /// Whether the stats store is currently unreachable.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Record the outcome of a stats-store health check.
    pub fn set_degraded(&self, degraded: bool) {
        let changed = self.degraded.send_if_modified(|current| {
            if *current == degraded {
                return false;
            }
            *current = degraded;
            true
        });
        if changed {
            if degraded {
                warn!("stats store unreachable; entering degraded mode");
            } else {
                info!("stats store reachable; leaving degraded mode");
            }
        }
    }
}
