use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::state::SharedState;

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll the stats store forever, keeping the shared degraded flag current.
///
/// Healthy stores are polled every few seconds; failing ones are retried with
/// exponential backoff. Games keep running either way, only their stats are lost.
pub async fn run(state: SharedState) {
    let mut delay = INITIAL_DELAY;

    loop {
        if check_once(&state).await {
            delay = INITIAL_DELAY;
            sleep(HEALTH_POLL_INTERVAL).await;
        } else {
            sleep(delay).await;
            delay = (delay * 2).min(MAX_DELAY);
        }
    }
}

/// Run one health check and record its outcome. Returns whether the store is healthy.
async fn check_once(state: &SharedState) -> bool {
    match state.stats().health_check().await {
        Ok(()) => {
            debug!("stats store healthy");
            state.set_degraded(false);
            true
        }
        Err(err) => {
            warn!(error = %err, "stats store health check failed");
            state.set_degraded(true);
            false
        }
    }
}
