use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::engine::{dispatch, quotes};
use crate::state::AppState;

/// Periodic safety net behind the lazy expiry checks: proactively closes
/// stale dispatch entries and quote windows nobody has touched.
pub async fn run_expiry_sweep(state: Arc<AppState>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "expiry sweep started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let now = Utc::now();
        let dispatch_closed = dispatch::expire_stale(&state, now);
        let quotes_closed = quotes::expire_stale(&state, now);

        if dispatch_closed > 0 {
            state
                .metrics
                .sweep_closed_total
                .with_label_values(&["dispatch"])
                .inc_by(dispatch_closed as u64);
        }
        if quotes_closed > 0 {
            state
                .metrics
                .sweep_closed_total
                .with_label_values(&["quote"])
                .inc_by(quotes_closed as u64);
        }

        if dispatch_closed + quotes_closed > 0 {
            info!(dispatch_closed, quotes_closed, "expiry sweep closed stale entries");
        }
    }
}
