//! Background reservation reaper.

use std::sync::Arc;
use std::time::Duration;

use store::CommerceStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// Runs a reaper pass every `period` until `shutdown` flips or its sender drops.
///
/// Returns `None` when `period` is zero, which disables the task.
pub fn spawn_reaper<S: CommerceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if period.is_zero() {
        tracing::info!("background reaper disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period_secs = period.as_secs_f64(), "background reaper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = state.reaper.release_expired(state.reaper_batch_limit).await {
                        tracing::error!(error = %e, "reaper pass failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("background reaper stopped");
    }))
}
