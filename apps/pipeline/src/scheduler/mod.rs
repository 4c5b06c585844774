//! Fixed-interval sweeps.
//!
//! Each sweep type runs in its own loop task. A tick is spawned and awaited
//! before the next one is allowed, so a sweep never overlaps with itself,
//! while different sweep types run independently.

pub mod deadline;
pub mod report_sweep;

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub use deadline::{close_with_audit, DeadlineSweep};
pub use report_sweep::ReportSweep;

pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!(sweep = name, period_secs = period.as_secs(), "Sweep scheduled");
        let mut interval = tokio::time::interval(period);
        // A slow tick delays the next one instead of triggering a burst.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let started = Instant::now();
            // Spawned so a panicking tick is contained and the loop survives.
            match tokio::spawn(tick()).await {
                Ok(()) => debug!(
                    sweep = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Sweep tick finished"
                ),
                Err(e) => error!(sweep = name, "Sweep tick aborted: {e}"),
            }
        }
    })
}
