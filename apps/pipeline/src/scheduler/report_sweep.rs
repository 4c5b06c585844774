//! Report sweep: generates reports for closed or past-deadline jobs lacking one.
//!
//! A small batch per tick, processed with bounded concurrency. Each job is
//! independent; a failure is logged and retried on a later tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::reports::ReportGenerator;
use crate::store::Store;

pub const MAX_CONCURRENCY: usize = 4;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSweepStats {
    pub due: usize,
    pub generated: usize,
    pub already_present: usize,
    pub failed: usize,
}

pub struct ReportSweep {
    store: Arc<dyn Store>,
    generator: Arc<ReportGenerator>,
    batch_size: i64,
    concurrency: usize,
}

impl ReportSweep {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<ReportGenerator>,
        batch_size: i64,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            generator,
            batch_size: batch_size.max(1),
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> ReportSweepStats {
        let jobs = match self.store.jobs_awaiting_report(now, self.batch_size).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to load jobs awaiting a report: {e}");
                return ReportSweepStats {
                    failed: 1,
                    ..ReportSweepStats::default()
                };
            }
        };
        let mut stats = ReportSweepStats {
            due: jobs.len(),
            ..ReportSweepStats::default()
        };
        if jobs.is_empty() {
            return stats;
        }

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        for job in jobs {
            let generator = self.generator.clone();
            let permits = permits.clone();
            set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (job.id, generator.generate(job.id).await)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(generated))) if generated.created => stats.generated += 1,
                Ok((_, Ok(_))) => stats.already_present += 1,
                Ok((job_id, Err(e))) => {
                    warn!(%job_id, "Report generation failed, will retry next sweep: {e}");
                    stats.failed += 1;
                }
                Err(e) => {
                    error!("Report task aborted: {e}");
                    stats.failed += 1;
                }
            }
        }

        info!(
            due = stats.due,
            generated = stats.generated,
            already_present = stats.already_present,
            failed = stats.failed,
            "Report sweep complete"
        );
        stats
    }
}
