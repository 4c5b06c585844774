//! Deadline sweep: closes job postings whose application deadline elapsed.
//!
//! Two passes run on every tick. The first executes due `deadline` schedule
//! rows; the second catches any open job past its deadline whether or not a
//! schedule row exists. The close itself is a guarded update, so each job
//! transitions (and is audited) exactly once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{AuditAction, NewAuditEntry};
use crate::store::{Store, StoreError};

pub const DEADLINE_REASON: &str = "application_deadline_passed";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DeadlineSweepStats {
    pub schedules_executed: usize,
    pub closed_by_schedule: usize,
    pub closed_by_catch_all: usize,
    pub failed: usize,
}

impl DeadlineSweepStats {
    pub fn closed(&self) -> usize {
        self.closed_by_schedule + self.closed_by_catch_all
    }
}

/// Closes the job if it is still open and writes one audit entry for the
/// transition. Returns false when the job was already closed or is unknown.
pub async fn close_with_audit(
    store: &dyn Store,
    job_id: Uuid,
    now: DateTime<Utc>,
    reason: &str,
    trigger: &str,
) -> Result<bool, StoreError> {
    if !store.close_job(job_id, now).await? {
        return Ok(false);
    }
    let company_id = match store.job(job_id).await {
        Ok(job) => job.map(|j| j.company_id),
        Err(e) => {
            warn!(%job_id, "Job lookup for audit failed: {e}");
            None
        }
    };
    store
        .append_audit(NewAuditEntry {
            action: AuditAction::JobClosed,
            job_posting_id: Some(job_id),
            company_id,
            metadata: json!({
                "reason": reason,
                "trigger": trigger,
                "closedAt": now.to_rfc3339(),
            }),
        })
        .await?;
    info!(%job_id, reason, trigger, "Job posting closed");
    Ok(true)
}

pub struct DeadlineSweep {
    store: Arc<dyn Store>,
}

impl DeadlineSweep {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> DeadlineSweepStats {
        let mut stats = DeadlineSweepStats::default();
        self.execute_schedules(now, &mut stats).await;
        self.close_overdue(now, &mut stats).await;

        if stats.closed() > 0 || stats.failed > 0 {
            info!(
                schedules_executed = stats.schedules_executed,
                closed_by_schedule = stats.closed_by_schedule,
                closed_by_catch_all = stats.closed_by_catch_all,
                failed = stats.failed,
                "Deadline sweep complete"
            );
        }
        stats
    }

    async fn execute_schedules(&self, now: DateTime<Utc>, stats: &mut DeadlineSweepStats) {
        let schedules = match self.store.due_schedules(now).await {
            Ok(schedules) => schedules,
            Err(e) => {
                error!("Failed to load due schedules: {e}");
                stats.failed += 1;
                return;
            }
        };

        for schedule in schedules {
            let closed = match close_with_audit(
                self.store.as_ref(),
                schedule.job_posting_id,
                now,
                DEADLINE_REASON,
                "schedule",
            )
            .await
            {
                Ok(closed) => closed,
                Err(e) => {
                    // Left unexecuted; the next tick retries it.
                    warn!(schedule_id = %schedule.id, job_id = %schedule.job_posting_id, "Deadline close failed: {e}");
                    stats.failed += 1;
                    continue;
                }
            };
            if closed {
                stats.closed_by_schedule += 1;
            }
            match self.store.mark_schedule_executed(schedule.id).await {
                Ok(true) => stats.schedules_executed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(schedule_id = %schedule.id, "Failed to mark schedule executed: {e}");
                    stats.failed += 1;
                }
            }
        }
    }

    async fn close_overdue(&self, now: DateTime<Utc>, stats: &mut DeadlineSweepStats) {
        let jobs = match self.store.overdue_open_jobs(now).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to load overdue jobs: {e}");
                stats.failed += 1;
                return;
            }
        };

        for job in jobs {
            match close_with_audit(self.store.as_ref(), job.id, now, DEADLINE_REASON, "sweep").await {
                Ok(true) => stats.closed_by_catch_all += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(job_id = %job.id, "Deadline close failed: {e}");
                    stats.failed += 1;
                }
            }
        }
    }
}
