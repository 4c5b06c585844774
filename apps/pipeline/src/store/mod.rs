//! Persistence seam for the pipeline.
//!
//! Every coordination rule (no double insert, no double scoring, no double
//! close, one report per job) is a single conditional statement behind one of
//! these methods. Callers never check-then-act.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Application, Company, Decision, Inserted, JobPosting, JobSchedule, NewApplication,
    NewAuditEntry, ParseEnumError, Report,
};

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(#[from] ParseEnumError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Decision write for an application that is still unscored.
#[derive(Debug, Clone)]
pub struct DecisionWrite {
    pub score: f64,
    pub decision: Decision,
    pub reasoning: String,
    pub resume_data: Option<serde_json::Value>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn job(&self, job_id: Uuid) -> Result<Option<JobPosting>, StoreError>;

    /// Resolves a subject token against the job reference (case-insensitive) or its id.
    async fn job_by_token(&self, token: &str) -> Result<Option<JobPosting>, StoreError>;

    async fn company(&self, company_id: Uuid) -> Result<Option<Company>, StoreError>;

    /// Insert keyed on (job_posting_id, candidate_email); on conflict returns the existing row.
    async fn insert_application(
        &self,
        new: NewApplication,
    ) -> Result<Inserted<Application>, StoreError>;

    /// Insert keyed on (job, external_id) or (job, email); on conflict returns the existing row.
    async fn insert_external_application(
        &self,
        new: NewApplication,
    ) -> Result<Inserted<Application>, StoreError>;

    /// Writes the decision only while `ai_status IS NULL`. Returns true for the winning writer.
    async fn record_decision(
        &self,
        application_id: Uuid,
        write: &DecisionWrite,
    ) -> Result<bool, StoreError>;

    /// Sets `resume_url` only while it is still NULL. Returns true when this call set it.
    async fn attach_resume(&self, application_id: Uuid, url: &str) -> Result<bool, StoreError>;

    /// Moves `interview_status` from NONE to SCHEDULED. Returns false if already scheduled.
    async fn schedule_interview(
        &self,
        application_id: Uuid,
        link: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;

    async fn applications_for_job(&self, job_id: Uuid) -> Result<Vec<Application>, StoreError>;

    /// Unexecuted deadline schedules whose `run_at` has passed.
    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<JobSchedule>, StoreError>;

    async fn mark_schedule_executed(&self, schedule_id: Uuid) -> Result<bool, StoreError>;

    /// Closes the job unless it is already CLOSED. Returns true only for the transition.
    async fn close_job(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// DRAFT/ACTIVE jobs whose deadline has passed.
    async fn overdue_open_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobPosting>, StoreError>;

    /// Jobs that are closed or past deadline and have no report yet, oldest deadline first.
    async fn jobs_awaiting_report(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<JobPosting>, StoreError>;

    async fn report_for_job(&self, job_id: Uuid) -> Result<Option<Report>, StoreError>;

    /// Insert-or-fetch on the per-job uniqueness of reports.
    async fn insert_report(
        &self,
        job_id: Uuid,
        report_url: &str,
    ) -> Result<Inserted<Report>, StoreError>;

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError>;
}
