use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// At most one per job posting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub job_posting_id: Uuid,
    pub report_url: String,
    pub created_at: DateTime<Utc>,
}
