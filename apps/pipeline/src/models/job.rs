use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ParseEnumError;

/// Lifecycle of a job posting. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Draft,
    Active,
    Closed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Draft => "DRAFT",
            JobStatus::Active => "ACTIVE",
            JobStatus::Closed => "CLOSED",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, JobStatus::Closed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(JobStatus::Draft),
            "ACTIVE" => Ok(JobStatus::Active),
            "CLOSED" => Ok(JobStatus::Closed),
            other => Err(ParseEnumError::new("job status", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPosting {
    pub id: Uuid,
    pub company_id: Uuid,
    /// Short human token candidates put in the mail subject, e.g. `[J1]`.
    pub reference: String,
    pub title: String,
    pub description: String,
    pub responsibilities: Option<String>,
    /// Normalized to lowercase.
    pub required_skills: Vec<String>,
    pub application_deadline: Option<DateTime<Utc>>,
    pub status: JobStatus,
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    pub meeting_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobPosting {
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.application_deadline.is_some_and(|d| d <= now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub hr_email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Deadline,
}

impl ScheduleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleKind::Deadline => "deadline",
        }
    }
}

impl FromStr for ScheduleKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deadline" => Ok(ScheduleKind::Deadline),
            other => Err(ParseEnumError::new("schedule kind", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSchedule {
    pub id: Uuid,
    pub job_posting_id: Uuid,
    pub kind: ScheduleKind,
    pub run_at: DateTime<Utc>,
    pub executed: bool,
    pub payload: Value,
}
