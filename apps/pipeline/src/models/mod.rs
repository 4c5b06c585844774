pub mod application;
pub mod audit;
pub mod job;
pub mod report;

use thiserror::Error;

pub use application::{Application, Decision, InterviewStatus, NewApplication, Prescored};
pub use audit::{AuditAction, NewAuditEntry};
pub use job::{Company, JobPosting, JobSchedule, JobStatus, ScheduleKind};
pub use report::Report;

/// Result of an insert-or-fetch write. `created` is false when the uniqueness
/// constraint matched an existing row and `row` is that existing row.
#[derive(Debug, Clone)]
pub struct Inserted<T> {
    pub row: T,
    pub created: bool,
}

impl<T> Inserted<T> {
    pub fn created(row: T) -> Self {
        Self { row, created: true }
    }

    pub fn existing(row: T) -> Self {
        Self {
            row,
            created: false,
        }
    }
}

/// Raised when a persisted status string is outside its closed set.
#[derive(Debug, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
