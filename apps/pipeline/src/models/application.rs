use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ParseEnumError;

/// Tri-state scoring outcome. An unscored application carries `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Shortlist,
    Flag,
    Reject,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Shortlist => "SHORTLIST",
            Decision::Flag => "FLAG",
            Decision::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive, so `"shortlist"` from a model or webhook is accepted.
impl FromStr for Decision {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHORTLIST" => Ok(Decision::Shortlist),
            "FLAG" => Ok(Decision::Flag),
            "REJECT" => Ok(Decision::Reject),
            _ => Err(ParseEnumError::new("decision", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterviewStatus {
    #[serde(rename = "NONE")]
    Unscheduled,
    #[serde(rename = "SCHEDULED")]
    Scheduled,
}

impl InterviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InterviewStatus::Unscheduled => "NONE",
            InterviewStatus::Scheduled => "SCHEDULED",
        }
    }
}

impl FromStr for InterviewStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(InterviewStatus::Unscheduled),
            "SCHEDULED" => Ok(InterviewStatus::Scheduled),
            other => Err(ParseEnumError::new("interview status", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Application {
    pub id: Uuid,
    pub job_posting_id: Uuid,
    pub candidate_email: String,
    pub candidate_name: String,
    pub phone: Option<String>,
    pub resume_url: Option<String>,
    pub resume_data: Option<Value>,
    pub ai_score: Option<f64>,
    pub ai_status: Option<Decision>,
    pub reasoning: Option<String>,
    pub interview_time: Option<DateTime<Utc>>,
    pub interview_link: Option<String>,
    pub interview_status: InterviewStatus,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn is_unscored(&self) -> bool {
        self.ai_status.is_none()
    }
}

/// A decision computed upstream and delivered through the webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct Prescored {
    pub score: Option<f64>,
    pub decision: Decision,
    pub reasoning: Option<String>,
}

/// Insert payload shared by the mailbox and webhook paths.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub job_posting_id: Uuid,
    pub candidate_email: String,
    pub candidate_name: String,
    pub phone: Option<String>,
    pub resume_url: Option<String>,
    pub resume_data: Option<Value>,
    pub external_id: Option<String>,
    pub prescored: Option<Prescored>,
}

impl NewApplication {
    pub fn new(job_posting_id: Uuid, candidate_email: &str, candidate_name: &str) -> Self {
        Self {
            job_posting_id,
            candidate_email: normalize_email(candidate_email),
            candidate_name: candidate_name.trim().to_string(),
            phone: None,
            resume_url: None,
            resume_data: None,
            external_id: None,
            prescored: None,
        }
    }
}

/// Dedup keys compare emails case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
