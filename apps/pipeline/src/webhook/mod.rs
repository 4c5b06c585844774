//! Inbound Webhook Receiver: push-based intake of already-scored submissions.
//!
//! Authenticated per job by a shared secret. The insert is keyed on a dedup
//! key so a replayed delivery returns the original row with `created: false`.

pub mod handlers;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Decision, JobPosting, NewApplication, Prescored};
use crate::scoring::heuristic::decision_for_score;
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookPayload {
    pub candidate_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub resume_url: Option<String>,
    pub parsed_resume: Option<Value>,
    pub score: Option<f64>,
    pub status: Option<String>,
    pub reasoning: Option<String>,
    pub external_id: Option<String>,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub received_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookReceipt {
    pub success: bool,
    pub created: bool,
    pub application_id: Uuid,
}

/// 404 for an unknown job, 401 for a missing or wrong secret.
pub async fn authorize(
    store: &dyn Store,
    job_id: Uuid,
    presented_secret: Option<&str>,
) -> Result<JobPosting, AppError> {
    let job = store
        .job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job posting {job_id} not found")))?;
    authenticate(&job, presented_secret)?;
    Ok(job)
}

pub async fn accept(
    store: &dyn Store,
    job: &JobPosting,
    payload: WebhookPayload,
) -> Result<WebhookReceipt, AppError> {
    let new = validate(job, payload)?;
    let inserted = store.insert_external_application(new).await?;

    info!(
        job_id = %job.id,
        application_id = %inserted.row.id,
        created = inserted.created,
        "Webhook application received"
    );
    Ok(WebhookReceipt {
        success: true,
        created: inserted.created,
        application_id: inserted.row.id,
    })
}

fn authenticate(job: &JobPosting, presented: Option<&str>) -> Result<(), AppError> {
    let Some(expected) = job.webhook_secret.as_deref().filter(|s| !s.is_empty()) else {
        warn!(job_id = %job.id, "Webhook call for a job without a secret");
        return Err(AppError::Unauthorized);
    };
    match presented {
        Some(presented) if constant_time_eq(expected.as_bytes(), presented.as_bytes()) => Ok(()),
        _ => {
            warn!(job_id = %job.id, "Webhook secret mismatch");
            Err(AppError::Unauthorized)
        }
    }
}

/// Length leaks, contents do not.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn validate(job: &JobPosting, payload: WebhookPayload) -> Result<NewApplication, AppError> {
    let email = non_empty(payload.email.as_deref())
        .ok_or_else(|| AppError::Validation("email is required".to_string()))?;
    if !is_plausible_email(email) {
        return Err(AppError::Validation(format!("'{email}' is not a valid email")));
    }

    if let Some(score) = payload.score {
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(AppError::Validation("score must be between 0 and 100".to_string()));
        }
    }
    let decision = match non_empty(payload.status.as_deref()) {
        Some(status) => Some(status.parse::<Decision>().map_err(|_| {
            AppError::Validation(format!("status must be SHORTLIST, FLAG or REJECT, got '{status}'"))
        })?),
        None => payload.score.map(decision_for_score),
    };

    let name = non_empty(payload.candidate_name.as_deref())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email));
    let mut new = NewApplication::new(job.id, email, name);
    new.external_id = Some(dedup_key(job, &new.candidate_email, &payload));
    new.phone = non_empty(payload.phone.as_deref()).map(str::to_string);
    new.resume_url = non_empty(payload.resume_url.as_deref()).map(str::to_string);
    new.resume_data = payload.parsed_resume;
    new.prescored = decision.map(|decision| Prescored {
        score: payload.score,
        decision,
        reasoning: non_empty(payload.reasoning.as_deref()).map(str::to_string),
    });
    Ok(new)
}

/// Caller's external id, else the message id, else a name-based UUID over the
/// submission's identifying fields.
pub fn dedup_key(job: &JobPosting, email: &str, payload: &WebhookPayload) -> String {
    if let Some(id) = non_empty(payload.external_id.as_deref()) {
        return id.to_string();
    }
    if let Some(id) = non_empty(payload.message_id.as_deref()) {
        return id.to_string();
    }
    let material = format!(
        "{}|{}|{}|{}|{}",
        job.company_id,
        job.id,
        email,
        payload.subject.as_deref().unwrap_or_default().trim(),
        payload.received_at.as_deref().unwrap_or_default().trim(),
    );
    format!("derived:{}", Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes()))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}
