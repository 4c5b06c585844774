//! In-memory doubles for every external collaborator.
//!
//! `MemoryStore` applies the same conditional-write rules as the SQL in
//! `PgStore`, so the pipeline's idempotency guarantees can be exercised
//! without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::ingestion::mailbox::{Mailbox, MailboxError, RawMessage};
use crate::llm_client::{CompletionModel, LlmError};
use crate::models::{
    Application, Company, Decision, Inserted, InterviewStatus, JobPosting, JobSchedule, JobStatus,
    NewApplication, NewAuditEntry, Report, ScheduleKind,
};
use crate::notify::{MailError, Mailer, OutboundEmail};
use crate::reports::ReportGenerator;
use crate::state::AppState;
use crate::storage::{BlobStore, StorageError};
use crate::store::{DecisionWrite, Store, StoreError};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn company(name: &str, hr_email: Option<&str>) -> Company {
    Company {
        id: Uuid::new_v4(),
        name: name.to_string(),
        hr_email: hr_email.map(str::to_string),
    }
}

/// An ACTIVE job with no deadline, requiring rust and postgresql.
pub fn job_posting(company_id: Uuid, reference: &str) -> JobPosting {
    let now = Utc::now();
    JobPosting {
        id: Uuid::new_v4(),
        company_id,
        reference: reference.to_string(),
        title: "Backend Engineer".to_string(),
        description: "Build the ingestion services".to_string(),
        responsibilities: None,
        required_skills: vec!["rust".to_string(), "postgresql".to_string()],
        application_deadline: None,
        status: JobStatus::Active,
        webhook_secret: Some("s3cret".to_string()),
        meeting_link: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn deadline_schedule(job_id: Uuid, run_at: DateTime<Utc>) -> JobSchedule {
    JobSchedule {
        id: Uuid::new_v4(),
        job_posting_id: job_id,
        kind: ScheduleKind::Deadline,
        run_at,
        executed: false,
        payload: json!({}),
    }
}

/// An application against a fresh job id; see [`application_for`].
pub fn application(email: &str, scored: Option<(f64, Decision)>) -> Application {
    application_for(Uuid::new_v4(), email, scored)
}

/// A stored application named after the email's local part.
pub fn application_for(job_id: Uuid, email: &str, scored: Option<(f64, Decision)>) -> Application {
    let now = Utc::now();
    let name = email.split('@').next().unwrap_or(email).to_string();
    Application {
        id: Uuid::new_v4(),
        job_posting_id: job_id,
        candidate_email: email.to_string(),
        candidate_name: name,
        phone: None,
        resume_url: None,
        resume_data: None,
        ai_score: scored.map(|(score, _)| score),
        ai_status: scored.map(|(_, decision)| decision),
        reasoning: scored.map(|(score, decision)| format!("{decision} at {score}")),
        interview_time: None,
        interview_link: None,
        interview_status: InterviewStatus::Unscheduled,
        external_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// Router state over `store` with in-memory blobs, a recording mailer and no model.
pub fn app_state(store: Arc<MemoryStore>) -> AppState {
    let reports = ReportGenerator::new(
        store.clone(),
        Arc::new(MemoryBlobStore::default()),
        Arc::new(RecordingMailer::default()),
        None,
        "hr@example.com".to_string(),
    );
    AppState {
        store,
        reports: Arc::new(reports),
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// An audit row as `MemoryStore` records it.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub job_posting_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    companies: HashMap<Uuid, Company>,
    jobs: HashMap<Uuid, JobPosting>,
    applications: Vec<Application>,
    schedules: Vec<JobSchedule>,
    reports: Vec<Report>,
    audits: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_inserts: Mutex<bool>,
}

impl MemoryStore {
    pub fn add_company(&self, company: Company) {
        self.lock().companies.insert(company.id, company);
    }

    pub fn add_job(&self, job: JobPosting) {
        self.lock().jobs.insert(job.id, job);
    }

    pub fn add_schedule(&self, schedule: JobSchedule) {
        self.lock().schedules.push(schedule);
    }

    /// Seeds an application directly, bypassing the insert path.
    pub fn add_application(&self, app: Application) {
        self.lock().applications.push(app);
    }

    /// Makes every application insert fail as if the database were down.
    pub fn fail_inserts(&self, fail: bool) {
        *self.fail_inserts.lock().unwrap() = fail;
    }

    pub fn job_snapshot(&self, job_id: Uuid) -> Option<JobPosting> {
        self.lock().jobs.get(&job_id).cloned()
    }

    pub fn applications(&self) -> Vec<Application> {
        self.lock().applications.clone()
    }

    pub fn schedules(&self) -> Vec<JobSchedule> {
        self.lock().schedules.clone()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.lock().reports.clone()
    }

    pub fn audits(&self) -> Vec<AuditEntry> {
        self.lock().audits.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    fn check_inserts(&self) -> Result<(), StoreError> {
        if *self.fail_inserts.lock().unwrap() {
            return Err(StoreError::Unavailable("insert disabled".to_string()));
        }
        Ok(())
    }

    fn materialize(new: NewApplication) -> Application {
        let now = Utc::now();
        let (ai_score, ai_status, reasoning) = match new.prescored {
            Some(p) => (p.score, Some(p.decision), p.reasoning),
            None => (None, None, None),
        };
        Application {
            id: Uuid::new_v4(),
            job_posting_id: new.job_posting_id,
            candidate_email: new.candidate_email,
            candidate_name: new.candidate_name,
            phone: new.phone,
            resume_url: new.resume_url,
            resume_data: new.resume_data,
            ai_score,
            ai_status,
            reasoning,
            interview_time: None,
            interview_link: None,
            interview_status: InterviewStatus::Unscheduled,
            external_id: new.external_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn job(&self, job_id: Uuid) -> Result<Option<JobPosting>, StoreError> {
        Ok(self.lock().jobs.get(&job_id).cloned())
    }

    async fn job_by_token(&self, token: &str) -> Result<Option<JobPosting>, StoreError> {
        let id = Uuid::parse_str(token).ok();
        Ok(self
            .lock()
            .jobs
            .values()
            .find(|j| j.reference.eq_ignore_ascii_case(token) || Some(j.id) == id)
            .cloned())
    }

    async fn company(&self, company_id: Uuid) -> Result<Option<Company>, StoreError> {
        Ok(self.lock().companies.get(&company_id).cloned())
    }

    async fn insert_application(
        &self,
        new: NewApplication,
    ) -> Result<Inserted<Application>, StoreError> {
        self.check_inserts()?;
        let mut tables = self.lock();
        if let Some(existing) = tables.applications.iter().find(|a| {
            a.job_posting_id == new.job_posting_id && a.candidate_email == new.candidate_email
        }) {
            return Ok(Inserted::existing(existing.clone()));
        }
        let app = Self::materialize(new);
        tables.applications.push(app.clone());
        Ok(Inserted::created(app))
    }

    async fn insert_external_application(
        &self,
        new: NewApplication,
    ) -> Result<Inserted<Application>, StoreError> {
        self.check_inserts()?;
        let mut tables = self.lock();
        let existing = tables
            .applications
            .iter()
            .find(|a| {
                new.external_id.is_some()
                    && a.job_posting_id == new.job_posting_id
                    && a.external_id == new.external_id
            })
            .or_else(|| {
                tables.applications.iter().find(|a| {
                    a.job_posting_id == new.job_posting_id
                        && a.candidate_email == new.candidate_email
                })
            });
        if let Some(existing) = existing {
            return Ok(Inserted::existing(existing.clone()));
        }
        let app = Self::materialize(new);
        tables.applications.push(app.clone());
        Ok(Inserted::created(app))
    }

    async fn record_decision(
        &self,
        application_id: Uuid,
        write: &DecisionWrite,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let Some(app) = tables
            .applications
            .iter_mut()
            .find(|a| a.id == application_id && a.ai_status.is_none())
        else {
            return Ok(false);
        };
        app.ai_score = Some(write.score);
        app.ai_status = Some(write.decision);
        app.reasoning = Some(write.reasoning.clone());
        if write.resume_data.is_some() {
            app.resume_data = write.resume_data.clone();
        }
        app.updated_at = Utc::now();
        Ok(true)
    }

    async fn attach_resume(&self, application_id: Uuid, url: &str) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let Some(app) = tables
            .applications
            .iter_mut()
            .find(|a| a.id == application_id && a.resume_url.is_none())
        else {
            return Ok(false);
        };
        app.resume_url = Some(url.to_string());
        app.updated_at = Utc::now();
        Ok(true)
    }

    async fn schedule_interview(
        &self,
        application_id: Uuid,
        link: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let Some(app) = tables.applications.iter_mut().find(|a| {
            a.id == application_id && a.interview_status == InterviewStatus::Unscheduled
        }) else {
            return Ok(false);
        };
        app.interview_status = InterviewStatus::Scheduled;
        app.interview_link = Some(link.to_string());
        app.interview_time = at;
        Ok(true)
    }

    async fn applications_for_job(&self, job_id: Uuid) -> Result<Vec<Application>, StoreError> {
        Ok(self
            .lock()
            .applications
            .iter()
            .filter(|a| a.job_posting_id == job_id)
            .cloned()
            .collect())
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<JobSchedule>, StoreError> {
        Ok(self
            .lock()
            .schedules
            .iter()
            .filter(|s| !s.executed && s.kind == ScheduleKind::Deadline && s.run_at <= now)
            .cloned()
            .collect())
    }

    async fn mark_schedule_executed(&self, schedule_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables
            .schedules
            .iter_mut()
            .find(|s| s.id == schedule_id && !s.executed)
        {
            Some(s) => {
                s.executed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close_job(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables.jobs.get_mut(&job_id) {
            Some(job) if !job.status.is_closed() => {
                job.status = JobStatus::Closed;
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn overdue_open_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobPosting>, StoreError> {
        Ok(self
            .lock()
            .jobs
            .values()
            .filter(|j| !j.status.is_closed() && j.deadline_passed(now))
            .cloned()
            .collect())
    }

    async fn jobs_awaiting_report(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<JobPosting>, StoreError> {
        let tables = self.lock();
        let mut due: Vec<JobPosting> = tables
            .jobs
            .values()
            .filter(|j| j.status.is_closed() || j.deadline_passed(now))
            .filter(|j| !tables.reports.iter().any(|r| r.job_posting_id == j.id))
            .cloned()
            .collect();
        due.sort_by_key(|j| (j.application_deadline.is_none(), j.application_deadline));
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn report_for_job(&self, job_id: Uuid) -> Result<Option<Report>, StoreError> {
        Ok(self
            .lock()
            .reports
            .iter()
            .find(|r| r.job_posting_id == job_id)
            .cloned())
    }

    async fn insert_report(
        &self,
        job_id: Uuid,
        report_url: &str,
    ) -> Result<Inserted<Report>, StoreError> {
        let mut tables = self.lock();
        if let Some(existing) = tables.reports.iter().find(|r| r.job_posting_id == job_id) {
            return Ok(Inserted::existing(existing.clone()));
        }
        let report = Report {
            id: Uuid::new_v4(),
            job_posting_id: job_id,
            report_url: report_url.to_string(),
            created_at: Utc::now(),
        };
        tables.reports.push(report.clone());
        Ok(Inserted::created(report))
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError> {
        self.lock().audits.push(AuditEntry {
            id: Uuid::new_v4(),
            action: entry.action.as_str().to_string(),
            job_posting_id: entry.job_posting_id,
            company_id: entry.company_id,
            metadata: entry.metadata,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blob storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    failing: bool,
}

impl MemoryBlobStore {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|(b, _)| b.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        if self.failing {
            return Err(StorageError::Upload {
                key: key.to_string(),
                message: "bucket unavailable".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(format!("https://blobs.test/{key}"))
    }
}

// ---------------------------------------------------------------------------
// Mail
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    failing: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        if self.failing {
            return Err(MailError::Api {
                status: 503,
                message: "transport down".to_string(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// Replies with the same text to every prompt and counts calls.
pub struct ScriptedModel {
    reply: String,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, _prompt: &str, _system: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

pub struct FailingModel;

#[async_trait]
impl CompletionModel for FailingModel {
    async fn complete(&self, _prompt: &str, _system: &str) -> Result<String, LlmError> {
        Err(LlmError::Api {
            status: 529,
            message: "overloaded".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

/// Unread messages keyed by UID; `mark_seen` removes them from the unread set.
#[derive(Default)]
pub struct MemoryMailbox {
    unread: Mutex<Vec<RawMessage>>,
    seen: Mutex<Vec<u32>>,
}

impl MemoryMailbox {
    pub fn deliver(&self, uid: u32, raw: &str) {
        self.unread.lock().unwrap().push(RawMessage {
            uid,
            bytes: raw.replace('\n', "\r\n").into_bytes(),
        });
    }

    pub fn unread_uids(&self) -> Vec<u32> {
        self.unread.lock().unwrap().iter().map(|m| m.uid).collect()
    }

    pub fn seen(&self) -> Vec<u32> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    async fn fetch_unread(&self) -> Result<Vec<RawMessage>, MailboxError> {
        Ok(self.unread.lock().unwrap().clone())
    }

    async fn mark_seen(&self, uids: &[u32]) -> Result<(), MailboxError> {
        self.unread.lock().unwrap().retain(|m| !uids.contains(&m.uid));
        self.seen.lock().unwrap().extend_from_slice(uids);
        Ok(())
    }
}

/// Builds an RFC 822 message with an optional single text attachment.
pub fn raw_email(from: &str, subject: &str, attachment: Option<(&str, &str, &str)>) -> String {
    let mut out = format!(
        "From: {from}\nTo: careers@acme.test\nSubject: {subject}\nMessage-ID: <{}@test>\nMIME-Version: 1.0\n",
        Uuid::new_v4()
    );
    match attachment {
        None => {
            out.push_str("Content-Type: text/plain; charset=utf-8\n\nPlease find my application.\n");
        }
        Some((filename, content_type, body)) => {
            out.push_str("Content-Type: multipart/mixed; boundary=\"XYZ\"\n\n");
            out.push_str("--XYZ\nContent-Type: text/plain; charset=utf-8\n\nPlease find my resume attached.\n");
            out.push_str(&format!(
                "--XYZ\nContent-Type: {content_type}; name=\"{filename}\"\nContent-Disposition: attachment; filename=\"{filename}\"\nContent-Transfer-Encoding: 8bit\n\n{body}\n"
            ));
            out.push_str("--XYZ--\n");
        }
    }
    out
}
