//! Mailbox Ingestion Engine.
//!
//! Per message: resolve job → insert-or-fetch application → store attachment →
//! extract → score → guarded decision write → notify. Messages are processed
//! one at a time; dedup relies on the store's conditional writes.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::extraction::{extract_resume, skills_found, DocumentKind, ExtractError, ExtractedResume};
use crate::ingestion::mailbox::{Mailbox, MailboxError, RawMessage};
use crate::ingestion::message::{parse_message, subject_tokens, InboundMessage, MessageError};
use crate::models::{Decision, JobPosting, NewApplication};
use crate::notify::{DecisionNotice, DecisionNotifier};
use crate::scoring::{CandidateProfile, JobContext, ScoringAdapter};
use crate::storage::{sanitize_file_name, BlobStore, StorageError};
use crate::store::{DecisionWrite, Store, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("resume extraction failed: {0}")]
    Resume(#[from] ExtractError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("attachment upload failed: {0}")]
    Storage(#[from] StorageError),
}

impl IngestError {
    /// Terminal errors will fail the same way on every retry, so the message
    /// is marked seen. Store and blob failures leave it unread for the next poll.
    pub fn is_terminal(&self) -> bool {
        match self {
            IngestError::Message(_) => true,
            IngestError::Resume(ExtractError::Undecodable { .. }) => true,
            IngestError::Resume(ExtractError::Task(_)) => false,
            IngestError::Store(_) | IngestError::Storage(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// No subject token resolved to a job posting.
    NoJob,
    /// The (job, sender) application already carries a decision.
    AlreadyDecided { application_id: Uuid },
    Decided {
        application_id: Uuid,
        decision: Decision,
        notified: bool,
    },
    /// Another run wrote the decision first; this run does not notify.
    DecidedElsewhere { application_id: Uuid },
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PollStats {
    pub fetched: usize,
    pub decided: usize,
    pub notified: usize,
    pub duplicates: usize,
    pub no_job: usize,
    pub failed: usize,
    pub retry_later: usize,
}

impl PollStats {
    fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::NoJob => self.no_job += 1,
            MessageOutcome::AlreadyDecided { .. } | MessageOutcome::DecidedElsewhere { .. } => {
                self.duplicates += 1
            }
            MessageOutcome::Decided { notified, .. } => {
                self.decided += 1;
                if *notified {
                    self.notified += 1;
                }
            }
        }
    }
}

pub struct IngestionEngine {
    mailbox: Arc<dyn Mailbox>,
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    scorer: ScoringAdapter,
    notifier: Arc<DecisionNotifier>,
}

impl IngestionEngine {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        scorer: ScoringAdapter,
        notifier: Arc<DecisionNotifier>,
    ) -> Self {
        Self {
            mailbox,
            store,
            blobs,
            scorer,
            notifier,
        }
    }

    /// One poll: fetch unread, process sequentially, mark terminal outcomes seen.
    pub async fn poll(&self) -> Result<PollStats, MailboxError> {
        let messages = self.mailbox.fetch_unread().await?;
        let mut stats = PollStats {
            fetched: messages.len(),
            ..PollStats::default()
        };
        let mut seen = Vec::with_capacity(messages.len());

        for raw in messages {
            let uid = raw.uid;
            match self.process_message(&raw).await {
                Ok(outcome) => {
                    stats.record(&outcome);
                    seen.push(uid);
                }
                Err(e) if e.is_terminal() => {
                    warn!(uid, "Skipping message: {e}");
                    stats.failed += 1;
                    seen.push(uid);
                }
                Err(e) => {
                    warn!(uid, "Message left unread for retry: {e}");
                    stats.retry_later += 1;
                }
            }
        }

        if !seen.is_empty() {
            // A failed flag update only means the next poll sees these again; dedup absorbs it.
            if let Err(e) = self.mailbox.mark_seen(&seen).await {
                warn!("Failed to mark {} message(s) seen: {e}", seen.len());
            }
        }

        info!(
            fetched = stats.fetched,
            decided = stats.decided,
            duplicates = stats.duplicates,
            no_job = stats.no_job,
            failed = stats.failed,
            retry_later = stats.retry_later,
            "Mailbox poll complete"
        );
        Ok(stats)
    }

    pub async fn process_message(&self, raw: &RawMessage) -> Result<MessageOutcome, IngestError> {
        let message = parse_message(raw)?;

        let Some(job) = self.resolve_job(&message.subject).await? else {
            info!(uid = message.uid, subject = %message.subject, "No job token in subject, skipping");
            return Ok(MessageOutcome::NoJob);
        };
        if job.status.is_closed() || job.deadline_passed(Utc::now()) {
            info!(uid = message.uid, job_id = %job.id, "Late application for a closed job, ingesting anyway");
        }

        let new = NewApplication::new(job.id, &message.sender_email, &message.sender_name);
        let inserted = self.store.insert_application(new).await?;
        let application = inserted.row;
        if !inserted.created {
            if !application.is_unscored() {
                info!(
                    uid = message.uid,
                    application_id = %application.id,
                    "Application already decided, not rescoring"
                );
                return Ok(MessageOutcome::AlreadyDecided {
                    application_id: application.id,
                });
            }
            info!(
                uid = message.uid,
                application_id = %application.id,
                "Existing unscored application, resuming scoring"
            );
        }

        if let (Some(attachment), None) = (&message.attachment, &application.resume_url) {
            // Keyed by application: a retried upload overwrites the same object.
            let key = format!(
                "resumes/{}/{}-{}",
                job.id,
                application.id,
                sanitize_file_name(&attachment.filename)
            );
            let url = self
                .blobs
                .put(&key, attachment.bytes.clone(), &attachment.content_type)
                .await?;
            if !self.store.attach_resume(application.id, &url).await? {
                info!(application_id = %application.id, "Resume already attached by another run");
            }
        }

        let resume = self.extract(&message).await?;
        let candidate = CandidateProfile {
            name: application.candidate_name.clone(),
            email: application.candidate_email.clone(),
            resume,
        };
        let outcome = self.scorer.score(&candidate, &JobContext::from(&job)).await;
        let skills = skills_found(&candidate.resume.text, &job.required_skills);

        let write = DecisionWrite {
            score: outcome.score,
            decision: outcome.decision,
            reasoning: outcome.reasoning,
            resume_data: Some(candidate.resume.to_resume_data(&skills)),
        };
        if !self.store.record_decision(application.id, &write).await? {
            info!(
                application_id = %application.id,
                "Decision already written by another run"
            );
            return Ok(MessageOutcome::DecidedElsewhere {
                application_id: application.id,
            });
        }
        info!(
            application_id = %application.id,
            job_id = %job.id,
            decision = %write.decision,
            score = write.score,
            "Decision recorded"
        );

        let interview_link = self.schedule_interview(application.id, &job, write.decision).await;

        let notice = DecisionNotice {
            to: application.candidate_email.clone(),
            candidate_name: application.candidate_name.clone(),
            decision: write.decision,
            interview_link,
            job_posting_id: Some(job.id),
        };
        let notified = match self.notifier.notify(&notice).await {
            Ok(()) => true,
            Err(e) => {
                warn!(application_id = %application.id, "Decision email failed: {e}");
                false
            }
        };

        Ok(MessageOutcome::Decided {
            application_id: application.id,
            decision: write.decision,
            notified,
        })
    }

    async fn resolve_job(&self, subject: &str) -> Result<Option<JobPosting>, StoreError> {
        for token in subject_tokens(subject) {
            if let Some(job) = self.store.job_by_token(&token).await? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn extract(&self, message: &InboundMessage) -> Result<ExtractedResume, ExtractError> {
        match &message.attachment {
            Some(attachment) => {
                let kind = DocumentKind::infer(
                    Some(attachment.content_type.as_str()),
                    Some(attachment.filename.as_str()),
                    &attachment.bytes,
                );
                extract_resume(attachment.bytes.clone(), kind).await
            }
            None => Ok(ExtractedResume::empty()),
        }
    }

    /// Returns the link to send when this run moved the interview to SCHEDULED.
    async fn schedule_interview(
        &self,
        application_id: Uuid,
        job: &JobPosting,
        decision: Decision,
    ) -> Option<String> {
        if decision != Decision::Shortlist {
            return None;
        }
        let link = job.meeting_link.as_deref()?;
        match self.store.schedule_interview(application_id, link, None).await {
            Ok(true) => Some(link.to_string()),
            Ok(false) => None,
            Err(e) => {
                warn!(%application_id, "Interview scheduling failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InterviewStatus;
    use crate::testing::{
        company, job_posting, raw_email, MemoryBlobStore, MemoryMailbox, MemoryStore,
        RecordingMailer, ScriptedModel,
    };

    const SHORTLIST_REPLY: &str =
        r#"{"score": 88, "status": "SHORTLIST", "reasoning": "Strong Rust background."}"#;

    struct Harness {
        mailbox: Arc<MemoryMailbox>,
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStore>,
        mailer: Arc<RecordingMailer>,
        model: Arc<ScriptedModel>,
        engine: IngestionEngine,
        job: JobPosting,
    }

    fn harness_with(reply: &str, configure: impl FnOnce(&mut JobPosting)) -> Harness {
        let mailbox = Arc::new(MemoryMailbox::default());
        let store = Arc::new(MemoryStore::default());
        let blobs = Arc::new(MemoryBlobStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        let model = Arc::new(ScriptedModel::new(reply));
        let acme = company("Acme", Some("talent@acme.test"));
        let mut job = job_posting(acme.id, "J1");
        configure(&mut job);
        store.add_company(acme);
        store.add_job(job.clone());

        let notifier = Arc::new(DecisionNotifier::new(
            store.clone(),
            mailer.clone(),
            "hr@example.com".to_string(),
        ));
        let engine = IngestionEngine::new(
            mailbox.clone(),
            store.clone(),
            blobs.clone(),
            ScoringAdapter::new(Some(model.clone())),
            notifier,
        );
        Harness {
            mailbox,
            store,
            blobs,
            mailer,
            model,
            engine,
            job,
        }
    }

    fn harness() -> Harness {
        harness_with(SHORTLIST_REPLY, |_| {})
    }

    fn cv(text: &str) -> Option<(&'static str, &'static str, &str)> {
        Some(("cv.txt", "text/plain", text))
    }

    #[tokio::test]
    async fn test_duplicate_messages_in_one_poll_create_one_application() {
        let h = harness();
        let from = "Jane Doe <jane@example.com>";
        h.mailbox.deliver(1, &raw_email(from, "Application [J1]", cv("Rust")));
        h.mailbox.deliver(2, &raw_email(from, "Application [J1]", cv("Rust")));

        let stats = h.engine.poll().await.unwrap();

        let apps = h.store.applications();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].candidate_email, "jane@example.com");
        assert_eq!(apps[0].ai_status, Some(Decision::Shortlist));
        assert_eq!(stats.decided, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(h.mailer.sent().len(), 1);
        assert_eq!(h.model.calls(), 1);
        assert!(h.mailbox.unread_uids().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_deliveries_store_one_resume_object() {
        let h = harness();
        let from = "jane@example.com";
        h.mailbox.deliver(1, &raw_email(from, "[J1]", cv("Rust")));
        h.mailbox.deliver(2, &raw_email(from, "[J1]", cv("Rust")));
        h.engine.poll().await.unwrap();
        h.mailbox.deliver(3, &raw_email(from, "[J1] again", cv("Rust")));
        h.engine.poll().await.unwrap();

        let keys = h.blobs.keys();
        assert_eq!(keys.len(), 1);
        let app = &h.store.applications()[0];
        assert!(keys[0].contains(&app.id.to_string()));
        assert_eq!(
            app.resume_url.as_deref(),
            Some(format!("https://blobs.test/{}", keys[0]).as_str())
        );
    }

    #[tokio::test]
    async fn test_failed_insert_uploads_nothing_and_retry_stores_once() {
        let h = harness();
        h.mailbox.deliver(3, &raw_email("a@example.com", "[J1]", cv("Rust")));
        h.store.fail_inserts(true);

        h.engine.poll().await.unwrap();
        assert!(h.blobs.keys().is_empty());

        h.store.fail_inserts(false);
        let stats = h.engine.poll().await.unwrap();
        assert_eq!(stats.decided, 1);
        assert_eq!(h.blobs.keys().len(), 1);
        assert!(h.store.applications()[0].resume_url.is_some());
    }

    #[tokio::test]
    async fn test_decided_application_is_never_rescored() {
        let h = harness();
        let from = "jane@example.com";
        h.mailbox.deliver(1, &raw_email(from, "[J1]", cv("Rust")));
        h.engine.poll().await.unwrap();
        let before = h.store.applications()[0].clone();

        h.mailbox.deliver(2, &raw_email(from, "[J1] updated CV", cv("Go only")));
        let stats = h.engine.poll().await.unwrap();

        let after = h.store.applications()[0].clone();
        assert_eq!(stats.duplicates, 1);
        assert_eq!(after.ai_score, before.ai_score);
        assert_eq!(after.reasoning, before.reasoning);
        assert_eq!(h.model.calls(), 1);
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_job_is_skipped_and_marked_seen() {
        let h = harness();
        h.mailbox.deliver(5, &raw_email("a@example.com", "Hello [NOPE]", None));

        let stats = h.engine.poll().await.unwrap();

        assert_eq!(stats.no_job, 1);
        assert!(h.store.applications().is_empty());
        assert_eq!(h.mailbox.seen(), vec![5]);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_message_unread() {
        let h = harness();
        h.mailbox.deliver(3, &raw_email("a@example.com", "[J1]", None));
        h.store.fail_inserts(true);

        let stats = h.engine.poll().await.unwrap();
        assert_eq!(stats.retry_later, 1);
        assert_eq!(h.mailbox.unread_uids(), vec![3]);

        h.store.fail_inserts(false);
        let stats = h.engine.poll().await.unwrap();
        assert_eq!(stats.decided, 1);
        assert!(h.mailbox.unread_uids().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_resume_is_terminal() {
        let h = harness();
        let garbage: String = (1u8..9).map(char::from).cycle().take(400).collect();
        let attachment = Some(("cv.bin", "application/octet-stream", garbage.as_str()));
        h.mailbox.deliver(4, &raw_email("a@example.com", "[J1]", attachment));

        let stats = h.engine.poll().await.unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(h.mailbox.seen(), vec![4]);
        assert!(h.store.applications()[0].is_unscored());
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_message_without_attachment_is_still_scored() {
        let h = harness();
        h.mailbox.deliver(1, &raw_email("bob@example.com", "[j1]", None));

        h.engine.poll().await.unwrap();

        let app = &h.store.applications()[0];
        assert!(app.resume_url.is_none());
        assert!(app.ai_status.is_some());
    }

    #[tokio::test]
    async fn test_shortlist_schedules_interview_with_meeting_link() {
        let h = harness_with(SHORTLIST_REPLY, |job| {
            job.meeting_link = Some("https://meet.example.com/acme".to_string());
        });
        h.mailbox.deliver(1, &raw_email("jane@example.com", "[J1]", cv("Rust")));

        h.engine.poll().await.unwrap();

        let app = &h.store.applications()[0];
        assert_eq!(app.interview_status, InterviewStatus::Scheduled);
        assert_eq!(app.interview_link.as_deref(), Some("https://meet.example.com/acme"));
        assert!(h.mailer.sent()[0].text.contains("https://meet.example.com/acme"));
    }

    #[tokio::test]
    async fn test_reject_does_not_schedule_interview() {
        let h = harness_with(
            r#"{"score": 12, "status": "REJECT", "reasoning": "No overlap."}"#,
            |job| job.meeting_link = Some("https://meet.example.com/acme".to_string()),
        );
        h.mailbox.deliver(1, &raw_email("jane@example.com", "[J1]", cv("Baking")));

        h.engine.poll().await.unwrap();

        let app = &h.store.applications()[0];
        assert_eq!(app.interview_status, InterviewStatus::Unscheduled);
        assert_eq!(app.ai_status, Some(Decision::Reject));
    }

    #[tokio::test]
    async fn test_concurrent_runs_notify_only_the_winning_writer() {
        let h = harness();
        let text = raw_email("jane@example.com", "[J1]", cv("Rust and PostgreSQL"));
        let first = RawMessage {
            uid: 1,
            bytes: text.clone().into_bytes(),
        };
        let second = RawMessage {
            uid: 2,
            bytes: text.into_bytes(),
        };

        let (a, b) = tokio::join!(
            h.engine.process_message(&first),
            h.engine.process_message(&second)
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        let decided = outcomes
            .iter()
            .filter(|o| matches!(o, MessageOutcome::Decided { .. }))
            .count();
        assert_eq!(decided, 1);
        assert_eq!(h.store.applications().len(), 1);
        assert_eq!(h.mailer.sent().len(), 1);
        assert_eq!(h.job.id, h.store.applications()[0].job_posting_id);
    }

    #[tokio::test]
    async fn test_failed_notification_keeps_decision() {
        let mailbox = Arc::new(MemoryMailbox::default());
        let store = Arc::new(MemoryStore::default());
        let acme = company("Acme", None);
        store.add_job(job_posting(acme.id, "J1"));
        store.add_company(acme);
        let notifier = Arc::new(DecisionNotifier::new(
            store.clone(),
            Arc::new(RecordingMailer::failing()),
            "hr@example.com".to_string(),
        ));
        let engine = IngestionEngine::new(
            mailbox.clone(),
            store.clone(),
            Arc::new(MemoryBlobStore::default()),
            ScoringAdapter::new(None),
            notifier,
        );
        mailbox.deliver(1, &raw_email("jane@example.com", "[J1]", cv("Rust")));

        let stats = engine.poll().await.unwrap();

        assert_eq!(stats.decided, 1);
        assert_eq!(stats.notified, 0);
        assert!(store.applications()[0].ai_status.is_some());
        assert!(mailbox.unread_uids().is_empty());
    }
}
