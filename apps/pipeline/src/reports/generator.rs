use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::llm_client::CompletionModel;
use crate::models::{AuditAction, JobPosting, NewAuditEntry, Report};
use crate::notify::decision::escape_html;
use crate::notify::{Attachment, MailError, Mailer, OutboundEmail};
use crate::reports::analysis::analyze;
use crate::reports::pdf::{render_pdf, PdfError, ReportDocument};
use crate::reports::stats::{compute_stats, ReportStats};
use crate::storage::{BlobStore, StorageError};
use crate::store::{Store, StoreError};

const PDF_CONTENT_TYPE: &str = "application/pdf";
const PLACEHOLDER_COMPANY: &str = "Your company";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("job posting {0} not found")]
    JobNotFound(Uuid),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error("report upload failed: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReport {
    pub report: Report,
    /// False when the report already existed or a concurrent run inserted it first.
    pub created: bool,
}

pub struct ReportGenerator {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    mailer: Arc<dyn Mailer>,
    model: Option<Arc<dyn CompletionModel>>,
    fallback_hr_email: String,
}

impl ReportGenerator {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        mailer: Arc<dyn Mailer>,
        model: Option<Arc<dyn CompletionModel>>,
        fallback_hr_email: String,
    ) -> Self {
        Self {
            store,
            blobs,
            mailer,
            model,
            fallback_hr_email,
        }
    }

    /// Returns the existing report untouched, or builds, stores and announces a new one.
    pub async fn generate(&self, job_id: Uuid) -> Result<GeneratedReport, ReportError> {
        if let Some(report) = self.store.report_for_job(job_id).await? {
            return Ok(GeneratedReport {
                report,
                created: false,
            });
        }

        let job = self
            .store
            .job(job_id)
            .await?
            .ok_or(ReportError::JobNotFound(job_id))?;
        let (company_name, hr_email) = self.resolve_company(&job).await;
        let applications = self.store.applications_for_job(job_id).await?;

        let stats = compute_stats(&applications);
        let analysis = analyze(
            self.model.as_deref(),
            &job,
            &company_name,
            &stats,
            &applications,
        )
        .await;
        let analysis_source = analysis.source;

        let now = Utc::now();
        let document = ReportDocument::new(
            &job.title,
            &company_name,
            now,
            stats.clone(),
            analysis,
            &applications,
        );
        let bytes = render_pdf(document).await?;
        let key = format!("reports/{job_id}/report-{}.pdf", now.format("%Y%m%dT%H%M%S%.3fZ"));
        let url = self.blobs.put(&key, bytes, PDF_CONTENT_TYPE).await?;

        // Insert-or-fetch: a concurrent run may have inserted between the check above and here.
        let inserted = self.store.insert_report(job_id, &url).await?;
        if !inserted.created {
            info!(
                %job_id,
                report_id = %inserted.row.id,
                "Report already inserted by a concurrent run"
            );
            return Ok(GeneratedReport {
                report: inserted.row,
                created: false,
            });
        }
        let report = inserted.row;
        info!(
            %job_id,
            report_id = %report.id,
            total_applicants = stats.total_applicants,
            "Report generated"
        );

        let emailed = match self.email_hr(&job, &company_name, &hr_email, &stats, &report).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%job_id, report_id = %report.id, "Report email failed: {e}");
                false
            }
        };

        let audit = NewAuditEntry {
            action: AuditAction::ReportGenerated,
            job_posting_id: Some(job_id),
            company_id: Some(job.company_id),
            metadata: json!({
                "reportId": report.id,
                "totalApplicants": stats.total_applicants,
                "reportUrl": report.report_url,
                "analysisSource": analysis_source,
                "emailed": emailed,
            }),
        };
        if let Err(e) = self.store.append_audit(audit).await {
            error!(%job_id, report_id = %report.id, "Failed to audit report generation: {e}");
        }

        Ok(GeneratedReport {
            report,
            created: true,
        })
    }

    async fn resolve_company(&self, job: &JobPosting) -> (String, String) {
        match self.store.company(job.company_id).await {
            Ok(Some(company)) => {
                let hr = company
                    .hr_email
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| self.fallback_hr_email.clone());
                (company.name, hr)
            }
            Ok(None) => (PLACEHOLDER_COMPANY.to_string(), self.fallback_hr_email.clone()),
            Err(e) => {
                warn!(job_id = %job.id, "Company lookup failed for report: {e}");
                (PLACEHOLDER_COMPANY.to_string(), self.fallback_hr_email.clone())
            }
        }
    }

    async fn email_hr(
        &self,
        job: &JobPosting,
        company_name: &str,
        hr_email: &str,
        stats: &ReportStats,
        report: &Report,
    ) -> Result<(), MailError> {
        let average = stats
            .average_score
            .map(|a| format!("{a:.1}"))
            .unwrap_or_else(|| "n/a".to_string());
        let summary = format!(
            "Applications for {} at {} have closed. {} applicant(s): {} shortlisted, {} flagged, {} rejected. Average score: {average}.",
            job.title,
            company_name,
            stats.total_applicants,
            stats.shortlisted,
            stats.flagged,
            stats.rejected,
        );
        let email = OutboundEmail {
            to: hr_email.to_string(),
            subject: format!("Hiring report ready: {}", job.title),
            html: Some(format!(
                "<p>{}</p><p><a href=\"{url}\">Download the full report (PDF)</a></p>",
                escape_html(&summary),
                url = escape_html(&report.report_url),
            )),
            text: format!("{summary}\n\nFull report: {}", report.report_url),
            reply_to: None,
            attachments: vec![Attachment {
                filename: format!("hiring-report-{}.pdf", job.reference),
                path: report.report_url.clone(),
            }],
        };
        self.mailer.send(&email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;
    use crate::testing::{
        application_for, company, job_posting, FailingModel, MemoryBlobStore, MemoryStore,
        RecordingMailer,
    };

    struct Harness {
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStore>,
        mailer: Arc<RecordingMailer>,
        generator: ReportGenerator,
        job_id: Uuid,
    }

    fn harness_with(blobs: MemoryBlobStore, mailer: RecordingMailer) -> Harness {
        let store = Arc::new(MemoryStore::default());
        let blobs = Arc::new(blobs);
        let mailer = Arc::new(mailer);
        let acme = company("Acme", Some("talent@acme.test"));
        let job = job_posting(acme.id, "J1");
        store.add_company(acme);
        store.add_job(job.clone());
        store.add_application(application_for(job.id, "a@x.io", Some((92.0, Decision::Shortlist))));
        store.add_application(application_for(job.id, "b@x.io", Some((30.0, Decision::Reject))));
        let generator = ReportGenerator::new(
            store.clone(),
            blobs.clone(),
            mailer.clone(),
            Some(Arc::new(FailingModel)),
            "hr@example.com".to_string(),
        );
        Harness {
            store,
            blobs,
            mailer,
            generator,
            job_id: job.id,
        }
    }

    fn harness() -> Harness {
        harness_with(MemoryBlobStore::default(), RecordingMailer::default())
    }

    #[tokio::test]
    async fn test_second_generation_returns_the_same_report() {
        let h = harness();

        let first = h.generator.generate(h.job_id).await.unwrap();
        let second = h.generator.generate(h.job_id).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.report, second.report);
        assert_eq!(h.store.reports().len(), 1);
        assert_eq!(h.mailer.sent().len(), 1);
        assert_eq!(h.store.audits().len(), 1);
        assert_eq!(h.blobs.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_generation_announces_one_report() {
        let h = harness();

        let (a, b) = tokio::join!(h.generator.generate(h.job_id), h.generator.generate(h.job_id));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.report.id, b.report.id);
        assert_eq!(a.report.report_url, b.report.report_url);
        assert!(a.created ^ b.created);
        assert_eq!(h.store.reports().len(), 1);
        assert_eq!(h.mailer.sent().len(), 1);
        assert_eq!(h.store.audits().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_model_still_produces_pdf_and_email() {
        let h = harness();

        let generated = h.generator.generate(h.job_id).await.unwrap();

        let key = generated
            .report
            .report_url
            .strip_prefix("https://blobs.test/")
            .unwrap()
            .to_string();
        assert!(key.starts_with(&format!("reports/{}/report-", h.job_id)));
        assert!(key.ends_with(".pdf"));
        let pdf = h.blobs.object(&key).unwrap();
        assert!(pdf.starts_with(b"%PDF"));

        let sent = h.mailer.sent();
        assert_eq!(sent[0].to, "talent@acme.test");
        assert_eq!(sent[0].attachments[0].path, generated.report.report_url);
        let audit = &h.store.audits()[0];
        assert_eq!(audit.action, "report_generated");
        assert_eq!(audit.metadata["totalApplicants"], 2);
        assert_eq!(audit.metadata["analysisSource"], "fallback");
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_no_report_for_retry() {
        let h = harness_with(MemoryBlobStore::failing(), RecordingMailer::default());

        let result = h.generator.generate(h.job_id).await;

        assert!(matches!(result, Err(ReportError::Storage(_))));
        assert!(h.store.reports().is_empty());
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_email_failure_keeps_report() {
        let h = harness_with(MemoryBlobStore::default(), RecordingMailer::failing());

        let generated = h.generator.generate(h.job_id).await.unwrap();

        assert!(generated.created);
        assert_eq!(h.store.reports().len(), 1);
        assert_eq!(h.store.audits()[0].metadata["emailed"], false);
    }

    #[tokio::test]
    async fn test_unknown_job_is_an_error() {
        let h = harness();
        let result = h.generator.generate(Uuid::new_v4()).await;
        assert!(matches!(result, Err(ReportError::JobNotFound(_))));
    }
}
