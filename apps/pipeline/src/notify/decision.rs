//! Decision Notifier: one candidate-facing email per decision.
//!
//! Lookup failures degrade to placeholder text; only the transport can fail a
//! send, and a failed send never touches the persisted decision.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::models::Decision;
use crate::notify::mailer::{MailError, Mailer, OutboundEmail};
use crate::store::Store;

const PLACEHOLDER_JOB_TITLE: &str = "the position";
const PLACEHOLDER_COMPANY: &str = "our company";

#[derive(Debug, Clone)]
pub struct DecisionNotice {
    pub to: String,
    pub candidate_name: String,
    pub decision: Decision,
    pub interview_link: Option<String>,
    pub job_posting_id: Option<Uuid>,
}

/// Company and job details substituted into the templates.
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeContext {
    pub job_title: String,
    pub company_name: String,
    pub hr_email: String,
}

pub struct DecisionNotifier {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    fallback_hr_email: String,
}

impl DecisionNotifier {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, fallback_hr_email: String) -> Self {
        Self {
            store,
            mailer,
            fallback_hr_email,
        }
    }

    pub async fn notify(&self, notice: &DecisionNotice) -> Result<(), MailError> {
        let context = self.resolve_context(notice.job_posting_id).await;
        let email = render_notice(notice, &context);
        self.mailer.send(&email).await?;
        info!(
            to = %notice.to,
            decision = %notice.decision,
            job_id = ?notice.job_posting_id,
            "Decision email sent"
        );
        Ok(())
    }

    async fn resolve_context(&self, job_id: Option<Uuid>) -> NoticeContext {
        let mut context = NoticeContext {
            job_title: PLACEHOLDER_JOB_TITLE.to_string(),
            company_name: PLACEHOLDER_COMPANY.to_string(),
            hr_email: self.fallback_hr_email.clone(),
        };
        let Some(job_id) = job_id else {
            return context;
        };

        let job = match self.store.job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(%job_id, "Job not found for decision email, using placeholders");
                return context;
            }
            Err(e) => {
                warn!(%job_id, "Job lookup failed for decision email: {e}");
                return context;
            }
        };
        context.job_title = job.title;

        match self.store.company(job.company_id).await {
            Ok(Some(company)) => {
                context.company_name = company.name;
                if let Some(hr) = company.hr_email.filter(|e| !e.trim().is_empty()) {
                    context.hr_email = hr;
                }
            }
            Ok(None) => warn!(company_id = %job.company_id, "Company not found for decision email"),
            Err(e) => warn!(company_id = %job.company_id, "Company lookup failed: {e}"),
        }
        context
    }
}

pub fn render_notice(notice: &DecisionNotice, ctx: &NoticeContext) -> OutboundEmail {
    let name = if notice.candidate_name.trim().is_empty() {
        "there"
    } else {
        notice.candidate_name.trim()
    };
    let (subject, paragraphs) = match notice.decision {
        Decision::Shortlist => {
            let next_step = match &notice.interview_link {
                Some(link) => format!("Please choose an interview slot using this link: {link}"),
                None => "Our hiring team will contact you shortly to arrange an interview."
                    .to_string(),
            };
            (
                format!("Next steps for your application: {} at {}", ctx.job_title, ctx.company_name),
                vec![
                    format!(
                        "Thank you for applying for {} at {}. We were impressed by your background and would like to invite you to an interview.",
                        ctx.job_title, ctx.company_name
                    ),
                    next_step,
                ],
            )
        }
        // Neutral acknowledgement; the internal review state is not disclosed.
        Decision::Flag => (
            format!("Your application for {} at {}", ctx.job_title, ctx.company_name),
            vec![
                format!(
                    "Thank you for applying for {} at {}. We have received your application and it is still under review.",
                    ctx.job_title, ctx.company_name
                ),
                "We will be in touch once the review is complete.".to_string(),
            ],
        ),
        Decision::Reject => (
            format!("Update on your application: {} at {}", ctx.job_title, ctx.company_name),
            vec![
                format!(
                    "Thank you for your interest in {} at {}. After careful consideration, we have decided not to move forward with your application at this time.",
                    ctx.job_title, ctx.company_name
                ),
                "We appreciate the time you invested and wish you every success in your search."
                    .to_string(),
            ],
        ),
    };

    let signature = format!("The {} hiring team", ctx.company_name);
    let text = format!(
        "Hi {name},\n\n{}\n\nIf you have any questions, reply to {}.\n\n{signature}",
        paragraphs.join("\n\n"),
        ctx.hr_email
    );
    let html = format!(
        "<p>Hi {},</p>{}<p>If you have any questions, reply to <a href=\"mailto:{hr}\">{hr}</a>.</p><p>{}</p>",
        escape_html(name),
        paragraphs
            .iter()
            .map(|p| format!("<p>{}</p>", escape_html(p)))
            .collect::<String>(),
        escape_html(&signature),
        hr = escape_html(&ctx.hr_email),
    );

    OutboundEmail {
        to: notice.to.clone(),
        subject,
        html: Some(html),
        text,
        reply_to: Some(ctx.hr_email.clone()),
        attachments: Vec::new(),
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
