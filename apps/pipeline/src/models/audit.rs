use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    JobClosed,
    ReportGenerated,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::JobClosed => "job_closed",
            AuditAction::ReportGenerated => "report_generated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub job_posting_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub metadata: Value,
}
