use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::db::SchemaContract;
use crate::models::{
    Application, Company, Decision, Inserted, InterviewStatus, JobPosting, JobSchedule,
    JobStatus, NewApplication, NewAuditEntry, Report,
};
use crate::store::{DecisionWrite, Store, StoreError};

#[derive(Debug, FromRow)]
struct JobPostingRow {
    id: Uuid,
    company_id: Uuid,
    reference: String,
    title: String,
    description: String,
    responsibilities: Option<String>,
    required_skills: Vec<String>,
    application_deadline: Option<DateTime<Utc>>,
    status: String,
    webhook_secret: Option<String>,
    // Older schemas lack the column; invites then go out without a link.
    #[sqlx(default)]
    meeting_link: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobPostingRow> for JobPosting {
    type Error = StoreError;

    fn try_from(row: JobPostingRow) -> Result<Self, Self::Error> {
        Ok(JobPosting {
            id: row.id,
            company_id: row.company_id,
            reference: row.reference,
            title: row.title,
            description: row.description,
            responsibilities: row.responsibilities,
            required_skills: row
                .required_skills
                .into_iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            application_deadline: row.application_deadline,
            status: row.status.parse()?,
            webhook_secret: row.webhook_secret,
            meeting_link: row.meeting_link,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ApplicationRow {
    id: Uuid,
    job_posting_id: Uuid,
    candidate_email: String,
    candidate_name: String,
    phone: Option<String>,
    resume_url: Option<String>,
    resume_data: Option<Value>,
    ai_score: Option<f64>,
    ai_status: Option<String>,
    reasoning: Option<String>,
    #[sqlx(default)]
    interview_time: Option<DateTime<Utc>>,
    #[sqlx(default)]
    interview_link: Option<String>,
    #[sqlx(default)]
    interview_status: Option<String>,
    #[sqlx(default)]
    external_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = StoreError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: row.id,
            job_posting_id: row.job_posting_id,
            candidate_email: row.candidate_email,
            candidate_name: row.candidate_name,
            phone: row.phone,
            resume_url: row.resume_url,
            resume_data: row.resume_data,
            ai_score: row.ai_score,
            ai_status: row
                .ai_status
                .as_deref()
                .map(str::parse::<Decision>)
                .transpose()?,
            reasoning: row.reasoning,
            interview_time: row.interview_time,
            interview_link: row.interview_link,
            interview_status: row
                .interview_status
                .as_deref()
                .map(str::parse::<InterviewStatus>)
                .transpose()?
                .unwrap_or(InterviewStatus::Unscheduled),
            external_id: row.external_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CompanyRow {
    id: Uuid,
    name: String,
    hr_email: Option<String>,
}

#[derive(Debug, FromRow)]
struct JobScheduleRow {
    id: Uuid,
    job_posting_id: Uuid,
    kind: String,
    run_at: DateTime<Utc>,
    executed: bool,
    payload: Value,
}

#[derive(Debug, FromRow)]
struct ReportRow {
    id: Uuid,
    job_posting_id: Uuid,
    report_url: String,
    created_at: DateTime<Utc>,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Report {
            id: row.id,
            job_posting_id: row.job_posting_id,
            report_url: row.report_url,
            created_at: row.created_at,
        }
    }
}

fn jobs_from_rows(rows: Vec<JobPostingRow>) -> Result<Vec<JobPosting>, StoreError> {
    rows.into_iter().map(JobPosting::try_from).collect()
}

/// PostgreSQL implementation of [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: SchemaContract,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: SchemaContract) -> Self {
        Self { pool, schema }
    }

    async fn application_by_key(
        &self,
        job_id: Uuid,
        email: &str,
    ) -> Result<Option<Application>, StoreError> {
        sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE job_posting_id = $1 AND candidate_email = $2",
        )
        .bind(job_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(Application::try_from)
        .transpose()
    }

    async fn application_by_external_id(
        &self,
        job_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Application>, StoreError> {
        sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE job_posting_id = $1 AND external_id = $2",
        )
        .bind(job_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Application::try_from)
        .transpose()
    }

    /// `ON CONFLICT DO NOTHING ... RETURNING *` yields no row when the constraint matched.
    async fn try_insert(
        &self,
        new: &NewApplication,
        conflict_clause: &str,
    ) -> Result<Option<Application>, StoreError> {
        let (score, status, reasoning) = match &new.prescored {
            Some(p) => (p.score, Some(p.decision.as_str()), p.reasoning.clone()),
            None => (None, None, None),
        };
        let external_id = if self.schema.has_external_id {
            new.external_id.as_deref()
        } else {
            None
        };

        let sql = format!(
            r#"
            INSERT INTO applications
                (id, job_posting_id, candidate_email, candidate_name, phone,
                 resume_url, resume_data, ai_score, ai_status, reasoning{external_col})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10{external_val})
            {conflict_clause}
            RETURNING *
            "#,
            external_col = if self.schema.has_external_id { ", external_id" } else { "" },
            external_val = if self.schema.has_external_id { ", $11" } else { "" },
        );

        let mut query = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.job_posting_id)
            .bind(&new.candidate_email)
            .bind(&new.candidate_name)
            .bind(&new.phone)
            .bind(&new.resume_url)
            .bind(&new.resume_data)
            .bind(score)
            .bind(status)
            .bind(reasoning);
        if self.schema.has_external_id {
            query = query.bind(external_id);
        }

        query
            .fetch_optional(&self.pool)
            .await?
            .map(Application::try_from)
            .transpose()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn job(&self, job_id: Uuid) -> Result<Option<JobPosting>, StoreError> {
        sqlx::query_as::<_, JobPostingRow>("SELECT * FROM job_postings WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .map(JobPosting::try_from)
            .transpose()
    }

    async fn job_by_token(&self, token: &str) -> Result<Option<JobPosting>, StoreError> {
        sqlx::query_as::<_, JobPostingRow>(
            "SELECT * FROM job_postings WHERE lower(reference) = lower($1) OR id::text = lower($1) LIMIT 1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .map(JobPosting::try_from)
        .transpose()
    }

    async fn company(&self, company_id: Uuid) -> Result<Option<Company>, StoreError> {
        let row = sqlx::query_as::<_, CompanyRow>(
            "SELECT id, name, hr_email FROM companies WHERE id = $1",
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Company {
            id: r.id,
            name: r.name,
            hr_email: r.hr_email,
        }))
    }

    async fn insert_application(
        &self,
        new: NewApplication,
    ) -> Result<Inserted<Application>, StoreError> {
        if let Some(row) = self
            .try_insert(&new, "ON CONFLICT (job_posting_id, candidate_email) DO NOTHING")
            .await?
        {
            return Ok(Inserted::created(row));
        }
        debug!(
            job_id = %new.job_posting_id,
            email = %new.candidate_email,
            "Application already exists"
        );
        self.application_by_key(new.job_posting_id, &new.candidate_email)
            .await?
            .map(Inserted::existing)
            .ok_or_else(|| StoreError::Unavailable("conflicting application vanished".into()))
    }

    async fn insert_external_application(
        &self,
        new: NewApplication,
    ) -> Result<Inserted<Application>, StoreError> {
        // Both constraints are scoped to the job, so a match never crosses jobs.
        if let Some(row) = self.try_insert(&new, "ON CONFLICT DO NOTHING").await? {
            return Ok(Inserted::created(row));
        }
        if self.schema.has_external_id {
            if let Some(external_id) = new.external_id.as_deref() {
                if let Some(row) = self
                    .application_by_external_id(new.job_posting_id, external_id)
                    .await?
                {
                    return Ok(Inserted::existing(row));
                }
            }
        }
        self.application_by_key(new.job_posting_id, &new.candidate_email)
            .await?
            .map(Inserted::existing)
            .ok_or_else(|| StoreError::Unavailable("conflicting application vanished".into()))
    }

    async fn record_decision(
        &self,
        application_id: Uuid,
        write: &DecisionWrite,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET ai_score = $2,
                ai_status = $3,
                reasoning = $4,
                resume_data = COALESCE($5, resume_data),
                updated_at = now()
            WHERE id = $1 AND ai_status IS NULL
            "#,
        )
        .bind(application_id)
        .bind(write.score)
        .bind(write.decision.as_str())
        .bind(&write.reasoning)
        .bind(&write.resume_data)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn attach_resume(&self, application_id: Uuid, url: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE applications SET resume_url = $2, updated_at = now() WHERE id = $1 AND resume_url IS NULL",
        )
        .bind(application_id)
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn schedule_interview(
        &self,
        application_id: Uuid,
        link: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        if !self.schema.has_interview_fields {
            return Ok(false);
        }
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET interview_status = $4,
                interview_link = $2,
                interview_time = $3,
                updated_at = now()
            WHERE id = $1 AND interview_status = $5
            "#,
        )
        .bind(application_id)
        .bind(link)
        .bind(at)
        .bind(InterviewStatus::Scheduled.as_str())
        .bind(InterviewStatus::Unscheduled.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn applications_for_job(&self, job_id: Uuid) -> Result<Vec<Application>, StoreError> {
        sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE job_posting_id = $1 ORDER BY created_at, id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Application::try_from)
        .collect()
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<JobSchedule>, StoreError> {
        let rows = sqlx::query_as::<_, JobScheduleRow>(
            r#"
            SELECT id, job_posting_id, kind, run_at, executed, payload
            FROM job_schedules
            WHERE executed = false AND kind = 'deadline' AND run_at <= $1
            ORDER BY run_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(JobSchedule {
                    id: r.id,
                    job_posting_id: r.job_posting_id,
                    kind: r.kind.parse()?,
                    run_at: r.run_at,
                    executed: r.executed,
                    payload: r.payload,
                })
            })
            .collect()
    }

    async fn mark_schedule_executed(&self, schedule_id: Uuid) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE job_schedules SET executed = true WHERE id = $1 AND executed = false")
                .bind(schedule_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn close_job(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE job_postings SET status = $3, updated_at = $2 WHERE id = $1 AND status <> $3",
        )
        .bind(job_id)
        .bind(now)
        .bind(JobStatus::Closed.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn overdue_open_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobPosting>, StoreError> {
        let rows = sqlx::query_as::<_, JobPostingRow>(
            r#"
            SELECT * FROM job_postings
            WHERE status IN ('DRAFT', 'ACTIVE')
              AND application_deadline IS NOT NULL
              AND application_deadline <= $1
            ORDER BY application_deadline
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        jobs_from_rows(rows)
    }

    async fn jobs_awaiting_report(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<JobPosting>, StoreError> {
        let rows = sqlx::query_as::<_, JobPostingRow>(
            r#"
            SELECT j.* FROM job_postings j
            WHERE (j.status = 'CLOSED'
                   OR (j.application_deadline IS NOT NULL AND j.application_deadline <= $1))
              AND NOT EXISTS (SELECT 1 FROM reports r WHERE r.job_posting_id = j.id)
            ORDER BY j.application_deadline ASC NULLS LAST, j.updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        jobs_from_rows(rows)
    }

    async fn report_for_job(&self, job_id: Uuid) -> Result<Option<Report>, StoreError> {
        let row = sqlx::query_as::<_, ReportRow>(
            "SELECT id, job_posting_id, report_url, created_at FROM reports WHERE job_posting_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Report::from))
    }

    async fn insert_report(
        &self,
        job_id: Uuid,
        report_url: &str,
    ) -> Result<Inserted<Report>, StoreError> {
        let id = Uuid::new_v4();
        // The no-op update makes RETURNING yield the winning row on conflict.
        let row = sqlx::query_as::<_, ReportRow>(
            r#"
            INSERT INTO reports (id, job_posting_id, report_url)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_posting_id)
                DO UPDATE SET job_posting_id = EXCLUDED.job_posting_id
            RETURNING id, job_posting_id, report_url, created_at
            "#,
        )
        .bind(id)
        .bind(job_id)
        .bind(report_url)
        .fetch_one(&self.pool)
        .await?;

        let report = Report::from(row);
        Ok(if report.id == id {
            Inserted::created(report)
        } else {
            Inserted::existing(report)
        })
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, action, job_posting_id, company_id, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.action.as_str())
        .bind(entry.job_posting_id)
        .bind(entry.company_id)
        .bind(&entry.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
