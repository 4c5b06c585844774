//! Narrative analysis of an applicant pool.
//!
//! The model path is tried first. Any failure falls back to a deterministic
//! analysis built from the statistics alone, which cannot fail.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, UNTRUSTED_INPUT_INSTRUCTION};
use crate::llm_client::{complete_json, CompletionModel};
use crate::models::{Application, Decision, JobPosting};
use crate::reports::prompts::ANALYSIS_PROMPT_TEMPLATE;
use crate::reports::stats::{ranked, ReportStats};

const TOP_N: usize = 3;
const MAX_REASONING_CHARS: usize = 300;
const MAX_PROMPT_APPLICANTS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCandidate {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportAnalysis {
    pub executive_summary: String,
    pub top_candidates: Vec<TopCandidate>,
    pub role_fit_analysis: String,
    pub pool_gaps: Vec<String>,
    pub recommendations: Vec<String>,
    pub source: AnalysisSource,
}

#[derive(Debug, Deserialize)]
struct ModelAnalysis {
    executive_summary: String,
    #[serde(default)]
    top_candidates: Vec<TopCandidate>,
    #[serde(default)]
    role_fit_analysis: String,
    #[serde(default)]
    pool_gaps: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
}

pub async fn analyze(
    model: Option<&dyn CompletionModel>,
    job: &JobPosting,
    company_name: &str,
    stats: &ReportStats,
    applications: &[Application],
) -> ReportAnalysis {
    let Some(model) = model else {
        return fallback_analysis(job, stats, applications);
    };
    let prompt = build_analysis_prompt(job, company_name, stats, applications);
    match complete_json::<ModelAnalysis>(model, &prompt, JSON_ONLY_SYSTEM).await {
        Ok(answer) if !answer.executive_summary.trim().is_empty() => {
            info!(job_id = %job.id, "Model produced report analysis");
            ReportAnalysis {
                executive_summary: answer.executive_summary.trim().to_string(),
                top_candidates: answer.top_candidates.into_iter().take(TOP_N).collect(),
                role_fit_analysis: answer.role_fit_analysis,
                pool_gaps: answer.pool_gaps,
                recommendations: answer.recommendations,
                source: AnalysisSource::Model,
            }
        }
        Ok(_) => {
            warn!(job_id = %job.id, "Model analysis had an empty summary, using fallback");
            fallback_analysis(job, stats, applications)
        }
        Err(e) => {
            warn!(job_id = %job.id, "Report analysis model call failed, using fallback: {e}");
            fallback_analysis(job, stats, applications)
        }
    }
}

pub fn fallback_analysis(
    job: &JobPosting,
    stats: &ReportStats,
    applications: &[Application],
) -> ReportAnalysis {
    let top_candidates: Vec<TopCandidate> = ranked(applications, Decision::Shortlist)
        .into_iter()
        .take(TOP_N)
        .map(|app| TopCandidate {
            name: app.candidate_name.clone(),
            email: Some(app.candidate_email.clone()),
            score: app.ai_score,
            rationale: app
                .reasoning
                .as_deref()
                .map(|r| truncate(r, MAX_REASONING_CHARS))
                .unwrap_or_else(|| "Shortlisted by automated screening.".to_string()),
        })
        .collect();

    let mut summary = format!(
        "{} received {} application(s): {} shortlisted, {} flagged for review and {} rejected.",
        job.title, stats.total_applicants, stats.shortlisted, stats.flagged, stats.rejected
    );
    if stats.unscored > 0 {
        summary.push_str(&format!(" {} application(s) were not scored.", stats.unscored));
    }
    match stats.average_score {
        Some(avg) => summary.push_str(&format!(" The average score was {avg:.1} out of 100.")),
        None => summary.push_str(" No application carried a score."),
    }

    let role_fit_analysis = if stats.total_applicants == 0 {
        "No applications were received, so role fit could not be assessed.".to_string()
    } else {
        let share = stats.shortlisted as f64 / stats.total_applicants as f64 * 100.0;
        format!(
            "{share:.0}% of applicants met the shortlist threshold for {}.",
            job.title
        )
    };

    let pool_gaps = missing_skills(job, applications);

    let mut recommendations = Vec::new();
    if stats.shortlisted > 0 {
        recommendations.push(format!(
            "Schedule interviews with the {} shortlisted candidate(s), starting with the top scorers.",
            stats.shortlisted
        ));
    } else {
        recommendations.push(
            "No candidate was shortlisted; consider widening sourcing or revisiting requirements."
                .to_string(),
        );
    }
    if stats.flagged > 0 {
        recommendations.push(format!(
            "Manually review the {} flagged application(s).",
            stats.flagged
        ));
    }
    if !pool_gaps.is_empty() {
        recommendations.push(format!(
            "Target sourcing at missing skills: {}.",
            pool_gaps.join(", ")
        ));
    }

    ReportAnalysis {
        executive_summary: summary,
        top_candidates,
        role_fit_analysis,
        pool_gaps,
        recommendations,
        source: AnalysisSource::Fallback,
    }
}

/// Required skills that no applicant's extracted skill list contains.
fn missing_skills(job: &JobPosting, applications: &[Application]) -> Vec<String> {
    if applications.is_empty() {
        return Vec::new();
    }
    job.required_skills
        .iter()
        .filter(|skill| {
            !applications.iter().any(|app| {
                app.resume_data
                    .as_ref()
                    .and_then(|d| d.get("skills"))
                    .and_then(|s| s.as_array())
                    .is_some_and(|skills| {
                        skills
                            .iter()
                            .filter_map(|s| s.as_str())
                            .any(|s| s.eq_ignore_ascii_case(skill))
                    })
            })
        })
        .cloned()
        .collect()
}

fn build_analysis_prompt(
    job: &JobPosting,
    company_name: &str,
    stats: &ReportStats,
    applications: &[Application],
) -> String {
    let candidates = applications
        .iter()
        .take(MAX_PROMPT_APPLICANTS)
        .map(|app| {
            format!(
                "{} | {} | {} | {} | {}",
                app.candidate_name,
                app.candidate_email,
                app.ai_status.map(Decision::as_str).unwrap_or("UNSCORED"),
                app.ai_score
                    .map(|s| format!("{s:.0}"))
                    .unwrap_or_else(|| "-".to_string()),
                truncate(app.reasoning.as_deref().unwrap_or(""), MAX_REASONING_CHARS)
                    .replace('\n', " "),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let stats_text = serde_json::to_string(stats).unwrap_or_default();

    ANALYSIS_PROMPT_TEMPLATE
        .replace("{title}", &job.title)
        .replace("{company}", company_name)
        .replace("{required_skills}", &job.required_skills.join(", "))
        .replace("{stats}", &stats_text)
        .replace("{untrusted}", UNTRUSTED_INPUT_INSTRUCTION)
        .replace("{candidates}", &candidates)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}
