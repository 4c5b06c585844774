//! Scoring Adapter: job + candidate text in, `{score, decision, reasoning}` out.
//!
//! The model path never blocks the pipeline. A missing key, a transport
//! failure, or any answer outside the closed decision set falls back to the
//! skill-overlap heuristic, and the reasoning says so.

pub mod heuristic;
pub mod prompts;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::extraction::ExtractedResume;
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, UNTRUSTED_INPUT_INSTRUCTION};
use crate::llm_client::{complete_json, CompletionModel, LlmError};
use crate::models::{Decision, JobPosting};
use crate::scoring::heuristic::heuristic_score;
use crate::scoring::prompts::SCORING_PROMPT_TEMPLATE;

/// Prefix on every fallback reasoning string.
pub const FALLBACK_PREFIX: &str = "[Automated fallback: AI scoring unavailable]";

/// Resume text beyond this many characters is not sent to the model.
const MAX_RESUME_CHARS: usize = 12_000;

/// Job context the adapter scores against.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub title: String,
    pub description: String,
    pub responsibilities: Option<String>,
    pub required_skills: Vec<String>,
}

impl From<&JobPosting> for JobContext {
    fn from(job: &JobPosting) -> Self {
        Self {
            title: job.title.clone(),
            description: job.description.clone(),
            responsibilities: job.responsibilities.clone(),
            required_skills: job.required_skills.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CandidateProfile {
    pub name: String,
    pub email: String,
    pub resume: ExtractedResume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub score: f64,
    pub decision: Decision,
    pub reasoning: String,
    pub source: ScoreSource,
}

/// Raw model answer before validation.
#[derive(Debug, Deserialize)]
struct ModelVerdict {
    score: f64,
    status: String,
    reasoning: String,
}

#[derive(Debug, Error)]
enum VerdictError {
    #[error("model unavailable")]
    Unconfigured,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("score {0} outside 0-100")]
    ScoreOutOfRange(f64),

    #[error("status '{0}' is not SHORTLIST, FLAG or REJECT")]
    UnknownStatus(String),

    #[error("empty reasoning")]
    EmptyReasoning,
}

impl ModelVerdict {
    fn validate(self) -> Result<ScoreOutcome, VerdictError> {
        if !self.score.is_finite() || !(0.0..=100.0).contains(&self.score) {
            return Err(VerdictError::ScoreOutOfRange(self.score));
        }
        let decision = self
            .status
            .parse::<Decision>()
            .map_err(|_| VerdictError::UnknownStatus(self.status.clone()))?;
        let reasoning = self.reasoning.trim();
        if reasoning.is_empty() {
            return Err(VerdictError::EmptyReasoning);
        }
        Ok(ScoreOutcome {
            score: self.score,
            decision,
            reasoning: reasoning.to_string(),
            source: ScoreSource::Model,
        })
    }
}

#[derive(Clone)]
pub struct ScoringAdapter {
    model: Option<Arc<dyn CompletionModel>>,
}

impl ScoringAdapter {
    pub fn new(model: Option<Arc<dyn CompletionModel>>) -> Self {
        if model.is_none() {
            warn!("No AI model configured; scoring and report analysis use fallbacks");
        }
        Self { model }
    }

    /// Always returns an outcome; model failures degrade to the heuristic.
    pub async fn score(&self, candidate: &CandidateProfile, job: &JobContext) -> ScoreOutcome {
        match self.score_with_model(candidate, job).await {
            Ok(outcome) => {
                info!(
                    candidate = %candidate.email,
                    score = outcome.score,
                    decision = %outcome.decision,
                    "Model scored candidate"
                );
                outcome
            }
            Err(e) => {
                warn!(candidate = %candidate.email, "Model scoring failed, using heuristic: {e}");
                fallback_outcome(candidate, job, &e.to_string())
            }
        }
    }

    async fn score_with_model(
        &self,
        candidate: &CandidateProfile,
        job: &JobContext,
    ) -> Result<ScoreOutcome, VerdictError> {
        let model = self.model.as_deref().ok_or(VerdictError::Unconfigured)?;
        let prompt = build_scoring_prompt(candidate, job);
        let verdict: ModelVerdict = complete_json(model, &prompt, JSON_ONLY_SYSTEM).await?;
        verdict.validate()
    }
}

pub fn fallback_outcome(
    candidate: &CandidateProfile,
    job: &JobContext,
    cause: &str,
) -> ScoreOutcome {
    let verdict = heuristic_score(&candidate.resume.text, &job.required_skills);
    ScoreOutcome {
        score: verdict.score,
        decision: verdict.decision,
        reasoning: format!("{FALLBACK_PREFIX} ({cause}). {}", verdict.summary),
        source: ScoreSource::Fallback,
    }
}

fn build_scoring_prompt(candidate: &CandidateProfile, job: &JobContext) -> String {
    let resume_text: String = candidate.resume.text.chars().take(MAX_RESUME_CHARS).collect();
    let links = [
        candidate.resume.linkedin_url.as_deref(),
        candidate.resume.github_url.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(", ");

    SCORING_PROMPT_TEMPLATE
        .replace("{title}", &job.title)
        .replace("{description}", &job.description)
        .replace(
            "{responsibilities}",
            job.responsibilities.as_deref().unwrap_or("(not specified)"),
        )
        .replace(
            "{required_skills}",
            &if job.required_skills.is_empty() {
                "(none listed)".to_string()
            } else {
                job.required_skills.join(", ")
            },
        )
        .replace("{candidate_name}", &candidate.name)
        .replace("{links}", if links.is_empty() { "(none)" } else { links.as_str() })
        .replace("{untrusted}", UNTRUSTED_INPUT_INSTRUCTION)
        .replace("{resume_text}", &resume_text)
}
