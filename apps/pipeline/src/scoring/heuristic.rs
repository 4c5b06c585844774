//! Deterministic fallback used when the model is unavailable or answers badly.

use crate::extraction::skills_found;
use crate::models::Decision;

pub const SHORTLIST_THRESHOLD: f64 = 70.0;
pub const FLAG_THRESHOLD: f64 = 40.0;

/// Score given to a readable resume for a job without required skills.
const NEUTRAL_SCORE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicVerdict {
    pub score: f64,
    pub decision: Decision,
    pub matched: Vec<String>,
    pub summary: String,
}

pub fn decision_for_score(score: f64) -> Decision {
    if score >= SHORTLIST_THRESHOLD {
        Decision::Shortlist
    } else if score >= FLAG_THRESHOLD {
        Decision::Flag
    } else {
        Decision::Reject
    }
}

/// Skill-overlap ratio against the required skills, scaled to 0–100.
///
/// An empty resume is flagged for a human rather than rejected, and so is a
/// job with no required skills, since there is nothing to measure against.
pub fn heuristic_score(resume_text: &str, required_skills: &[String]) -> HeuristicVerdict {
    if resume_text.trim().is_empty() {
        return HeuristicVerdict {
            score: 0.0,
            decision: Decision::Flag,
            matched: Vec::new(),
            summary: "No readable resume text; needs manual review.".to_string(),
        };
    }

    if required_skills.is_empty() {
        return HeuristicVerdict {
            score: NEUTRAL_SCORE,
            decision: Decision::Flag,
            matched: Vec::new(),
            summary: "Job lists no required skills; needs manual review.".to_string(),
        };
    }

    let matched = skills_found(resume_text, required_skills);
    let ratio = matched.len() as f64 / required_skills.len() as f64;
    let score = (ratio * 100.0).round().clamp(0.0, 100.0);
    let decision = decision_for_score(score);

    let summary = if matched.is_empty() {
        format!("Matched 0 of {} required skills.", required_skills.len())
    } else {
        format!(
            "Matched {} of {} required skills: {}.",
            matched.len(),
            required_skills.len(),
            matched.join(", ")
        )
    };

    HeuristicVerdict {
        score,
        decision,
        matched,
        summary,
    }
}
