use serde::Serialize;

use crate::models::{Application, Decision};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    pub total_applicants: usize,
    pub shortlisted: usize,
    pub flagged: usize,
    pub rejected: usize,
    pub unscored: usize,
    /// Mean over applications with a score; `None` when nobody was scored.
    pub average_score: Option<f64>,
}

pub fn compute_stats(applications: &[Application]) -> ReportStats {
    let mut stats = ReportStats {
        total_applicants: applications.len(),
        ..ReportStats::default()
    };
    for app in applications {
        match app.ai_status {
            Some(Decision::Shortlist) => stats.shortlisted += 1,
            Some(Decision::Flag) => stats.flagged += 1,
            Some(Decision::Reject) => stats.rejected += 1,
            None => stats.unscored += 1,
        }
    }
    let scores: Vec<f64> = applications.iter().filter_map(|a| a.ai_score).collect();
    if !scores.is_empty() {
        stats.average_score = Some(scores.iter().sum::<f64>() / scores.len() as f64);
    }
    stats
}

/// Applications with the given decision, best score first.
pub fn ranked(applications: &[Application], decision: Decision) -> Vec<&Application> {
    let mut matching: Vec<&Application> = applications
        .iter()
        .filter(|a| a.ai_status == Some(decision))
        .collect();
    matching.sort_by(|a, b| {
        b.ai_score
            .unwrap_or(f64::MIN)
            .total_cmp(&a.ai_score.unwrap_or(f64::MIN))
            .then_with(|| a.candidate_name.cmp(&b.candidate_name))
    });
    matching
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::application;

    #[test]
    fn test_counts_and_mean_skip_unscored() {
        let apps = vec![
            application("a@x.io", Some((90.0, Decision::Shortlist))),
            application("b@x.io", Some((50.0, Decision::Flag))),
            application("c@x.io", Some((10.0, Decision::Reject))),
            application("d@x.io", None),
        ];
        let stats = compute_stats(&apps);
        assert_eq!(stats.total_applicants, 4);
        assert_eq!(stats.shortlisted, 1);
        assert_eq!(stats.flagged, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.unscored, 1);
        assert_eq!(stats.average_score, Some(50.0));
    }

    #[test]
    fn test_empty_pool_has_no_average() {
        assert_eq!(compute_stats(&[]).average_score, None);
    }

    #[test]
    fn test_ranked_orders_by_score_descending() {
        let apps = vec![
            application("low@x.io", Some((71.0, Decision::Shortlist))),
            application("high@x.io", Some((95.0, Decision::Shortlist))),
            application("flag@x.io", Some((99.0, Decision::Flag))),
        ];
        let ranked = ranked(&apps, Decision::Shortlist);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].candidate_email, "high@x.io");
    }
}
