use uuid::Uuid;

use crate::config::HeuristicConfig;
use crate::history::{group_by_student, StudentHistory};
use crate::models::{
    AnalysisWindow, CohortRiskReport, CohortStats, PeriodAttendanceAggregate, RiskTier,
    StudentRiskProfile,
};
use crate::risk::{recommend, RiskInput, RiskScorer};
use crate::trend::estimate_trend;

/// Every student with enough history, scored, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortAnalysis {
    pub window: AnalysisWindow,
    pub profiles: Vec<StudentRiskProfile>,
    pub insufficient_history: usize,
}

pub fn analyze_cohort(
    aggregates: &[PeriodAttendanceAggregate],
    window: AnalysisWindow,
    config: &HeuristicConfig,
) -> CohortAnalysis {
    let scorer = RiskScorer::new(config.scoring.clone());
    let histories = group_by_student(aggregates);
    let total = histories.len();

    let profiles: Vec<StudentRiskProfile> = histories
        .into_iter()
        .filter(|history| history.periods.len() >= config.report.min_periods)
        .map(|history| profile_student(history, &scorer, config))
        .collect();

    CohortAnalysis {
        window,
        insufficient_history: total - profiles.len(),
        profiles,
    }
}

fn profile_student(
    history: StudentHistory,
    scorer: &RiskScorer,
    config: &HeuristicConfig,
) -> StudentRiskProfile {
    let percentages = history.percentages();
    let input = RiskInput {
        mean_pct: history.mean_pct(),
        trend: estimate_trend(&percentages, &config.trend),
        absence_streak: history.recent_absence_streak(config.report.streak_lookback),
        deficiencies: history.deficiency_total(),
    };

    let assessment = scorer.score(&input).unwrap_or_else(|err| {
        tracing::warn!(
            student_id = %history.student_id,
            error = %err,
            "risk inputs could not be scored, using neutral assessment"
        );
        scorer.neutral()
    });
    let recommendations = recommend(
        &input,
        assessment.score,
        scorer.tiers(),
        &config.recommendations,
    );

    StudentRiskProfile {
        class_name: history.class_label(),
        periods: history.periods.iter().map(|totals| totals.period).collect(),
        student_id: history.student_id,
        student_name: history.student_name,
        percentages,
        mean_pct: input.mean_pct,
        trend: input.trend,
        absence_streak: input.absence_streak,
        deficiencies: input.deficiencies,
        score: assessment.score,
        tier: assessment.tier,
        recommendations,
    }
}

/// Keeps at-risk profiles, ranks them by score and computes cohort stats.
/// Stats describe the whole at-risk population, not the truncated page.
pub fn build_report(
    analysis: &CohortAnalysis,
    class_id: Option<Uuid>,
    limit: usize,
) -> CohortRiskReport {
    let mut students: Vec<StudentRiskProfile> = analysis
        .profiles
        .iter()
        .filter(|profile| profile.tier != RiskTier::Low)
        .cloned()
        .collect();
    // stable: equal scores keep input order
    students.sort_by(|a, b| b.score.total_cmp(&a.score));

    let analyzed = analysis.profiles.len();
    let at_risk = students.len();
    students.truncate(limit);
    let risk_rate = if analyzed == 0 {
        0.0
    } else {
        (at_risk as f64 / analyzed as f64 * 1000.0).round() / 10.0
    };

    CohortRiskReport {
        class_id,
        students,
        stats: CohortStats {
            analyzed,
            at_risk,
            risk_rate,
            window: analysis.window.label(),
        },
    }
}
