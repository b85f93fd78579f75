use serde::Serialize;

use crate::config::{RecommendationConfig, ScoringConfig, TierThresholds};
use crate::error::ComputationError;
use crate::models::{Recommendation, RiskTier};

/// Per-student metrics the scorer consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskInput {
    pub mean_pct: f64,
    pub trend: f64,
    pub absence_streak: u32,
    pub deficiencies: i64,
}

/// Unweighted factor values, kept for explainability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskComponents {
    pub percentage: f64,
    pub trend: f64,
    pub streak: f64,
    pub deficiency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub tier: RiskTier,
    pub components: Option<RiskComponents>,
}

pub struct RiskScorer {
    config: ScoringConfig,
}

impl RiskScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, input: &RiskInput) -> Result<RiskAssessment, ComputationError> {
        if !input.mean_pct.is_finite() {
            return Err(ComputationError::NonFinite {
                field: "mean attendance",
                value: input.mean_pct,
            });
        }
        if !input.trend.is_finite() {
            return Err(ComputationError::NonFinite {
                field: "trend",
                value: input.trend,
            });
        }
        if !(0.0..=100.0).contains(&input.mean_pct) {
            return Err(ComputationError::MeanOutOfRange(input.mean_pct));
        }

        let config = &self.config;
        let components = RiskComponents {
            percentage: (100.0 - input.mean_pct).max(0.0),
            trend: if input.trend < 0.0 {
                ((1.0 - input.trend) * config.trend_multiplier).min(config.trend_cap)
            } else {
                0.0
            },
            streak: (input.absence_streak as f64 * config.streak_step).min(config.streak_cap),
            deficiency: (input.deficiencies.max(0) as f64 * config.deficiency_step)
                .min(config.deficiency_cap),
        };

        let raw = config.percentage_weight * components.percentage
            + config.trend_weight * components.trend
            + config.streak_weight * components.streak
            + config.deficiency_weight * components.deficiency;
        let score = round2(raw.clamp(0.0, 100.0));

        Ok(RiskAssessment {
            score,
            tier: tier_for(score, &config.tiers),
            components: Some(components),
        })
    }

    /// Assessment used when the inputs could not be scored.
    pub fn neutral(&self) -> RiskAssessment {
        RiskAssessment {
            score: self.config.neutral_score,
            tier: tier_for(self.config.neutral_score, &self.config.tiers),
            components: None,
        }
    }

    pub fn tiers(&self) -> &TierThresholds {
        &self.config.tiers
    }
}

pub fn tier_for(score: f64, tiers: &TierThresholds) -> RiskTier {
    if score >= tiers.critical {
        RiskTier::Critical
    } else if score >= tiers.high {
        RiskTier::High
    } else if score >= tiers.medium {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

pub fn recommend(
    input: &RiskInput,
    score: f64,
    tiers: &TierThresholds,
    config: &RecommendationConfig,
) -> Vec<Recommendation> {
    let rules = [
        (
            score >= tiers.critical,
            [Recommendation::UrgentContact, Recommendation::PresentialMeeting],
        ),
        (
            input.mean_pct < config.low_attendance_pct,
            [Recommendation::PedagogyReview, Recommendation::Mentoring],
        ),
        (
            input.trend < config.steep_decline_trend,
            [Recommendation::CauseInvestigation, Recommendation::SatisfactionSurvey],
        ),
        (
            input.absence_streak >= config.streak_alert,
            [Recommendation::GuardianCommunication, Recommendation::AcademicStatusCheck],
        ),
        (
            score >= tiers.high,
            [Recommendation::RecoveryPlan, Recommendation::WeeklyMonitoring],
        ),
    ];

    let mut picked = Vec::new();
    for (fires, items) in rules {
        if !fires {
            continue;
        }
        for item in items {
            if !picked.contains(&item) {
                picked.push(item);
            }
        }
    }
    picked.truncate(config.max_items);
    picked
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> RiskScorer {
        RiskScorer::new(ScoringConfig::default())
    }

    fn input(mean_pct: f64, trend: f64, absence_streak: u32, deficiencies: i64) -> RiskInput {
        RiskInput {
            mean_pct,
            trend,
            absence_streak,
            deficiencies,
        }
    }

    #[test]
    fn fixed_profile_scores_46() {
        let assessment = scorer().score(&input(50.0, -1.0, 4, 10)).unwrap();
        let components = assessment.components.unwrap();
        assert_eq!(components.percentage, 50.0);
        assert_eq!(components.trend, 50.0);
        assert_eq!(components.streak, 40.0);
        assert_eq!(components.deficiency, 30.0);
        assert!((assessment.score - 46.0).abs() < 1e-9);
        assert_eq!(assessment.tier, RiskTier::Medium);
    }

    #[test]
    fn perfect_attendance_scores_zero() {
        let assessment = scorer().score(&input(100.0, 0.4, 0, 0)).unwrap();
        assert_eq!(assessment.score, 0.0);
        assert_eq!(assessment.tier, RiskTier::Low);
    }

    #[test]
    fn tier_lower_bounds_are_inclusive() {
        let tiers = TierThresholds::default();
        assert_eq!(tier_for(80.0, &tiers), RiskTier::Critical);
        assert_eq!(tier_for(79.9, &tiers), RiskTier::High);
        assert_eq!(tier_for(60.0, &tiers), RiskTier::High);
        assert_eq!(tier_for(59.9, &tiers), RiskTier::Medium);
        assert_eq!(tier_for(40.0, &tiers), RiskTier::Medium);
        assert_eq!(tier_for(39.9, &tiers), RiskTier::Low);
    }

    #[test]
    fn malformed_input_is_reported_not_raised() {
        let scorer = scorer();
        assert!(matches!(
            scorer.score(&input(f64::NAN, 0.0, 0, 0)),
            Err(ComputationError::NonFinite { .. })
        ));
        assert_eq!(
            scorer.score(&input(140.0, 0.0, 0, 0)),
            Err(ComputationError::MeanOutOfRange(140.0))
        );

        let neutral = scorer.neutral();
        assert_eq!(neutral.score, 50.0);
        assert_eq!(neutral.tier, RiskTier::Medium);
    }

    #[test]
    fn alternate_weights_change_the_score() {
        let config = ScoringConfig {
            percentage_weight: 1.0,
            trend_weight: 0.0,
            streak_weight: 0.0,
            deficiency_weight: 0.0,
            ..ScoringConfig::default()
        };
        let assessment = RiskScorer::new(config).score(&input(15.0, -0.5, 3, 2)).unwrap();
        assert_eq!(assessment.score, 85.0);
        assert_eq!(assessment.tier, RiskTier::Critical);
    }

    #[test]
    fn recommendations_follow_rule_order_and_truncate() {
        let tiers = TierThresholds::default();
        let config = RecommendationConfig::default();
        let items = recommend(&input(20.0, -0.8, 3, 6), 85.0, &tiers, &config);
        assert_eq!(
            items,
            vec![
                Recommendation::UrgentContact,
                Recommendation::PresentialMeeting,
                Recommendation::PedagogyReview,
                Recommendation::Mentoring,
                Recommendation::CauseInvestigation,
            ]
        );
    }

    #[test]
    fn recommendations_for_moderate_risk() {
        let tiers = TierThresholds::default();
        let config = RecommendationConfig::default();
        let items = recommend(&input(70.0, -0.1, 2, 0), 62.0, &tiers, &config);
        assert_eq!(
            items,
            vec![
                Recommendation::GuardianCommunication,
                Recommendation::AcademicStatusCheck,
                Recommendation::RecoveryPlan,
                Recommendation::WeeklyMonitoring,
            ]
        );
        assert!(recommend(&input(95.0, 0.2, 0, 0), 5.0, &tiers, &config).is_empty());
    }
}
