use serde::Serialize;
use uuid::Uuid;

use crate::config::{HeuristicConfig, InterventionConfig};
use crate::models::{CohortRiskReport, Recommendation, RiskTier, StudentRiskProfile};
use crate::report::CohortAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Preventive,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Critical => "critical",
            Urgency::High => "high",
            Urgency::Medium => "medium",
            Urgency::Preventive => "preventive",
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Urgency::Critical => "Immediate mandatory intervention",
            Urgency::High => "Urgent scheduled meeting",
            Urgency::Medium => "Reinforced follow-up",
            Urgency::Preventive => "Preventive monitoring",
        }
    }

    pub fn response_window(&self) -> &'static str {
        match self {
            Urgency::Critical => "24 hours",
            Urgency::High => "3 business days",
            Urgency::Medium => "1 week",
            Urgency::Preventive => "2 weeks",
        }
    }

    pub fn responsible(&self) -> &'static str {
        match self {
            Urgency::Critical => "coordination + counseling",
            Urgency::High => "teacher + coordination",
            Urgency::Medium => "responsible teacher",
            Urgency::Preventive => "teacher",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStudent {
    pub student_id: Uuid,
    pub student_name: String,
    pub class_name: String,
    pub score: f64,
    pub tier: RiskTier,
    pub trend: f64,
    pub recommendations: Vec<Recommendation>,
}

impl From<&StudentRiskProfile> for PlannedStudent {
    fn from(profile: &StudentRiskProfile) -> Self {
        Self {
            student_id: profile.student_id,
            student_name: profile.student_name.clone(),
            class_name: profile.class_name.clone(),
            score: profile.score,
            tier: profile.tier,
            trend: profile.trend,
            recommendations: profile.recommendations.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterventionBucket {
    pub urgency: Urgency,
    pub action: String,
    pub response_window: String,
    pub responsible: String,
    pub students: Vec<PlannedStudent>,
}

impl InterventionBucket {
    fn new(urgency: Urgency) -> Self {
        Self {
            urgency,
            action: urgency.action().to_string(),
            response_window: urgency.response_window().to_string(),
            responsible: urgency.responsible().to_string(),
            students: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterventionPlan {
    pub window: String,
    pub critical: InterventionBucket,
    pub high: InterventionBucket,
    pub medium: InterventionBucket,
    pub preventive: InterventionBucket,
    pub guidance: Vec<String>,
}

impl InterventionPlan {
    pub fn buckets(&self) -> [&InterventionBucket; 4] {
        [&self.critical, &self.high, &self.medium, &self.preventive]
    }

    pub fn at_risk_total(&self) -> usize {
        self.critical.students.len() + self.high.students.len() + self.medium.students.len()
    }
}

/// Splits the ranked report into urgency buckets. Preventive candidates come
/// from the whole analyzed cohort, since they sit below the report cut-off.
pub fn plan_interventions(
    report: &CohortRiskReport,
    analysis: &CohortAnalysis,
    config: &HeuristicConfig,
) -> InterventionPlan {
    let mut critical = InterventionBucket::new(Urgency::Critical);
    let mut high = InterventionBucket::new(Urgency::High);
    let mut medium = InterventionBucket::new(Urgency::Medium);
    let mut preventive = InterventionBucket::new(Urgency::Preventive);

    for profile in &report.students {
        let bucket = match profile.tier {
            RiskTier::Critical => &mut critical,
            RiskTier::High => &mut high,
            RiskTier::Medium => &mut medium,
            RiskTier::Low => continue,
        };
        bucket.students.push(profile.into());
    }

    preventive.students = analysis
        .profiles
        .iter()
        .filter(|profile| {
            profile.trend < config.intervention.preventive_trend
                && profile.score < config.scoring.tiers.medium
        })
        .map(PlannedStudent::from)
        .collect();

    let guidance = cohort_guidance(
        critical.students.len(),
        high.students.len(),
        critical.students.len() + high.students.len() + medium.students.len(),
        &config.intervention,
    );

    InterventionPlan {
        window: report.stats.window.clone(),
        critical,
        high,
        medium,
        preventive,
        guidance,
    }
}

fn cohort_guidance(
    critical: usize,
    high: usize,
    total: usize,
    config: &InterventionConfig,
) -> Vec<String> {
    let mut guidance = Vec::new();

    if critical > config.critical_alert_count {
        guidance.push(format!(
            "{critical} students in critical risk: review the institutional retention strategy"
        ));
    }
    if high > config.high_alert_count {
        guidance.push(format!(
            "{high} students in high risk: start a preventive attendance program"
        ));
    }
    if total > config.total_alert_count {
        guidance.push(format!(
            "{total} students at risk: analyze systemic causes of evasion"
        ));
        guidance.push("Consider expanding the pedagogical support staff".to_string());
    }
    if guidance.is_empty() {
        guidance.push("Situation controlled: keep routine monitoring".to_string());
    }

    guidance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisWindow, CohortStats, Period};

    fn profile(name: &str, score: f64, tier: RiskTier, trend: f64) -> StudentRiskProfile {
        StudentRiskProfile {
            student_id: Uuid::new_v4(),
            student_name: name.to_string(),
            class_name: "Winds".to_string(),
            periods: Vec::new(),
            percentages: Vec::new(),
            mean_pct: 100.0 - score,
            trend,
            absence_streak: 0,
            deficiencies: 0,
            score,
            tier,
            recommendations: Vec::new(),
        }
    }

    fn fixture(profiles: Vec<StudentRiskProfile>) -> (CohortRiskReport, CohortAnalysis) {
        let window = AnalysisWindow::ending_at(Period::new(2026, 6).unwrap(), 6);
        let students: Vec<StudentRiskProfile> = profiles
            .iter()
            .filter(|p| p.tier != RiskTier::Low)
            .cloned()
            .collect();
        let report = CohortRiskReport {
            class_id: None,
            stats: CohortStats {
                analyzed: profiles.len(),
                at_risk: students.len(),
                risk_rate: 0.0,
                window: window.label(),
            },
            students,
        };
        let analysis = CohortAnalysis {
            window,
            profiles,
            insufficient_history: 0,
        };
        (report, analysis)
    }

    #[test]
    fn buckets_follow_tiers_and_preventive_uses_full_cohort() {
        let (report, analysis) = fixture(vec![
            profile("crit", 85.0, RiskTier::Critical, -0.9),
            profile("high", 65.0, RiskTier::High, 0.0),
            profile("med", 45.0, RiskTier::Medium, -0.5),
            profile("slipping", 30.0, RiskTier::Low, -0.25),
            profile("steady", 20.0, RiskTier::Low, -0.1),
        ]);

        let plan = plan_interventions(&report, &analysis, &HeuristicConfig::default());

        assert_eq!(plan.critical.students.len(), 1);
        assert_eq!(plan.critical.response_window, "24 hours");
        assert_eq!(plan.high.students[0].student_name, "high");
        assert_eq!(plan.high.responsible, "teacher + coordination");
        assert_eq!(plan.medium.students[0].student_name, "med");
        assert_eq!(plan.medium.response_window, "1 week");

        let preventive: Vec<&str> = plan
            .preventive
            .students
            .iter()
            .map(|s| s.student_name.as_str())
            .collect();
        assert_eq!(preventive, vec!["slipping"]);
        assert_eq!(plan.preventive.response_window, "2 weeks");
        assert_eq!(plan.guidance.len(), 1);
        assert!(plan.guidance[0].starts_with("Situation controlled"));
        assert_eq!(plan.at_risk_total(), 3);
    }

    #[test]
    fn crowded_cohort_triggers_every_guidance_line() {
        let mut profiles = Vec::new();
        for index in 0..6 {
            profiles.push(profile(&format!("c{index}"), 90.0, RiskTier::Critical, -1.0));
        }
        for index in 0..11 {
            profiles.push(profile(&format!("h{index}"), 70.0, RiskTier::High, -1.0));
        }
        for index in 0..4 {
            profiles.push(profile(&format!("m{index}"), 50.0, RiskTier::Medium, -1.0));
        }
        let (report, analysis) = fixture(profiles);

        let plan = plan_interventions(&report, &analysis, &HeuristicConfig::default());
        assert_eq!(plan.guidance.len(), 4);
        assert!(plan.guidance[0].contains("institutional retention strategy"));
        assert!(plan.guidance[1].contains("preventive attendance program"));
        assert!(plan.guidance[2].contains("systemic causes"));
        assert!(plan.guidance[3].contains("support staff"));
        assert!(plan.preventive.students.is_empty());
    }
}
