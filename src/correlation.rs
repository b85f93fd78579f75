use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

use crate::config::CorrelationConfig;
use crate::history::group_by_student;
use crate::models::PeriodAttendanceAggregate;

/// Source of a student's performance on a 0..=10 scale.
pub trait PerformanceEstimator {
    fn estimate(&mut self, attendance_pct: f64) -> f64;
}

/// Stand-in until grade data is integrated: attendance mapped onto the
/// 0..=10 scale plus seeded uniform noise.
pub struct AttendanceProxyEstimator {
    rng: StdRng,
    noise: f64,
}

impl AttendanceProxyEstimator {
    pub fn with_seed(seed: u64, noise: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            noise: if noise.is_finite() { noise.abs() } else { 0.0 },
        }
    }
}

impl PerformanceEstimator for AttendanceProxyEstimator {
    fn estimate(&mut self, attendance_pct: f64) -> f64 {
        let jitter = if self.noise > 0.0 {
            self.rng.gen_range(-self.noise..=self.noise)
        } else {
            0.0
        };
        let value = (attendance_pct / 10.0 + jitter).clamp(0.0, 10.0);
        (value * 10.0).round() / 10.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceClass {
    HighPerformance,
    GoodPerformance,
    RegularPerformance,
    LowPerformance,
    DivergentHighAttendance,
    DivergentLowAttendance,
    Undefined,
}

impl PerformanceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceClass::HighPerformance => "high-performance",
            PerformanceClass::GoodPerformance => "good-performance",
            PerformanceClass::RegularPerformance => "regular-performance",
            PerformanceClass::LowPerformance => "low-performance",
            PerformanceClass::DivergentHighAttendance => "divergent-high-attendance",
            PerformanceClass::DivergentLowAttendance => "divergent-low-attendance",
            PerformanceClass::Undefined => "undefined",
        }
    }

    pub fn is_divergent(&self) -> bool {
        matches!(
            self,
            PerformanceClass::DivergentHighAttendance | PerformanceClass::DivergentLowAttendance
        )
    }
}

pub fn classify(attendance_pct: f64, performance: f64) -> PerformanceClass {
    if attendance_pct >= 90.0 && performance >= 8.0 {
        PerformanceClass::HighPerformance
    } else if attendance_pct >= 75.0 && performance >= 7.0 {
        PerformanceClass::GoodPerformance
    } else if attendance_pct >= 75.0 && performance < 5.0 {
        PerformanceClass::DivergentHighAttendance
    } else if attendance_pct < 60.0 && performance >= 7.0 {
        PerformanceClass::DivergentLowAttendance
    } else if attendance_pct < 60.0 && performance < 5.0 {
        PerformanceClass::LowPerformance
    } else if attendance_pct >= 60.0 && performance >= 5.0 {
        PerformanceClass::RegularPerformance
    } else {
        PerformanceClass::Undefined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationStrength {
    VeryStrong,
    Strong,
    Moderate,
    Weak,
    Negligible,
}

impl CorrelationStrength {
    pub fn from_coefficient(r: f64) -> Self {
        let magnitude = r.abs();
        if magnitude >= 0.8 {
            CorrelationStrength::VeryStrong
        } else if magnitude >= 0.6 {
            CorrelationStrength::Strong
        } else if magnitude >= 0.4 {
            CorrelationStrength::Moderate
        } else if magnitude >= 0.2 {
            CorrelationStrength::Weak
        } else {
            CorrelationStrength::Negligible
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationStrength::VeryStrong => "very strong",
            CorrelationStrength::Strong => "strong",
            CorrelationStrength::Moderate => "moderate",
            CorrelationStrength::Weak => "weak",
            CorrelationStrength::Negligible => "negligible",
        }
    }
}

/// Pearson's r. Zero when there are fewer than two pairs or either series
/// has no variance.
pub fn pearson(pairs: &[(f64, f64)]) -> f64 {
    if pairs.len() < 2 {
        return 0.0;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut covariance, mut variance_x, mut variance_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        variance_x += dx * dx;
        variance_y += dy * dy;
    }

    let denominator = (variance_x * variance_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    (covariance / denominator).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationRecord {
    pub student_id: Uuid,
    pub student_name: String,
    pub class_name: String,
    pub attendance_pct: f64,
    pub deficiencies: i64,
    pub estimated_performance: f64,
    pub classification: PerformanceClass,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationStudy {
    pub records: Vec<CorrelationRecord>,
    pub coefficient: f64,
    pub strength: CorrelationStrength,
    pub mean_attendance: f64,
    pub mean_performance: f64,
    pub divergent_count: usize,
    /// Performance values are attendance-derived estimates, not grades.
    pub performance_is_estimated: bool,
    pub recommendations: Vec<String>,
}

pub fn analyze_correlation<E: PerformanceEstimator>(
    aggregates: &[PeriodAttendanceAggregate],
    estimator: &mut E,
    config: &CorrelationConfig,
) -> CorrelationStudy {
    let records: Vec<CorrelationRecord> = group_by_student(aggregates)
        .into_iter()
        .filter(|history| !history.periods.is_empty())
        .map(|history| {
            let attendance_pct = round2(history.mean_pct());
            let estimated_performance = estimator.estimate(attendance_pct);
            CorrelationRecord {
                student_id: history.student_id,
                class_name: history.class_label(),
                deficiencies: history.deficiency_total(),
                student_name: history.student_name,
                attendance_pct,
                estimated_performance,
                classification: classify(attendance_pct, estimated_performance),
            }
        })
        .collect();

    let pairs: Vec<(f64, f64)> = records
        .iter()
        .map(|record| (record.attendance_pct, record.estimated_performance))
        .collect();
    let coefficient = (pearson(&pairs) * 1000.0).round() / 1000.0;
    let strength = CorrelationStrength::from_coefficient(coefficient);
    let divergent_count = records
        .iter()
        .filter(|record| record.classification.is_divergent())
        .count();

    let (mean_attendance, mean_performance) = if pairs.is_empty() {
        (0.0, 0.0)
    } else {
        let n = pairs.len() as f64;
        (
            round2(pairs.iter().map(|(x, _)| x).sum::<f64>() / n),
            round2(pairs.iter().map(|(_, y)| y).sum::<f64>() / n),
        )
    };

    CorrelationStudy {
        recommendations: correlation_recommendations(coefficient, divergent_count, config),
        records,
        coefficient,
        strength,
        mean_attendance,
        mean_performance,
        divergent_count,
        performance_is_estimated: true,
    }
}

fn correlation_recommendations(
    coefficient: f64,
    divergent_count: usize,
    config: &CorrelationConfig,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    let band = if coefficient >= 0.6 {
        "Attendance strongly tracks performance: prioritize attendance recovery actions"
    } else if coefficient >= 0.2 {
        "Attendance partially explains performance: pair attendance follow-up with pedagogical support"
    } else if coefficient > -0.2 {
        "Attendance shows little relation to performance: investigate other performance factors"
    } else {
        "Attendance and performance move in opposite directions: review assessment criteria"
    };
    recommendations.push(band.to_string());

    if divergent_count > config.divergent_review_count {
        recommendations.push(format!(
            "{divergent_count} students with divergent attendance and performance: schedule individualized review"
        ));
    }

    recommendations
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Period;

    /// Scores every student with a fixed multiple of attendance.
    struct Linear(f64);

    impl PerformanceEstimator for Linear {
        fn estimate(&mut self, attendance_pct: f64) -> f64 {
            attendance_pct * self.0
        }
    }

    fn aggregates(presences: &[i32]) -> Vec<PeriodAttendanceAggregate> {
        presences
            .iter()
            .map(|presences| PeriodAttendanceAggregate {
                student_id: Uuid::new_v4(),
                student_name: format!("student {presences}"),
                class_id: Uuid::nil(),
                class_name: "Brass".to_string(),
                activity: "lesson".to_string(),
                period: Period::new(2026, 4).unwrap(),
                convocations: 10,
                presences: *presences,
                absences: 10 - presences,
                deficiencies: 0,
                volunteer_presences: 0,
                volunteer_absences: 0,
            })
            .collect()
    }

    #[test]
    fn perfectly_linear_series_correlate_at_one() {
        let pairs: Vec<(f64, f64)> = [20.0, 45.0, 70.0, 95.0].iter().map(|x| (*x, x * 0.1)).collect();
        assert!((pearson(&pairs) - 1.0).abs() < 1e-9);

        let inverse: Vec<(f64, f64)> = pairs.iter().map(|(x, y)| (*x, -y)).collect();
        assert!((pearson(&inverse) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_series_yield_zero() {
        assert_eq!(pearson(&[]), 0.0);
        assert_eq!(pearson(&[(50.0, 5.0)]), 0.0);
        let flat = pearson(&[(50.0, 5.0), (60.0, 5.0), (70.0, 5.0)]);
        assert_eq!(flat, 0.0);
        assert!(!flat.is_nan());
    }

    #[test]
    fn strength_labels_use_absolute_value() {
        assert_eq!(CorrelationStrength::from_coefficient(0.8), CorrelationStrength::VeryStrong);
        assert_eq!(CorrelationStrength::from_coefficient(-0.65), CorrelationStrength::Strong);
        assert_eq!(CorrelationStrength::from_coefficient(0.4), CorrelationStrength::Moderate);
        assert_eq!(CorrelationStrength::from_coefficient(-0.2), CorrelationStrength::Weak);
        assert_eq!(CorrelationStrength::from_coefficient(0.19), CorrelationStrength::Negligible);
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify(95.0, 9.0), PerformanceClass::HighPerformance);
        assert_eq!(classify(80.0, 7.5), PerformanceClass::GoodPerformance);
        assert_eq!(classify(70.0, 6.0), PerformanceClass::RegularPerformance);
        assert_eq!(classify(40.0, 3.0), PerformanceClass::LowPerformance);
        assert_eq!(classify(85.0, 4.0), PerformanceClass::DivergentHighAttendance);
        assert_eq!(classify(50.0, 8.0), PerformanceClass::DivergentLowAttendance);
        assert_eq!(classify(65.0, 4.0), PerformanceClass::Undefined);
    }

    #[test]
    fn noiseless_estimates_track_attendance() {
        let mut estimator = AttendanceProxyEstimator::with_seed(7, 0.0);
        let study = analyze_correlation(
            &aggregates(&[2, 4, 6, 8, 10]),
            &mut estimator,
            &CorrelationConfig::default(),
        );

        assert_eq!(study.records.len(), 5);
        assert_eq!(study.coefficient, 1.0);
        assert_eq!(study.strength, CorrelationStrength::VeryStrong);
        assert_eq!(study.records[4].estimated_performance, 10.0);
        assert_eq!(study.records[4].classification, PerformanceClass::HighPerformance);
        assert_eq!(study.mean_attendance, 60.0);
        assert!(study.recommendations[0].starts_with("Attendance strongly tracks"));
        assert!(study.performance_is_estimated);
    }

    #[test]
    fn seeded_noise_is_reproducible_and_bounded() {
        let rows = aggregates(&[0, 3, 5, 7, 10]);
        let config = CorrelationConfig::default();
        let first = analyze_correlation(&rows, &mut AttendanceProxyEstimator::with_seed(11, 1.0), &config);
        let second = analyze_correlation(&rows, &mut AttendanceProxyEstimator::with_seed(11, 1.0), &config);

        assert_eq!(first, second);
        for record in &first.records {
            assert!((0.0..=10.0).contains(&record.estimated_performance));
            assert!((record.estimated_performance - record.attendance_pct / 10.0).abs() <= 1.05);
        }
    }

    #[test]
    fn non_finite_noise_disables_jitter() {
        for noise in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let mut estimator = AttendanceProxyEstimator::with_seed(3, noise);
            assert_eq!(estimator.estimate(73.0), 7.3);
        }
    }

    #[test]
    fn many_divergent_records_flag_individual_review() {
        let rows = aggregates(&[9, 9, 9, 9, 9, 9, 1]);
        let study = analyze_correlation(&rows, &mut Linear(0.01), &CorrelationConfig::default());

        assert_eq!(study.divergent_count, 6);
        assert_eq!(study.recommendations.len(), 2);
        assert!(study.recommendations[1].contains("individualized review"));
    }

    #[test]
    fn empty_input_is_a_valid_study() {
        let study = analyze_correlation(&[], &mut Linear(0.1), &CorrelationConfig::default());
        assert!(study.records.is_empty());
        assert_eq!(study.coefficient, 0.0);
        assert_eq!(study.strength, CorrelationStrength::Negligible);
    }
}
