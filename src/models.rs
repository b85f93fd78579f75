use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// One calendar month, the unit attendance is aggregated by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn current() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    /// Walks back `months` calendar months, crossing year boundaries.
    pub fn months_back(&self, months: u32) -> Self {
        let index = self.year as i64 * 12 + (self.month as i64 - 1) - months as i64;
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (year, month) = value
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got {value:?}"))?;
        let year: i32 = year.parse().map_err(|_| format!("invalid year in {value:?}"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in {value:?}"))?;
        Period::new(year, month).ok_or_else(|| format!("month out of range in {value:?}"))
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Inclusive range of periods a report looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisWindow {
    pub start: Period,
    pub end: Period,
}

impl AnalysisWindow {
    /// `months` periods ending at (and including) `anchor`.
    pub fn ending_at(anchor: Period, months: u32) -> Self {
        Self {
            start: anchor.months_back(months.max(1) - 1),
            end: anchor,
        }
    }

    pub fn label(&self) -> String {
        format!("{} to {}", self.start, self.end)
    }
}

/// A student's attendance summary for one class activity in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAttendanceAggregate {
    pub student_id: Uuid,
    pub student_name: String,
    pub class_id: Uuid,
    pub class_name: String,
    pub activity: String,
    pub period: Period,
    pub convocations: i32,
    pub presences: i32,
    pub absences: i32,
    pub deficiencies: i32,
    pub volunteer_presences: i32,
    pub volunteer_absences: i32,
}

impl PeriodAttendanceAggregate {
    pub fn validate(&self) -> Result<(), StoreError> {
        let counts = [
            self.convocations,
            self.presences,
            self.absences,
            self.deficiencies,
            self.volunteer_presences,
            self.volunteer_absences,
        ];
        if counts.iter().any(|count| *count < 0) {
            return Err(self.malformed("negative count"));
        }
        if self.presences.checked_add(self.absences) != Some(self.convocations) {
            return Err(self.malformed(&format!(
                "presences {} + absences {} != convocations {}",
                self.presences, self.absences, self.convocations
            )));
        }
        Ok(())
    }

    fn malformed(&self, reason: &str) -> StoreError {
        StoreError::Malformed {
            student_id: self.student_id,
            period: self.period,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Critical => "CRITICAL",
            RiskTier::High => "HIGH",
            RiskTier::Medium => "MEDIUM",
            RiskTier::Low => "LOW",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed intervention taxonomy, in the order the generator may emit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    UrgentContact,
    PresentialMeeting,
    PedagogyReview,
    Mentoring,
    CauseInvestigation,
    SatisfactionSurvey,
    GuardianCommunication,
    AcademicStatusCheck,
    RecoveryPlan,
    WeeklyMonitoring,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::UrgentContact => "urgent-contact",
            Recommendation::PresentialMeeting => "presential-meeting",
            Recommendation::PedagogyReview => "pedagogy-review",
            Recommendation::Mentoring => "mentoring",
            Recommendation::CauseInvestigation => "cause-investigation",
            Recommendation::SatisfactionSurvey => "satisfaction-survey",
            Recommendation::GuardianCommunication => "guardian-communication",
            Recommendation::AcademicStatusCheck => "academic-status-check",
            Recommendation::RecoveryPlan => "recovery-plan",
            Recommendation::WeeklyMonitoring => "weekly-monitoring",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Recommendation::UrgentContact => "Contact the student and guardians urgently",
            Recommendation::PresentialMeeting => "Schedule an in-person meeting",
            Recommendation::PedagogyReview => "Review the pedagogical approach for this student",
            Recommendation::Mentoring => "Assign an academic mentor",
            Recommendation::CauseInvestigation => "Investigate causes of the attendance decline",
            Recommendation::SatisfactionSurvey => "Run a course satisfaction survey",
            Recommendation::GuardianCommunication => "Notify guardians about consecutive absences",
            Recommendation::AcademicStatusCheck => "Check the student's academic standing",
            Recommendation::RecoveryPlan => "Build an attendance recovery plan",
            Recommendation::WeeklyMonitoring => "Monitor attendance weekly",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRiskProfile {
    pub student_id: Uuid,
    pub student_name: String,
    pub class_name: String,
    pub periods: Vec<Period>,
    pub percentages: Vec<f64>,
    pub mean_pct: f64,
    pub trend: f64,
    pub absence_streak: u32,
    pub deficiencies: i64,
    pub score: f64,
    pub tier: RiskTier,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortStats {
    pub analyzed: usize,
    pub at_risk: usize,
    pub risk_rate: f64,
    pub window: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortRiskReport {
    pub class_id: Option<Uuid>,
    pub students: Vec<StudentRiskProfile>,
    pub stats: CohortStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(presences: i32, absences: i32, convocations: i32) -> PeriodAttendanceAggregate {
        PeriodAttendanceAggregate {
            student_id: Uuid::new_v4(),
            student_name: "Avery Lee".to_string(),
            class_id: Uuid::new_v4(),
            class_name: "Guitar I".to_string(),
            activity: "lesson".to_string(),
            period: Period::new(2026, 3).unwrap(),
            convocations,
            presences,
            absences,
            deficiencies: 0,
            volunteer_presences: 0,
            volunteer_absences: 0,
        }
    }

    #[test]
    fn months_back_crosses_year_boundary() {
        let anchor = Period::new(2026, 2).unwrap();
        assert_eq!(anchor.months_back(1), Period::new(2026, 1).unwrap());
        assert_eq!(anchor.months_back(2), Period::new(2025, 12).unwrap());
        assert_eq!(anchor.months_back(14), Period::new(2024, 12).unwrap());
    }

    #[test]
    fn window_covers_six_periods_ending_at_anchor() {
        let window = AnalysisWindow::ending_at(Period::new(2026, 3).unwrap(), 6);
        assert_eq!(window.start, Period::new(2025, 10).unwrap());
        assert_eq!(window.end, Period::new(2026, 3).unwrap());
        assert_eq!(window.label(), "2025-10 to 2026-03");
    }

    #[test]
    fn period_parses_and_rejects_bad_months() {
        assert_eq!("2026-07".parse::<Period>().unwrap(), Period::new(2026, 7).unwrap());
        assert!("2026-13".parse::<Period>().is_err());
        assert!("202607".parse::<Period>().is_err());
    }

    #[test]
    fn validate_enforces_count_invariant() {
        assert!(aggregate(3, 1, 4).validate().is_ok());
        assert!(matches!(
            aggregate(3, 2, 4).validate(),
            Err(StoreError::Malformed { .. })
        ));
        assert!(aggregate(-1, 5, 4).validate().is_err());
    }

    #[test]
    fn validate_rejects_overflowing_counts() {
        assert!(matches!(
            aggregate(i32::MAX, 5, 4).validate(),
            Err(StoreError::Malformed { .. })
        ));
    }
}
