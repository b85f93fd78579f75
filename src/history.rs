use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{Period, PeriodAttendanceAggregate};

/// Attendance totals for one student in one period, summed across classes
/// and activities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodTotals {
    pub period: Period,
    pub convocations: i64,
    pub presences: i64,
    pub absences: i64,
    pub deficiencies: i64,
}

impl PeriodTotals {
    pub fn attendance_pct(&self) -> f64 {
        self.presences as f64 / self.convocations as f64 * 100.0
    }
}

/// One student's periods in ascending order. Periods without convocations
/// are left out.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentHistory {
    pub student_id: Uuid,
    pub student_name: String,
    pub class_names: Vec<String>,
    pub periods: Vec<PeriodTotals>,
}

impl StudentHistory {
    pub fn class_label(&self) -> String {
        self.class_names.join(" / ")
    }

    pub fn percentages(&self) -> Vec<f64> {
        self.periods.iter().map(PeriodTotals::attendance_pct).collect()
    }

    pub fn mean_pct(&self) -> f64 {
        if self.periods.is_empty() {
            return 0.0;
        }
        self.periods.iter().map(PeriodTotals::attendance_pct).sum::<f64>() / self.periods.len() as f64
    }

    pub fn deficiency_total(&self) -> i64 {
        self.periods.iter().map(|totals| totals.deficiencies).sum()
    }

    /// Longest run of consecutive periods with at least one absence among
    /// the last `lookback` periods.
    pub fn recent_absence_streak(&self, lookback: usize) -> u32 {
        let start = self.periods.len().saturating_sub(lookback);
        let mut longest = 0u32;
        let mut current = 0u32;
        for totals in &self.periods[start..] {
            if totals.absences > 0 {
                current += 1;
                longest = longest.max(current);
            } else {
                current = 0;
            }
        }
        longest
    }
}

/// Groups aggregates by student, keeping students in order of first
/// appearance.
pub fn group_by_student(aggregates: &[PeriodAttendanceAggregate]) -> Vec<StudentHistory> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut histories: Vec<StudentHistory> = Vec::new();

    for aggregate in aggregates {
        let slot = *index.entry(aggregate.student_id).or_insert_with(|| {
            histories.push(StudentHistory {
                student_id: aggregate.student_id,
                student_name: aggregate.student_name.clone(),
                class_names: Vec::new(),
                periods: Vec::new(),
            });
            histories.len() - 1
        });
        let history = &mut histories[slot];

        if !history.class_names.contains(&aggregate.class_name) {
            history.class_names.push(aggregate.class_name.clone());
        }

        match history
            .periods
            .iter_mut()
            .find(|totals| totals.period == aggregate.period)
        {
            Some(totals) => {
                totals.convocations += aggregate.convocations as i64;
                totals.presences += aggregate.presences as i64;
                totals.absences += aggregate.absences as i64;
                totals.deficiencies += aggregate.deficiencies as i64;
            }
            None => history.periods.push(PeriodTotals {
                period: aggregate.period,
                convocations: aggregate.convocations as i64,
                presences: aggregate.presences as i64,
                absences: aggregate.absences as i64,
                deficiencies: aggregate.deficiencies as i64,
            }),
        }
    }

    for history in &mut histories {
        history.periods.retain(|totals| totals.convocations > 0);
        history.periods.sort_by_key(|totals| totals.period);
    }

    histories
}
