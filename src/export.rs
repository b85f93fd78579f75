use serde::Serialize;
use uuid::Uuid;

use crate::correlation::{CorrelationStudy, PerformanceClass};
use crate::error::ExportError;
use crate::intervention::{InterventionPlan, Urgency};
use crate::models::{CohortRiskReport, RiskTier};

/// Separator for list-valued cells.
const LIST_SEPARATOR: &str = "|";

const RISK_HEADERS: [&str; 11] = [
    "student_id",
    "student_name",
    "class_name",
    "percentages",
    "mean_pct",
    "trend",
    "absence_streak",
    "deficiencies",
    "score",
    "tier",
    "recommendations",
];

const PLAN_HEADERS: [&str; 10] = [
    "urgency",
    "action",
    "response_window",
    "responsible",
    "student_id",
    "student_name",
    "class_name",
    "score",
    "tier",
    "trend",
];

const CORRELATION_HEADERS: [&str; 7] = [
    "student_id",
    "student_name",
    "class_name",
    "attendance_pct",
    "deficiencies",
    "estimated_performance",
    "classification",
];

#[derive(Serialize)]
struct RiskRow<'a> {
    student_id: Uuid,
    student_name: &'a str,
    class_name: &'a str,
    percentages: String,
    mean_pct: f64,
    trend: f64,
    absence_streak: u32,
    deficiencies: i64,
    score: f64,
    tier: RiskTier,
    recommendations: String,
}

#[derive(Serialize)]
struct PlanRow<'a> {
    urgency: Urgency,
    action: &'a str,
    response_window: &'a str,
    responsible: &'a str,
    student_id: Uuid,
    student_name: &'a str,
    class_name: &'a str,
    score: f64,
    tier: RiskTier,
    trend: f64,
}

#[derive(Serialize)]
struct CorrelationRow<'a> {
    student_id: Uuid,
    student_name: &'a str,
    class_name: &'a str,
    attendance_pct: f64,
    deficiencies: i64,
    estimated_performance: f64,
    classification: PerformanceClass,
}

pub fn export_risk_report(report: &CohortRiskReport, delimiter: u8) -> Result<String, ExportError> {
    let rows = report.students.iter().map(|profile| RiskRow {
        student_id: profile.student_id,
        student_name: &profile.student_name,
        class_name: &profile.class_name,
        percentages: profile
            .percentages
            .iter()
            .map(|pct| format!("{pct:.2}"))
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        mean_pct: profile.mean_pct,
        trend: profile.trend,
        absence_streak: profile.absence_streak,
        deficiencies: profile.deficiencies,
        score: profile.score,
        tier: profile.tier,
        recommendations: profile
            .recommendations
            .iter()
            .map(|item| item.as_str())
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
    });
    write_rows(&RISK_HEADERS, rows, delimiter)
}

pub fn export_intervention_plan(
    plan: &InterventionPlan,
    delimiter: u8,
) -> Result<String, ExportError> {
    let rows = plan.buckets().into_iter().flat_map(|bucket| {
        bucket.students.iter().map(move |student| PlanRow {
            urgency: bucket.urgency,
            action: &bucket.action,
            response_window: &bucket.response_window,
            responsible: &bucket.responsible,
            student_id: student.student_id,
            student_name: &student.student_name,
            class_name: &student.class_name,
            score: student.score,
            tier: student.tier,
            trend: student.trend,
        })
    });
    write_rows(&PLAN_HEADERS, rows, delimiter)
}

pub fn export_correlation(study: &CorrelationStudy, delimiter: u8) -> Result<String, ExportError> {
    let rows = study.records.iter().map(|record| CorrelationRow {
        student_id: record.student_id,
        student_name: &record.student_name,
        class_name: &record.class_name,
        attendance_pct: record.attendance_pct,
        deficiencies: record.deficiencies,
        estimated_performance: record.estimated_performance,
        classification: record.classification,
    });
    write_rows(&CORRELATION_HEADERS, rows, delimiter)
}

fn write_rows<T, I>(headers: &[&str], rows: I, delimiter: u8) -> Result<String, ExportError>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}
