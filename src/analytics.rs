use uuid::Uuid;

use crate::config::HeuristicConfig;
use crate::correlation::{analyze_correlation, AttendanceProxyEstimator, CorrelationStudy};
use crate::db::{AggregateQuery, AggregateStore};
use crate::error::AnalyticsError;
use crate::intervention::{plan_interventions, InterventionPlan};
use crate::models::{AnalysisWindow, CohortRiskReport, Period, PeriodAttendanceAggregate};
use crate::report::{analyze_cohort, build_report, CohortAnalysis};

/// Entry point for the evasion-risk analytics. Every call reads fresh
/// aggregates and keeps no state between calls.
pub struct AttendanceAnalytics<S> {
    store: S,
    config: HeuristicConfig,
}

impl<S: AggregateStore> AttendanceAnalytics<S> {
    pub fn new(store: S, config: HeuristicConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    /// Ranked at-risk students for the window ending at `anchor`
    /// (the current month when omitted).
    pub async fn get_evasion_risk(
        &self,
        class_id: Option<Uuid>,
        limit: usize,
        anchor: Option<Period>,
    ) -> Result<CohortRiskReport, AnalyticsError> {
        let analysis = self.analyze(class_id, anchor).await?;
        let report = build_report(&analysis, class_id, limit);

        tracing::info!(
            class_id = ?class_id,
            window = %report.stats.window,
            analyzed = report.stats.analyzed,
            at_risk = report.stats.at_risk,
            insufficient_history = analysis.insufficient_history,
            "evasion risk report built"
        );
        Ok(report)
    }

    pub async fn get_intervention_plan(
        &self,
        class_id: Option<Uuid>,
        anchor: Option<Period>,
    ) -> Result<InterventionPlan, AnalyticsError> {
        let analysis = self.analyze(class_id, anchor).await?;
        let report = build_report(&analysis, class_id, self.config.report.default_limit);
        let plan = plan_interventions(&report, &analysis, &self.config);

        tracing::info!(
            class_id = ?class_id,
            window = %plan.window,
            critical = plan.critical.students.len(),
            high = plan.high.students.len(),
            medium = plan.medium.students.len(),
            preventive = plan.preventive.students.len(),
            at_risk = plan.at_risk_total(),
            "intervention plan built"
        );
        Ok(plan)
    }

    /// Correlates attendance with estimated performance, over a single
    /// period when one is given and over all stored periods otherwise.
    pub async fn get_attendance_performance_correlation(
        &self,
        class_id: Option<Uuid>,
        period: Option<Period>,
    ) -> Result<CorrelationStudy, AnalyticsError> {
        let query = AggregateQuery {
            class_id,
            from: period,
            to: period,
        };
        let aggregates = self.fetch(&query).await?;

        let correlation = &self.config.correlation;
        let mut estimator = AttendanceProxyEstimator::with_seed(correlation.seed, correlation.noise);
        let study = analyze_correlation(&aggregates, &mut estimator, correlation);

        tracing::info!(
            class_id = ?class_id,
            period = ?period.map(|p| p.to_string()),
            students = study.records.len(),
            coefficient = study.coefficient,
            strength = study.strength.as_str(),
            "attendance correlation computed"
        );
        Ok(study)
    }

    async fn analyze(
        &self,
        class_id: Option<Uuid>,
        anchor: Option<Period>,
    ) -> Result<CohortAnalysis, AnalyticsError> {
        let anchor = anchor.unwrap_or_else(Period::current);
        let window = AnalysisWindow::ending_at(anchor, self.config.report.window_months);
        let query = AggregateQuery {
            class_id,
            from: Some(window.start),
            to: Some(window.end),
        };
        let aggregates = self.fetch(&query).await?;
        Ok(analyze_cohort(&aggregates, window, &self.config))
    }

    async fn fetch(
        &self,
        query: &AggregateQuery,
    ) -> Result<Vec<PeriodAttendanceAggregate>, AnalyticsError> {
        let result = self.store.fetch_aggregates(query).await.and_then(|aggregates| {
            for aggregate in &aggregates {
                aggregate.validate()?;
            }
            Ok(aggregates)
        });

        result.map_err(|err| {
            tracing::error!(
                class_id = ?query.class_id,
                from = ?query.from.map(|p| p.to_string()),
                to = ?query.to.map(|p| p.to_string()),
                error = %err,
                "failed to read attendance aggregates"
            );
            AnalyticsError::DataAccess(err)
        })
    }
}
