use thiserror::Error;
use uuid::Uuid;

use crate::models::Period;

/// Failures reading attendance aggregates.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("aggregate query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("failed to read aggregate file: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed aggregate for student {student_id} in {period}: {reason}")]
    Malformed {
        student_id: Uuid,
        period: Period,
        reason: String,
    },
}

/// The only error that crosses the analytics boundary.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("data access failed: {0}")]
    DataAccess(#[from] StoreError),
}

/// Numeric edge cases. Never escalated; callers substitute a fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputationError {
    #[error("{field} is not a finite number ({value})")]
    NonFinite { field: &'static str, value: f64 },

    #[error("mean attendance {0} is outside 0..=100")]
    MeanOutOfRange(f64),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush export buffer: {0}")]
    Io(#[from] std::io::Error),

    #[error("export produced invalid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
