use crate::aggregator::GradeReport;
use crate::splitter::ParseError;
use autograde_common::types::{AssignmentId, AttemptKey};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[derive(Debug, Error)]
pub enum GradingError {
    #[error("submission window for assignment {assignment_id} opens at {opens_at}")]
    WindowNotOpen {
        assignment_id: AssignmentId,
        opens_at: DateTime<Utc>,
    },

    #[error("submission window for assignment {assignment_id} closed at {closed_at}")]
    WindowClosed {
        assignment_id: AssignmentId,
        closed_at: DateTime<Utc>,
    },

    #[error("attempt limit of {limit} reached for {key}")]
    LimitReached { key: AttemptKey, limit: u32 },

    #[error("unknown assignment {0}")]
    UnknownAssignment(AssignmentId),

    #[error("test suite has zero total points")]
    ZeroTotalPoints,

    #[error("no execution result for unit {0}")]
    MissingResult(String),

    /// Infrastructure affected the run; the student is not charged an attempt.
    /// `report` keeps the per-unit outcomes when the units did run.
    #[error("grading failed, contact instructor ({reason})")]
    GradingFailed {
        reason: String,
        report: Option<Box<GradeReport>>,
    },

    #[error("grading cancelled")]
    Cancelled,

    #[error("invalid test suite: {0}")]
    InvalidSuite(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GradingError {
    /// Errors raised before any unit was dispatched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GradingError::WindowNotOpen { .. }
                | GradingError::WindowClosed { .. }
                | GradingError::LimitReached { .. }
                | GradingError::UnknownAssignment(_)
        )
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        GradingError::GradingFailed {
            reason: reason.into(),
            report: None,
        }
    }

    /// Per-unit outcomes of a run that could not be graded.
    pub fn report(&self) -> Option<&GradeReport> {
        match self {
            GradingError::GradingFailed { report, .. } => report.as_deref(),
            _ => None,
        }
    }
}
