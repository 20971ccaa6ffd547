/// Attempt Recording
///
/// **Lifecycle of one attempt:**
/// 1. `begin`: window check, then atomic slot reservation (before any dispatch)
/// 2. `commit`: persist the attempt and raise the best grade
/// 3. `abandon`: give the slot back (cancellation, infrastructure failure)
///
/// A reservation that is neither committed nor abandoned keeps its slot.

use crate::aggregator::GradeReport;
use crate::error::GradingError;
use crate::store::AttemptStore;
use autograde_common::types::{Assignment, AssignmentId, Attempt, AttemptKey, StudentId, Submission, SubmissionWindow};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// A reserved attempt slot.
#[derive(Debug)]
#[must_use = "a reservation must be committed or abandoned"]
pub struct Reservation {
    pub key: AttemptKey,
    pub attempt_number: u32,
    pub suite_version: u32,
}

/// Both bounds are inclusive; a missing bound is open.
pub fn check_window(
    assignment_id: AssignmentId,
    window: &SubmissionWindow,
    now: DateTime<Utc>,
) -> Result<(), GradingError> {
    if let Some(start) = window.start {
        if now < start {
            return Err(GradingError::WindowNotOpen {
                assignment_id,
                opens_at: start,
            });
        }
    }
    if let Some(stop) = window.stop {
        if now > stop {
            return Err(GradingError::WindowClosed {
                assignment_id,
                closed_at: stop,
            });
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct AttemptRecorder {
    store: Arc<dyn AttemptStore>,
}

impl AttemptRecorder {
    pub fn new(store: Arc<dyn AttemptStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AttemptStore> {
        &self.store
    }

    pub async fn begin(
        &self,
        assignment: &Assignment,
        student_id: StudentId,
        now: DateTime<Utc>,
    ) -> Result<Reservation, GradingError> {
        check_window(assignment.id, &assignment.window, now)?;

        let key = AttemptKey::new(student_id, assignment.id);
        let attempt_number = self
            .store
            .reserve(&key, assignment.sub_limit)
            .await?
            .ok_or(GradingError::LimitReached {
                key,
                limit: assignment.sub_limit.unwrap_or(u32::MAX),
            })?;

        info!(key = %key, attempt = attempt_number, "Reserved attempt slot");
        Ok(Reservation {
            key,
            attempt_number,
            suite_version: assignment.suite.version,
        })
    }

    /// Persist a graded attempt. A report without a grade releases the slot instead.
    pub async fn commit(
        &self,
        reservation: Reservation,
        submission: &Submission,
        report: GradeReport,
    ) -> Result<Attempt, GradingError> {
        let Some(grade) = report.grade else {
            let reason = format!("infrastructure failure in units: {}", report.infra_affected.join(", "));
            warn!(key = %reservation.key, attempt = reservation.attempt_number, reason = %reason, "Attempt not recorded");
            self.abandon(reservation).await?;
            return Err(GradingError::GradingFailed {
                reason,
                report: Some(Box::new(report)),
            });
        };

        let attempt = Attempt {
            submission_id: submission.id,
            student_id: reservation.key.student_id,
            assignment_id: reservation.key.assignment_id,
            suite_version: reservation.suite_version,
            attempt_number: reservation.attempt_number,
            grade,
            earned_points: report.earned_points,
            total_points: report.total_points,
            partial: report.partial,
            breakdown: report.breakdown,
            created_at: submission.created_at,
        };

        let record = self.store.record(&attempt).await?;
        info!(
            key = %reservation.key,
            attempt = attempt.attempt_number,
            grade = grade,
            best_grade = record.best_grade,
            partial = attempt.partial,
            "Recorded attempt"
        );
        Ok(attempt)
    }

    pub async fn abandon(&self, reservation: Reservation) -> Result<(), GradingError> {
        self.store.release(&reservation.key).await?;
        info!(key = %reservation.key, attempt = reservation.attempt_number, "Released attempt slot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAttemptStore;
    use autograde_common::types::{Language, TestSuite};
    use chrono::Duration;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn assignment(window: SubmissionWindow, sub_limit: Option<u32>) -> Assignment {
        Assignment {
            id: 11,
            total_points: 10,
            window,
            sub_limit,
            suite: TestSuite {
                id: Uuid::new_v4(),
                assignment_id: 11,
                version: 3,
                language: Language::Python,
                preamble: String::new(),
                units: Vec::new(),
            },
        }
    }

    fn report(grade: Option<u8>) -> GradeReport {
        GradeReport {
            earned_points: 5,
            total_points: 10,
            grade,
            partial: false,
            infra_affected: if grade.is_none() { vec!["test_a".to_string()] } else { Vec::new() },
            by_outcome: BTreeMap::new(),
            breakdown: Vec::new(),
        }
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let now = Utc::now();
        let window = SubmissionWindow {
            start: Some(now),
            stop: Some(now + Duration::hours(1)),
        };
        assert!(check_window(1, &window, now).is_ok());
        assert!(check_window(1, &window, now + Duration::hours(1)).is_ok());
        assert!(matches!(
            check_window(1, &window, now - Duration::seconds(1)),
            Err(GradingError::WindowNotOpen { .. })
        ));
        assert!(matches!(
            check_window(1, &window, now + Duration::hours(2)),
            Err(GradingError::WindowClosed { .. })
        ));
        assert!(check_window(1, &SubmissionWindow::default(), now).is_ok());
    }

    #[tokio::test]
    async fn test_begin_rejects_at_limit() {
        let recorder = AttemptRecorder::new(Arc::new(MemoryAttemptStore::new()));
        let assignment = assignment(SubmissionWindow::default(), Some(1));

        let first = recorder.begin(&assignment, 7, Utc::now()).await.unwrap();
        assert_eq!(first.attempt_number, 1);
        assert_eq!(first.suite_version, 3);

        let err = recorder.begin(&assignment, 7, Utc::now()).await.unwrap_err();
        assert!(matches!(err, GradingError::LimitReached { limit: 1, .. }));
        assert!(err.is_rejection());

        // Other students have their own ledger
        assert!(recorder.begin(&assignment, 8, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_commit_persists_attempt() {
        let store = Arc::new(MemoryAttemptStore::new());
        let recorder = AttemptRecorder::new(store.clone());
        let assignment = assignment(SubmissionWindow::default(), None);
        let submission = Submission::new(7, 11, "x = 1");

        let reservation = recorder.begin(&assignment, 7, Utc::now()).await.unwrap();
        let attempt = recorder.commit(reservation, &submission, report(Some(50))).await.unwrap();

        assert_eq!(attempt.grade, 50);
        assert_eq!(attempt.submission_id, submission.id);
        let key = AttemptKey::new(7, 11);
        assert_eq!(store.best_grade(&key).await.unwrap().map(|r| r.best_grade), Some(50));
        assert_eq!(store.attempts(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ungradable_report_releases_slot() {
        let store = Arc::new(MemoryAttemptStore::new());
        let recorder = AttemptRecorder::new(store.clone());
        let assignment = assignment(SubmissionWindow::default(), Some(1));
        let submission = Submission::new(7, 11, "x = 1");

        let reservation = recorder.begin(&assignment, 7, Utc::now()).await.unwrap();
        let err = recorder.commit(reservation, &submission, report(None)).await.unwrap_err();

        assert!(err.to_string().starts_with("grading failed, contact instructor"));
        assert_eq!(err.report().map(|r| r.infra_affected.clone()), Some(vec!["test_a".to_string()]));
        assert!(store.attempts(&AttemptKey::new(7, 11)).await.unwrap().is_empty());
        // Slot is usable again, with a fresh number
        let retry = recorder.begin(&assignment, 7, Utc::now()).await.unwrap();
        assert_eq!(retry.attempt_number, 2);
    }
}
