// HTTP route handlers for the Autograde API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use autograde_common::types::{AssignmentId, Attempt, Language, StudentId, SubmissionWindow, UnitBreakdown};
use autograde_core::{AssignmentSpec, GradingError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::metrics;
use crate::AppState;

const HIDDEN_LABEL: &str = "hidden test";

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub language: Language,
    pub suite_source: String,
    pub total_points: u32,
    #[serde(default)]
    pub window: SubmissionWindow,
    #[serde(default)]
    pub sub_limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct UnitSummary {
    pub id: String,
    pub label: String,
    pub points: u32,
    pub visible: bool,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub assignment_id: AssignmentId,
    pub version: u32,
    pub total_points: u32,
    pub units: Vec<UnitSummary>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub student_id: StudentId,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct AttemptsResponse {
    pub assignment_id: AssignmentId,
    pub student_id: StudentId,
    pub attempt_count: usize,
    pub attempts: Vec<Attempt>,
}

#[derive(Debug, Serialize)]
pub struct BestGradeResponse {
    pub assignment_id: AssignmentId,
    pub student_id: StudentId,
    pub best_grade: Option<u8>,
}

/// Grading errors rendered as JSON with a matching status code.
pub struct ApiError(GradingError);

impl From<GradingError> for ApiError {
    fn from(e: GradingError) -> Self {
        ApiError(e)
    }
}

pub fn status_for(error: &GradingError) -> StatusCode {
    match error {
        GradingError::WindowNotOpen { .. } | GradingError::WindowClosed { .. } => StatusCode::FORBIDDEN,
        GradingError::LimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
        GradingError::UnknownAssignment(_) => StatusCode::NOT_FOUND,
        GradingError::InvalidSuite(_) => StatusCode::UNPROCESSABLE_ENTITY,
        GradingError::GradingFailed { .. } | GradingError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        GradingError::ZeroTotalPoints | GradingError::MissingResult(_) | GradingError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl ApiError {
    fn body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({ "error": self.0.to_string() });
        if let Some(report) = self.0.report() {
            let mut report = report.clone();
            redact_breakdown(&mut report.breakdown);
            body["report"] = serde_json::to_value(&report).unwrap_or_default();
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

/// Hidden units keep their outcome and points but not their name.
fn redact_breakdown(breakdown: &mut [UnitBreakdown]) {
    for unit in breakdown.iter_mut().filter(|u| !u.visible) {
        unit.label = HIDDEN_LABEL.to_string();
    }
}

pub fn redact_hidden(mut attempt: Attempt) -> Attempt {
    redact_breakdown(&mut attempt.breakdown);
    attempt
}

/// POST /assignments/{id}/suite - Split, validate and publish a test suite
pub async fn publish_suite(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<AssignmentId>,
    Json(payload): Json<PublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let spec = AssignmentSpec {
        id: assignment_id,
        language: payload.language,
        suite_source: payload.suite_source,
        total_points: payload.total_points,
        window: payload.window,
        sub_limit: payload.sub_limit,
    };
    let assignment = state.service.publish_assignment(spec).await?;

    let units = assignment
        .suite
        .units
        .iter()
        .map(|u| UnitSummary {
            id: u.id.clone(),
            label: u.label.clone(),
            points: u.points,
            visible: u.visible,
        })
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            assignment_id,
            version: assignment.suite.version,
            total_points: assignment.total_points,
            units,
        }),
    ))
}

/// POST /assignments/{id}/submissions - Grade a submission and record the attempt
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<AssignmentId>,
    Json(payload): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let started = Instant::now();
    let student_id = payload.student_id;

    // Grading runs to completion even if the client goes away, so a reserved
    // slot is always either recorded or released
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        task_state
            .service
            .grade_submission(assignment_id, student_id, &payload.code)
            .await
    });
    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(e) => Err(GradingError::failed(format!("grading task aborted: {}", e))),
    };

    metrics::GRADING_SECONDS.observe(started.elapsed().as_secs_f64());
    metrics::WORKERS_AVAILABLE.set(state.service.available_workers() as i64);

    match outcome {
        Ok(attempt) => {
            metrics::observe_attempt(&attempt);
            info!(
                assignment_id = assignment_id,
                student_id = student_id,
                attempt = attempt.attempt_number,
                grade = attempt.grade,
                "Submission graded"
            );
            Ok((StatusCode::CREATED, Json(redact_hidden(attempt))))
        }
        Err(e) => {
            let label = if e.is_rejection() { "rejected" } else { "failed" };
            metrics::SUBMISSIONS_TOTAL.with_label_values(&[label]).inc();
            warn!(assignment_id = assignment_id, student_id = student_id, error = %e, "Submission not graded");
            Err(e.into())
        }
    }
}

/// GET /assignments/{id}/students/{student_id}/attempts
pub async fn list_attempts(
    State(state): State<Arc<AppState>>,
    Path((assignment_id, student_id)): Path<(AssignmentId, StudentId)>,
) -> Result<impl IntoResponse, ApiError> {
    let attempts: Vec<Attempt> = state
        .service
        .get_attempts(assignment_id, student_id)
        .await?
        .into_iter()
        .map(redact_hidden)
        .collect();

    Ok(Json(AttemptsResponse {
        assignment_id,
        student_id,
        attempt_count: attempts.len(),
        attempts,
    }))
}

/// GET /assignments/{id}/students/{student_id}/best
pub async fn best_grade(
    State(state): State<Arc<AppState>>,
    Path((assignment_id, student_id)): Path<(AssignmentId, StudentId)>,
) -> Result<impl IntoResponse, ApiError> {
    let best_grade = state.service.get_best_grade(assignment_id, student_id).await?;
    Ok(Json(BestGradeResponse {
        assignment_id,
        student_id,
        best_grade,
    }))
}

/// GET /status - Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let languages: Vec<String> = state
        .service
        .languages()
        .list_languages()
        .iter()
        .map(|l| l.to_string())
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "workers_available": state.service.available_workers(),
            "outstanding_sandbox_submissions": state.sandbox.outstanding_tokens().len(),
            "languages": languages,
        })),
    )
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics() -> Response {
    match metrics::render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autograde_common::types::{AttemptKey, Outcome};
    use autograde_core::aggregator::GradeReport;
    use autograde_core::splitter::ParseError;
    use std::collections::BTreeMap;
    use chrono::Utc;

    fn breakdown(id: &str, visible: bool) -> UnitBreakdown {
        UnitBreakdown {
            unit_id: id.to_string(),
            label: id.to_string(),
            outcome: Outcome::Passed,
            points: 5,
            earned: 5,
            visible,
            time_ms: 1,
            memory_kb: 1,
            infra_failure: None,
        }
    }

    #[test]
    fn test_hidden_units_are_redacted() {
        let attempt = Attempt {
            submission_id: Default::default(),
            student_id: 1,
            assignment_id: 2,
            suite_version: 1,
            attempt_number: 1,
            grade: 100,
            earned_points: 10,
            total_points: 10,
            partial: false,
            breakdown: vec![breakdown("test_visible", true), breakdown("test_secret", false)],
            created_at: Utc::now(),
        };

        let redacted = redact_hidden(attempt);

        assert_eq!(redacted.breakdown[0].label, "test_visible");
        assert_eq!(redacted.breakdown[1].label, HIDDEN_LABEL);
        assert_eq!(redacted.breakdown[1].earned, 5);
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            status_for(&GradingError::LimitReached {
                key: AttemptKey::new(1, 2),
                limit: 3
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_for(&GradingError::UnknownAssignment(9)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&GradingError::InvalidSuite(ParseError::NoUnits)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&GradingError::failed("down")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_failed_grading_body_carries_redacted_report() {
        let mut timed_out = breakdown("test_secret", false);
        timed_out.outcome = Outcome::Timeout;
        timed_out.earned = 0;
        timed_out.infra_failure = Some("no result within 20000ms".to_string());
        let report = GradeReport {
            earned_points: 5,
            total_points: 10,
            grade: None,
            partial: false,
            infra_affected: vec!["test_secret".to_string()],
            by_outcome: BTreeMap::from([(Outcome::Passed, 1), (Outcome::Timeout, 1)]),
            breakdown: vec![breakdown("test_visible", true), timed_out],
        };
        let error = ApiError(GradingError::GradingFailed {
            reason: "infrastructure failure in units: test_secret".to_string(),
            report: Some(Box::new(report)),
        });

        let body = error.body();

        assert!(body["error"].as_str().unwrap().contains("contact instructor"));
        let units = body["report"]["breakdown"].as_array().unwrap();
        assert_eq!(units[0]["outcome"], "PASSED");
        assert_eq!(units[1]["outcome"], "TIMEOUT");
        assert_eq!(units[1]["label"], HIDDEN_LABEL);
        assert!(units[1]["infra_failure"].is_string());
        assert!(body["report"]["grade"].is_null());

        assert!(ApiError(GradingError::Cancelled).body().get("report").is_none());
    }
}
