use crate::handlers;
use crate::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assignments/:id/suite", post(handlers::publish_suite))
        .route("/assignments/:id/submissions", post(handlers::submit))
        .route("/assignments/:id/students/:student_id/attempts", get(handlers::list_attempts))
        .route("/assignments/:id/students/:student_id/best", get(handlers::best_grade))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
}
