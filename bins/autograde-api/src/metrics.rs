// Prometheus metrics exposed on GET /metrics

use autograde_common::types::Attempt;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Encoder, Histogram, IntCounterVec, IntGauge,
    TextEncoder,
};

lazy_static! {
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "autograde_submissions_total",
        "Graded submissions by result",
        &["result"]
    )
    .expect("metric names are unique");
    pub static ref UNIT_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "autograde_unit_outcomes_total",
        "Classified test unit outcomes",
        &["outcome"]
    )
    .expect("metric names are unique");
    pub static ref GRADING_SECONDS: Histogram = register_histogram!(
        "autograde_grading_seconds",
        "Wall-clock time to grade one submission",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("metric names are unique");
    pub static ref WORKERS_AVAILABLE: IntGauge = register_int_gauge!(
        "autograde_workers_available",
        "Free permits of the shared execution pool"
    )
    .expect("metric names are unique");
}

pub fn observe_attempt(attempt: &Attempt) {
    SUBMISSIONS_TOTAL.with_label_values(&["recorded"]).inc();
    for unit in &attempt.breakdown {
        UNIT_OUTCOMES_TOTAL
            .with_label_values(&[&unit.outcome.to_string()])
            .inc();
    }
}

pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
