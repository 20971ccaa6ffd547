/// Execution Dispatcher
///
/// Runs every unit of one submission concurrently against the sandbox.
///
/// **Resource Rules:**
/// - A single semaphore is shared by every grading run in the process;
///   a saturated pool blocks further dispatch (backpressure)
/// - A permit is held for the whole sandbox call, including calls whose
///   unit already timed out locally (the remote job keeps running)
/// - The per-unit timeout starts at dispatch, not at enqueue
///
/// **Result Rules:**
/// - Exactly one `ExecutionResult` per unit, in unit order
/// - Transport failures and worker panics become infrastructure results
/// - A result arriving after its job timed out is discarded by the job
///   state machine; after cancellation nobody is listening at all

use crate::error::GradingError;
use crate::sandbox::{ExecutionLimits, Program, RawResult, Sandbox};
use autograde_common::types::{ExecutionResult, Outcome, TestUnit};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Lifecycle of one (submission, unit) execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Dispatched,
    Completed,
    TimedOut,
    Errored,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::TimedOut | JobState::Errored)
    }

    fn can_advance_to(self, next: JobState) -> bool {
        match self {
            JobState::Pending => next == JobState::Dispatched,
            JobState::Dispatched => next.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionJob {
    pub unit_id: String,
    state: JobState,
    deadline: Option<Instant>,
}

impl ExecutionJob {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            state: JobState::Pending,
            deadline: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Move forward; any other transition is rejected and leaves the job untouched.
    pub fn advance(&mut self, next: JobState) -> Result<(), JobState> {
        if self.state.can_advance_to(next) {
            self.state = next;
            Ok(())
        } else {
            Err(self.state)
        }
    }
}

/// Receiving side of a cancellation request.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

/// Sending side of a cancellation request.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelSignal(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if it never can be.
    pub async fn cancelled(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// One unit paired with the complete program that exercises it.
#[derive(Debug, Clone)]
pub struct DispatchUnit {
    pub unit: TestUnit,
    pub program: Program,
    pub limits: ExecutionLimits,
}

enum Event {
    Dispatched(usize),
    Finished(usize, Result<RawResult, String>),
}

pub struct ExecutionDispatcher {
    sandbox: Arc<dyn Sandbox>,
    pool: Arc<Semaphore>,
    unit_timeout: Duration,
}

impl ExecutionDispatcher {
    pub fn new(sandbox: Arc<dyn Sandbox>, pool_size: usize, unit_timeout: Duration) -> Self {
        Self::with_pool(sandbox, Arc::new(Semaphore::new(pool_size.max(1))), unit_timeout)
    }

    pub fn with_pool(sandbox: Arc<dyn Sandbox>, pool: Arc<Semaphore>, unit_timeout: Duration) -> Self {
        Self {
            sandbox,
            pool,
            unit_timeout,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.pool.available_permits()
    }

    /// Execute all units and classify each raw result with `classify`.
    pub async fn run<F>(
        &self,
        units: Vec<DispatchUnit>,
        classify: F,
        mut cancel: CancelSignal,
    ) -> Result<Vec<ExecutionResult>, GradingError>
    where
        F: Fn(&RawResult, &TestUnit) -> ExecutionResult,
    {
        if cancel.is_cancelled() {
            return Err(GradingError::Cancelled);
        }
        let total = units.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut jobs: Vec<ExecutionJob> = units.iter().map(|u| ExecutionJob::new(u.unit.id.clone())).collect();
        let meta: Vec<TestUnit> = units.iter().map(|u| u.unit.clone()).collect();
        let mut results: Vec<Option<ExecutionResult>> = vec![None; total];
        let mut remaining = total;

        // Dispatched + Finished per unit: sends never block
        let (tx, mut rx) = mpsc::channel::<Event>(total * 2);
        self.spawn_feeder(units, tx, cancel.clone());

        while remaining > 0 {
            let next_deadline = jobs
                .iter()
                .filter(|j| j.state == JobState::Dispatched)
                .filter_map(|j| j.deadline)
                .min();

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(units = total, finished = total - remaining, "Grading run cancelled, abandoning in-flight units");
                    return Err(GradingError::Cancelled);
                }

                event = rx.recv() => match event {
                    Some(Event::Dispatched(idx)) => {
                        if jobs[idx].advance(JobState::Dispatched).is_ok() {
                            jobs[idx].deadline = Some(Instant::now() + self.unit_timeout);
                            debug!(unit = %jobs[idx].unit_id, "Unit dispatched");
                        }
                    }
                    Some(Event::Finished(idx, outcome)) => {
                        let next = if outcome.is_ok() { JobState::Completed } else { JobState::Errored };
                        if let Err(state) = jobs[idx].advance(next) {
                            debug!(unit = %jobs[idx].unit_id, state = ?state, "Discarding late result");
                            continue;
                        }
                        let unit = &meta[idx];
                        let result = match outcome {
                            Ok(raw) => classify(&raw, unit),
                            Err(reason) => {
                                warn!(unit = %unit.id, error = %reason, "Unit failed in the grading infrastructure");
                                ExecutionResult::infra(unit, Outcome::RuntimeError, reason)
                            }
                        };
                        results[idx] = Some(result);
                        remaining -= 1;
                    }
                    None => {
                        // Every sender is gone; units still open never reported back
                        for (idx, job) in jobs.iter_mut().enumerate() {
                            if !job.state.is_terminal() {
                                job.state = JobState::Errored;
                                results[idx] = Some(ExecutionResult::infra(
                                    &meta[idx],
                                    Outcome::RuntimeError,
                                    "unit never produced a result",
                                ));
                            }
                        }
                        break;
                    }
                },

                _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                    let now = Instant::now();
                    for (idx, job) in jobs.iter_mut().enumerate() {
                        let expired = job.deadline.is_some_and(|d| d <= now);
                        if job.state == JobState::Dispatched && expired && job.advance(JobState::TimedOut).is_ok() {
                            warn!(unit = %job.unit_id, timeout_ms = self.unit_timeout.as_millis() as u64, "Unit timed out");
                            results[idx] = Some(ExecutionResult::infra(
                                &meta[idx],
                                Outcome::Timeout,
                                format!("no result within {}ms", self.unit_timeout.as_millis()),
                            ));
                            remaining -= 1;
                        }
                    }
                }
            }
        }

        let mut ordered: Vec<ExecutionResult> = results
            .into_iter()
            .zip(meta.iter())
            .map(|(result, unit)| result.ok_or_else(|| GradingError::MissingResult(unit.id.clone())))
            .collect::<Result<_, _>>()?;
        ordered.sort_by_key(|r| r.order);
        Ok(ordered)
    }

    /// Acquire a permit per unit in order, then hand the unit to its own task.
    fn spawn_feeder(&self, units: Vec<DispatchUnit>, tx: mpsc::Sender<Event>, mut cancel: CancelSignal) {
        let pool = self.pool.clone();
        let sandbox = self.sandbox.clone();

        tokio::spawn(async move {
            for (idx, dispatch) in units.into_iter().enumerate() {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    permit = pool.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                if tx.send(Event::Dispatched(idx)).await.is_err() {
                    return;
                }

                let sandbox = sandbox.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let call = sandbox.execute(&dispatch.program, &dispatch.limits);
                    let outcome = match AssertUnwindSafe(call).catch_unwind().await {
                        Ok(Ok(raw)) => Ok(raw),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(panic) => Err(format!("grading worker panicked: {}", panic_message(panic.as_ref()))),
                    };
                    // Receiver is gone after cancellation or once the run finished
                    let _ = tx.send(Event::Finished(idx, outcome)).await;
                });
            }
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
