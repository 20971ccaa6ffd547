// Scripted sandbox for tests: behaviour is chosen by directives in the program source
//   @sleep=<ms>    delay before answering
//   @panic         panic inside the call
//   @transport     fail with an exhausted transport error
//   @assert_fail   exit 1 with an AssertionError
//   @syntax        exit 1 with a SyntaxError
//   @tle           provider time limit status
//   @internal      provider internal error
// Anything else exits 0 and prints the success marker.

use crate::languages::SUCCESS_MARKER;
use crate::sandbox::{ExecutionLimits, Program, ProviderStatus, RawResult, Sandbox, SandboxError, SandboxToken};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct StubSandbox {
    queued: DashMap<SandboxToken, Program>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn status(id: i64, description: &str) -> ProviderStatus {
    ProviderStatus {
        id,
        description: description.to_string(),
    }
}

fn result(status: ProviderStatus, exit_code: Option<i32>, stdout: &str, stderr: &str) -> RawResult {
    RawResult {
        raw_payload: format!("{{\"status\":{{\"id\":{}}}}}", status.id),
        status,
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        compile_output: String::new(),
        message: None,
        time_ms: 3,
        memory_kb: 1024,
    }
}

fn sleep_directive(source: &str) -> Option<u64> {
    let start = source.find("@sleep=")? + "@sleep=".len();
    let digits: String = source[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[async_trait]
impl Sandbox for StubSandbox {
    async fn submit(&self, program: &Program, _limits: &ExecutionLimits) -> Result<SandboxToken, SandboxError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let token = SandboxToken(format!("stub-{}", n));
        self.queued.insert(token.clone(), program.clone());
        Ok(token)
    }

    async fn fetch(&self, token: &SandboxToken) -> Result<RawResult, SandboxError> {
        let (_, program) = self
            .queued
            .remove(token)
            .ok_or_else(|| SandboxError::Rejected {
                status: 404,
                body: format!("unknown token {}", token),
            })?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(ms) = sleep_directive(&program.source) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        let source = program.source.as_str();
        if source.contains("@panic") {
            panic!("stub sandbox exploded");
        }
        if source.contains("@transport") {
            return Err(SandboxError::Transport {
                attempts: 3,
                reason: "connection refused".to_string(),
            });
        }

        let raw = if source.contains("@syntax") {
            result(status(11, "Runtime Error (NZEC)"), Some(1), "", "SyntaxError: invalid syntax")
        } else if source.contains("@tle") {
            result(status(5, "Time Limit Exceeded"), None, "", "")
        } else if source.contains("@internal") {
            result(status(13, "Internal Error"), None, "", "")
        } else if source.contains("@assert_fail") {
            result(
                status(11, "Runtime Error (NZEC)"),
                Some(1),
                "",
                "Traceback (most recent call last):\nAssertionError",
            )
        } else {
            result(status(3, "Accepted"), Some(0), &format!("{}\n", SUCCESS_MARKER), "")
        };
        Ok(raw)
    }
}
