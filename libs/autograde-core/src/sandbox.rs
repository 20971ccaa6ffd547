/// Sandbox Abstraction
///
/// **Boundary:**
/// - A sandbox knows HOW to run a program remotely
/// - It does NOT know outcomes, points, or grades
/// - Provider statuses are returned verbatim for the classifier to normalize
///
/// Transport failures are retried inside the implementation; whatever
/// escapes as `SandboxError` means the grading system failed, not the student.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Explicit per-call resource limits; never inferred by the client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub cpu_time_secs: f64,
    pub memory_kb: u64,
}

/// One complete program to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub language_id: u32,
    pub source: String,
    pub stdin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxToken(pub String);

impl fmt::Display for SandboxToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status exactly as the provider reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub id: i64,
    pub description: String,
}

/// Raw execution result of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResult {
    pub status: ProviderStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub compile_output: String,
    /// Provider's own diagnostic message, if any.
    pub message: Option<String>,
    pub time_ms: u64,
    pub memory_kb: u64,
    /// Unparsed provider response, kept for diagnostics.
    pub raw_payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// Network-level failure; retried before it is ever returned.
    #[error("sandbox transport error after {attempts} attempt(s): {reason}")]
    Transport { attempts: u32, reason: String },
    /// Request refused by the provider (4xx); retrying cannot help.
    #[error("sandbox rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    /// Provider never reached a terminal status within the polling budget.
    #[error("sandbox result for {token} not ready after {waited_ms}ms")]
    PollExhausted { token: String, waited_ms: u64 },
    #[error("sandbox client misconfigured: {0}")]
    Config(String),
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Queue a program for execution.
    async fn submit(&self, program: &Program, limits: &ExecutionLimits) -> Result<SandboxToken, SandboxError>;

    /// Wait for and retrieve the result of a queued program.
    async fn fetch(&self, token: &SandboxToken) -> Result<RawResult, SandboxError>;

    /// Submit then fetch.
    async fn execute(&self, program: &Program, limits: &ExecutionLimits) -> Result<RawResult, SandboxError> {
        let token = self.submit(program, limits).await?;
        self.fetch(&token).await
    }
}

const TRUNCATION_NOTICE: &str = "\n[output truncated]";

fn floor_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Cap output at about `max_bytes`, respecting UTF-8 boundaries.
///
/// The head and the last complete lines are kept: harnesses print their
/// success marker last, so it must survive truncation of a verbose unit.
pub fn cap_output(text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let tail_budget = max_bytes / 4;
    let head_end = floor_boundary(&text, max_bytes - tail_budget);
    let mut tail_start = ceil_boundary(&text, text.len() - tail_budget);

    // start the tail on a line boundary
    if tail_start > 0 && tail_start < text.len() && text.as_bytes()[tail_start - 1] != b'\n' {
        tail_start = match text[tail_start..].find('\n') {
            Some(newline) => tail_start + newline + 1,
            None => text.len(),
        };
    }

    let mut capped = String::with_capacity(head_end + TRUNCATION_NOTICE.len() + 1 + text.len() - tail_start);
    capped.push_str(&text[..head_end]);
    capped.push_str(TRUNCATION_NOTICE);
    if tail_start < text.len() {
        capped.push('\n');
        capped.push_str(&text[tail_start..]);
    }
    capped
}
