/// Result Classification
///
/// Pure mapping from a raw sandbox result to the closed `Outcome` taxonomy.
///
/// **Rule Order (first match wins):**
/// 1. Time limit status -> `TIMEOUT`
/// 2. Memory limit status -> `MEMORY_ERROR`
/// 3. Exit 0 and the harness success marker in stdout -> `PASSED`
/// 4. Compilation status, or a compiler/syntax signature in compile output
///    (or in stderr for interpreted languages) -> `COMPILE_ERROR`
/// 5. Non-zero exit with an assertion signature in stderr -> `FAILED_ASSERTION`
/// 6. Unrecognised provider status -> `RUNTIME_ERROR` (raw payload kept)
/// 7. Provider internal error -> `RUNTIME_ERROR` flagged as infrastructure
/// 8. Anything else -> `RUNTIME_ERROR`

use crate::languages::{LanguageConfig, SUCCESS_MARKER};
use crate::sandbox::{ProviderStatus, RawResult};
use autograde_common::types::{ExecutionResult, Outcome, TestUnit};
use std::collections::HashMap;

/// Provider-neutral meaning of a sandbox status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Pending,
    /// Program ran to completion; the verdict comes from exit code and output.
    Finished,
    TimeLimit,
    MemoryLimit,
    Compilation,
    Runtime,
    Internal,
    Unknown,
}

/// Maps a provider's status vocabulary onto `StatusKind`.
#[derive(Debug, Clone)]
pub struct StatusVocabulary {
    by_id: HashMap<i64, StatusKind>,
    /// Lower-cased description fragments, checked when the id is not known.
    by_description: Vec<(String, StatusKind)>,
}

impl StatusVocabulary {
    pub fn new(by_id: HashMap<i64, StatusKind>, by_description: Vec<(String, StatusKind)>) -> Self {
        Self {
            by_id,
            by_description: by_description
                .into_iter()
                .map(|(text, kind)| (text.to_lowercase(), kind))
                .collect(),
        }
    }

    /// Judge0 CE status table.
    pub fn judge0() -> Self {
        let by_id = HashMap::from([
            (1, StatusKind::Pending),        // In Queue
            (2, StatusKind::Pending),        // Processing
            (3, StatusKind::Finished),       // Accepted
            (4, StatusKind::Finished),       // Wrong Answer (no expected_output is ever sent)
            (5, StatusKind::TimeLimit),      // Time Limit Exceeded
            (6, StatusKind::Compilation),    // Compilation Error
            (7, StatusKind::Runtime),        // SIGSEGV
            (8, StatusKind::Runtime),        // SIGXFSZ
            (9, StatusKind::Runtime),        // SIGFPE
            (10, StatusKind::Runtime),       // SIGABRT
            (11, StatusKind::Runtime),       // NZEC
            (12, StatusKind::Runtime),       // Other
            (13, StatusKind::Internal),      // Internal Error
            (14, StatusKind::Internal),      // Exec Format Error
        ]);
        let by_description = vec![
            ("memory limit".to_string(), StatusKind::MemoryLimit),
            ("time limit".to_string(), StatusKind::TimeLimit),
            ("compilation".to_string(), StatusKind::Compilation),
            ("internal error".to_string(), StatusKind::Internal),
        ];
        Self::new(by_id, by_description)
    }

    pub fn kind(&self, status: &ProviderStatus) -> StatusKind {
        let description = status.description.to_lowercase();

        // Memory exhaustion is reported as a runtime signal by some providers
        if description.contains("memory limit") {
            return StatusKind::MemoryLimit;
        }
        if let Some(kind) = self.by_id.get(&status.id) {
            return *kind;
        }
        self.by_description
            .iter()
            .find(|(text, _)| description.contains(text.as_str()))
            .map(|(_, kind)| *kind)
            .unwrap_or(StatusKind::Unknown)
    }
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        Self::judge0()
    }
}

/// Language-specific signatures the classifier looks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierRules {
    pub assertion_signatures: Vec<String>,
    pub compile_signatures: Vec<String>,
    /// Look for compile signatures in stderr too. Off for compiled languages,
    /// whose stack traces and abort messages carry file locations.
    pub compile_errors_in_stderr: bool,
}

impl From<&LanguageConfig> for ClassifierRules {
    fn from(config: &LanguageConfig) -> Self {
        Self {
            assertion_signatures: config.assertion_signatures.clone(),
            compile_signatures: config.compile_signatures.clone(),
            compile_errors_in_stderr: config.interpreted,
        }
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| !n.is_empty() && haystack.contains(n.as_str()))
}

/// Drop the harness marker line so students never see it.
fn strip_marker(stdout: &str) -> String {
    if !stdout.contains(SUCCESS_MARKER) {
        return stdout.to_string();
    }
    stdout
        .lines()
        .filter(|line| line.trim() != SUCCESS_MARKER)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classify one raw result. Never fails: every input maps to exactly one outcome.
pub fn classify(
    raw: &RawResult,
    unit: &TestUnit,
    rules: &ClassifierRules,
    vocabulary: &StatusVocabulary,
) -> ExecutionResult {
    let kind = vocabulary.kind(&raw.status);
    let exit_code = raw
        .exit_code
        .unwrap_or(if kind == StatusKind::Finished { 0 } else { 1 });
    let marker_seen = raw.stdout.lines().any(|line| line.trim() == SUCCESS_MARKER);

    let mut infra_failure = None;
    let mut diagnostic = None;

    let outcome = if kind == StatusKind::TimeLimit {
        Outcome::Timeout
    } else if kind == StatusKind::MemoryLimit {
        Outcome::MemoryError
    } else if exit_code == 0 && marker_seen {
        Outcome::Passed
    } else if kind == StatusKind::Compilation
        || contains_any(&raw.compile_output, &rules.compile_signatures)
        || (rules.compile_errors_in_stderr && contains_any(&raw.stderr, &rules.compile_signatures))
    {
        Outcome::CompileError
    } else if exit_code != 0 && contains_any(&raw.stderr, &rules.assertion_signatures) {
        Outcome::FailedAssertion
    } else if matches!(kind, StatusKind::Unknown | StatusKind::Pending) {
        diagnostic = Some(raw.raw_payload.clone());
        Outcome::RuntimeError
    } else if kind == StatusKind::Internal {
        infra_failure = Some(format!(
            "sandbox internal error: {}",
            raw.message.as_deref().unwrap_or(&raw.status.description)
        ));
        Outcome::RuntimeError
    } else {
        Outcome::RuntimeError
    };

    let stderr = if outcome == Outcome::CompileError && raw.stderr.is_empty() {
        raw.compile_output.clone()
    } else {
        raw.stderr.clone()
    };

    ExecutionResult {
        unit_id: unit.id.clone(),
        order: unit.order,
        outcome,
        stdout: strip_marker(&raw.stdout),
        stderr,
        time_ms: raw.time_ms,
        memory_kb: raw.memory_kb,
        infra_failure,
        diagnostic,
    }
}
