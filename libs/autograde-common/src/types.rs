use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type StudentId = i64;
pub type AssignmentId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Rust,
    Cpp,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::Python, Language::Java, Language::Rust, Language::Cpp];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "python" | "py" | "python3" => Some(Language::Python),
            "java" => Some(Language::Java),
            "rust" | "rs" => Some(Language::Rust),
            "cpp" | "c++" => Some(Language::Cpp),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Rust => "rust",
            Language::Cpp => "cpp",
        };
        f.write_str(name)
    }
}

/// Smallest independently executable check extracted from a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestUnit {
    /// Stable identifier: the test function name, or `assert_<n>` for bare assertions.
    pub id: String,
    pub order: u32,
    pub code: String,
    pub points: u32,
    pub visible: bool,
    /// Human readable label (function name or assertion text).
    pub label: String,
    /// Entry point the harness must invoke, if the unit is a function.
    pub entry: Option<String>,
}

/// Published, immutable test suite. Re-publishing an assignment bumps `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    pub id: Uuid,
    pub assignment_id: AssignmentId,
    pub version: u32,
    pub language: Language,
    /// Shared lines (imports, helpers) every unit is executed with.
    pub preamble: String,
    pub units: Vec<TestUnit>,
}

impl TestSuite {
    /// `None` when the unit points do not fit in a `u32`.
    pub fn total_points(&self) -> Option<u32> {
        self.units.iter().try_fold(0u32, |sum, u| sum.checked_add(u.points))
    }
}

/// Submission window: either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionWindow {
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub total_points: u32,
    pub window: SubmissionWindow,
    /// `None` means unlimited attempts.
    pub sub_limit: Option<u32>,
    pub suite: TestSuite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub student_id: StudentId,
    pub assignment_id: AssignmentId,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(student_id: StudentId, assignment_id: AssignmentId, code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            assignment_id,
            code: code.into(),
            created_at: Utc::now(),
        }
    }
}

/// Closed outcome taxonomy for one test unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Passed,
    FailedAssertion,
    Timeout,
    MemoryError,
    CompileError,
    RuntimeError,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Passed => "PASSED",
            Outcome::FailedAssertion => "FAILED_ASSERTION",
            Outcome::Timeout => "TIMEOUT",
            Outcome::MemoryError => "MEMORY_ERROR",
            Outcome::CompileError => "COMPILE_ERROR",
            Outcome::RuntimeError => "RUNTIME_ERROR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub unit_id: String,
    pub order: u32,
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
    pub time_ms: u64,
    pub memory_kb: u64,
    /// Set when the grading system, not the student, produced this result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra_failure: Option<String>,
    /// Raw provider payload kept for statuses the classifier did not recognise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl ExecutionResult {
    /// Result synthesized locally when a unit never produced sandbox output.
    pub fn infra(unit: &TestUnit, outcome: Outcome, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            unit_id: unit.id.clone(),
            order: unit.order,
            outcome,
            stdout: String::new(),
            stderr: reason.clone(),
            time_ms: 0,
            memory_kb: 0,
            infra_failure: Some(reason),
            diagnostic: None,
        }
    }

    pub fn is_infra_affected(&self) -> bool {
        self.infra_failure.is_some()
    }
}

/// Per-unit line of an attempt's breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitBreakdown {
    pub unit_id: String,
    pub label: String,
    pub outcome: Outcome,
    pub points: u32,
    pub earned: u32,
    pub visible: bool,
    pub time_ms: u64,
    pub memory_kb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra_failure: Option<String>,
}

/// Immutable snapshot of one graded execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub submission_id: Uuid,
    pub student_id: StudentId,
    pub assignment_id: AssignmentId,
    pub suite_version: u32,
    pub attempt_number: u32,
    pub grade: u8,
    pub earned_points: u32,
    pub total_points: u32,
    /// Graded over a subset of units because some were infrastructure-affected.
    pub partial: bool,
    pub breakdown: Vec<UnitBreakdown>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub student_id: StudentId,
    pub assignment_id: AssignmentId,
    pub best_grade: u8,
}

impl GradeRecord {
    pub fn new(key: AttemptKey, best_grade: u8) -> Self {
        Self {
            student_id: key.student_id,
            assignment_id: key.assignment_id,
            best_grade,
        }
    }
}

/// Key of the only shared mutable state: one ledger per (student, assignment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptKey {
    pub student_id: StudentId,
    pub assignment_id: AssignmentId,
}

impl AttemptKey {
    pub fn new(student_id: StudentId, assignment_id: AssignmentId) -> Self {
        Self { student_id, assignment_id }
    }
}

impl fmt::Display for AttemptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.assignment_id, self.student_id)
    }
}
