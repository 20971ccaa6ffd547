/// Grading Service
///
/// Entry point of the engine. One call grades one submission:
///
/// 1. Load the published assignment and build one program per unit
/// 2. Check the window and reserve an attempt slot (nothing dispatched yet)
/// 3. Dispatch every unit, classify each raw result
/// 4. Aggregate into a grade report
/// 5. Record the attempt, or release the slot if grading could not finish

use crate::aggregator::{aggregate, GradeReport};
use crate::classifier::{classify, ClassifierRules, StatusVocabulary};
use crate::dispatcher::{CancelSignal, DispatchUnit, ExecutionDispatcher};
use crate::error::GradingError;
use crate::harness;
use crate::languages::LanguageConfigManager;
use crate::recorder::AttemptRecorder;
use crate::sandbox::{ExecutionLimits, Program, RawResult, Sandbox};
use crate::splitter::{validate_total, ParseError, SplitSuite, TestUnitSplitter};
use crate::store::AttemptStore;
use autograde_common::config::GradingConfig;
use autograde_common::types::{
    Assignment, AssignmentId, Attempt, AttemptKey, ExecutionResult, GradeRecord, Language, StudentId,
    Submission, SubmissionWindow, TestSuite, TestUnit,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Instructor input for publishing (or re-publishing) an assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSpec {
    pub id: AssignmentId,
    pub language: Language,
    /// Raw test suite source, split into units on publication.
    pub suite_source: String,
    pub total_points: u32,
    #[serde(default)]
    pub window: SubmissionWindow,
    #[serde(default)]
    pub sub_limit: Option<u32>,
}

pub struct GradingService {
    config: GradingConfig,
    languages: LanguageConfigManager,
    splitter: TestUnitSplitter,
    dispatcher: ExecutionDispatcher,
    recorder: AttemptRecorder,
    vocabulary: StatusVocabulary,
}

impl GradingService {
    pub fn new(
        config: GradingConfig,
        languages: LanguageConfigManager,
        sandbox: Arc<dyn Sandbox>,
        store: Arc<dyn AttemptStore>,
    ) -> Self {
        let splitter = TestUnitSplitter::from_languages(&languages);
        let dispatcher = ExecutionDispatcher::new(sandbox, config.worker_pool_size, config.unit_timeout);
        Self {
            config,
            languages,
            splitter,
            dispatcher,
            recorder: AttemptRecorder::new(store),
            vocabulary: StatusVocabulary::judge0(),
        }
    }

    pub fn with_vocabulary(mut self, vocabulary: StatusVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub fn languages(&self) -> &LanguageConfigManager {
        &self.languages
    }

    /// Free permits of the shared execution pool.
    pub fn available_workers(&self) -> usize {
        self.dispatcher.available_permits()
    }

    pub fn split(&self, source: &str, language: Language) -> Result<SplitSuite, ParseError> {
        self.splitter.split(source, language)
    }

    /// Split and validate a suite, then store it as the next version of the assignment.
    #[instrument(skip(self, spec), fields(assignment_id = spec.id, language = %spec.language))]
    pub async fn publish_assignment(&self, spec: AssignmentSpec) -> Result<Assignment, GradingError> {
        let split = self.splitter.split(&spec.suite_source, spec.language)?;
        validate_total(&split, spec.total_points)?;

        let store = self.recorder.store();
        let version = store
            .assignment(spec.id)
            .await?
            .map(|previous| previous.suite.version + 1)
            .unwrap_or(1);

        let assignment = Assignment {
            id: spec.id,
            total_points: spec.total_points,
            window: spec.window,
            sub_limit: spec.sub_limit,
            suite: TestSuite {
                id: Uuid::new_v4(),
                assignment_id: spec.id,
                version,
                language: spec.language,
                preamble: split.preamble,
                units: split.units,
            },
        };
        store.save_assignment(&assignment).await?;

        info!(
            version = version,
            units = assignment.suite.units.len(),
            total_points = assignment.total_points,
            "Published assignment"
        );
        Ok(assignment)
    }

    pub async fn assignment(&self, id: AssignmentId) -> Result<Assignment, GradingError> {
        self.recorder
            .store()
            .assignment(id)
            .await?
            .ok_or(GradingError::UnknownAssignment(id))
    }

    pub async fn grade_submission(
        &self,
        assignment_id: AssignmentId,
        student_id: StudentId,
        code: &str,
    ) -> Result<Attempt, GradingError> {
        self.grade_submission_cancellable(assignment_id, student_id, code, CancelSignal::never())
            .await
    }

    #[instrument(skip(self, code, cancel), fields(code_size = code.len()))]
    pub async fn grade_submission_cancellable(
        &self,
        assignment_id: AssignmentId,
        student_id: StudentId,
        code: &str,
        cancel: CancelSignal,
    ) -> Result<Attempt, GradingError> {
        let assignment = self.assignment(assignment_id).await?;
        let units = self.build_units(&assignment.suite, code)?;

        let reservation = self.recorder.begin(&assignment, student_id, Utc::now()).await?;
        let submission = Submission::new(student_id, assignment_id, code);

        let graded = match self.dispatch(&assignment.suite, units, cancel).await {
            Ok(results) => aggregate(&assignment.suite.units, &results, self.config.partial_policy),
            Err(e) => Err(e),
        };

        match graded {
            Ok(report) => self.recorder.commit(reservation, &submission, report).await,
            Err(e) => {
                warn!(error = %e, attempt = reservation.attempt_number, "Grading did not complete");
                if let Err(release) = self.recorder.abandon(reservation).await {
                    warn!(error = %release, "Failed to release attempt slot");
                }
                Err(e)
            }
        }
    }

    /// Run a suite against code without touching any attempt ledger.
    pub async fn evaluate(
        &self,
        suite: &TestSuite,
        code: &str,
        cancel: CancelSignal,
    ) -> Result<(Vec<ExecutionResult>, GradeReport), GradingError> {
        let units = self.build_units(suite, code)?;
        let results = self.dispatch(suite, units, cancel).await?;
        let report = aggregate(&suite.units, &results, self.config.partial_policy)?;
        Ok((results, report))
    }

    pub async fn get_attempts(
        &self,
        assignment_id: AssignmentId,
        student_id: StudentId,
    ) -> Result<Vec<Attempt>, GradingError> {
        let key = AttemptKey::new(student_id, assignment_id);
        Ok(self.recorder.store().attempts(&key).await?)
    }

    pub async fn get_grade_record(
        &self,
        assignment_id: AssignmentId,
        student_id: StudentId,
    ) -> Result<Option<GradeRecord>, GradingError> {
        let key = AttemptKey::new(student_id, assignment_id);
        Ok(self.recorder.store().best_grade(&key).await?)
    }

    pub async fn get_best_grade(
        &self,
        assignment_id: AssignmentId,
        student_id: StudentId,
    ) -> Result<Option<u8>, GradingError> {
        let record = self.get_grade_record(assignment_id, student_id).await?;
        Ok(record.map(|r| r.best_grade))
    }

    fn build_units(&self, suite: &TestSuite, code: &str) -> Result<Vec<DispatchUnit>, GradingError> {
        let config = self
            .languages
            .get_config(&suite.language)
            .map_err(|_| ParseError::UnsupportedLanguage(suite.language))?;
        let limits = ExecutionLimits {
            cpu_time_secs: config.cpu_time_limit_secs,
            memory_kb: config.memory_limit_kb,
        };

        Ok(suite
            .units
            .iter()
            .map(|unit| DispatchUnit {
                unit: unit.clone(),
                program: Program {
                    language_id: config.sandbox_language_id,
                    source: harness::render(config, &suite.preamble, code, unit),
                    stdin: String::new(),
                },
                limits,
            })
            .collect())
    }

    async fn dispatch(
        &self,
        suite: &TestSuite,
        units: Vec<DispatchUnit>,
        cancel: CancelSignal,
    ) -> Result<Vec<ExecutionResult>, GradingError> {
        let config = self
            .languages
            .get_config(&suite.language)
            .map_err(|_| ParseError::UnsupportedLanguage(suite.language))?;
        let rules = ClassifierRules::from(config);
        let vocabulary = &self.vocabulary;

        self.dispatcher
            .run(
                units,
                |raw: &RawResult, unit: &TestUnit| classify(raw, unit, &rules, vocabulary),
                cancel,
            )
            .await
    }
}
