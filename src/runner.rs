//! The bulk test runner.
//!
//! Walks contexts → categories → STACK questions → variant seeds, runs every
//! stored test case against every variant, and folds the outcome into a
//! [`RunReport`]. Problems scoped to one question or one variant never abort
//! the run; store and environment failures do.
//!
//! Traversal order is fixed (categories by path, questions by name) so two
//! runs over the same bank produce the same report.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{DisplayOptions, QuestionEngine, Variant};
use crate::environment::ExecutionEnvironment;
use crate::errors::{BulkTestError, Result};
use crate::model::{
    Category, Context, ContextId, Question, Seed, StoredTestCase, TestCaseId, TestCaseResult,
    VariantOutcome,
};
use crate::progress::ProgressSink;
use crate::report::{QuestionLabel, QuestionProblem, ReportEntry, ReportSection, RunReport};
use crate::store::{QuestionStore, TestCaseStore};
use crate::usage::QuestionUsage;

// =============================================================================
// SCOPE
// =============================================================================

/// A context holding STACK questions, with its categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeEntry {
    pub context: Context,
    pub categories: Vec<Category>,
    pub question_count: usize,
}

/// Every context with at least one STACK question, ordered by context path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scope {
    pub contexts: Vec<ScopeEntry>,
}

impl Scope {
    pub fn question_counts(&self) -> BTreeMap<ContextId, usize> {
        self.contexts
            .iter()
            .map(|e| (e.context.id, e.question_count))
            .collect()
    }

    pub fn total_questions(&self) -> usize {
        self.contexts.iter().map(|e| e.question_count).sum()
    }
}

// =============================================================================
// VARIANT RESULTS
// =============================================================================

/// What seeding the cache for one variant produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedCacheOutcome {
    pub seed: Seed,
    pub rendered: String,
    pub general_feedback: String,
    pub summary: String,
    pub variables: Vec<(String, String)>,
    pub teacher_answers: Vec<(String, String)>,
    pub runtime_errors: Vec<String>,
}

/// A variant's aggregate outcome together with every test case result.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRun {
    pub seed: Seed,
    pub outcome: VariantOutcome,
    pub results: Vec<(TestCaseId, TestCaseResult)>,
}

fn pin(question: &Question, seed: Option<Seed>) -> Question {
    match seed {
        Some(seed) => question.with_seed_override(seed),
        None => question.clone(),
    }
}

// =============================================================================
// RUNNER
// =============================================================================

pub struct BulkTester<'a, E: QuestionEngine> {
    questions: &'a dyn QuestionStore,
    tests: &'a dyn TestCaseStore,
    engine: &'a E,
    environment: &'a mut dyn ExecutionEnvironment,
}

impl<'a, E: QuestionEngine> BulkTester<'a, E> {
    pub fn new(
        questions: &'a dyn QuestionStore,
        tests: &'a dyn TestCaseStore,
        engine: &'a E,
        environment: &'a mut dyn ExecutionEnvironment,
    ) -> Self {
        Self {
            questions,
            tests,
            engine,
            environment,
        }
    }

    /// Every context holding STACK questions, with its question count.
    pub fn enumerate_questions_by_context(&self) -> Result<Scope> {
        let mut contexts = Vec::new();
        for context in self.questions.list_contexts()? {
            let categories = self.questions.list_categories(context.id)?;
            let mut question_count = 0;
            for category in &categories {
                question_count += self.questions.list_questions_by_category(category.id)?.len();
            }
            if question_count > 0 {
                contexts.push(ScopeEntry {
                    context,
                    categories,
                    question_count,
                });
            }
        }
        Ok(Scope { contexts })
    }

    /// Runs every test of every variant of every STACK question in `context`.
    ///
    /// Returns whether everything passed, and the report of what did not.
    pub fn run_all_tests_for_context(
        &mut self,
        context: &Context,
        sink: &mut dyn ProgressSink,
    ) -> Result<(bool, RunReport)> {
        info!(context = context.id, name = %context.name, "running question tests");
        let mut all_passed = true;
        let mut report = RunReport::default();

        for category in self.questions.list_categories(context.id)? {
            let questions = self.questions.list_questions_by_category(category.id)?;
            if questions.is_empty() {
                continue;
            }
            sink.on_category(&category, questions.len());

            for (id, name) in questions {
                let question = self.questions.load_question(id)?;
                let label = QuestionLabel {
                    context: context.name.clone(),
                    question: id,
                    name,
                };
                if !self.run_question(&question, &label, &mut report, sink)? {
                    all_passed = false;
                }
            }
        }

        info!(context = context.id, all_passed, "finished question tests");
        Ok((all_passed, report))
    }

    /// Runs every context of the scope in order and merges their reports.
    pub fn run_all_contexts(&mut self, sink: &mut dyn ProgressSink) -> Result<(bool, RunReport)> {
        let scope = self.enumerate_questions_by_context()?;
        let mut all_passed = true;
        let mut report = RunReport::default();
        for entry in &scope.contexts {
            let (passed, context_report) = self.run_all_tests_for_context(&entry.context, sink)?;
            all_passed &= passed;
            report.merge(context_report);
        }
        Ok((all_passed, report))
    }

    fn run_question(
        &mut self,
        question: &Question,
        label: &QuestionLabel,
        report: &mut RunReport,
        sink: &mut dyn ProgressSink,
    ) -> Result<bool> {
        match self.engine.validate_against_version(question) {
            Ok(()) => {}
            Err(BulkTestError::VersionIncompatible { message, .. }) => {
                info!(question = question.id, %message, "question fails the upgrade check");
                sink.on_upgrade_failure(label, &message);
                report.push(
                    ReportSection::FailingUpgrades,
                    ReportEntry::new(label, None, Some(message)),
                );
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        let tests = self.tests.load_test_cases(question.id)?;
        let mut problems = Vec::new();
        if !question.has_general_feedback() {
            problems.push(QuestionProblem::NoGeneralFeedback);
        }
        if tests.is_empty() {
            problems.push(QuestionProblem::NoTests);
        }
        for problem in &problems {
            report.push(problem.section(), ReportEntry::new(label, None, None));
        }
        sink.on_question(label, &problems);

        let mut passed = true;
        for seed in question.seeds_to_test() {
            let cached = self.seed_cache(question, seed)?;
            sink.on_seed_cache(label, seed, &cached.runtime_errors);
            if tests.is_empty() {
                continue;
            }

            let outcome = self.test_question(question, &tests, seed)?;
            sink.on_variant_result(label, seed, &outcome);
            if !outcome.passed {
                passed = false;
                report.push(
                    ReportSection::FailingTests,
                    ReportEntry::new(label, seed, Some(outcome.message())),
                );
            }
        }
        Ok(passed)
    }

    fn prepare_variant(&mut self) -> Result<()> {
        self.environment.before_variant()?;
        self.engine.collect_garbage();
        Ok(())
    }

    /// Instantiates one variant and evaluates its text, general feedback and
    /// summary, so that evaluation errors surface even without tests.
    pub fn seed_cache(&mut self, question: &Question, seed: Option<Seed>) -> Result<SeedCacheOutcome> {
        self.prepare_variant()?;
        let pinned = pin(question, seed);
        let effective = pinned.effective_seed();

        let mut usage = match QuestionUsage::start(self.engine, pinned) {
            Ok(usage) => usage,
            Err(e) if !e.is_fatal() => {
                warn!(question = question.id, seed = effective, error = %e, "cannot instantiate variant");
                self.environment.after_variant()?;
                return Ok(SeedCacheOutcome {
                    seed: effective,
                    rendered: String::new(),
                    general_feedback: String::new(),
                    summary: String::new(),
                    variables: Vec::new(),
                    teacher_answers: Vec::new(),
                    runtime_errors: vec![e.to_string()],
                });
            }
            Err(e) => return Err(e),
        };

        let rendered = usage.render(&DisplayOptions::preview());
        let general_feedback = usage.variant_mut().general_feedback();
        let summary = usage.variant_mut().summary();
        let variables = usage.variant().variables();
        let teacher_answers = usage.teacher_answers();
        let runtime_errors: Vec<String> = usage.runtime_errors().iter().cloned().collect();
        if !runtime_errors.is_empty() {
            warn!(question = question.id, seed = effective, errors = ?runtime_errors, "runtime errors while seeding the cache");
        }
        drop(usage);
        self.environment.after_variant()?;

        Ok(SeedCacheOutcome {
            seed: effective,
            rendered,
            general_feedback,
            summary,
            variables,
            teacher_answers,
            runtime_errors,
        })
    }

    /// Runs `tests` against one variant and summarises the outcome.
    pub fn test_question(
        &mut self,
        question: &Question,
        tests: &[StoredTestCase],
        seed: Option<Seed>,
    ) -> Result<VariantOutcome> {
        Ok(self.run_variant(question, tests, seed)?.outcome)
    }

    /// Like [`test_question`](Self::test_question), keeping each test case result.
    pub fn run_variant(
        &mut self,
        question: &Question,
        tests: &[StoredTestCase],
        seed: Option<Seed>,
    ) -> Result<VariantRun> {
        self.prepare_variant()?;
        let pinned = pin(question, seed);
        let effective = pinned.effective_seed();
        debug!(question = question.id, seed = effective, tests = tests.len(), "testing variant");

        let mut usage = match QuestionUsage::start(self.engine, pinned) {
            Ok(usage) => usage,
            Err(e) if !e.is_fatal() => {
                warn!(question = question.id, seed = effective, error = %e, "cannot instantiate variant");
                self.environment.after_variant()?;
                return Ok(VariantRun {
                    seed: effective,
                    outcome: VariantOutcome {
                        passed: false,
                        passes: 0,
                        fails: 0,
                        runtime_errors: vec![e.to_string()],
                    },
                    results: Vec::new(),
                });
            }
            Err(e) => return Err(e),
        };

        let mut results = Vec::with_capacity(tests.len());
        let (mut passes, mut fails) = (0, 0);
        for stored in tests {
            let result = usage.run_test_case(&stored.case);
            if result.passed {
                passes += 1;
            } else {
                fails += 1;
            }
            results.push((stored.testcase, result));
        }

        // Evaluated regardless of tests: errors here fail the variant too.
        usage.render(&DisplayOptions::preview());
        usage.variant_mut().summary();
        usage.variant_mut().general_feedback();

        let runtime_errors: Vec<String> = usage.runtime_errors().iter().cloned().collect();
        let outcome = VariantOutcome {
            passed: fails == 0 && runtime_errors.is_empty(),
            passes,
            fails,
            runtime_errors,
        };
        drop(usage);
        self.environment.after_variant()?;

        Ok(VariantRun {
            seed: effective,
            outcome,
            results,
        })
    }
}
