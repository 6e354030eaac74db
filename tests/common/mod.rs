//! Shared fixtures for the stacktest integration tests.
//!
//! Builds small in-memory banks: one context, one category, and questions
//! whose `prt1` is right when `ans1` equals the random variable `a`.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use stacktest::bank::QuestionBank;
use stacktest::environment::ExecutionEnvironment;
use stacktest::model::{
    Category, Context, ExpectedResult, Input, Prt, PrtNode, PrtOutcome, Question, QuestionId,
    QuestionVariable, Seed, TestCase, STACK_QTYPE,
};
use stacktest::Result;

pub const CONTEXT: u64 = 1;
pub const CATEGORY: u64 = 10;
pub const CURRENT_VERSION: &str = "2023010100";

pub fn context() -> Context {
    Context {
        id: CONTEXT,
        name: "Course: Calculus".to_string(),
        path: "/1".to_string(),
    }
}

pub fn category(id: u64, name: &str) -> Category {
    Category {
        id,
        context: CONTEXT,
        name: name.to_string(),
        path: format!("/1/{id}"),
    }
}

/// An empty bank holding the shared context and category.
pub fn bank() -> QuestionBank {
    let mut bank = QuestionBank::new();
    bank.add_context(context());
    bank.add_category(category(CATEGORY, "Differentiation"));
    bank
}

// =============================================================================
// QUESTIONS
// =============================================================================

pub struct QuestionBuilder {
    question: Question,
}

impl QuestionBuilder {
    pub fn new(id: QuestionId, name: &str) -> Self {
        let mut prts = BTreeMap::new();
        prts.insert(
            "prt1".to_string(),
            Prt {
                nodes: vec![PrtNode {
                    input: "ans1".to_string(),
                    answer: "{@a@}".to_string(),
                    outcome: PrtOutcome::new(1.0, 0.0, "prt1-1-T"),
                }],
                otherwise: PrtOutcome::new(0.0, 0.1, "prt1-1-F"),
            },
        );
        Self {
            question: Question {
                id,
                name: name.to_string(),
                category: CATEGORY,
                qtype: STACK_QTYPE.to_string(),
                stack_version: Some(CURRENT_VERSION.to_string()),
                deployed_seeds: vec![],
                question_text: "Type {@a@}: [[input:ans1]] [[validation:ans1]]".to_string(),
                general_feedback: "The answer is {@a@}.".to_string(),
                question_note: String::new(),
                default_mark: 1.0,
                variables: vec![QuestionVariable {
                    name: "a".to_string(),
                    value: "rand(1000)".to_string(),
                }],
                inputs: vec![Input {
                    name: "ans1".to_string(),
                    teacher_answer: "{@a@}".to_string(),
                }],
                prts,
                forced_seed: None,
            },
        }
    }

    pub fn seeds(mut self, seeds: &[Seed]) -> Self {
        self.question.deployed_seeds = seeds.to_vec();
        self
    }

    pub fn category(mut self, category: u64) -> Self {
        self.question.category = category;
        self
    }

    pub fn version(mut self, version: Option<&str>) -> Self {
        self.question.stack_version = version.map(str::to_string);
        self
    }

    pub fn general_feedback(mut self, text: &str) -> Self {
        self.question.general_feedback = text.to_string();
        self
    }

    pub fn question_text(mut self, text: &str) -> Self {
        self.question.question_text = text.to_string();
        self
    }

    pub fn question_note(mut self, note: &str) -> Self {
        self.question.question_note = note.to_string();
        self
    }

    pub fn qtype(mut self, qtype: &str) -> Self {
        self.question.qtype = qtype.to_string();
        self
    }

    /// Replaces every PRT with a single one on `ans1` accepting `answer`.
    pub fn only_prt(mut self, name: &str, answer: &str, right: &str, wrong: &str) -> Self {
        self.question.prts.clear();
        self.question.prts.insert(
            name.to_string(),
            Prt {
                nodes: vec![PrtNode {
                    input: "ans1".to_string(),
                    answer: answer.to_string(),
                    outcome: PrtOutcome::new(1.0, 0.0, right),
                }],
                otherwise: PrtOutcome::new(0.0, 0.0, wrong),
            },
        );
        self
    }

    pub fn build(self) -> Question {
        self.question
    }
}

// =============================================================================
// TEST CASES
// =============================================================================

pub fn case(ans1: &str, prt: &str, score: f64, penalty: f64, note: &str) -> TestCase {
    let mut case = TestCase::new(BTreeMap::from([("ans1".to_string(), ans1.to_string())]));
    case.add_expected_result(prt, ExpectedResult::new(score, penalty, note));
    case
}

/// Right answer for every variant: the input follows the random variable.
pub fn passing_case() -> TestCase {
    case("{@a@}", "prt1", 1.0, 0.0, "prt1-1-T")
}

pub fn wrong_answer_case() -> TestCase {
    case("not a number", "prt1", 0.0, 0.1, "prt1-1-F")
}

/// Expects full marks for a wrong answer.
pub fn mismatched_case() -> TestCase {
    case("not a number", "prt1", 1.0, 0.0, "prt1-1-T")
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Counts every call the runner makes into the environment.
#[derive(Debug, Default)]
pub struct RecordingEnvironment {
    pub extensions: usize,
    pub flushes: usize,
    pub after: usize,
    /// Refuse to extend once this many extensions were granted.
    pub limit: Option<usize>,
}

impl ExecutionEnvironment for RecordingEnvironment {
    fn extend_time_budget(&mut self, _budget: Duration) -> Result<()> {
        if self.limit.is_some_and(|limit| self.extensions >= limit) {
            return Err(stacktest::bulk_err!(Environment, "time budget exhausted"));
        }
        self.extensions += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn variant_budget(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn after_variant(&mut self) -> Result<()> {
        self.after += 1;
        self.flush()
    }
}
