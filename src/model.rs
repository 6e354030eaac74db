//! Core data types shared by the stores, the engine and the bulk runner.
//!
//! Questions and test cases are owned by the stores and handed to the runner
//! read-only. Forcing a particular variant never mutates a question: see
//! [`Question::with_seed_override`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

pub type QuestionId = u64;
pub type ContextId = u64;
pub type CategoryId = u64;
pub type TestCaseId = u32;
pub type Seed = i64;

/// Question type handled by the bulk tester.
pub const STACK_QTYPE: &str = "stack";

/// Seed used when a question has no deployed variants and no override.
pub const IMPLICIT_SEED: Seed = 0;

/// Answer note reported for a PRT that was not evaluated.
pub const NULL_NOTE: &str = "NULL";

/// Tolerance used when comparing scores and penalties.
pub const SCORE_TOLERANCE: f64 = 1e-6;

// =============================================================================
// CONTEXTS AND CATEGORIES
// =============================================================================

/// A course, module or system context holding question categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub id: ContextId,
    pub name: String,
    /// Materialized path, e.g. `/1/3/17`. Orders contexts for display.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub context: ContextId,
    pub name: String,
    pub path: String,
}

// =============================================================================
// QUESTIONS
// =============================================================================

/// A question variable: `rand(...)` or castext evaluated in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionVariable {
    pub name: String,
    pub value: String,
}

/// A named learner input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    #[serde(default)]
    pub teacher_answer: String,
}

/// One answer test inside a response tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrtNode {
    /// Input whose value is compared.
    pub input: String,
    /// Castext for the expected answer, e.g. `{@a@}`.
    pub answer: String,
    #[serde(flatten)]
    pub outcome: PrtOutcome,
}

/// A potential response tree: the first matching node wins, else `otherwise`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prt {
    #[serde(default)]
    pub nodes: Vec<PrtNode>,
    pub otherwise: PrtOutcome,
}

impl Prt {
    /// Names of the inputs this tree reads, without duplicates.
    pub fn required_inputs(&self) -> BTreeSet<&str> {
        self.nodes.iter().map(|n| n.input.as_str()).collect()
    }
}

fn default_qtype() -> String {
    STACK_QTYPE.to_string()
}

fn default_mark() -> f64 {
    1.0
}

/// A question definition as held by the question store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub name: String,
    pub category: CategoryId,
    #[serde(default = "default_qtype")]
    pub qtype: String,
    #[serde(default)]
    pub stack_version: Option<String>,
    #[serde(default)]
    pub deployed_seeds: Vec<Seed>,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub general_feedback: String,
    #[serde(default)]
    pub question_note: String,
    #[serde(default = "default_mark")]
    pub default_mark: f64,
    #[serde(default)]
    pub variables: Vec<QuestionVariable>,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub prts: BTreeMap<String, Prt>,
    /// Seed forced onto this copy, bypassing the question's own derivation.
    #[serde(skip)]
    pub forced_seed: Option<Seed>,
}

impl Question {
    /// Returns a copy pinned to `seed`. The original is left untouched.
    pub fn with_seed_override(&self, seed: Seed) -> Question {
        Question {
            forced_seed: Some(seed),
            ..self.clone()
        }
    }

    /// The seed a variant of this question is instantiated with.
    pub fn effective_seed(&self) -> Seed {
        self.forced_seed
            .or_else(|| self.deployed_seeds.first().copied())
            .unwrap_or(IMPLICIT_SEED)
    }

    /// The variants the bulk runner tests: one per distinct deployed seed,
    /// or a single implicit run when nothing is deployed.
    pub fn seeds_to_test(&self) -> Vec<Option<Seed>> {
        if self.deployed_seeds.is_empty() {
            return vec![None];
        }
        let mut seen = BTreeSet::new();
        self.deployed_seeds
            .iter()
            .filter(|seed| seen.insert(**seed))
            .map(|seed| Some(*seed))
            .collect()
    }

    pub fn is_stack(&self) -> bool {
        self.qtype == STACK_QTYPE
    }

    pub fn has_general_feedback(&self) -> bool {
        !self.general_feedback.trim().is_empty()
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|i| i.name.as_str())
    }
}

// =============================================================================
// TEST CASES
// =============================================================================

/// Actual state of one PRT after evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrtOutcome {
    pub score: f64,
    pub penalty: f64,
    pub answer_note: String,
}

impl PrtOutcome {
    pub fn new(score: f64, penalty: f64, answer_note: impl Into<String>) -> Self {
        Self {
            score,
            penalty,
            answer_note: answer_note.into(),
        }
    }

    /// Outcome of a PRT whose inputs were not all supplied.
    pub fn not_evaluated() -> Self {
        Self::new(0.0, 0.0, NULL_NOTE)
    }
}

impl fmt::Display for PrtOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "score={}, penalty={}, note={}",
            self.score, self.penalty, self.answer_note
        )
    }
}

/// What a test case expects one PRT to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedResult {
    pub score: f64,
    pub penalty: f64,
    pub answer_note: String,
}

impl ExpectedResult {
    pub fn new(score: f64, penalty: f64, answer_note: impl Into<String>) -> Self {
        Self {
            score,
            penalty,
            answer_note: answer_note.into(),
        }
    }

    /// Exact match on the note, tolerance match on score and penalty.
    pub fn matches(&self, actual: &PrtOutcome) -> bool {
        (self.score - actual.score).abs() < SCORE_TOLERANCE
            && (self.penalty - actual.penalty).abs() < SCORE_TOLERANCE
            && self.answer_note == actual.answer_note
    }
}

impl fmt::Display for ExpectedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "score={}, penalty={}, note={}",
            self.score, self.penalty, self.answer_note
        )
    }
}

/// A stored question test: literal input values plus expected PRT results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub expected: BTreeMap<String, ExpectedResult>,
}

impl TestCase {
    pub fn new(inputs: BTreeMap<String, String>) -> Self {
        Self {
            inputs,
            expected: BTreeMap::new(),
        }
    }

    pub fn add_expected_result(&mut self, prt: impl Into<String>, expected: ExpectedResult) {
        self.expected.insert(prt.into(), expected);
    }
}

/// A test case together with its sequence number within its question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTestCase {
    pub testcase: TestCaseId,
    #[serde(flatten)]
    pub case: TestCase,
}

// =============================================================================
// RESULTS
// =============================================================================

/// Expected against actual for one PRT of one test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrtComparison {
    pub prt: String,
    pub expected: ExpectedResult,
    pub actual: PrtOutcome,
    pub matches: bool,
}

/// Result of running one test case against one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCaseResult {
    pub passed: bool,
    pub prts: Vec<PrtComparison>,
}

impl TestCaseResult {
    pub fn mismatches(&self) -> impl Iterator<Item = &PrtComparison> {
        self.prts.iter().filter(|c| !c.matches)
    }
}

/// Aggregate result of all test cases run against one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariantOutcome {
    pub passed: bool,
    pub passes: usize,
    pub fails: usize,
    /// Distinct runtime error keys raised while evaluating the variant.
    pub runtime_errors: Vec<String>,
}

impl VariantOutcome {
    /// Summary line: `passes=N,fails=M`, plus runtime errors when present.
    pub fn message(&self) -> String {
        let mut message = format!("passes={},fails={}", self.passes, self.fails);
        if !self.runtime_errors.is_empty() {
            message.push_str("; runtime errors: ");
            message.push_str(&self.runtime_errors.join(" "));
        }
        message
    }
}

impl fmt::Display for VariantOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
