//! The evaluation seam between the bulk runner and a question engine.
//!
//! The runner never evaluates anything itself. It asks a [`QuestionEngine`]
//! to instantiate a [`Variant`] of a question and then drives that variant:
//! rendering, feedback, summary and PRT evaluation. Problems raised during
//! evaluation are not `Err`s; they accumulate as runtime error keys on the
//! variant so that one bad expression fails the variant instead of the run.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::Result;
use crate::model::{PrtOutcome, Question, Seed};

pub mod builtin;
pub mod castext;

pub use builtin::{BuiltinEngine, BuiltinVariant};

/// Visibility of the question flag control in rendered markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagsVisibility {
    #[default]
    Hidden,
    Editable,
}

/// How a variant is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayOptions {
    pub readonly: bool,
    pub flags: FlagsVisibility,
    pub suppress_run_tests_link: bool,
}

impl DisplayOptions {
    /// Read-only, no flags, no link back to the test runner.
    pub fn preview() -> Self {
        Self {
            readonly: true,
            flags: FlagsVisibility::Hidden,
            suppress_run_tests_link: true,
        }
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            readonly: false,
            flags: FlagsVisibility::Editable,
            suppress_run_tests_link: false,
        }
    }
}

/// Instantiates question variants.
pub trait QuestionEngine {
    type Variant: Variant;

    /// Fails with [`BulkTestError::VersionIncompatible`] when `question`
    /// predates what this engine supports.
    ///
    /// [`BulkTestError::VersionIncompatible`]: crate::errors::BulkTestError::VersionIncompatible
    fn validate_against_version(&self, question: &Question) -> Result<()>;

    /// Builds the variant selected by `question.effective_seed()`.
    ///
    /// An `Err` here means the variant could not be built at all; it is
    /// reported against the variant unless the error is fatal.
    fn instantiate(&self, question: Question) -> Result<Self::Variant>;

    /// Releases memory held between variants. Called before every variant.
    fn collect_garbage(&self) {}
}

/// One instantiated variant of a question.
pub trait Variant {
    fn seed(&self) -> Seed;

    fn question(&self) -> &Question;

    /// Question text as markup.
    fn render(&mut self, options: &DisplayOptions) -> String;

    /// General feedback (worked solution) text.
    fn general_feedback(&mut self) -> String;

    /// Question summary, falling back to the question text.
    fn summary(&mut self) -> String;

    /// Question variables in declaration order.
    fn variables(&self) -> Vec<(String, String)>;

    /// Substitutes question variables into `text`, e.g. a test input.
    fn substitute(&mut self, text: &str) -> String;

    /// Evaluates one PRT against the given input values.
    fn evaluate_prt(&mut self, prt: &str, inputs: &BTreeMap<String, String>) -> PrtOutcome;

    /// Distinct runtime error keys raised so far.
    fn runtime_errors(&self) -> &BTreeSet<String>;
}
