//! An isolated evaluation sandbox for one variant.
//!
//! A [`QuestionUsage`] owns its variant outright. Nothing it does is visible
//! to other usages, so variants can be run one after another without any
//! state leaking between them.

use std::collections::{BTreeMap, BTreeSet};

use crate::engine::{DisplayOptions, QuestionEngine, Variant};
use crate::errors::Result;
use crate::model::{PrtComparison, Question, TestCase, TestCaseResult};

/// Behaviour every usage created by the bulk tester is bound to.
pub const PREFERRED_BEHAVIOUR: &str = "adaptive";

pub struct QuestionUsage<V: Variant> {
    behaviour: &'static str,
    variant: V,
}

impl<V: Variant> QuestionUsage<V> {
    /// Instantiates `question` in a fresh usage.
    pub fn start<E>(engine: &E, question: Question) -> Result<Self>
    where
        E: QuestionEngine<Variant = V>,
    {
        Ok(Self {
            behaviour: PREFERRED_BEHAVIOUR,
            variant: engine.instantiate(question)?,
        })
    }

    pub fn behaviour(&self) -> &'static str {
        self.behaviour
    }

    pub fn variant(&self) -> &V {
        &self.variant
    }

    pub fn variant_mut(&mut self) -> &mut V {
        &mut self.variant
    }

    pub fn render(&mut self, options: &DisplayOptions) -> String {
        self.variant.render(options)
    }

    /// Each input's teacher answer, evaluated against this variant.
    pub fn teacher_answers(&mut self) -> Vec<(String, String)> {
        let answers: Vec<(String, String)> = self
            .variant
            .question()
            .inputs
            .iter()
            .map(|input| (input.name.clone(), input.teacher_answer.clone()))
            .collect();
        answers
            .into_iter()
            .map(|(name, answer)| (name, self.variant.substitute(&answer)))
            .collect()
    }

    /// Runs one test case against this variant.
    ///
    /// Input values are castext over the question variables, so tests can
    /// follow randomization. Every PRT the test case names is evaluated and
    /// compared; any mismatch fails the test case.
    pub fn run_test_case(&mut self, case: &TestCase) -> TestCaseResult {
        let inputs: BTreeMap<String, String> = case
            .inputs
            .iter()
            .map(|(name, value)| (name.clone(), self.variant.substitute(value)))
            .collect();

        let prts: Vec<PrtComparison> = case
            .expected
            .iter()
            .map(|(prt, expected)| {
                let actual = self.variant.evaluate_prt(prt, &inputs);
                PrtComparison {
                    prt: prt.clone(),
                    matches: expected.matches(&actual),
                    expected: expected.clone(),
                    actual,
                }
            })
            .collect();

        TestCaseResult {
            passed: prts.iter().all(|c| c.matches),
            prts,
        }
    }

    pub fn runtime_errors(&self) -> &BTreeSet<String> {
        self.variant.runtime_errors()
    }
}
