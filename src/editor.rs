//! Single test case editor.
//!
//! Opens one stored test case (or a blank one) for a question, turns a
//! submitted [`TestCaseForm`] into a typed [`TestCase`] and saves it, and
//! previews the variant the test case is written against.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::bulk_err;
use crate::engine::{DisplayOptions, QuestionEngine, Variant};
use crate::errors::Result;
use crate::model::{ExpectedResult, Question, QuestionId, Seed, TestCase, TestCaseId};
use crate::report::PreviewLink;
use crate::store::{QuestionStore, TestCaseStore};
use crate::usage::QuestionUsage;

/// Posted values for one PRT, still as entered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrtFields {
    pub score: String,
    pub penalty: String,
    pub answer_note: String,
}

impl PrtFields {
    pub fn new(score: impl Into<String>, penalty: impl Into<String>, answer_note: impl Into<String>) -> Self {
        Self {
            score: score.into(),
            penalty: penalty.into(),
            answer_note: answer_note.into(),
        }
    }
}

/// The editing form: one value per input, one triple per PRT.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestCaseForm {
    pub inputs: BTreeMap<String, String>,
    pub prts: BTreeMap<String, PrtFields>,
}

impl TestCaseForm {
    /// An empty form with a field for every input and PRT of `question`.
    pub fn blank(question: &Question) -> Self {
        Self {
            inputs: question
                .input_names()
                .map(|name| (name.to_string(), String::new()))
                .collect(),
            prts: question
                .prts
                .keys()
                .map(|name| (name.clone(), PrtFields::default()))
                .collect(),
        }
    }

    /// A form pre-filled from a stored test case.
    pub fn from_test_case(question: &Question, case: &TestCase) -> Self {
        let mut form = Self::blank(question);
        for (name, value) in &case.inputs {
            form.inputs.insert(name.clone(), value.clone());
        }
        for (prt, expected) in &case.expected {
            form.prts.insert(
                prt.clone(),
                PrtFields::new(
                    expected.score.to_string(),
                    expected.penalty.to_string(),
                    expected.answer_note.clone(),
                ),
            );
        }
        form
    }
}

fn parse_number(prt: &str, field: &str, value: &str) -> Result<f64> {
    let value = value.trim();
    if value.is_empty() {
        return Err(bulk_err!(Validation, "{} for prt '{}' is required", field, prt));
    }
    let number: f64 = value
        .parse()
        .map_err(|_| bulk_err!(Validation, "{} for prt '{}' is not a number: '{}'", field, prt, value))?;
    if !number.is_finite() {
        return Err(bulk_err!(Validation, "{} for prt '{}' must be finite: '{}'", field, prt, value));
    }
    Ok(number)
}

/// Builds a test case for `question` from a submitted form.
///
/// Only the question's own inputs and PRTs are read. Missing inputs are
/// saved as empty values; every PRT needs a score and a penalty.
pub fn build_test_case(question: &Question, form: &TestCaseForm) -> Result<TestCase> {
    let inputs = question
        .input_names()
        .map(|name| {
            let value = form.inputs.get(name).cloned().unwrap_or_default();
            (name.to_string(), value)
        })
        .collect();
    let mut case = TestCase::new(inputs);

    for prt in question.prts.keys() {
        let fields = form
            .prts
            .get(prt)
            .ok_or_else(|| bulk_err!(Validation, "no expected result given for prt '{}'", prt))?;
        let score = parse_number(prt, "score", &fields.score)?;
        if !(0.0..=1.0).contains(&score) {
            return Err(bulk_err!(Validation, "score for prt '{}' must be between 0 and 1: {}", prt, score));
        }
        let penalty = parse_number(prt, "penalty", &fields.penalty)?;
        case.add_expected_result(
            prt.clone(),
            ExpectedResult::new(score, penalty, fields.answer_note.trim()),
        );
    }
    Ok(case)
}

/// An open editing session.
#[derive(Debug, Clone)]
pub struct EditSession {
    pub question: Question,
    pub testcase: Option<TestCaseId>,
    pub seed: Option<Seed>,
    pub title: String,
    pub submit_label: &'static str,
    pub form: TestCaseForm,
    /// Where the editor returns after saving or cancelling.
    pub back: PreviewLink,
}

/// Read-only view of the variant a test case is edited against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub title: String,
    pub seed: Seed,
    pub rendered: String,
    pub variables: Vec<(String, String)>,
    pub question_text: String,
    pub runtime_errors: Vec<String>,
}

pub struct TestCaseEditor<'a, S, E>
where
    S: QuestionStore + TestCaseStore,
    E: QuestionEngine,
{
    store: &'a mut S,
    engine: &'a E,
}

impl<'a, S, E> TestCaseEditor<'a, S, E>
where
    S: QuestionStore + TestCaseStore,
    E: QuestionEngine,
{
    pub fn new(store: &'a mut S, engine: &'a E) -> Self {
        Self { store, engine }
    }

    pub fn open(
        &self,
        question_id: QuestionId,
        testcase: Option<TestCaseId>,
        seed: Option<Seed>,
    ) -> Result<EditSession> {
        let question = self.store.load_question(question_id)?;
        let (title, submit_label, form) = match testcase {
            Some(n) => {
                let case = self.store.load_test_case(question_id, n)?;
                (
                    format!("Editing test case {n} for question {}", question.name),
                    "Save changes",
                    TestCaseForm::from_test_case(&question, &case),
                )
            }
            None => (
                format!("Adding a test case to question {}", question.name),
                "Create test case",
                TestCaseForm::blank(&question),
            ),
        };
        Ok(EditSession {
            back: PreviewLink {
                question: question_id,
                seed,
            },
            question,
            testcase,
            seed,
            title,
            submit_label,
            form,
        })
    }

    /// Validates and saves `form`, returning the test case number.
    pub fn submit(&mut self, session: &EditSession, form: &TestCaseForm) -> Result<TestCaseId> {
        let case = build_test_case(&session.question, form)?;
        let id = self
            .store
            .save_test_case(session.question.id, case, session.testcase)?;
        info!(question = session.question.id, testcase = id, "saved test case");
        Ok(id)
    }

    /// Discards the session.
    pub fn cancel(&self, session: EditSession) -> PreviewLink {
        session.back
    }

    pub fn preview(&self, session: &EditSession) -> Result<Preview> {
        let question = match session.seed {
            Some(seed) => session.question.with_seed_override(seed),
            None => session.question.clone(),
        };
        let question_text = question.question_text.clone();
        let mut usage = QuestionUsage::start(self.engine, question)?;
        let rendered = usage.render(&DisplayOptions::preview());
        Ok(Preview {
            title: session.title.clone(),
            seed: usage.variant().seed(),
            rendered,
            variables: usage.variant().variables(),
            question_text,
            runtime_errors: usage.runtime_errors().iter().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Input, Prt, PrtOutcome, STACK_QTYPE};

    fn question() -> Question {
        let mut prts = BTreeMap::new();
        prts.insert(
            "prt1".to_string(),
            Prt {
                nodes: vec![],
                otherwise: PrtOutcome::new(0.0, 0.0, "prt1-1-F"),
            },
        );
        Question {
            id: 1,
            name: "q".to_string(),
            category: 1,
            qtype: STACK_QTYPE.to_string(),
            stack_version: None,
            deployed_seeds: vec![],
            question_text: String::new(),
            general_feedback: String::new(),
            question_note: String::new(),
            default_mark: 1.0,
            variables: vec![],
            inputs: vec![
                Input {
                    name: "ans1".to_string(),
                    teacher_answer: String::new(),
                },
                Input {
                    name: "ans2".to_string(),
                    teacher_answer: String::new(),
                },
            ],
            prts,
            forced_seed: None,
        }
    }

    #[test]
    fn build_reads_only_question_fields() {
        let mut form = TestCaseForm::blank(&question());
        form.inputs.insert("ans1".to_string(), "x^2".to_string());
        form.inputs.insert("stray".to_string(), "ignored".to_string());
        form.prts
            .insert("prt1".to_string(), PrtFields::new("1", "0", " prt1-1-T "));

        let case = build_test_case(&question(), &form).unwrap();
        assert_eq!(case.inputs.len(), 2);
        assert_eq!(case.inputs["ans1"], "x^2");
        assert_eq!(case.inputs["ans2"], "");
        assert_eq!(case.expected["prt1"], ExpectedResult::new(1.0, 0.0, "prt1-1-T"));
    }

    #[test]
    fn missing_or_bad_numbers_are_rejected() {
        let q = question();
        let blank = TestCaseForm::blank(&q);
        let err = build_test_case(&q, &blank).unwrap_err();
        assert!(err.to_string().contains("score for prt 'prt1' is required"));

        let mut form = blank.clone();
        form.prts
            .insert("prt1".to_string(), PrtFields::new("1", "lots", "n"));
        let err = build_test_case(&q, &form).unwrap_err();
        assert!(err.to_string().contains("not a number"));

        form.prts
            .insert("prt1".to_string(), PrtFields::new("1.5", "0", "n"));
        let err = build_test_case(&q, &form).unwrap_err();
        assert!(err.to_string().contains("score for prt 'prt1' must be between 0 and 1"));

        form.prts
            .insert("prt1".to_string(), PrtFields::new("NaN", "0", "n"));
        let err = build_test_case(&q, &form).unwrap_err();
        assert!(err.to_string().contains("score for prt 'prt1' must be finite"));

        form.prts
            .insert("prt1".to_string(), PrtFields::new("1", "inf", "n"));
        let err = build_test_case(&q, &form).unwrap_err();
        assert!(err.to_string().contains("penalty for prt 'prt1' must be finite"));

        form.prts.clear();
        assert!(build_test_case(&q, &form).is_err());
    }

    #[test]
    fn stored_case_round_trips_through_the_form() {
        let q = question();
        let mut case = TestCase::new(BTreeMap::from([
            ("ans1".to_string(), "1".to_string()),
            ("ans2".to_string(), "2".to_string()),
        ]));
        case.add_expected_result("prt1", ExpectedResult::new(0.5, 0.25, "prt1-2-T"));
        let form = TestCaseForm::from_test_case(&q, &case);
        assert_eq!(form.prts["prt1"], PrtFields::new("0.5", "0.25", "prt1-2-T"));
        assert_eq!(build_test_case(&q, &form).unwrap(), case);
    }
}
