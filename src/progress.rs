//! Progress notifications emitted while a bulk run is in flight.
//!
//! The runner reports what it is doing through a [`ProgressSink`] so that a
//! presentation layer can stream output as it goes. [`NullSink`] discards
//! everything; [`ProgressLog`] records events for inspection.

use serde::Serialize;

use crate::model::{Category, Seed, VariantOutcome};
use crate::report::{QuestionLabel, QuestionProblem};

pub trait ProgressSink {
    /// A category with at least one STACK question is about to be run.
    fn on_category(&mut self, _category: &Category, _question_count: usize) {}

    /// A question passed its upgrade check; `problems` may be empty.
    fn on_question(&mut self, _question: &QuestionLabel, _problems: &[QuestionProblem]) {}

    fn on_upgrade_failure(&mut self, _question: &QuestionLabel, _message: &str) {}

    /// A variant was instantiated to seed the cache.
    fn on_seed_cache(
        &mut self,
        _question: &QuestionLabel,
        _seed: Option<Seed>,
        _runtime_errors: &[String],
    ) {
    }

    fn on_variant_result(
        &mut self,
        _question: &QuestionLabel,
        _seed: Option<Seed>,
        _outcome: &VariantOutcome,
    ) {
    }
}

/// Sink that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProgressEvent {
    Category {
        name: String,
        question_count: usize,
    },
    Question {
        question: QuestionLabel,
        problems: Vec<QuestionProblem>,
    },
    UpgradeFailure {
        question: QuestionLabel,
        message: String,
    },
    SeedCache {
        question: QuestionLabel,
        seed: Option<Seed>,
        runtime_errors: Vec<String>,
    },
    VariantResult {
        question: QuestionLabel,
        seed: Option<Seed>,
        outcome: VariantOutcome,
    },
}

/// Sink that records every event in order.
#[derive(Debug, Default, Clone)]
pub struct ProgressLog {
    pub events: Vec<ProgressEvent>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_caches(&self) -> impl Iterator<Item = &ProgressEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::SeedCache { .. }))
    }

    pub fn variant_results(&self) -> impl Iterator<Item = &ProgressEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::VariantResult { .. }))
    }
}

impl ProgressSink for ProgressLog {
    fn on_category(&mut self, category: &Category, question_count: usize) {
        self.events.push(ProgressEvent::Category {
            name: category.name.clone(),
            question_count,
        });
    }

    fn on_question(&mut self, question: &QuestionLabel, problems: &[QuestionProblem]) {
        self.events.push(ProgressEvent::Question {
            question: question.clone(),
            problems: problems.to_vec(),
        });
    }

    fn on_upgrade_failure(&mut self, question: &QuestionLabel, message: &str) {
        self.events.push(ProgressEvent::UpgradeFailure {
            question: question.clone(),
            message: message.to_string(),
        });
    }

    fn on_seed_cache(&mut self, question: &QuestionLabel, seed: Option<Seed>, runtime_errors: &[String]) {
        self.events.push(ProgressEvent::SeedCache {
            question: question.clone(),
            seed,
            runtime_errors: runtime_errors.to_vec(),
        });
    }

    fn on_variant_result(&mut self, question: &QuestionLabel, seed: Option<Seed>, outcome: &VariantOutcome) {
        self.events.push(ProgressEvent::VariantResult {
            question: question.clone(),
            seed,
            outcome: outcome.clone(),
        });
    }
}
