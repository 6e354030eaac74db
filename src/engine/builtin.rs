//! A small table-driven question engine.
//!
//! Variables are evaluated in declaration order. `rand(N)` draws from
//! `[0, N)`, `rand([a, b, c])` picks one element, and anything else is
//! castext over the variables bound so far. The PRNG is seeded from the
//! variant seed, so a (question, seed) pair always yields the same variant.
//!
//! Instantiations are cached under a SHA-256 of the question definition and
//! the seed. Re-instantiating a cached variant replays its variables and its
//! runtime errors without evaluating anything again.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use once_cell::sync::Lazy;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::castext::{self, normalise_answer, replace_tags, substitute};
use super::{DisplayOptions, FlagsVisibility, QuestionEngine, Variant};
use crate::bulk_err;
use crate::config::BulkTestConfig;
use crate::errors::{BulkTestError, Result};
use crate::model::{PrtOutcome, Question, Seed};

// Seeded from the variant seed.
type VariantRng = Xoshiro256StarStar;

/// Oldest `stack_version` accepted without an upgrade diagnostic.
pub const DEFAULT_MINIMUM_VERSION: &str = "2014010100";

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

static RAND_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*rand\(\s*(-?\d+)\s*\)\s*$").expect("rand range pattern"));

static RAND_CHOICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*rand\(\s*\[(.*)\]\s*\)\s*$").expect("rand choice pattern"));

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

#[derive(Debug)]
struct Instantiation {
    variables: Vec<(String, String)>,
    errors: BTreeSet<String>,
}

// =============================================================================
// ENGINE
// =============================================================================

#[derive(Debug)]
pub struct BuiltinEngine {
    minimum_version: String,
    cache_capacity: usize,
    cache: RefCell<HashMap<String, Rc<Instantiation>>>,
    evaluations: Cell<usize>,
}

impl BuiltinEngine {
    pub fn new(minimum_version: impl Into<String>, cache_capacity: usize) -> Self {
        Self {
            minimum_version: minimum_version.into(),
            cache_capacity,
            cache: RefCell::new(HashMap::new()),
            evaluations: Cell::new(0),
        }
    }

    pub fn from_config(config: &BulkTestConfig) -> Self {
        Self::new(config.minimum_version.clone(), config.cache_capacity)
    }

    /// Number of variants actually evaluated, i.e. cache misses.
    pub fn evaluations(&self) -> usize {
        self.evaluations.get()
    }

    pub fn cached_variants(&self) -> usize {
        self.cache.borrow().len()
    }

    fn cache_key(question: &Question, seed: Seed) -> Result<String> {
        let definition = serde_json::to_vec(question)
            .map_err(|e| bulk_err!(Internal, "cannot hash question {}: {}", question.id, e))?;
        let mut hasher = Sha256::new();
        hasher.update(&definition);
        hasher.update(seed.to_le_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn evaluate_variables(question: &Question, seed: Seed) -> Instantiation {
        let mut rng = VariantRng::seed_from_u64(seed as u64);
        let mut variables: Vec<(String, String)> = Vec::with_capacity(question.variables.len());
        let mut errors = BTreeSet::new();

        for var in &question.variables {
            let value = if let Some(caps) = RAND_RANGE.captures(&var.value) {
                match caps[1].parse::<i64>() {
                    Ok(n) if n > 0 => rng.gen_range(0..n).to_string(),
                    _ => {
                        errors.insert(format!("{}: rand range must be positive", var.name));
                        "0".to_string()
                    }
                }
            } else if let Some(caps) = RAND_CHOICE.captures(&var.value) {
                let items: Vec<&str> = caps[1]
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                if items.is_empty() {
                    errors.insert(format!("{}: rand list must not be empty", var.name));
                    String::new()
                } else {
                    items[rng.gen_range(0..items.len())].to_string()
                }
            } else {
                let rendered = substitute(&var.value, &variables);
                errors.extend(rendered.errors);
                rendered.text
            };
            variables.push((var.name.clone(), value));
        }

        Instantiation { variables, errors }
    }
}

impl Default for BuiltinEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MINIMUM_VERSION, DEFAULT_CACHE_CAPACITY)
    }
}

impl QuestionEngine for BuiltinEngine {
    type Variant = BuiltinVariant;

    fn validate_against_version(&self, question: &Question) -> Result<()> {
        let mut problems = Vec::new();

        match question.stack_version.as_deref() {
            None => problems.push(format!(
                "Question has no recorded STACK version; re-save it with version {} or later.",
                self.minimum_version
            )),
            Some(version) => match (version.trim().parse::<u64>(), self.minimum_version.parse::<u64>()) {
                (Ok(found), Ok(required)) if found < required => problems.push(format!(
                    "Question was last saved with STACK version {}; version {} or later is required.",
                    version, self.minimum_version
                )),
                (Ok(_), Ok(_)) => {}
                _ => problems.push(format!("Unrecognised STACK version '{version}'.")),
            },
        }

        for input in question.input_names() {
            for kind in ["input", "validation"] {
                if !castext::has_tag(&question.question_text, kind, input) {
                    problems.push(format!(
                        "Input '{input}' has no [[{kind}:{input}]] tag in the question text."
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(BulkTestError::VersionIncompatible {
                question: question.id,
                message: problems.join(" "),
            })
        }
    }

    fn instantiate(&self, question: Question) -> Result<BuiltinVariant> {
        if let Some(bad) = question
            .variables
            .iter()
            .find(|v| !IDENTIFIER.is_match(&v.name))
        {
            return Err(BulkTestError::Evaluation {
                question: question.id,
                message: format!("variable name '{}' is not an identifier", bad.name),
            });
        }

        let seed = question.effective_seed();
        let key = Self::cache_key(&question, seed)?;
        let cached = self.cache.borrow().get(&key).cloned();
        let instantiation = match cached {
            Some(hit) => {
                debug!(question = question.id, seed, "variant cache hit");
                hit
            }
            None => {
                let fresh = Rc::new(Self::evaluate_variables(&question, seed));
                self.evaluations.set(self.evaluations.get() + 1);
                self.cache.borrow_mut().insert(key, Rc::clone(&fresh));
                fresh
            }
        };

        Ok(BuiltinVariant {
            seed,
            variables: instantiation.variables.clone(),
            runtime_errors: instantiation.errors.clone(),
            question,
        })
    }

    fn collect_garbage(&self) {
        let mut cache = self.cache.borrow_mut();
        if cache.len() > self.cache_capacity {
            debug!(entries = cache.len(), "clearing variant cache");
            cache.clear();
        }
    }
}

// =============================================================================
// VARIANT
// =============================================================================

#[derive(Debug, Clone)]
pub struct BuiltinVariant {
    question: Question,
    seed: Seed,
    variables: Vec<(String, String)>,
    runtime_errors: BTreeSet<String>,
}

impl BuiltinVariant {
    fn castext(&mut self, template: &str) -> String {
        let rendered = substitute(template, &self.variables);
        self.runtime_errors.extend(rendered.errors);
        rendered.text
    }

    fn has_input(&self, name: &str) -> bool {
        self.question.input_names().any(|n| n == name)
    }
}

impl Variant for BuiltinVariant {
    fn seed(&self) -> Seed {
        self.seed
    }

    fn question(&self) -> &Question {
        &self.question
    }

    fn render(&mut self, options: &DisplayOptions) -> String {
        let template = self.question.question_text.clone();
        let text = self.castext(&template);
        let mut unknown = Vec::new();
        let body = replace_tags(&text, |kind, name| {
            if kind != "input" {
                return String::new();
            }
            if !self.has_input(name) {
                unknown.push(format!("castext: unknown input '{name}'"));
            }
            let readonly = if options.readonly { " readonly" } else { "" };
            format!("<input type=\"text\" name=\"{name}\"{readonly}>")
        });
        self.runtime_errors.extend(unknown);

        let mut markup = format!("<div class=\"formulation\">{body}</div>");
        if options.flags == FlagsVisibility::Editable {
            markup.push_str("<div class=\"questionflag\"></div>");
        }
        if !options.suppress_run_tests_link {
            markup.push_str(&format!(
                "<a class=\"runtests\" href=\"stacktest preview --question {} --seed {}\">Run question tests</a>",
                self.question.id, self.seed
            ));
        }
        markup
    }

    fn general_feedback(&mut self) -> String {
        let template = self.question.general_feedback.clone();
        self.castext(&template)
    }

    fn summary(&mut self) -> String {
        let template = if self.question.question_note.trim().is_empty() {
            replace_tags(&self.question.question_text, |_, _| String::new())
        } else {
            self.question.question_note.clone()
        };
        self.castext(&template)
    }

    fn variables(&self) -> Vec<(String, String)> {
        self.variables.clone()
    }

    fn substitute(&mut self, text: &str) -> String {
        self.castext(text)
    }

    fn evaluate_prt(&mut self, prt: &str, inputs: &BTreeMap<String, String>) -> PrtOutcome {
        let Some(tree) = self.question.prts.get(prt).cloned() else {
            self.runtime_errors
                .insert(format!("prt: unknown response tree '{prt}'"));
            return PrtOutcome::not_evaluated();
        };

        for name in tree.required_inputs() {
            if !self.has_input(name) {
                self.runtime_errors
                    .insert(format!("{prt}: unknown input '{name}'"));
                return PrtOutcome::not_evaluated();
            }
            if inputs.get(name).map_or(true, |v| v.trim().is_empty()) {
                return PrtOutcome::not_evaluated();
            }
        }

        for node in &tree.nodes {
            let expected = self.castext(&node.answer);
            let given = inputs.get(&node.input).map(String::as_str).unwrap_or("");
            if normalise_answer(given) == normalise_answer(&expected) {
                return node.outcome.clone();
            }
        }
        tree.otherwise
    }

    fn runtime_errors(&self) -> &BTreeSet<String> {
        &self.runtime_errors
    }
}
