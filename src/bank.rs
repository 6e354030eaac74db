//! File-backed question bank implementing both stores.
//!
//! # Layout
//!
//! ```text
//! <root>/contexts.yaml          contexts and their categories
//! <root>/questions/**/*.yaml    one question definition per file
//! <root>/testcases/q<ID>.yaml   stored test cases of question <ID>
//! ```
//!
//! `contexts.yaml`:
//!
//! ```yaml
//! contexts:
//!   - id: 1
//!     name: "Course: Calculus"
//!     path: "/1/2"
//!     categories:
//!       - { id: 10, name: "Differentiation", path: "/10" }
//! ```
//!
//! A bank built with [`QuestionBank::new`] has no root and lives in memory;
//! saved test cases then stay in memory too.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::errors::{BulkTestError, Result};
use crate::model::{
    Category, CategoryId, Context, ContextId, Question, QuestionId, StoredTestCase, TestCase,
    TestCaseId,
};
use crate::store::{QuestionStore, TestCaseStore};

pub const CONTEXTS_FILE: &str = "contexts.yaml";
pub const QUESTIONS_DIR: &str = "questions";
pub const TESTCASES_DIR: &str = "testcases";

#[derive(Debug, Deserialize, Serialize)]
struct ContextsFile {
    contexts: Vec<ContextEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ContextEntry {
    id: ContextId,
    name: String,
    path: String,
    #[serde(default)]
    categories: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
struct CategoryEntry {
    id: CategoryId,
    name: String,
    path: String,
}

#[derive(Debug, Default)]
pub struct QuestionBank {
    root: Option<PathBuf>,
    contexts: Vec<Context>,
    categories: Vec<Category>,
    questions: BTreeMap<QuestionId, Question>,
    testcases: BTreeMap<QuestionId, Vec<StoredTestCase>>,
}

// =============================================================================
// LOADING
// =============================================================================

/// Discovers all YAML files recursively under `root`, in path order.
pub fn discover_yaml_files<P: AsRef<Path>>(root: P) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| BulkTestError::bank(path, "cannot read file", e))?;
    serde_yaml::from_str(&content).map_err(|e| BulkTestError::bank(path, "invalid YAML", e))
}

fn testcase_file_id(path: &Path) -> Option<QuestionId> {
    path.file_stem()?
        .to_str()?
        .strip_prefix('q')?
        .parse()
        .ok()
}

impl QuestionBank {
    /// An empty in-memory bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a bank directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(BulkTestError::StoreUnavailable {
                message: format!("bank directory {} does not exist", root.display()),
                source: None,
            });
        }

        let mut bank = Self {
            root: Some(root.to_path_buf()),
            ..Self::default()
        };

        let contexts_path = root.join(CONTEXTS_FILE);
        if !contexts_path.is_file() {
            return Err(BulkTestError::StoreUnavailable {
                message: format!("{} has no {CONTEXTS_FILE}", root.display()),
                source: None,
            });
        }
        let contexts: ContextsFile = read_yaml(&contexts_path)?;
        for entry in contexts.contexts {
            for cat in entry.categories {
                bank.add_category(Category {
                    id: cat.id,
                    context: entry.id,
                    name: cat.name,
                    path: cat.path,
                });
            }
            bank.add_context(Context {
                id: entry.id,
                name: entry.name,
                path: entry.path,
            });
        }

        for path in discover_yaml_files(root.join(QUESTIONS_DIR)) {
            let question: Question = match read_yaml(&path) {
                Ok(q) => q,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable question file");
                    continue;
                }
            };
            if bank.questions.contains_key(&question.id) {
                return Err(BulkTestError::Bank {
                    path,
                    message: format!("duplicate question id {}", question.id),
                    source: None,
                });
            }
            bank.add_question(question);
        }

        for path in discover_yaml_files(root.join(TESTCASES_DIR)) {
            let Some(question) = testcase_file_id(&path) else {
                warn!(path = %path.display(), "ignoring test case file not named q<ID>.yaml");
                continue;
            };
            let mut cases: Vec<StoredTestCase> = read_yaml(&path)?;
            cases.sort_by_key(|c| c.testcase);
            bank.testcases.insert(question, cases);
        }

        info!(
            root = %root.display(),
            contexts = bank.contexts.len(),
            questions = bank.questions.len(),
            "opened question bank"
        );
        Ok(bank)
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn add_context(&mut self, context: Context) {
        self.contexts.retain(|c| c.id != context.id);
        self.contexts.push(context);
        self.contexts
            .sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id)));
    }

    pub fn add_category(&mut self, category: Category) {
        self.categories.retain(|c| c.id != category.id);
        self.categories.push(category);
        self.categories
            .sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id)));
    }

    pub fn add_question(&mut self, question: Question) {
        self.questions.insert(question.id, question);
    }

    /// Adds a test case under the next free number, without persisting it.
    pub fn add_test_case(&mut self, question: QuestionId, case: TestCase) -> TestCaseId {
        let cases = self.testcases.entry(question).or_default();
        let testcase = next_testcase_id(cases);
        cases.push(StoredTestCase { testcase, case });
        testcase
    }

    fn testcase_path(root: &Path, question: QuestionId) -> PathBuf {
        root.join(TESTCASES_DIR).join(format!("q{question}.yaml"))
    }

    fn persist_test_cases(&self, question: QuestionId, cases: &[StoredTestCase]) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let path = Self::testcase_path(root, question);
        let yaml = serde_yaml::to_string(cases)
            .map_err(|e| BulkTestError::bank(&path, "cannot serialize test cases", e))?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| BulkTestError::bank(dir, "cannot create directory", e))?;
        }
        fs::write(&path, yaml).map_err(|e| BulkTestError::bank(&path, "cannot write file", e))
    }
}

fn next_testcase_id(cases: &[StoredTestCase]) -> TestCaseId {
    cases.iter().map(|c| c.testcase).max().unwrap_or(0) + 1
}

// =============================================================================
// STORE IMPLEMENTATIONS
// =============================================================================

impl QuestionStore for QuestionBank {
    fn list_contexts(&self) -> Result<Vec<Context>> {
        Ok(self.contexts.clone())
    }

    fn load_context(&self, id: ContextId) -> Result<Context> {
        self.contexts
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(BulkTestError::ContextNotFound(id))
    }

    fn list_categories(&self, context: ContextId) -> Result<Vec<Category>> {
        Ok(self
            .categories
            .iter()
            .filter(|c| c.context == context)
            .cloned()
            .collect())
    }

    fn list_questions_by_category(&self, category: CategoryId) -> Result<Vec<(QuestionId, String)>> {
        let mut questions: Vec<(QuestionId, String)> = self
            .questions
            .values()
            .filter(|q| q.category == category && q.is_stack())
            .map(|q| (q.id, q.name.clone()))
            .collect();
        questions.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(questions)
    }

    fn load_question(&self, id: QuestionId) -> Result<Question> {
        self.questions
            .get(&id)
            .cloned()
            .ok_or(BulkTestError::QuestionNotFound(id))
    }
}

impl TestCaseStore for QuestionBank {
    fn load_test_cases(&self, question: QuestionId) -> Result<Vec<StoredTestCase>> {
        Ok(self.testcases.get(&question).cloned().unwrap_or_default())
    }

    fn load_test_case(&self, question: QuestionId, testcase: TestCaseId) -> Result<TestCase> {
        self.testcases
            .get(&question)
            .and_then(|cases| cases.iter().find(|c| c.testcase == testcase))
            .map(|c| c.case.clone())
            .ok_or(BulkTestError::TestCaseNotFound { question, testcase })
    }

    fn save_test_case(
        &mut self,
        question: QuestionId,
        case: TestCase,
        testcase: Option<TestCaseId>,
    ) -> Result<TestCaseId> {
        if !self.questions.contains_key(&question) {
            return Err(BulkTestError::QuestionNotFound(question));
        }
        let mut cases = self.testcases.get(&question).cloned().unwrap_or_default();
        let id = match testcase {
            Some(id) => {
                match cases.iter_mut().find(|c| c.testcase == id) {
                    Some(existing) => existing.case = case,
                    None => cases.push(StoredTestCase { testcase: id, case }),
                }
                id
            }
            None => {
                let id = next_testcase_id(&cases);
                cases.push(StoredTestCase { testcase: id, case });
                id
            }
        };
        cases.sort_by_key(|c| c.testcase);
        // Memory only follows a successful write.
        self.persist_test_cases(question, &cases)?;
        self.testcases.insert(question, cases);
        Ok(id)
    }
}
