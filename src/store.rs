//! Store interfaces consumed by the runner and the editor.
//!
//! Both traits are implemented by [`QuestionBank`](crate::bank::QuestionBank).
//! Failures to reach the store are fatal to the caller.

use crate::errors::Result;
use crate::model::{
    Category, CategoryId, Context, ContextId, Question, QuestionId, StoredTestCase, TestCase,
    TestCaseId,
};

pub trait QuestionStore {
    /// Every context, ordered by path.
    fn list_contexts(&self) -> Result<Vec<Context>>;

    fn load_context(&self, id: ContextId) -> Result<Context>;

    /// Categories of one context, ordered by path.
    fn list_categories(&self, context: ContextId) -> Result<Vec<Category>>;

    /// STACK questions of one category as `(id, name)`, ordered by name then id.
    fn list_questions_by_category(&self, category: CategoryId) -> Result<Vec<(QuestionId, String)>>;

    fn load_question(&self, id: QuestionId) -> Result<Question>;
}

pub trait TestCaseStore {
    /// Stored test cases of a question, ordered by test case number.
    fn load_test_cases(&self, question: QuestionId) -> Result<Vec<StoredTestCase>>;

    fn load_test_case(&self, question: QuestionId, testcase: TestCaseId) -> Result<TestCase>;

    /// Saves `case` under `testcase`, or under a fresh number when `None`.
    /// Returns the number it was saved under.
    fn save_test_case(
        &mut self,
        question: QuestionId,
        case: TestCase,
        testcase: Option<TestCaseId>,
    ) -> Result<TestCaseId>;
}
