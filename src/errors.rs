//! stacktest error handling.
//!
//! Every failure mode of the bulk runner and the test-case editor is a
//! [`BulkTestError`]. Infrastructure failures (store, bank files, execution
//! environment) are fatal and propagate with `?`. Per-question and
//! per-variant failures are folded into the run report by the runner; see
//! [`BulkTestError::is_fatal`].
//!
//! Message-only variants are built with [`bulk_err!`](crate::bulk_err):
//!
//! ```
//! use stacktest::{bulk_err, BulkTestError};
//!
//! let err = bulk_err!(Validation, "missing score for prt '{}'", "prt1");
//! assert!(matches!(err, BulkTestError::Validation { .. }));
//! ```

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::model::{ContextId, QuestionId, TestCaseId};

pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for the bulk tester, its stores and its engine.
#[derive(Debug, Error, Diagnostic)]
pub enum BulkTestError {
    /// The question or test-case store could not be reached.
    #[error("question store unavailable: {message}")]
    #[diagnostic(
        code(stacktest::store),
        help("check that the bank directory exists and is readable")
    )]
    StoreUnavailable {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// A bank file exists but could not be read, parsed or written.
    #[error("bank file {}: {message}", path.display())]
    #[diagnostic(code(stacktest::bank))]
    Bank {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("question {0} not found")]
    #[diagnostic(code(stacktest::not_found))]
    QuestionNotFound(QuestionId),

    #[error("context {0} not found")]
    #[diagnostic(code(stacktest::not_found))]
    ContextNotFound(ContextId),

    #[error("test case {testcase} of question {question} not found")]
    #[diagnostic(
        code(stacktest::not_found),
        help("omit --testcase to create a new test case")
    )]
    TestCaseNotFound {
        question: QuestionId,
        testcase: TestCaseId,
    },

    /// The ambient execution budget could not be extended.
    #[error("execution environment failure: {message}")]
    #[diagnostic(code(stacktest::environment))]
    Environment { message: String },

    /// A question predates the engine version the bulk tester requires.
    #[error("question {question} needs upgrading: {message}")]
    #[diagnostic(code(stacktest::upgrade))]
    VersionIncompatible { question: QuestionId, message: String },

    /// The engine could not instantiate or evaluate one variant.
    #[error("evaluation of question {question} failed: {message}")]
    #[diagnostic(code(stacktest::evaluation))]
    Evaluation { question: QuestionId, message: String },

    /// A submitted test case does not fit the question it is saved against.
    #[error("invalid test case: {message}")]
    #[diagnostic(code(stacktest::validation))]
    Validation { message: String },

    #[error("internal error: {message}")]
    #[diagnostic(code(stacktest::internal))]
    Internal { message: String },
}

impl BulkTestError {
    /// Whether this error must abort the whole run.
    ///
    /// Only version and evaluation problems are scoped to one question or
    /// variant; everything else is infrastructure.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BulkTestError::VersionIncompatible { .. } | BulkTestError::Evaluation { .. }
        )
    }

    /// Builds a store error that wraps an underlying cause.
    pub fn store<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BulkTestError::StoreUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Builds a bank file error that wraps an underlying cause.
    pub fn bank<E>(path: impl Into<PathBuf>, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BulkTestError::Bank {
            path: path.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Builds a message-only [`BulkTestError`] variant with `format!` arguments.
#[macro_export]
macro_rules! bulk_err {
    ($variant:ident, $($arg:tt)+) => {
        $crate::BulkTestError::$variant {
            message: format!($($arg)+),
        }
    };
}

pub type Result<T, E = BulkTestError> = std::result::Result<T, E>;
