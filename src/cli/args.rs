//! Defines the command-line arguments and subcommands for the stacktest CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

use crate::model::{ContextId, QuestionId, Seed, TestCaseId};

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "stacktest",
    version,
    about = "Bulk-run and edit STACK question tests across a question bank."
)]
pub struct StacktestArgs {
    /// The question bank directory.
    #[arg(long, global = true, default_value = ".")]
    pub bank: PathBuf,

    /// Log debug events to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Seconds granted to each variant (overrides stacktest.yaml).
    #[arg(long, global = true, value_name = "SECS")]
    pub time_budget: Option<u64>,

    /// Hard cap on the whole run in seconds (overrides stacktest.yaml).
    #[arg(long, global = true, value_name = "SECS")]
    pub max_run: Option<u64>,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the contexts holding STACK questions.
    Index,
    /// Run every test of every deployed variant.
    #[command(group(ArgGroup::new("scope").required(true).args(["context", "all"])))]
    Run {
        /// The context to run.
        #[arg(long)]
        context: Option<ContextId>,
        /// Run every context in the bank.
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Show one variant of a question with the results of its stored tests.
    Preview {
        #[arg(long)]
        question: QuestionId,
        #[arg(long)]
        seed: Option<Seed>,
    },
    /// Show, save or cancel a single test case.
    Edit {
        #[arg(long)]
        question: QuestionId,
        /// The test case to edit; omit to add a new one.
        #[arg(long)]
        testcase: Option<TestCaseId>,
        #[arg(long)]
        seed: Option<Seed>,
        /// Input value as `name=value`.
        #[arg(long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,
        /// Expected PRT result as `prt=score,penalty,note`.
        #[arg(long = "expect", value_name = "PRT=SCORE,PENALTY,NOTE")]
        expects: Vec<String>,
        /// Leave the editor without saving.
        #[arg(long, conflicts_with_all = ["inputs", "expects"])]
        cancel: bool,
    },
}
