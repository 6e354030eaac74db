//! The stacktest Command-Line Interface.
//!
//! This module is the main entry point for all CLI commands. It opens the
//! bank, builds the engine and execution environment from the configuration,
//! and dispatches to the runner or the editor.

use std::io::Write;
use std::process;

use clap::Parser;
use termcolor::{ColorChoice, StandardStream};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::bank::QuestionBank;
use crate::bulk_err;
use crate::cli::args::{Command, ReportFormat, StacktestArgs};
use crate::cli::output::{print_edit_session, print_index, print_preview, TerminalSink};
use crate::config::BulkTestConfig;
use crate::editor::{PrtFields, TestCaseEditor};
use crate::engine::BuiltinEngine;
use crate::environment::ProcessEnvironment;
use crate::errors::{BulkTestError, Result};
use crate::model::{ContextId, QuestionId, Seed, TestCaseId};
use crate::progress::NullSink;
use crate::report::{render_overall_result, to_json};
use crate::runner::BulkTester;
use crate::store::{QuestionStore, TestCaseStore};

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() {
    let args = StacktestArgs::parse();
    init_logging(args.verbose);

    match execute(args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            print_error(e);
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "stacktest=debug" } else { "stacktest=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Prints a fatal error with its diagnostic code and help.
pub fn print_error(error: BulkTestError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Shared state every command is built from.
struct Session {
    config: BulkTestConfig,
    bank: QuestionBank,
    engine: BuiltinEngine,
    environment: ProcessEnvironment,
}

impl Session {
    fn open(args: &StacktestArgs) -> Result<Self> {
        let mut config = BulkTestConfig::load(&args.bank)?;
        if let Some(secs) = args.time_budget {
            config.time_budget_secs = secs;
        }
        if let Some(secs) = args.max_run {
            config.max_run_secs = Some(secs);
        }
        if args.no_color {
            config.use_colors = false;
        }

        let bank = QuestionBank::open(&args.bank)?;
        let engine = BuiltinEngine::from_config(&config);
        let environment = ProcessEnvironment::new(config.time_budget(), config.max_run());
        Ok(Self {
            config,
            bank,
            engine,
            environment,
        })
    }

    fn color_choice(&self) -> ColorChoice {
        if self.config.use_colors {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        }
    }

    fn stdout(&self) -> StandardStream {
        StandardStream::stdout(self.color_choice())
    }

    fn tester(&mut self) -> BulkTester<'_, BuiltinEngine> {
        BulkTester::new(&self.bank, &self.bank, &self.engine, &mut self.environment)
    }
}

fn io_error(e: std::io::Error) -> BulkTestError {
    bulk_err!(Environment, "cannot write output: {}", e)
}

/// Runs one command. `Ok(false)` means the command ran but tests failed.
fn execute(args: StacktestArgs) -> Result<bool> {
    let mut session = Session::open(&args)?;
    match args.command {
        Command::Index => handle_index(&mut session),
        Command::Run {
            context, format, ..
        } => handle_run(&mut session, context, format),
        Command::Preview { question, seed } => handle_preview(&mut session, question, seed),
        Command::Edit {
            question,
            testcase,
            seed,
            inputs,
            expects,
            cancel,
        } => handle_edit(&mut session, question, testcase, seed, &inputs, &expects, cancel),
    }
}

fn handle_index(session: &mut Session) -> Result<bool> {
    let scope = session.tester().enumerate_questions_by_context()?;
    let mut out = session.stdout();
    print_index(&mut out, &scope).map_err(io_error)?;
    Ok(true)
}

fn handle_run(session: &mut Session, context: Option<ContextId>, format: ReportFormat) -> Result<bool> {
    let context = context.map(|id| session.bank.load_context(id)).transpose()?;
    let mut out = session.stdout();

    let (all_passed, report) = match format {
        ReportFormat::Text => {
            let mut sink = TerminalSink::stdout(session.color_choice());
            let mut tester = session.tester();
            let result = match &context {
                Some(context) => tester.run_all_tests_for_context(context, &mut sink)?,
                None => tester.run_all_contexts(&mut sink)?,
            };
            render_overall_result(&mut out, result.0, &result.1).map_err(io_error)?;
            result
        }
        ReportFormat::Json => {
            let mut tester = session.tester();
            let result = match &context {
                Some(context) => tester.run_all_tests_for_context(context, &mut NullSink)?,
                None => tester.run_all_contexts(&mut NullSink)?,
            };
            let json = to_json(result.0, &result.1)
                .map_err(|e| bulk_err!(Internal, "cannot serialize report: {}", e))?;
            writeln!(out, "{json}").map_err(io_error)?;
            result
        }
    };

    info!(
        all_passed,
        failing = report.failingtests.len(),
        upgrades = report.failingupgrades.len(),
        "run finished"
    );
    Ok(all_passed)
}

fn handle_preview(session: &mut Session, question_id: QuestionId, seed: Option<Seed>) -> Result<bool> {
    let question = session.bank.load_question(question_id)?;
    let tests = session.bank.load_test_cases(question_id)?;

    let mut tester = session.tester();
    let cached = tester.seed_cache(&question, seed)?;
    let run = if tests.is_empty() {
        None
    } else {
        Some(tester.run_variant(&question, &tests, seed)?)
    };
    drop(tester);

    let passed = run.as_ref().map_or(true, |r| r.outcome.passed);
    let mut out = session.stdout();
    print_preview(&mut out, &question, &cached, &tests, run.as_ref()).map_err(io_error)?;
    Ok(passed)
}

fn handle_edit(
    session: &mut Session,
    question: QuestionId,
    testcase: Option<TestCaseId>,
    seed: Option<Seed>,
    inputs: &[String],
    expects: &[String],
    cancel: bool,
) -> Result<bool> {
    let mut out = session.stdout();
    let mut editor = TestCaseEditor::new(&mut session.bank, &session.engine);
    let edit = editor.open(question, testcase, seed)?;

    if cancel {
        let back = editor.cancel(edit);
        writeln!(out, "Cancelled. Back: {back}").map_err(io_error)?;
        return Ok(true);
    }

    if inputs.is_empty() && expects.is_empty() {
        let preview = editor.preview(&edit)?;
        print_edit_session(&mut out, &edit, &preview).map_err(io_error)?;
        return Ok(true);
    }

    let mut form = edit.form.clone();
    for raw in inputs {
        let (name, value) = parse_input(raw)?;
        form.inputs.insert(name, value);
    }
    for raw in expects {
        let (prt, fields) = parse_expect(raw)?;
        form.prts.insert(prt, fields);
    }
    let id = editor.submit(&edit, &form)?;
    writeln!(out, "Saved test case {id} for question {}.", edit.question.name).map_err(io_error)?;
    writeln!(out, "Back: {}", edit.back).map_err(io_error)?;
    Ok(true)
}

// ============================================================================
// FORM VALUES
// ============================================================================

/// Parses `name=value`; the value may itself contain `=`.
fn parse_input(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| bulk_err!(Validation, "expected NAME=VALUE, got '{}'", raw))?;
    Ok((name.trim().to_string(), value.to_string()))
}

/// Parses `prt=score,penalty,note`; the note may be empty.
fn parse_expect(raw: &str) -> Result<(String, PrtFields)> {
    let malformed = || bulk_err!(Validation, "expected PRT=SCORE,PENALTY,NOTE, got '{}'", raw);
    let (prt, triple) = raw.split_once('=').ok_or_else(malformed)?;
    let mut parts = triple.splitn(3, ',');
    let score = parts.next().ok_or_else(malformed)?;
    let penalty = parts.next().ok_or_else(malformed)?;
    let note = parts.next().unwrap_or_default();
    Ok((prt.trim().to_string(), PrtFields::new(score, penalty, note)))
}
