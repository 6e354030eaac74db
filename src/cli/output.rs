//! Handles all user-facing output for the CLI.
//!
//! Progress streams through [`TerminalSink`] while a run is in flight; the
//! printers below render the index, a single variant and the editor form.
//! Everything writes to a [`WriteColor`] so it can be captured in tests.

use std::io;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::editor::{EditSession, Preview};
use crate::model::{Category, Question, Seed, StoredTestCase, VariantOutcome};
use crate::progress::ProgressSink;
use crate::report::{QuestionLabel, QuestionProblem};
use crate::runner::{Scope, SeedCacheOutcome, VariantRun};

// ============================================================================
// PROGRESS SINK
// ============================================================================

/// Streams progress of a bulk run to a terminal.
pub struct TerminalSink<W: WriteColor> {
    out: W,
}

impl TerminalSink<StandardStream> {
    pub fn stdout(choice: ColorChoice) -> Self {
        Self::new(StandardStream::stdout(choice))
    }
}

impl<W: WriteColor> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn colored(&mut self, color: Color, bold: bool, text: &str) {
        let _ = self
            .out
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.reset();
    }
}

fn seed_label(seed: Option<Seed>) -> String {
    match seed {
        Some(seed) => format!("seed {seed}"),
        None => "no deployed variants".to_string(),
    }
}

impl<W: WriteColor> ProgressSink for TerminalSink<W> {
    fn on_category(&mut self, category: &Category, question_count: usize) {
        let _ = writeln!(self.out);
        let _ = self.out.set_color(ColorSpec::new().set_bold(true));
        let _ = writeln!(self.out, "{} ({} questions)", category.name, question_count);
        let _ = self.out.reset();
    }

    fn on_question(&mut self, question: &QuestionLabel, problems: &[QuestionProblem]) {
        let _ = writeln!(self.out, "  {}", question.name);
        for problem in problems {
            self.colored(Color::Yellow, false, &format!("    {}", problem.description()));
        }
    }

    fn on_upgrade_failure(&mut self, question: &QuestionLabel, message: &str) {
        let _ = writeln!(self.out, "  {}", question.name);
        self.colored(Color::Red, false, &format!("    {message}"));
    }

    fn on_seed_cache(&mut self, _question: &QuestionLabel, seed: Option<Seed>, runtime_errors: &[String]) {
        if !runtime_errors.is_empty() {
            self.colored(
                Color::Yellow,
                false,
                &format!("    {}: {}", seed_label(seed), runtime_errors.join(" ")),
            );
        }
        let _ = self.out.flush();
    }

    fn on_variant_result(&mut self, _question: &QuestionLabel, seed: Option<Seed>, outcome: &VariantOutcome) {
        let color = if outcome.passed { Color::Green } else { Color::Red };
        self.colored(color, false, &format!("    * {}: {}", seed_label(seed), outcome));
        let _ = self.out.flush();
    }
}

// ============================================================================
// PRINTERS
// ============================================================================

fn heading<W: WriteColor>(out: &mut W, text: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(out, "{text}")?;
    out.reset()
}

fn variables<W: WriteColor>(out: &mut W, variables: &[(String, String)]) -> io::Result<()> {
    writeln!(out)?;
    heading(out, "Question variables")?;
    if variables.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for (name, value) in variables {
        writeln!(out, "  {name} = {value}")?;
    }
    Ok(())
}

/// Lists every context holding STACK questions.
pub fn print_index<W: WriteColor>(out: &mut W, scope: &Scope) -> io::Result<()> {
    heading(out, "Contexts with STACK questions")?;
    if scope.contexts.is_empty() {
        writeln!(out, "  No STACK questions found.")?;
        return Ok(());
    }
    for entry in &scope.contexts {
        writeln!(
            out,
            "  [{}] {}: {} questions",
            entry.context.id, entry.context.name, entry.question_count
        )?;
        writeln!(out, "      stacktest run --context {}", entry.context.id)?;
    }
    writeln!(out)?;
    writeln!(out, "Run everything: stacktest run --all")?;
    Ok(())
}

/// Prints one variant and the results of every stored test case against it.
pub fn print_preview<W: WriteColor>(
    out: &mut W,
    question: &Question,
    cached: &SeedCacheOutcome,
    tests: &[StoredTestCase],
    run: Option<&VariantRun>,
) -> io::Result<()> {
    heading(out, &format!("{} (seed {})", question.name, cached.seed))?;
    writeln!(out, "Marked out of {}", question.default_mark)?;
    writeln!(out, "{}", cached.rendered)?;
    variables(out, &cached.variables)?;

    writeln!(out)?;
    heading(out, "Teacher answers")?;
    for (name, value) in &cached.teacher_answers {
        writeln!(out, "  {name} = {value}")?;
    }

    if !cached.runtime_errors.is_empty() {
        writeln!(out)?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        for error in &cached.runtime_errors {
            writeln!(out, "  {error}")?;
        }
        out.reset()?;
    }

    writeln!(out)?;
    heading(out, "Question tests")?;
    let Some(run) = run else {
        writeln!(out, "  This question has no tests.")?;
        return Ok(());
    };
    for (testcase, result) in &run.results {
        let (color, status) = if result.passed {
            (Color::Green, "pass")
        } else {
            (Color::Red, "fail")
        };
        write!(out, "  Test case {testcase}: ")?;
        out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        writeln!(out, "{status}")?;
        out.reset()?;
        if let Some(stored) = tests.iter().find(|t| t.testcase == *testcase) {
            for (name, value) in &stored.case.inputs {
                writeln!(out, "      {name} = {value}")?;
            }
        }
        for comparison in result.mismatches() {
            writeln!(
                out,
                "      {}: expected {}; got {}",
                comparison.prt, comparison.expected, comparison.actual
            )?;
        }
    }
    writeln!(out, "  {}", run.outcome)?;
    Ok(())
}

/// Prints the editing form of a session, with the variant it is written against.
pub fn print_edit_session<W: WriteColor>(
    out: &mut W,
    session: &EditSession,
    preview: &Preview,
) -> io::Result<()> {
    heading(out, &session.title)?;
    writeln!(out, "{}", preview.rendered)?;
    variables(out, &preview.variables)?;
    writeln!(out)?;
    heading(out, "Question text")?;
    writeln!(out, "{}", preview.question_text)?;

    writeln!(out)?;
    heading(out, "Test case inputs")?;
    for (name, value) in &session.form.inputs {
        writeln!(out, "  {name} = {value}")?;
    }
    writeln!(out)?;
    heading(out, "Expected results")?;
    for (prt, fields) in &session.form.prts {
        writeln!(
            out,
            "  {prt}: score={}, penalty={}, note={}",
            fields.score, fields.penalty, fields.answer_note
        )?;
    }

    writeln!(out)?;
    let mut command = format!("stacktest edit --question {}", session.question.id);
    if let Some(testcase) = session.testcase {
        command.push_str(&format!(" --testcase {testcase}"));
    }
    if let Some(seed) = session.seed {
        command.push_str(&format!(" --seed {seed}"));
    }
    writeln!(
        out,
        "{}: {command} --input NAME=VALUE --expect PRT=SCORE,PENALTY,NOTE",
        session.submit_label
    )?;
    writeln!(out, "Cancel: {command} --cancel")?;
    Ok(())
}
