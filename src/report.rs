//! The run report and its renderers.
//!
//! A [`RunReport`] holds four lists in a fixed taxonomy. Sections render in
//! [`ReportSection::ALL`] order and only when non-empty. Every entry carries a
//! [`PreviewLink`] naming the command that reproduces the variant.

use std::fmt;
use std::io;

use serde::Serialize;
use termcolor::{Color, ColorSpec, WriteColor};

use crate::model::{QuestionId, Seed};

// =============================================================================
// TAXONOMY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSection {
    FailingTests,
    NoTests,
    NoGeneralFeedback,
    FailingUpgrades,
}

impl ReportSection {
    pub const ALL: [ReportSection; 4] = [
        ReportSection::FailingTests,
        ReportSection::NoTests,
        ReportSection::NoGeneralFeedback,
        ReportSection::FailingUpgrades,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ReportSection::FailingTests => "failingtests",
            ReportSection::NoTests => "notests",
            ReportSection::NoGeneralFeedback => "nogeneralfeedback",
            ReportSection::FailingUpgrades => "failingupgrades",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportSection::FailingTests => "Questions with failing tests",
            ReportSection::NoTests => "Questions with no tests",
            ReportSection::NoGeneralFeedback => "Questions with no general feedback",
            ReportSection::FailingUpgrades => "Questions failing the upgrade check",
        }
    }
}

impl fmt::Display for ReportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Non-blocking problems noticed while preparing a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuestionProblem {
    NoGeneralFeedback,
    NoTests,
}

impl QuestionProblem {
    pub fn section(&self) -> ReportSection {
        match self {
            QuestionProblem::NoGeneralFeedback => ReportSection::NoGeneralFeedback,
            QuestionProblem::NoTests => ReportSection::NoTests,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            QuestionProblem::NoGeneralFeedback => "This question has no general feedback.",
            QuestionProblem::NoTests => "This question has no tests.",
        }
    }
}

// =============================================================================
// ENTRIES
// =============================================================================

/// Identifies a question within the context being run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionLabel {
    pub context: String,
    pub question: QuestionId,
    pub name: String,
}

/// Focused single-variant view of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PreviewLink {
    pub question: QuestionId,
    pub seed: Option<Seed>,
}

impl fmt::Display for PreviewLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stacktest preview --question {}", self.question)?;
        if let Some(seed) = self.seed {
            write!(f, " --seed {seed}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub question: QuestionLabel,
    pub seed: Option<Seed>,
    pub message: Option<String>,
    pub link: PreviewLink,
}

impl ReportEntry {
    pub fn new(question: &QuestionLabel, seed: Option<Seed>, message: Option<String>) -> Self {
        Self {
            link: PreviewLink {
                question: question.question,
                seed,
            },
            question: question.clone(),
            seed,
            message,
        }
    }

    /// Composite label: context, question and, when pinned, the seed.
    pub fn label(&self) -> String {
        match self.seed {
            Some(seed) => format!("{} {} seed {}", self.question.context, self.question.name, seed),
            None => format!("{} {}", self.question.context, self.question.name),
        }
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.label(), message),
            None => f.write_str(&self.label()),
        }
    }
}

// =============================================================================
// REPORT
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub failingtests: Vec<ReportEntry>,
    pub notests: Vec<ReportEntry>,
    pub nogeneralfeedback: Vec<ReportEntry>,
    pub failingupgrades: Vec<ReportEntry>,
}

impl RunReport {
    pub fn entries(&self, section: ReportSection) -> &[ReportEntry] {
        match section {
            ReportSection::FailingTests => &self.failingtests,
            ReportSection::NoTests => &self.notests,
            ReportSection::NoGeneralFeedback => &self.nogeneralfeedback,
            ReportSection::FailingUpgrades => &self.failingupgrades,
        }
    }

    pub(crate) fn push(&mut self, section: ReportSection, entry: ReportEntry) {
        match section {
            ReportSection::FailingTests => self.failingtests.push(entry),
            ReportSection::NoTests => self.notests.push(entry),
            ReportSection::NoGeneralFeedback => self.nogeneralfeedback.push(entry),
            ReportSection::FailingUpgrades => self.failingupgrades.push(entry),
        }
    }

    /// Non-empty sections in taxonomy order.
    pub fn sections(&self) -> impl Iterator<Item = (ReportSection, &[ReportEntry])> {
        ReportSection::ALL
            .into_iter()
            .map(move |s| (s, self.entries(s)))
            .filter(|(_, entries)| !entries.is_empty())
    }

    /// Appends another report, section by section.
    pub fn merge(&mut self, other: RunReport) {
        self.failingtests.extend(other.failingtests);
        self.notests.extend(other.notests);
        self.nogeneralfeedback.extend(other.nogeneralfeedback);
        self.failingupgrades.extend(other.failingupgrades);
    }

    pub fn is_empty(&self) -> bool {
        self.sections().next().is_none()
    }

    /// Every entry naming `question`, across all sections.
    pub fn mentions(&self, question: QuestionId) -> Vec<(ReportSection, &ReportEntry)> {
        ReportSection::ALL
            .into_iter()
            .flat_map(|s| {
                self.entries(s)
                    .iter()
                    .filter(move |e| e.question.question == question)
                    .map(move |e| (s, e))
            })
            .collect()
    }
}

// =============================================================================
// RENDERERS
// =============================================================================

#[derive(Serialize)]
struct JsonReport<'a> {
    all_passed: bool,
    #[serde(flatten)]
    report: &'a RunReport,
}

/// Renders the overall result as pretty JSON.
pub fn to_json(all_passed: bool, report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport { all_passed, report })
}

/// Writes the overall summary: result line, then each non-empty section.
pub fn render_overall_result<W: WriteColor>(
    out: &mut W,
    all_passed: bool,
    report: &RunReport,
) -> io::Result<()> {
    writeln!(out)?;
    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(out, "Overall result")?;
    out.reset()?;

    let (color, text) = if all_passed {
        (Color::Green, "All tests passed!")
    } else {
        (Color::Red, "One or more tests failed.")
    };
    out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    writeln!(out, "{text}")?;
    out.reset()?;

    for (section, entries) in report.sections() {
        writeln!(out)?;
        out.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(out, "{} ({})", section.title(), section.key())?;
        out.reset()?;
        for entry in entries {
            writeln!(out, "  - {entry}")?;
            writeln!(out, "      {}", entry.link)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "Back: stacktest index")?;
    Ok(())
}
