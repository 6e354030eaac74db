//! Resource governance for long batch runs.
//!
//! The runner calls [`ExecutionEnvironment::before_variant`] before it
//! instantiates each variant and [`ExecutionEnvironment::after_variant`]
//! once the variant is done. The process implementation flushes stdout so
//! progress stays visible, re-arms a per-variant time budget, and refuses to
//! extend past an optional hard cap on the whole run.

use std::io::Write;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::bulk_err;
use crate::errors::Result;

pub trait ExecutionEnvironment {
    /// Grants the next unit of work `budget` from now.
    fn extend_time_budget(&mut self, budget: Duration) -> Result<()>;

    /// Pushes partial output out to the observer.
    fn flush(&mut self) -> Result<()>;

    /// Budget granted per variant.
    fn variant_budget(&self) -> Duration;

    /// Called before each variant is instantiated.
    fn before_variant(&mut self) -> Result<()> {
        self.flush()?;
        let budget = self.variant_budget();
        self.extend_time_budget(budget)
    }

    /// Called after each variant finished.
    fn after_variant(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Environment of a CLI process writing its report to stdout.
#[derive(Debug)]
pub struct ProcessEnvironment {
    started: Instant,
    variant_budget: Duration,
    hard_limit: Option<Duration>,
    deadline: Option<Instant>,
}

impl ProcessEnvironment {
    pub fn new(variant_budget: Duration, hard_limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            variant_budget,
            hard_limit,
            deadline: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl ExecutionEnvironment for ProcessEnvironment {
    fn extend_time_budget(&mut self, budget: Duration) -> Result<()> {
        if let Some(limit) = self.hard_limit {
            if self.elapsed() >= limit {
                return Err(bulk_err!(
                    Environment,
                    "run exceeded its {}s limit; cannot extend the time budget",
                    limit.as_secs()
                ));
            }
        }
        self.deadline = Some(Instant::now() + budget);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        std::io::stdout()
            .flush()
            .map_err(|e| bulk_err!(Environment, "cannot flush output: {}", e))
    }

    fn variant_budget(&self) -> Duration {
        self.variant_budget
    }

    fn after_variant(&mut self) -> Result<()> {
        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            if now > deadline {
                warn!(
                    overrun_ms = (now - deadline).as_millis() as u64,
                    "variant exceeded its time budget"
                );
            }
        }
        self.flush()
    }
}
