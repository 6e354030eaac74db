//! Runner configuration.
//!
//! Defaults suit an interactive run. A bank directory may carry a
//! `stacktest.yaml` overriding any subset of the fields; command-line flags
//! are applied on top by the CLI.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::engine::builtin::{DEFAULT_CACHE_CAPACITY, DEFAULT_MINIMUM_VERSION};
use crate::errors::{BulkTestError, Result};

/// File name looked up in the bank root.
pub const CONFIG_FILE: &str = "stacktest.yaml";

/// Seconds granted to each variant before it is considered overrunning.
pub const DEFAULT_TIME_BUDGET_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BulkTestConfig {
    /// Time budget granted before each variant.
    pub time_budget_secs: u64,
    /// Hard cap on the whole run; extending past it is an environment failure.
    pub max_run_secs: Option<u64>,
    /// Oldest question `stack_version` accepted by the upgrade check.
    pub minimum_version: String,
    /// Cached variants kept before garbage collection clears the cache.
    pub cache_capacity: usize,
    #[serde(skip)]
    pub use_colors: bool,
}

impl Default for BulkTestConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: DEFAULT_TIME_BUDGET_SECS,
            max_run_secs: None,
            minimum_version: DEFAULT_MINIMUM_VERSION.to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            use_colors: atty::is(atty::Stream::Stdout),
        }
    }
}

impl BulkTestConfig {
    /// Loads `stacktest.yaml` from `bank_root`, or the defaults if absent.
    pub fn load(bank_root: &Path) -> Result<Self> {
        let path = bank_root.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| BulkTestError::bank(&path, "cannot read configuration", e))?;
        let mut config: Self = serde_yaml::from_str(&content)
            .map_err(|e| BulkTestError::bank(&path, "invalid configuration", e))?;
        config.use_colors = atty::is(atty::Stream::Stdout);
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    pub fn max_run(&self) -> Option<Duration> {
        self.max_run_secs.map(Duration::from_secs)
    }
}
