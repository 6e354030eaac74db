pub use crate::errors::{BulkTestError, Result};

pub mod bank;
pub mod cli;
pub mod config;
pub mod editor;
pub mod engine;
pub mod environment;
pub mod errors;
pub mod model;
pub mod progress;
pub mod report;
pub mod runner;
pub mod store;
pub mod usage;
