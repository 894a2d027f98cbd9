//! Fantasy Market Service Library
//!
//! Configuration, logging, component wiring and graceful shutdown for the
//! `fantasy-market` binary.

use anyhow::{Context, Result};
use std::path::Path;

pub mod cli;
pub mod config;
pub mod logging;
pub mod service;
pub mod signals;

pub use cli::Cli;
pub use config::ServiceConfig;
pub use logging::initialize_logging;
pub use service::{ServiceHealth, ServiceState};
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from files and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(path).context("Failed to load service configuration")
}
