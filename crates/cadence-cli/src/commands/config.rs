//! Config command - print the effective scheduler configuration

use anyhow::{Context, Result};
use cadence_core::SchedulerConfig;
use std::path::Path;

/// Load `path`, or the defaults when no file is given
pub fn load(path: Option<&Path>) -> Result<SchedulerConfig> {
    match path {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(SchedulerConfig::default()),
    }
}

pub fn run(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    config.validate()?;
    print!("{}", config.to_toml_string()?);
    println!(
        "# fixed step {:.4}s, {} worker thread(s)",
        config.fixed_step(),
        config.resolved_worker_threads()
    );
    Ok(())
}
