//! Scheduler configuration, loadable from TOML

use crate::error::{CadenceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Plain numeric settings that shape one frame's schedule.
///
/// ```toml
/// fixed_frequency = 50.0
/// max_fixed_steps = 5
/// worker_threads = 4
/// physics_sub_steps = 1
/// time_scale = 1.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fixed simulation ticks per second
    pub fixed_frequency: f64,
    /// Maximum fixed ticks run in a single frame (catch-up clamp)
    pub max_fixed_steps: u32,
    /// Worker pool size override. `None` uses `max(1, hardware threads - 1)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_threads: Option<usize>,
    /// Sub-steps handed to the physics backend per fixed tick
    pub physics_sub_steps: u32,
    /// Multiplier applied to wall time before it reaches the fixed clock
    pub time_scale: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fixed_frequency: 50.0,
            max_fixed_steps: 5,
            worker_threads: None,
            physics_sub_steps: 1,
            time_scale: 1.0,
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate a config from a TOML string
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Serialize the config back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fixed_frequency.is_finite() || self.fixed_frequency <= 0.0 {
            return Err(CadenceError::ConfigError(format!(
                "fixed_frequency must be a positive number, got {}",
                self.fixed_frequency
            )));
        }
        if self.max_fixed_steps == 0 {
            return Err(CadenceError::ValueOutOfRange {
                field: "max_fixed_steps".into(),
                min: 1.0,
                max: u32::MAX as f64,
                value: 0.0,
            });
        }
        if self.worker_threads == Some(0) {
            return Err(CadenceError::ConfigError(
                "worker_threads override must be at least 1".into(),
            ));
        }
        if self.physics_sub_steps == 0 {
            return Err(CadenceError::ConfigError(
                "physics_sub_steps must be at least 1".into(),
            ));
        }
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(CadenceError::ConfigError(format!(
                "time_scale must be a non-negative number, got {}",
                self.time_scale
            )));
        }
        Ok(())
    }

    /// Duration of one fixed tick in seconds
    pub fn fixed_step(&self) -> f64 {
        1.0 / self.fixed_frequency
    }

    /// Effective worker pool size: the override, or all hardware threads but one
    pub fn resolved_worker_threads(&self) -> usize {
        match self.worker_threads {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1),
        }
    }
}
