//! Bridge configuration.
//!
//! Loaded from JSON. Every section is optional and falls back to its
//! default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeResult, ValidationError};
use crate::lifecycle::{CommandTemplates, DEFAULT_SNAPSHOT_NAME};

/// Change-notification settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Per-subscriber stream buffer capacity.
    pub stream_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { stream_capacity: 64 }
    }
}

/// Weight validation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Allowed deviation from 1 per factor level.
    pub sum_tolerance: f64,
    /// Upper bound on the total allowed deviation.
    pub max_tolerance: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            sum_tolerance: 1e-9,
            max_tolerance: 1e-6,
        }
    }
}

impl WeightConfig {
    /// Tolerance for a set of `levels` weights.
    #[must_use]
    pub fn tolerance_for(&self, levels: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let scaled = self.sum_tolerance * levels.max(1) as f64;
        scaled.min(self.max_tolerance)
    }
}

/// One categorical adjustment to build from engine data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalSpec {
    /// Engine variable holding the adjustment matrix; may be a `$` path.
    pub r_matrix_varname: String,
    /// Variable the matrix adjusts, used to look up its description.
    pub r_variable: String,
    /// Multiplier applied for display; its reciprocal is applied on write-back.
    #[serde(default = "unit_factor")]
    pub display_adj_factor: f64,
}

const fn unit_factor() -> f64 {
    1.0
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Commands run at lifecycle transitions.
    pub commands: CommandTemplates,
    /// Base name of the per-run snapshot variable.
    pub snapshot_name: String,
    /// Change stream sizing shared by all parameter sets.
    pub notifier: NotifierConfig,
    /// Single-variable weight validation.
    pub weights: WeightConfig,
    /// Adjustment matrices to build at startup.
    pub categorical: Vec<CategoricalSpec>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            commands: CommandTemplates::default(),
            snapshot_name: DEFAULT_SNAPSHOT_NAME.to_string(),
            notifier: NotifierConfig::default(),
            weights: WeightConfig::default(),
            categorical: Vec::new(),
        }
    }
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        reason: reason.into(),
    }
}

impl BridgeConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load_from_file(path: &Path) -> BridgeResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write the configuration as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> BridgeResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check limits and names.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.snapshot_name.trim().is_empty() {
            return Err(invalid("snapshot_name must not be empty"));
        }
        if self.notifier.stream_capacity == 0 {
            return Err(invalid("notifier.stream_capacity must be > 0"));
        }
        let w = &self.weights;
        if !(w.sum_tolerance.is_finite() && w.sum_tolerance > 0.0) {
            return Err(invalid("weights.sum_tolerance must be > 0"));
        }
        if !(w.max_tolerance.is_finite() && w.max_tolerance >= w.sum_tolerance) {
            return Err(invalid("weights.max_tolerance must be >= sum_tolerance"));
        }
        for spec in &self.categorical {
            if spec.r_matrix_varname.trim().is_empty() {
                return Err(invalid("categorical r_matrix_varname must not be empty"));
            }
            if !spec.display_adj_factor.is_finite() || spec.display_adj_factor == 0.0 {
                return Err(invalid(format!(
                    "display_adj_factor for {} must be finite and non-zero",
                    spec.r_matrix_varname
                )));
            }
        }
        Ok(())
    }
}
