//! Error types for simbridge.
//!
//! Errors are strongly typed using thiserror and split by how they propagate:
//! engine failures are fatal to the enclosing lifecycle action, validation
//! failures stop at the strategy boundary, construction failures fail the
//! constructor, and lookups of unseen factor levels are programmer errors.

use thiserror::Error;

/// Failures talking to the external statistical engine.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Evaluation of '{expr}' failed: {message}")]
    Evaluation {
        expr: String,
        message: String,
    },

    #[error("Evaluation of '{expr}' returned {actual}, expected {expected}")]
    UnexpectedShape {
        expr: String,
        expected: String,
        actual: String,
    },

    #[error("Assignment to '{name}' failed: {message}")]
    Assignment {
        name: String,
        message: String,
    },

    #[error("Snapshot for run {run} failed: {message}")]
    Snapshot {
        run: u32,
        message: String,
    },

    #[error("Engine backend error: {message}")]
    Backend {
        message: String,
    },
}

/// Recoverable validation failures of a parameter set.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Level weights ({total}) must add to 1 (tolerance {tolerance})")]
    WeightSumMismatch {
        total: f64,
        tolerance: f64,
    },

    #[error("Value {value} for '{field}' is not finite")]
    NonFinite {
        field: String,
        value: f64,
    },

    #[error("Value {value} for '{field}' is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("No cell at row {row}, column '{column}'")]
    UnknownCell {
        row: usize,
        column: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Failures building a weighting strategy from its source data.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("'{expr}' returned {actual}, expected a numeric vector")]
    NotNumericVector {
        expr: String,
        actual: String,
    },

    #[error("Result of '{expr}' does not supply a names attribute")]
    MissingNames {
        expr: String,
    },

    #[error("Cannot build table from value of class {class}")]
    NotTabular {
        class: String,
    },

    #[error("Table '{table}' has no column '{column}'")]
    MissingColumn {
        table: String,
        column: String,
    },

    #[error("Column '{column}' row {row} cannot be read as {expected}")]
    BadColumnType {
        column: String,
        row: usize,
        expected: String,
    },

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate factor level '{level}'")]
    DuplicateLevel {
        level: String,
    },

    #[error("Names attribute has {names} entries for {values} values")]
    NamesLengthMismatch {
        names: usize,
        values: usize,
    },

    #[error("Display adjustment factor {factor} for '{varname}' must be finite and non-zero")]
    BadAdjustmentFactor {
        varname: String,
        factor: f64,
    },
}

/// Weight lookups that the caller should never have made.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Cannot find reweighting value for {variable} with value = {value}")]
    UnknownLevel {
        variable: String,
        value: String,
    },

    #[error("Variable '{variable}' is not present in the supplied values")]
    MissingVariable {
        variable: String,
    },
}

/// Top-level error type for simbridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The engine failed; fatal to the enclosing action.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Edited values were rejected.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A strategy could not be built from its source data.
    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),

    /// A weight was requested for an unknown level or variable.
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// The operation is not supported by this strategy.
    #[error("{operation} not implemented")]
    NotImplemented {
        /// Name of the unsupported operation.
        operation: &'static str,
    },

    /// Reading or writing a config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A config file could not be parsed or serialized.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl BridgeError {
    /// Creates a not-implemented error for `operation`.
    #[must_use]
    pub const fn not_implemented(operation: &'static str) -> Self {
        Self::NotImplemented { operation }
    }

    /// Returns true if the enclosing run must be aborted.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Engine(_))
    }

    /// Returns true if the error can be corrected by the user and retried.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the error signals a misuse of the API.
    #[must_use]
    pub const fn is_programmer_error(&self) -> bool {
        matches!(self, Self::Lookup(_) | Self::NotImplemented { .. })
    }

    /// Returns true if this is a not-implemented signal.
    #[must_use]
    pub const fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }
}

/// Result type alias for simbridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_sum_mismatch_carries_total() {
        let err = ValidationError::WeightSumMismatch {
            total: 1.2,
            tolerance: 1e-9,
        };
        let msg = format!("{err}");
        assert!(msg.contains("1.2"));
        assert!(msg.contains("must add to 1"));
    }

    #[test]
    fn test_engine_error_is_fatal() {
        let err: BridgeError = EngineError::Evaluation {
            expr: "f(1)".to_string(),
            message: "could not find function".to_string(),
        }
        .into();
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
        assert!(format!("{err}").contains("f(1)"));
    }

    #[test]
    fn test_validation_error_is_recoverable() {
        let err: BridgeError = ValidationError::WeightSumMismatch {
            total: 0.5,
            tolerance: 1e-9,
        }
        .into();
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_not_implemented() {
        let err = BridgeError::not_implemented("level_weight");
        assert!(err.is_not_implemented());
        assert!(err.is_programmer_error());
        assert_eq!(format!("{err}"), "level_weight not implemented");
    }

    #[test]
    fn test_out_of_range_names_bounds() {
        let err = ValidationError::OutOfRange {
            field: "flag".to_string(),
            value: 300.0,
            min: -127.0,
            max: 127.0,
        };
        assert_eq!(format!("{err}"), "Value 300 for 'flag' is outside [-127, 127]");
    }

    #[test]
    fn test_unknown_level_message() {
        let err = LookupError::UnknownLevel {
            variable: "sol1".to_string(),
            value: "4".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("sol1"));
        assert!(msg.contains("value = 4"));
    }
}
