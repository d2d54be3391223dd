//! Interface to the external statistical engine.
//!
//! The engine owns a single shared namespace of named variables. The bridge
//! writes population snapshots into it and runs user command templates
//! against it; the weighting strategies read distributions out of it and
//! write adjustment matrices back.
//!
//! [`memory::InMemoryEngine`] is a reference implementation used by tests
//! and for embedding without a real engine.

/// In-memory reference engine.
pub mod memory;

use crate::error::EngineError;
use crate::frame::DataFrame;
use crate::value::Value;

pub use memory::{EngineFn, InMemoryEngine};

/// Operations the core consumes from a statistical engine.
///
/// Calls are synchronous round-trips. Implementations should treat a failed
/// call as final; callers do not retry.
pub trait StatEngine: Send + Sync {
    /// Evaluate an expression and return its value.
    ///
    /// # Errors
    /// - `Evaluation`: the engine reported an error for `expr`
    /// - `UnexpectedShape`: the result could not be represented as a [`Value`]
    fn evaluate(&self, expr: &str) -> Result<Value, EngineError>;

    /// Bind `value` to `name`. `name` may be a `$`-separated path into a list.
    fn assign(&self, name: &str, value: Value) -> Result<(), EngineError>;

    /// Bind the current value of the variable `source` to `target`.
    fn assign_from(&self, target: &str, source: &str) -> Result<(), EngineError> {
        let value = self.evaluate(source)?;
        self.assign(target, value)
    }

    /// Write a line to the engine console.
    fn echo(&self, text: &str);

    /// Present the engine's interactive prompt.
    fn print_prompt(&self);

    /// Run number for engine-side logging hooks. Called before each command.
    fn set_run_number(&self, _run: u32) {}
}

/// Evaluate `expr` and build a table from the result.
///
/// # Errors
/// `UnexpectedShape` when the result is neither a frame nor a matrix.
pub fn evaluate_frame(
    engine: &dyn StatEngine,
    expr: &str,
) -> Result<DataFrame, EngineError> {
    let value = engine.evaluate(expr)?;
    DataFrame::from_value(expr, &value).map_err(|_| EngineError::UnexpectedShape {
        expr: expr.to_string(),
        expected: "matrix or data.frame".to_string(),
        actual: value.class().to_string(),
    })
}
