//! Weighting strategies.
//!
//! A strategy is a [`ParameterSet`]: a named, user-editable table that
//! publishes a [`ParameterChange`] after each accepted update. Strategies
//! that also compute per-entity weights implement [`WeightCalculator`].
//!
//! - [`SingleVarWeights`] reweights the levels of one categorical variable.
//! - [`CategoricalAdjustment`] edits an adjustment matrix held by the engine.
//! - [`CombinedWeights`] multiplies the weights of several calculators.

/// Multiplicative combination of calculators.
pub mod combined;
/// Factor levels and weight entries.
pub mod entry;
/// Observer and stream fan-out.
pub mod notify;

pub mod categorical;
pub mod single_var;

use std::sync::Arc;

use crate::error::{BridgeResult, ValidationError};
use crate::frame::DataFrame;
use crate::prefs::Preferences;

pub use categorical::{CategoricalAdjustment, INTERMEDIATE_VAR};
pub use combined::CombinedWeights;
pub use entry::{LevelKey, LevelValue, Variables, WeightEntry, WeightSet};
pub use notify::{ChangeNotifier, ChangeStream, ParameterChange, ParameterObserver, ParameterSetId};
pub use single_var::{SingleVarWeights, SingleVarWeightsBuilder};

/// Neutral weight that combined weights start from.
pub const WEIGHT_BASE: f64 = 1.0;

/// Result of [`ParameterSet::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The edits were accepted and observers notified.
    Published(ParameterChange),
    /// The edits were rejected; observers were not notified.
    Rejected(ValidationError),
}

impl UpdateOutcome {
    /// True if the update was published.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

/// A named, editable parameter table with change notification.
pub trait ParameterSet {
    /// Human-readable name for menus and window titles.
    fn name(&self) -> String;

    /// Current tabular view, including unpublished edits.
    fn table(&self) -> DataFrame;

    /// Validate pending edits and publish them.
    ///
    /// A rejected update is reported through [`UpdateOutcome::Rejected`],
    /// not as an error. Errors are reserved for engine failures.
    fn update(&mut self) -> BridgeResult<UpdateOutcome>;

    /// Return to the set's defaults.
    fn reset_defaults(&mut self) -> BridgeResult<()>;

    /// Restore edits saved by [`ParameterSet::save_state`].
    fn load_state(&mut self, prefs: &dyn Preferences) -> BridgeResult<()>;

    /// Save edits to `prefs`.
    fn save_state(&self, prefs: &mut dyn Preferences) -> BridgeResult<()>;

    /// Base that this set's weights are relative to.
    fn weight_base(&self) -> f64 {
        WEIGHT_BASE
    }

    /// Register an observer. Returns false if it was already registered.
    fn add_observer(&mut self, observer: Arc<dyn ParameterObserver>) -> bool;

    /// Open a bounded stream of published changes.
    fn subscribe(&mut self) -> ChangeStream;
}

/// Computes per-entity weights from the published state of a set.
pub trait WeightCalculator: ParameterSet {
    /// Reweighting factor for the entity described by `vars`.
    ///
    /// # Errors
    /// `Lookup` when the variable is absent or its level is unknown.
    fn weight(&self, vars: &Variables) -> BridgeResult<f64>;

    /// Current proportion of the entity's level.
    fn level_weight(&self, vars: &Variables) -> BridgeResult<f64>;

    /// Current proportion of every level, in level order.
    fn all_level_props(&self) -> BridgeResult<Vec<f64>>;
}
