//! Several weighting strategies applied to the same entity.

use log::debug;

use crate::error::BridgeResult;

use super::entry::Variables;
use super::{UpdateOutcome, WeightCalculator, WEIGHT_BASE};

/// Product of several calculators' weights, each taken relative to its
/// own weight base.
#[derive(Default)]
pub struct CombinedWeights {
    calculators: Vec<Box<dyn WeightCalculator>>,
}

impl std::fmt::Debug for CombinedWeights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.calculators.iter().map(|c| c.name()))
            .finish()
    }
}

impl CombinedWeights {
    /// No calculators; every weight is [`WEIGHT_BASE`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`CombinedWeights::push`].
    #[must_use]
    pub fn with(mut self, calculator: Box<dyn WeightCalculator>) -> Self {
        self.push(calculator);
        self
    }

    /// Append a calculator.
    pub fn push(&mut self, calculator: Box<dyn WeightCalculator>) {
        debug!("combining {}", calculator.name());
        self.calculators.push(calculator);
    }

    /// Number of calculators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calculators.len()
    }

    /// True when nothing has been combined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calculators.is_empty()
    }

    /// Calculator names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.calculators.iter().map(|c| c.name()).collect()
    }

    /// Calculator at `index`, for editing.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn WeightCalculator + 'static)> {
        self.calculators.get_mut(index).map(|c| &mut **c)
    }

    /// Combined weight of one entity. [`WEIGHT_BASE`] when empty.
    ///
    /// # Errors
    /// The first calculator error, unchanged.
    pub fn weight(&self, vars: &Variables) -> BridgeResult<f64> {
        self.calculators.iter().try_fold(WEIGHT_BASE, |acc, c| {
            Ok(acc * c.weight(vars)? / c.weight_base())
        })
    }

    /// Publish pending edits of every calculator.
    ///
    /// # Errors
    /// The first calculator error; later calculators are not updated.
    pub fn update_all(&mut self) -> BridgeResult<Vec<UpdateOutcome>> {
        self.calculators.iter_mut().map(|c| c.update()).collect()
    }
}
