//! Reweighting of a single categorical variable.
//!
//! The level proportions come from the engine's proportion table of the
//! variable. Each level starts with `numerator == denominator`; the user
//! edits numerators and [`ParameterSet::update`] publishes the edits once
//! they again sum to one. Weight lookups only ever see published state.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};

use crate::config::{BridgeConfig, NotifierConfig, WeightConfig};
use crate::dictionary::DataDictionary;
use crate::display::{LogMessageSink, MessageSink};
use crate::engine::StatEngine;
use crate::error::{BridgeResult, ConstructionError, LookupError, ValidationError};
use crate::frame::DataFrame;
use crate::prefs::Preferences;
use crate::value::Value;

use super::entry::{LevelKey, Variables, WeightEntry, WeightSet};
use super::notify::{ChangeNotifier, ChangeStream, ParameterObserver};
use super::{ParameterSet, UpdateOutcome, WeightCalculator};

/// Builder for [`SingleVarWeights`].
pub struct SingleVarWeightsBuilder {
    r_variable: String,
    variable_name: String,
    description: Option<String>,
    weights: WeightConfig,
    notifier: NotifierConfig,
    messages: Arc<dyn MessageSink>,
}

impl SingleVarWeightsBuilder {
    /// Description used in the set's name. Defaults to the variable name.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Take the description from `dictionary`.
    #[must_use]
    pub fn dictionary(self, dictionary: &DataDictionary) -> Self {
        let description = dictionary.description(&self.variable_name);
        self.description(description)
    }

    /// Tolerance settings for the sum check.
    #[must_use]
    pub fn weight_config(mut self, weights: WeightConfig) -> Self {
        self.weights = weights;
        self
    }

    /// Change stream sizing.
    #[must_use]
    pub fn notifier_config(mut self, notifier: NotifierConfig) -> Self {
        self.notifier = notifier;
        self
    }

    /// Apply the weight and notifier sections of `config`.
    #[must_use]
    pub fn config(self, config: &BridgeConfig) -> Self {
        self.weight_config(config.weights).notifier_config(config.notifier)
    }

    /// Where rejected updates are reported. Defaults to the log.
    #[must_use]
    pub fn messages(mut self, messages: Arc<dyn MessageSink>) -> Self {
        self.messages = messages;
        self
    }

    /// Query the engine and build the strategy.
    ///
    /// # Errors
    /// - `Engine` if the proportion query fails
    /// - `Construction` if the result is not a named numeric vector
    /// - `Validation` if the proportions do not sum to one
    pub fn build(self, engine: &dyn StatEngine) -> BridgeResult<SingleVarWeights> {
        let source_expr = proportion_query(&self.r_variable);
        let levels = load_levels(engine, &source_expr)?;
        check_total(&levels, &self.weights)?;

        let description = self
            .description
            .unwrap_or_else(|| self.variable_name.clone());
        info!(
            "{}: {} levels from {source_expr}",
            self.variable_name,
            levels.len()
        );

        Ok(SingleVarWeights {
            variable_name: self.variable_name,
            description,
            source_expr,
            edited: levels.clone(),
            published: levels,
            weights: self.weights,
            notifier: ChangeNotifier::new(self.notifier),
            messages: self.messages,
        })
    }
}

/// Per-level weights of one categorical variable.
pub struct SingleVarWeights {
    variable_name: String,
    description: String,
    source_expr: String,
    /// Working copy shown to the user.
    edited: WeightSet,
    /// Last validated state, used for lookups.
    published: WeightSet,
    weights: WeightConfig,
    notifier: ChangeNotifier,
    messages: Arc<dyn MessageSink>,
}

impl std::fmt::Debug for SingleVarWeights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleVarWeights")
            .field("variable_name", &self.variable_name)
            .field("source_expr", &self.source_expr)
            .field("edited", &self.edited)
            .field("published", &self.published)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

fn proportion_query(r_variable: &str) -> String {
    format!("prop.table(table({r_variable}))")
}

fn load_levels(engine: &dyn StatEngine, expr: &str) -> BridgeResult<WeightSet> {
    let value = engine.evaluate(expr)?;
    let Value::Numeric { values, names } = &value else {
        return Err(ConstructionError::NotNumericVector {
            expr: expr.to_string(),
            actual: value.class().to_string(),
        }
        .into());
    };
    let names = names.as_ref().ok_or_else(|| ConstructionError::MissingNames {
        expr: expr.to_string(),
    })?;
    Ok(WeightSet::from_levels(names, values)?)
}

fn check_total(levels: &WeightSet, weights: &WeightConfig) -> Result<(), ValidationError> {
    let total = levels.total();
    let tolerance = weights.tolerance_for(levels.len());
    if !total.is_finite() || (total - 1.0).abs() > tolerance {
        return Err(ValidationError::WeightSumMismatch { total, tolerance });
    }
    Ok(())
}

impl SingleVarWeights {
    /// Start building weights for the engine variable `r_variable`, looked
    /// up in entity variables under `variable_name`.
    #[must_use]
    pub fn builder(r_variable: &str, variable_name: &str) -> SingleVarWeightsBuilder {
        SingleVarWeightsBuilder {
            r_variable: r_variable.to_string(),
            variable_name: variable_name.to_string(),
            description: None,
            weights: WeightConfig::default(),
            notifier: NotifierConfig::default(),
            messages: Arc::new(LogMessageSink),
        }
    }

    /// Variable looked up in entity values.
    #[must_use]
    pub fn variable_name(&self) -> &str {
        &self.variable_name
    }

    /// The engine query the levels were read from.
    #[must_use]
    pub fn source_expr(&self) -> &str {
        &self.source_expr
    }

    /// Levels including unpublished edits.
    #[must_use]
    pub const fn edited(&self) -> &WeightSet {
        &self.edited
    }

    /// Levels as last published.
    #[must_use]
    pub const fn published(&self) -> &WeightSet {
        &self.published
    }

    /// Observers and streams of this set.
    #[must_use]
    pub const fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Check that the edited numerators sum to one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_total(&self.edited, &self.weights)
    }

    /// Edit the numerator of `level`. Takes effect on the next update.
    pub fn set_numerator(&mut self, level: &str, numerator: f64) -> BridgeResult<()> {
        if !numerator.is_finite() {
            return Err(ValidationError::NonFinite {
                field: level.to_string(),
                value: numerator,
            }
            .into());
        }
        let entry = self
            .edited
            .get_mut(&LevelKey::from_label(level))
            .ok_or_else(|| LookupError::UnknownLevel {
                variable: self.variable_name.clone(),
                value: level.to_string(),
            })?;
        entry.set_numerator(numerator);
        Ok(())
    }

    /// Re-read the proportion table and publish it, discarding edits.
    ///
    /// On failure the current state is kept.
    pub fn reload(&mut self, engine: &dyn StatEngine) -> BridgeResult<UpdateOutcome> {
        let levels = load_levels(engine, &self.source_expr)?;
        check_total(&levels, &self.weights)?;
        self.edited = levels;
        self.update()
    }

    fn state_key(&self) -> String {
        format!("weights.{}", self.variable_name)
    }

    fn lookup(&self, vars: &Variables) -> BridgeResult<&WeightEntry> {
        let value = vars
            .get(&self.variable_name)
            .ok_or_else(|| LookupError::MissingVariable {
                variable: self.variable_name.clone(),
            })?;
        let entry = self
            .published
            .get(&LevelKey::from_value(value))
            .ok_or_else(|| LookupError::UnknownLevel {
                variable: self.variable_name.clone(),
                value: value.to_string(),
            })?;
        Ok(entry)
    }
}

impl ParameterSet for SingleVarWeights {
    fn name(&self) -> String {
        format!("Weightings - {}", self.description)
    }

    fn table(&self) -> DataFrame {
        self.edited.to_frame(&self.variable_name)
    }

    fn update(&mut self) -> BridgeResult<UpdateOutcome> {
        if let Err(e) = self.validate() {
            self.messages.show_message(&e.to_string());
            debug!("{}: update rejected", self.variable_name);
            return Ok(UpdateOutcome::Rejected(e));
        }
        self.published = self.edited.clone();
        let name = self.name();
        let change = self.notifier.notify(&name);
        Ok(UpdateOutcome::Published(change))
    }

    fn reset_defaults(&mut self) -> BridgeResult<()> {
        self.edited.reset_all();
        self.update()?;
        Ok(())
    }

    fn load_state(&mut self, prefs: &dyn Preferences) -> BridgeResult<()> {
        let Some(json) = prefs.get(&self.state_key()) else {
            return Ok(());
        };
        let saved: BTreeMap<String, f64> = serde_json::from_str(&json)?;

        let mut restored = self.edited.clone();
        for (level, numerator) in saved {
            if let Some(entry) = restored.get_mut(&LevelKey::from_label(&level)) {
                entry.set_numerator(numerator);
            } else {
                debug!("{}: ignoring saved level {level}", self.variable_name);
            }
        }

        let previous = std::mem::replace(&mut self.edited, restored);
        if let UpdateOutcome::Rejected(e) = self.update()? {
            self.edited = previous;
            return Err(e.into());
        }
        Ok(())
    }

    fn save_state(&self, prefs: &mut dyn Preferences) -> BridgeResult<()> {
        let numerators: BTreeMap<&str, f64> = self
            .edited
            .iter()
            .map(|e| (e.level(), e.numerator()))
            .collect();
        prefs.put(&self.state_key(), serde_json::to_string(&numerators)?);
        Ok(())
    }

    fn add_observer(&mut self, observer: Arc<dyn ParameterObserver>) -> bool {
        self.notifier.add_observer(observer)
    }

    fn subscribe(&mut self) -> ChangeStream {
        self.notifier.subscribe()
    }
}

impl WeightCalculator for SingleVarWeights {
    fn weight(&self, vars: &Variables) -> BridgeResult<f64> {
        Ok(self.lookup(vars)?.fraction())
    }

    fn level_weight(&self, vars: &Variables) -> BridgeResult<f64> {
        Ok(self.lookup(vars)?.numerator())
    }

    fn all_level_props(&self) -> BridgeResult<Vec<f64>> {
        Ok(self.published.iter().map(WeightEntry::numerator).collect())
    }
}
