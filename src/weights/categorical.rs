//! Editable adjustment matrices held by the engine.
//!
//! The matrix is read from the engine, multiplied by a display factor for
//! editing, and written back divided by the same factor. Write-back goes
//! through [`INTERMEDIATE_VAR`] so that the target may be an element nested
//! inside a list.

use std::sync::Arc;

use log::{debug, info};

use crate::config::{BridgeConfig, CategoricalSpec, NotifierConfig};
use crate::dictionary::DataDictionary;
use crate::engine::StatEngine;
use crate::error::{BridgeError, BridgeResult, ConstructionError, EngineError, ValidationError};
use crate::frame::{ColumnKind, DataFrame};
use crate::prefs::Preferences;
use crate::value::Value;

use super::entry::Variables;
use super::notify::{ChangeNotifier, ChangeStream, ParameterObserver};
use super::{ParameterSet, UpdateOutcome, WeightCalculator};

/// Engine variable used as the staging slot for matrix write-back.
pub const INTERMEDIATE_VAR: &str = ".catadj";

/// Column names of a batch specification table.
const SPEC_VARNAME: &str = "rMatrixVarname";
const SPEC_VARIABLE: &str = "rVariable";
const SPEC_FACTOR: &str = "displayAdjFactor";

/// An adjustment matrix edited at display scale.
pub struct CategoricalAdjustment {
    engine: Arc<dyn StatEngine>,
    spec: CategoricalSpec,
    description: String,
    /// Display-scaled cells.
    table: DataFrame,
    source: Source,
    notifier: ChangeNotifier,
}

/// What the engine held before display scaling.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Source {
    matrix: bool,
    kinds: Vec<ColumnKind>,
}

impl std::fmt::Debug for CategoricalAdjustment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoricalAdjustment")
            .field("spec", &self.spec)
            .field("description", &self.description)
            .field("table", &self.table)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

fn load_matrix(engine: &dyn StatEngine, spec: &CategoricalSpec) -> BridgeResult<(DataFrame, Source)> {
    let value = engine.evaluate(&spec.r_matrix_varname)?;
    let frame = DataFrame::from_value(&spec.r_matrix_varname, &value)?;
    let source = Source {
        matrix: matches!(value, Value::Matrix(_)),
        kinds: frame.column_kinds(),
    };
    Ok((frame.scale(spec.display_adj_factor), source))
}

impl CategoricalAdjustment {
    /// Load the matrix named by `spec` and scale it for display.
    ///
    /// # Errors
    /// - `Engine` if the matrix cannot be evaluated
    /// - `Construction` if it is not a matrix or data frame
    pub fn new(
        engine: Arc<dyn StatEngine>,
        spec: CategoricalSpec,
        dictionary: &DataDictionary,
    ) -> BridgeResult<Self> {
        Self::with_notifier(engine, spec, dictionary, NotifierConfig::default())
    }

    fn with_notifier(
        engine: Arc<dyn StatEngine>,
        spec: CategoricalSpec,
        dictionary: &DataDictionary,
        notifier: NotifierConfig,
    ) -> BridgeResult<Self> {
        if !spec.display_adj_factor.is_finite() || spec.display_adj_factor == 0.0 {
            return Err(ConstructionError::BadAdjustmentFactor {
                varname: spec.r_matrix_varname,
                factor: spec.display_adj_factor,
            }
            .into());
        }
        let (table, source) = load_matrix(engine.as_ref(), &spec)?;
        let description = dictionary.description(&spec.r_variable);
        info!(
            "{}: {}x{} adjustment matrix for {description}",
            spec.r_matrix_varname,
            table.nrows(),
            table.ncols()
        );
        Ok(Self {
            engine,
            spec,
            description,
            table,
            source,
            notifier: ChangeNotifier::new(notifier),
        })
    }

    /// Build one adjustment per row of a specification table with the
    /// columns `rMatrixVarname`, `rVariable` and `displayAdjFactor`.
    ///
    /// Every row is read before any matrix is loaded; a bad row fails the
    /// whole batch.
    pub fn from_spec_table(
        engine: &Arc<dyn StatEngine>,
        specs: &Value,
        dictionary: &DataDictionary,
    ) -> BridgeResult<Vec<Self>> {
        let Value::Frame(frame) = specs else {
            return Err(ConstructionError::NotTabular {
                class: specs.class().to_string(),
            }
            .into());
        };

        let rows = (0..frame.nrows())
            .map(|row| -> Result<CategoricalSpec, ConstructionError> {
                Ok(CategoricalSpec {
                    r_matrix_varname: frame.get_string(row, SPEC_VARNAME)?,
                    r_variable: frame.get_string(row, SPEC_VARIABLE)?,
                    display_adj_factor: frame.get_double(row, SPEC_FACTOR)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_specs(engine, &rows, dictionary, NotifierConfig::default())
    }

    /// Build the adjustments listed in `config`.
    ///
    /// # Errors
    /// The first adjustment that fails to build.
    pub fn from_config(
        engine: &Arc<dyn StatEngine>,
        config: &BridgeConfig,
        dictionary: &DataDictionary,
    ) -> BridgeResult<Vec<Self>> {
        Self::from_specs(engine, &config.categorical, dictionary, config.notifier)
    }

    fn from_specs(
        engine: &Arc<dyn StatEngine>,
        specs: &[CategoricalSpec],
        dictionary: &DataDictionary,
        notifier: NotifierConfig,
    ) -> BridgeResult<Vec<Self>> {
        specs
            .iter()
            .map(|spec| Self::with_notifier(Arc::clone(engine), spec.clone(), dictionary, notifier))
            .collect()
    }

    /// The specification this adjustment was built from.
    #[must_use]
    pub const fn spec(&self) -> &CategoricalSpec {
        &self.spec
    }

    /// Edit one display-scaled cell. Takes effect on the next write-back.
    ///
    /// # Errors
    /// `ValidationError` if the cell does not exist or the value does not
    /// fit the column.
    pub fn set_cell(&mut self, row: usize, column: &str, value: f64) -> Result<(), ValidationError> {
        self.table.set_cell(row, column, value)
    }

    /// Re-read the matrix from the engine, discarding edits.
    ///
    /// # Errors
    /// As for [`CategoricalAdjustment::new`].
    pub fn reload(&mut self) -> BridgeResult<()> {
        (self.table, self.source) = load_matrix(self.engine.as_ref(), &self.spec)?;
        debug!("{}: reloaded", self.spec.r_matrix_varname);
        Ok(())
    }

    /// Write the edited matrix back to the engine at its original scale.
    ///
    /// # Errors
    /// - `Validation` if an edited cell no longer fits its loaded column kind
    /// - `Engine` if either assignment fails
    pub fn assign_r_matrix(&self) -> BridgeResult<()> {
        let unscaled = self.table.scale(1.0 / self.spec.display_adj_factor);
        self.write_back(&unscaled)
    }

    /// The engine value for `frame` in the loaded shape and column kinds.
    fn restore(&self, frame: &DataFrame) -> BridgeResult<Value> {
        let typed = frame.with_kinds(&self.source.kinds)?;
        Ok(if self.source.matrix {
            Value::Matrix(typed.to_matrix()?)
        } else {
            Value::Frame(typed)
        })
    }

    fn write_back(&self, frame: &DataFrame) -> BridgeResult<()> {
        let target = &self.spec.r_matrix_varname;
        self.engine.assign(INTERMEDIATE_VAR, self.restore(frame)?)?;
        self.engine
            .assign_from(target, INTERMEDIATE_VAR)
            .map_err(|e| match e {
                e @ EngineError::Assignment { .. } => e,
                other => EngineError::Assignment {
                    name: target.clone(),
                    message: other.to_string(),
                },
            })?;
        self.engine.echo(&format!("Assigned adjustments to {target}"));
        info!("assigned adjustments to {target}");
        Ok(())
    }
}

impl ParameterSet for CategoricalAdjustment {
    fn name(&self) -> String {
        self.description.clone()
    }

    fn table(&self) -> DataFrame {
        self.table.clone()
    }

    /// Validation of matrix contents is left to the engine.
    fn update(&mut self) -> BridgeResult<UpdateOutcome> {
        let change = self.notifier.notify(&self.description);
        Ok(UpdateOutcome::Published(change))
    }

    /// Replace every cell with its column's missing value and write back.
    fn reset_defaults(&mut self) -> BridgeResult<()> {
        self.table.reset_to_missing();
        self.table = self.table.with_kinds(&self.source.kinds)?;
        debug!("{}: reset to missing", self.spec.r_matrix_varname);
        self.write_back(&self.table)
    }

    fn load_state(&mut self, _prefs: &dyn Preferences) -> BridgeResult<()> {
        Ok(())
    }

    fn save_state(&self, _prefs: &mut dyn Preferences) -> BridgeResult<()> {
        Ok(())
    }

    fn add_observer(&mut self, observer: Arc<dyn ParameterObserver>) -> bool {
        self.notifier.add_observer(observer)
    }

    fn subscribe(&mut self) -> ChangeStream {
        self.notifier.subscribe()
    }
}

impl WeightCalculator for CategoricalAdjustment {
    fn weight(&self, _vars: &Variables) -> BridgeResult<f64> {
        Err(BridgeError::not_implemented("weight"))
    }

    fn level_weight(&self, _vars: &Variables) -> BridgeResult<f64> {
        Err(BridgeError::not_implemented("level_weight"))
    }

    fn all_level_props(&self) -> BridgeResult<Vec<f64>> {
        Err(BridgeError::not_implemented("all_level_props"))
    }
}
