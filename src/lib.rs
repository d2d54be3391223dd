//! # simbridge - simulation to statistics engine bridge
//!
//! simbridge connects an agent-based microsimulation to an external
//! statistical engine. It snapshots the simulated population into the
//! engine at lifecycle transitions, runs user command templates there, and
//! lets users reweight factor levels or edit adjustment matrices that feed
//! back into the simulation.
//!
//! ## Core Concepts
//!
//! - **StatEngine**: the external engine's variable namespace and evaluator
//! - **LifecycleBridge**: runs commands at run start, iteration end, run stop and close
//! - **SingleVarWeights**: user-editable weights per level of one variable
//! - **CategoricalAdjustment**: an engine matrix edited at display scale
//! - **ChangeNotifier**: observers and streams told about published edits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use simbridge::{CommandTemplates, InMemoryEngine, LifecycleBridge, SingleVarWeights};
//!
//! let engine = Arc::new(InMemoryEngine::new());
//! let mut bridge = LifecycleBridge::new(
//!     engine.clone(),
//!     CommandTemplates::new().with_run_end("summary(simdata1)"),
//! );
//! bridge.on_run_start(&host)?;
//!
//! let mut weights = SingleVarWeights::builder("people$sex", "sex").build(engine.as_ref())?;
//! weights.set_numerator("F", 0.6)?;
//! weights.set_numerator("M", 0.4)?;
//! weights.update()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data exchanged with the engine
pub mod error;
pub mod frame;
pub mod value;

// Engine interface and lifecycle
pub mod engine;
pub mod lifecycle;

// Weighting strategies and their collaborators
pub mod config;
pub mod dictionary;
pub mod display;
pub mod prefs;
pub mod weights;

pub use config::{BridgeConfig, CategoricalSpec, NotifierConfig, WeightConfig};
pub use dictionary::DataDictionary;
pub use display::{LogMessageSink, MessageSink, RecordingMessageSink};
pub use engine::{evaluate_frame, InMemoryEngine, StatEngine};
pub use error::{
    BridgeError, BridgeResult, ConstructionError, EngineError, LookupError, ValidationError,
};
pub use frame::{missing, Cell, ColumnData, ColumnKind, DataFrame};
pub use lifecycle::{
    CloseAction, ClosePhase, CommandTemplates, LifecycleBridge, LifecycleEvent, LifecycleState,
    SimulationHost,
};
pub use prefs::{MemoryPreferences, Preferences};
pub use value::{Matrix, Value};
pub use weights::{
    CategoricalAdjustment, ChangeNotifier, ChangeStream, CombinedWeights, LevelValue,
    ParameterChange, ParameterObserver, ParameterSet, SingleVarWeights, UpdateOutcome, Variables,
    WeightCalculator, WeightEntry, WeightSet,
};
