//! Lifecycle bridge between the simulation and the statistical engine.
//!
//! The host delivers events strictly in order: run start, any number of
//! iteration ends, run stop, and finally two closing deliveries. At each
//! transition the bridge snapshots the population into the engine and runs
//! the configured command for that transition.
//!
//! | Event | Snapshot | Command |
//! |---|---|---|
//! | run start | always | `run_begin` |
//! | iteration end | only with a template | `iteration_end`, iteration substituted |
//! | run stop | always | `run_end` |
//! | closing (1st) | no | none |
//! | closing (2nd+) | no | `sim_end`, then the engine prompt |
//!
//! Any engine failure is returned as a fatal [`BridgeError::Engine`]; the
//! host is expected to abort the run.

/// Command templates and iteration substitution.
pub mod commands;
/// Run counter and two-phase close.
pub mod state;

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::engine::StatEngine;
use crate::error::{BridgeError, BridgeResult, EngineError};
use crate::frame::DataFrame;
use crate::value::Value;

pub use commands::{substitute_iteration, CommandTemplates, ITERATION_TOKEN};
pub use state::{CloseAction, ClosePhase, LifecycleState};

/// Default base name of the snapshot variable.
pub const DEFAULT_SNAPSHOT_NAME: &str = "simdata";

/// Lifecycle events delivered by the host simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A run began; the population is snapshotted.
    RunStart,
    /// One iteration of the current run finished.
    IterationEnd,
    /// The current run ended.
    RunStop,
    /// The host is shutting down; delivered twice per session.
    Closing,
}

/// What the bridge needs from the running simulation.
pub trait SimulationHost {
    /// Current iteration number.
    fn iteration(&self) -> u64;

    /// Render the current population as a table.
    fn snapshot(&self) -> BridgeResult<DataFrame>;
}

/// Synchronizes simulation lifecycle events with engine commands.
pub struct LifecycleBridge {
    engine: Arc<dyn StatEngine>,
    commands: CommandTemplates,
    snapshot_name: String,
    state: LifecycleState,
}

impl std::fmt::Debug for LifecycleBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleBridge")
            .field("commands", &self.commands)
            .field("snapshot_name", &self.snapshot_name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl LifecycleBridge {
    /// A bridge with the given commands, in its initial state.
    #[must_use]
    pub fn new(engine: Arc<dyn StatEngine>, commands: CommandTemplates) -> Self {
        Self {
            engine,
            commands: commands.normalized(),
            snapshot_name: DEFAULT_SNAPSHOT_NAME.to_string(),
            state: LifecycleState::new(),
        }
    }

    /// A bridge configured from `config`.
    #[must_use]
    pub fn from_config(engine: Arc<dyn StatEngine>, config: &BridgeConfig) -> Self {
        Self::new(engine, config.commands.clone()).with_snapshot_name(&config.snapshot_name)
    }

    /// Override the base name of the snapshot variable.
    #[must_use]
    pub fn with_snapshot_name(mut self, name: &str) -> Self {
        self.snapshot_name = name.to_string();
        self
    }

    /// Run counter and close phase.
    #[must_use]
    pub const fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// Number of the current or last run, 0 before the first.
    #[must_use]
    pub const fn run_number(&self) -> u32 {
        self.state.run_number()
    }

    /// Templates this bridge runs.
    #[must_use]
    pub const fn commands(&self) -> &CommandTemplates {
        &self.commands
    }

    /// Engine variable holding the snapshot of `run`.
    #[must_use]
    pub fn snapshot_var(&self, run: u32) -> String {
        format!("{}{run}", self.snapshot_name)
    }

    /// Route `event` to its handler.
    pub fn dispatch(&mut self, event: LifecycleEvent, host: &dyn SimulationHost) -> BridgeResult<()> {
        match event {
            LifecycleEvent::RunStart => self.on_run_start(host),
            LifecycleEvent::IterationEnd => self.on_iteration_end(host),
            LifecycleEvent::RunStop => self.on_run_stop(host),
            LifecycleEvent::Closing => self.on_closing(),
        }
    }

    /// Count the run, snapshot, and run the run-begin command.
    pub fn on_run_start(&mut self, host: &dyn SimulationHost) -> BridgeResult<()> {
        let run = self.state.begin_run();
        info!("run {run} started");

        if run == 1 {
            self.engine.echo("");
        }

        self.snapshot(host)?;

        if let Some(cmd) = &self.commands.run_begin {
            self.execute(cmd)?;
        }
        Ok(())
    }

    /// Snapshot and run the iteration-end command, if one is configured.
    pub fn on_iteration_end(&mut self, host: &dyn SimulationHost) -> BridgeResult<()> {
        let Some(template) = &self.commands.iteration_end else {
            return Ok(());
        };

        self.snapshot(host)?;
        let cmd = substitute_iteration(template, host.iteration());
        self.execute(&cmd)?;
        Ok(())
    }

    /// Snapshot and run the run-end command.
    pub fn on_run_stop(&mut self, host: &dyn SimulationHost) -> BridgeResult<()> {
        info!("run {} stopped", self.run_number());
        self.snapshot(host)?;

        if let Some(cmd) = &self.commands.run_end {
            self.execute(cmd)?;
        }
        Ok(())
    }

    /// Handle one closing delivery.
    pub fn on_closing(&mut self) -> BridgeResult<()> {
        match self.state.close() {
            CloseAction::Arm => {
                debug!("first close received");
            }
            CloseAction::Finalize => {
                info!("simulation closed after {} runs", self.run_number());
                if let Some(cmd) = &self.commands.sim_end {
                    self.execute(cmd)?;
                }
                self.engine.print_prompt();
            }
        }
        Ok(())
    }

    fn snapshot(&self, host: &dyn SimulationHost) -> BridgeResult<()> {
        let run = self.run_number();
        let started = Instant::now();

        let frame = host.snapshot().map_err(|e| match e {
            BridgeError::Engine(inner) => BridgeError::Engine(inner),
            other => BridgeError::Engine(EngineError::Snapshot {
                run,
                message: other.to_string(),
            }),
        })?;

        let name = self.snapshot_var(run);
        let rows = frame.nrows();
        self.engine.assign(&name, Value::Frame(frame))?;

        debug!(
            "assigned {rows} rows to {name} in {:.2?}",
            started.elapsed()
        );
        Ok(())
    }

    /// Evaluate `cmd`, echoing the command and its result to the console.
    fn execute(&self, cmd: &str) -> BridgeResult<Value> {
        let run = self.run_number();
        self.engine.set_run_number(run);
        self.engine.echo(&format!("> {cmd}"));
        info!("run {run}: {cmd}");

        match self.engine.evaluate(cmd) {
            Ok(value) => {
                self.engine.echo(&value.to_string());
                Ok(value)
            }
            Err(e) => {
                self.engine.echo(&format!("Error: {e}"));
                warn!("run {run}: command failed: {e}");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;

    use crate::engine::InMemoryEngine;
    use crate::frame::ColumnData;

    struct Host {
        iteration: Cell<u64>,
        fail: bool,
    }

    impl Host {
        fn new() -> Self {
            Self {
                iteration: Cell::new(0),
                fail: false,
            }
        }
    }

    impl SimulationHost for Host {
        fn iteration(&self) -> u64 {
            self.iteration.get()
        }

        fn snapshot(&self) -> BridgeResult<DataFrame> {
            if self.fail {
                return Err(BridgeError::not_implemented("snapshot"));
            }
            Ok(DataFrame::new("people")
                .with_column("age", ColumnData::Int(vec![3, 7]))?)
        }
    }

    fn bridge(commands: CommandTemplates) -> (Arc<InMemoryEngine>, LifecycleBridge) {
        let engine = Arc::new(InMemoryEngine::new());
        engine
            .define_function("f", |vars, args| {
                vars.insert("seen".to_string(), Value::from(args));
                Ok(Value::Null)
            })
            .unwrap();
        let bridge = LifecycleBridge::new(engine.clone(), commands);
        (engine, bridge)
    }

    #[test]
    fn run_start_increments_and_snapshots() {
        let (engine, mut bridge) = bridge(CommandTemplates::new());
        let host = Host::new();

        bridge.on_run_start(&host).unwrap();
        bridge.on_run_start(&host).unwrap();

        assert_eq!(bridge.run_number(), 2);
        assert!(engine.get("simdata1").unwrap().is_some_and(|v| v.is_frame()));
        assert!(engine.get("simdata2").unwrap().is_some());
        let blanks = engine.console().unwrap().iter().filter(|l| l.is_empty()).count();
        assert_eq!(blanks, 1);
    }

    #[test]
    fn iteration_end_without_template_skips_snapshot() {
        let (engine, mut bridge) = bridge(CommandTemplates::new());
        let host = Host::new();
        bridge.on_iteration_end(&host).unwrap();
        assert!(engine.get("simdata0").unwrap().is_none());
        assert!(engine.evaluated().unwrap().is_empty());
    }

    #[test]
    fn iteration_end_substitutes_iteration() {
        let (engine, mut bridge) =
            bridge(CommandTemplates::new().with_iteration_end("f(ITERATION_NBR)"));
        let host = Host::new();
        bridge.on_run_start(&host).unwrap();
        host.iteration.set(7);
        bridge.on_iteration_end(&host).unwrap();

        assert_eq!(engine.evaluated().unwrap(), vec!["f(7)".to_string()]);
        assert_eq!(engine.get("seen").unwrap(), Some(Value::from("7")));
        assert_eq!(engine.run_number().unwrap(), Some(1));
        assert!(engine.console().unwrap().contains(&"> f(7)".to_string()));
    }

    #[test]
    fn closing_fires_on_second_delivery_only() {
        let (engine, mut bridge) = bridge(CommandTemplates::new().with_sim_end("f(end)"));

        bridge.on_closing().unwrap();
        assert!(engine.evaluated().unwrap().is_empty());
        assert_eq!(engine.prompts().unwrap(), 0);
        assert_eq!(bridge.state().close_phase(), ClosePhase::ReadyForFinal);

        bridge.on_closing().unwrap();
        assert_eq!(engine.evaluated().unwrap(), vec!["f(end)".to_string()]);
        assert_eq!(engine.prompts().unwrap(), 1);
    }

    #[test]
    fn snapshot_failure_is_fatal() {
        let (_engine, mut bridge) = bridge(CommandTemplates::new());
        let host = Host {
            iteration: Cell::new(0),
            fail: true,
        };
        let err = bridge.on_run_start(&host).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, BridgeError::Engine(EngineError::Snapshot { run: 1, .. })));
    }

    #[test]
    fn failing_command_is_fatal_and_echoed() {
        let (engine, mut bridge) = bridge(CommandTemplates::new().with_run_end("nope()"));
        let host = Host::new();
        bridge.on_run_start(&host).unwrap();
        let err = bridge.on_run_stop(&host).unwrap_err();
        assert!(err.is_fatal());
        assert!(engine
            .console()
            .unwrap()
            .iter()
            .any(|l| l.starts_with("Error:")));
    }
}
