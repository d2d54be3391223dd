//! Command templates run at lifecycle transitions.

use serde::{Deserialize, Serialize};

/// Token in an iteration-end template replaced by the current iteration number.
pub const ITERATION_TOKEN: &str = "ITERATION_NBR";

/// The four optional engine commands, one per lifecycle transition.
///
/// Blank templates are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    /// Run after every iteration; may contain [`ITERATION_TOKEN`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_end: Option<String>,
    /// Run at the start of every run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_begin: Option<String>,
    /// Run when a run stops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_end: Option<String>,
    /// Run once the simulation has closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sim_end: Option<String>,
}

fn non_blank(template: Option<String>) -> Option<String> {
    template.filter(|t| !t.trim().is_empty())
}

impl CommandTemplates {
    /// No commands.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Command run after every iteration. May use `ITERATION_NBR`.
    #[must_use]
    pub fn with_iteration_end(mut self, cmd: impl Into<String>) -> Self {
        self.iteration_end = Some(cmd.into());
        self
    }

    /// Command run after the start-of-run snapshot.
    #[must_use]
    pub fn with_run_begin(mut self, cmd: impl Into<String>) -> Self {
        self.run_begin = Some(cmd.into());
        self
    }

    /// Command run when a run stops.
    #[must_use]
    pub fn with_run_end(mut self, cmd: impl Into<String>) -> Self {
        self.run_end = Some(cmd.into());
        self
    }

    /// Command run on the final close.
    #[must_use]
    pub fn with_sim_end(mut self, cmd: impl Into<String>) -> Self {
        self.sim_end = Some(cmd.into());
        self
    }

    /// Drop blank templates.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            iteration_end: non_blank(self.iteration_end),
            run_begin: non_blank(self.run_begin),
            run_end: non_blank(self.run_end),
            sim_end: non_blank(self.sim_end),
        }
    }
}

/// Replace every [`ITERATION_TOKEN`] in `template` with `iteration`.
#[must_use]
pub fn substitute_iteration(template: &str, iteration: u64) -> String {
    template.replace(ITERATION_TOKEN, &iteration.to_string())
}
