//! Per-session lifecycle state.

use serde::{Deserialize, Serialize};

/// Two-phase shutdown. The host delivers the closing event twice per
/// session; only deliveries after the first finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClosePhase {
    /// No close seen yet.
    #[default]
    AwaitingFirstClose,
    /// The next close finalizes the session.
    ReadyForFinal,
}

/// What a closing delivery should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// First delivery: arm only.
    Arm,
    /// Run the simulation-end command and present the prompt.
    Finalize,
}

impl ClosePhase {
    /// Advance on a closing delivery.
    pub fn on_close(&mut self) -> CloseAction {
        match self {
            Self::AwaitingFirstClose => {
                *self = Self::ReadyForFinal;
                CloseAction::Arm
            }
            Self::ReadyForFinal => CloseAction::Finalize,
        }
    }
}

/// Run counter and close phase, owned by one bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LifecycleState {
    run_number: u32,
    close_phase: ClosePhase,
}

impl LifecycleState {
    /// Before the first run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs started so far; 0 before the first run.
    #[must_use]
    pub const fn run_number(&self) -> u32 {
        self.run_number
    }

    /// Current close phase.
    #[must_use]
    pub const fn close_phase(&self) -> ClosePhase {
        self.close_phase
    }

    /// Count a new run and return its number.
    pub(crate) fn begin_run(&mut self) -> u32 {
        self.run_number = self.run_number.saturating_add(1);
        self.run_number
    }

    pub(crate) fn close(&mut self) -> CloseAction {
        self.close_phase.on_close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_close_arms_then_finalizes() {
        let mut phase = ClosePhase::default();
        assert_eq!(phase.on_close(), CloseAction::Arm);
        assert_eq!(phase, ClosePhase::ReadyForFinal);
        assert_eq!(phase.on_close(), CloseAction::Finalize);
        assert_eq!(phase, ClosePhase::ReadyForFinal);
    }

    #[test]
    fn run_number_only_grows() {
        let mut state = LifecycleState::new();
        assert_eq!(state.run_number(), 0);
        assert_eq!(state.begin_run(), 1);
        assert_eq!(state.begin_run(), 2);
        state.close();
        assert_eq!(state.run_number(), 2);
    }
}
