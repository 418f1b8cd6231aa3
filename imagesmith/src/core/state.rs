//! Controller state machine transitions.
//!
//! `Init -> Building -> Evaluating -> (DoneSuccess | DoneExhausted)`, with
//! `Refining` looping back to `Building`. The controller drives I/O; this
//! module only decides where to go next.

use std::fmt;

/// Where the controller is within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Init,
    Building { epoch: u32 },
    Evaluating { epoch: u32 },
    Refining { epoch: u32 },
    DoneSuccess { epochs: u32 },
    DoneExhausted { epochs: u32 },
}

impl ControllerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ControllerState::DoneSuccess { .. } | ControllerState::DoneExhausted { .. }
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Init => f.write_str("init"),
            ControllerState::Building { epoch } => write!(f, "building(epoch={epoch})"),
            ControllerState::Evaluating { epoch } => write!(f, "evaluating(epoch={epoch})"),
            ControllerState::Refining { epoch } => write!(f, "refining(epoch={epoch})"),
            ControllerState::DoneSuccess { epochs } => write!(f, "done_success(epochs={epochs})"),
            ControllerState::DoneExhausted { epochs } => {
                write!(f, "done_exhausted(epochs={epochs})")
            }
        }
    }
}

/// Decide the state after evaluating the attempt of `epoch`.
///
/// A successful attempt always terminates. A failing attempt refines unless
/// it used the last permitted epoch.
pub fn after_evaluation(epoch: u32, max_epochs: u32, succeeded: bool) -> ControllerState {
    let consumed = epoch + 1;
    if succeeded {
        return ControllerState::DoneSuccess { epochs: consumed };
    }
    if consumed >= max_epochs {
        return ControllerState::DoneExhausted { epochs: consumed };
    }
    ControllerState::Refining { epoch }
}

/// State after a refinement of `epoch` has been written.
pub fn after_refinement(epoch: u32) -> ControllerState {
    ControllerState::Building { epoch: epoch + 1 }
}
