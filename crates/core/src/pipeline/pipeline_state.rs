use serde::Serialize;
use thiserror::Error;

/// Why a run stopped. None of these is a failure of the run itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    NormalEndOfStream,
    UserCancelled,
    SourceReadFailure,
}

/// Lifecycle of a pipeline run.
///
/// `Running -> Cancelling -> Terminated`. `Terminated` is final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    /// Stop requested; resources are being released.
    Cancelling(TerminationReason),
    Terminated(TerminationReason),
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("illegal pipeline transition from {from:?} to {to}")]
pub struct InvalidTransition {
    pub from: PipelineState,
    pub to: &'static str,
}

impl PipelineState {
    /// Requests a stop. Repeated requests keep the first reason.
    pub fn cancel(self, reason: TerminationReason) -> Result<PipelineState, InvalidTransition> {
        match self {
            PipelineState::Running => Ok(PipelineState::Cancelling(reason)),
            PipelineState::Cancelling(first) => Ok(PipelineState::Cancelling(first)),
            PipelineState::Terminated(_) => Err(InvalidTransition {
                from: self,
                to: "Cancelling",
            }),
        }
    }

    /// Marks resource release as complete.
    pub fn terminate(self) -> Result<PipelineState, InvalidTransition> {
        match self {
            PipelineState::Cancelling(reason) => Ok(PipelineState::Terminated(reason)),
            _ => Err(InvalidTransition {
                from: self,
                to: "Terminated",
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Running)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, PipelineState::Terminated(_))
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        match self {
            PipelineState::Running => None,
            PipelineState::Cancelling(r) | PipelineState::Terminated(r) => Some(*r),
        }
    }
}
