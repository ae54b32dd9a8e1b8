use thiserror::Error;

use crate::domain::approval::{ApprovalStage, ApprovalState};
use crate::flows::states::{ApprovalEvent, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot grant {stage:?} approval from {state:?}; {required:?} approval is required first")]
    StageOutOfOrder { state: ApprovalState, stage: ApprovalStage, required: Option<ApprovalStage> },
    #[error("{stage:?} approval was already granted")]
    StageAlreadyGranted { stage: ApprovalStage },
    #[error("quotation is in terminal state {state:?}; event {event:?} is not allowed")]
    TerminalState { state: ApprovalState, event: ApprovalEvent },
}

/// Technical, then sales, then final sign-off; any open quotation may be rejected.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalFlow;

impl ApprovalFlow {
    pub fn initial_state(&self) -> ApprovalState {
        ApprovalState::Draft
    }

    pub fn apply(
        &self,
        current: &ApprovalState,
        event: &ApprovalEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let to = match event {
            ApprovalEvent::Grant(stage) => {
                if current.has_granted(*stage) {
                    return Err(FlowTransitionError::StageAlreadyGranted { stage: *stage });
                }
                if current.is_terminal() {
                    return Err(FlowTransitionError::TerminalState {
                        state: *current,
                        event: *event,
                    });
                }

                let expected = match stage.previous() {
                    Some(previous) => previous.granted_state(),
                    None => self.initial_state(),
                };
                if *current != expected {
                    return Err(FlowTransitionError::StageOutOfOrder {
                        state: *current,
                        stage: *stage,
                        required: stage.previous(),
                    });
                }
                stage.granted_state()
            }
            ApprovalEvent::Reject => {
                if current.is_terminal() {
                    return Err(FlowTransitionError::TerminalState {
                        state: *current,
                        event: *event,
                    });
                }
                ApprovalState::Rejected
            }
        };

        Ok(TransitionOutcome { from: *current, to, event: *event })
    }
}
