use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalStage, ApprovalState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "stage", rename_all = "snake_case")]
pub enum ApprovalEvent {
    Grant(ApprovalStage),
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ApprovalState,
    pub to: ApprovalState,
    pub event: ApprovalEvent,
}
