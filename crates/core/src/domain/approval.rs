use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::flows::{ApprovalEvent, ApprovalFlow, FlowTransitionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    Technical,
    Sales,
    Final,
}

impl ApprovalStage {
    pub const ORDERED: [ApprovalStage; 3] = [Self::Technical, Self::Sales, Self::Final];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Sales => "sales",
            Self::Final => "final",
        }
    }

    pub fn previous(&self) -> Option<ApprovalStage> {
        match self {
            Self::Technical => None,
            Self::Sales => Some(Self::Technical),
            Self::Final => Some(Self::Sales),
        }
    }

    /// State the quotation lands in once this stage is granted.
    pub fn granted_state(&self) -> ApprovalState {
        match self {
            Self::Technical => ApprovalState::TechnicallyApproved,
            Self::Sales => ApprovalState::SalesApproved,
            Self::Final => ApprovalState::FinallyApproved,
        }
    }
}

impl std::str::FromStr for ApprovalStage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "technical" => Ok(Self::Technical),
            "sales" => Ok(Self::Sales),
            "final" => Ok(Self::Final),
            other => {
                Err(format!("unsupported approval stage `{other}` (expected technical|sales|final)"))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    #[default]
    Draft,
    TechnicallyApproved,
    SalesApproved,
    FinallyApproved,
    Rejected,
}

impl ApprovalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::TechnicallyApproved => "technically_approved",
            Self::SalesApproved => "sales_approved",
            Self::FinallyApproved => "finally_approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "technically_approved" => Some(Self::TechnicallyApproved),
            "sales_approved" => Some(Self::SalesApproved),
            "finally_approved" => Some(Self::FinallyApproved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinallyApproved | Self::Rejected)
    }

    /// Pricing is only editable before anyone has signed off.
    pub fn is_frozen(&self) -> bool {
        !matches!(self, Self::Draft)
    }

    pub fn has_granted(&self, stage: ApprovalStage) -> bool {
        let granted = match self {
            Self::Draft | Self::Rejected => 0,
            Self::TechnicallyApproved => 1,
            Self::SalesApproved => 2,
            Self::FinallyApproved => 3,
        };
        let required = match stage {
            ApprovalStage::Technical => 1,
            ApprovalStage::Sales => 2,
            ApprovalStage::Final => 3,
        };
        granted >= required
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub stage: ApprovalStage,
    pub approver_id: String,
    pub approved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub rejected_by: String,
    pub rejected_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Current approval state plus the append-only log that produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApprovalTrail {
    state: ApprovalState,
    approvals: Vec<ApprovalRecord>,
    rejection: Option<RejectionRecord>,
}

impl ApprovalTrail {
    /// Rebuilds a trail from stored records by running them through the flow again, so a
    /// stored log that skips a stage or repeats one is refused.
    pub fn replay(
        mut approvals: Vec<ApprovalRecord>,
        rejection: Option<RejectionRecord>,
    ) -> Result<Self, FlowTransitionError> {
        approvals.sort_by_key(|record| record.stage);

        let flow = ApprovalFlow;
        let mut state = flow.initial_state();
        for record in &approvals {
            state = flow.apply(&state, &ApprovalEvent::Grant(record.stage))?.to;
        }
        if rejection.is_some() {
            state = flow.apply(&state, &ApprovalEvent::Reject)?.to;
        }

        Ok(Self { state, approvals, rejection })
    }

    pub fn state(&self) -> ApprovalState {
        self.state
    }

    pub fn approvals(&self) -> &[ApprovalRecord] {
        &self.approvals
    }

    pub fn rejection(&self) -> Option<&RejectionRecord> {
        self.rejection.as_ref()
    }

    pub fn record_for(&self, stage: ApprovalStage) -> Option<&ApprovalRecord> {
        self.approvals.iter().find(|record| record.stage == stage)
    }

    pub fn grant(
        &mut self,
        stage: ApprovalStage,
        approver_id: impl Into<String>,
        approved_at: DateTime<Utc>,
    ) -> Result<ApprovalRecord, DomainError> {
        let approver_id = required_identity("approver_id", approver_id.into())?;
        let outcome = ApprovalFlow.apply(&self.state, &ApprovalEvent::Grant(stage))?;

        let record = ApprovalRecord { stage, approver_id, approved_at };
        self.state = outcome.to;
        self.approvals.push(record.clone());
        Ok(record)
    }

    pub fn reject(
        &mut self,
        rejected_by: impl Into<String>,
        reason: Option<String>,
        rejected_at: DateTime<Utc>,
    ) -> Result<&RejectionRecord, DomainError> {
        let rejected_by = required_identity("approver_id", rejected_by.into())?;
        let outcome = ApprovalFlow.apply(&self.state, &ApprovalEvent::Reject)?;

        self.state = outcome.to;
        Ok(self.rejection.insert(RejectionRecord { rejected_by, rejected_at, reason }))
    }
}

fn required_identity(field: &'static str, identity: String) -> Result<String, DomainError> {
    if identity.trim().is_empty() {
        return Err(DomainError::validation(field, "an identified approver is required"));
    }
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{ApprovalRecord, ApprovalStage, ApprovalState, ApprovalTrail, RejectionRecord};
    use crate::errors::DomainError;
    use crate::flows::FlowTransitionError;

    #[test]
    fn stages_grant_in_order_and_log_each_approver() {
        let mut trail = ApprovalTrail::default();
        let now = Utc::now();

        trail.grant(ApprovalStage::Technical, "tech.lead", now).expect("technical");
        trail.grant(ApprovalStage::Sales, "sales.manager", now).expect("sales");
        trail.grant(ApprovalStage::Final, "director", now).expect("final");

        assert_eq!(trail.state(), ApprovalState::FinallyApproved);
        assert_eq!(trail.approvals().len(), 3);
        assert_eq!(
            trail.record_for(ApprovalStage::Sales).map(|record| record.approver_id.as_str()),
            Some("sales.manager")
        );
    }

    #[test]
    fn regranting_a_stage_keeps_the_original_record() {
        let mut trail = ApprovalTrail::default();
        let first = Utc::now();
        trail.grant(ApprovalStage::Technical, "tech.lead", first).expect("technical");

        let error = trail
            .grant(ApprovalStage::Technical, "someone.else", first + Duration::hours(1))
            .expect_err("second technical approval must fail");

        assert_eq!(
            error,
            DomainError::InvalidTransition(FlowTransitionError::StageAlreadyGranted {
                stage: ApprovalStage::Technical,
            })
        );
        let record = trail.record_for(ApprovalStage::Technical).expect("record kept");
        assert_eq!(record.approver_id, "tech.lead");
        assert_eq!(record.approved_at, first);
        assert_eq!(trail.approvals().len(), 1);
    }

    #[test]
    fn blank_approver_is_refused_without_changing_state() {
        let mut trail = ApprovalTrail::default();
        let error = trail.grant(ApprovalStage::Technical, "  ", Utc::now()).expect_err("blank");

        assert!(matches!(error, DomainError::Validation { field: "approver_id", .. }));
        assert_eq!(trail.state(), ApprovalState::Draft);
        assert!(trail.approvals().is_empty());

        let error = trail.reject("", None, Utc::now()).expect_err("blank rejecter");
        assert!(matches!(error, DomainError::Validation { field: "approver_id", .. }));
        assert!(trail.rejection().is_none());
    }

    #[test]
    fn replay_rebuilds_state_from_unordered_records() {
        let now = Utc::now();
        let trail = ApprovalTrail::replay(
            vec![
                ApprovalRecord {
                    stage: ApprovalStage::Sales,
                    approver_id: "sales.manager".to_owned(),
                    approved_at: now,
                },
                ApprovalRecord {
                    stage: ApprovalStage::Technical,
                    approver_id: "tech.lead".to_owned(),
                    approved_at: now,
                },
            ],
            Some(RejectionRecord {
                rejected_by: "director".to_owned(),
                rejected_at: now,
                reason: Some("budget cut".to_owned()),
            }),
        )
        .expect("replay");

        assert_eq!(trail.state(), ApprovalState::Rejected);
        assert_eq!(trail.approvals()[0].stage, ApprovalStage::Technical);
    }

    #[test]
    fn replay_refuses_a_log_with_a_gap() {
        let error = ApprovalTrail::replay(
            vec![ApprovalRecord {
                stage: ApprovalStage::Final,
                approver_id: "director".to_owned(),
                approved_at: Utc::now(),
            }],
            None,
        )
        .expect_err("final without sales must fail");

        assert!(matches!(error, FlowTransitionError::StageOutOfOrder { .. }));
    }

    #[test]
    fn stage_parsing_accepts_mixed_case() {
        assert_eq!("Technical".parse::<ApprovalStage>(), Ok(ApprovalStage::Technical));
        assert_eq!(" FINAL ".parse::<ApprovalStage>(), Ok(ApprovalStage::Final));
        assert!("legal".parse::<ApprovalStage>().is_err());
    }
}
