use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerRequestId(pub String);

impl CustomerRequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    InProgress,
    Quoted,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] =
        [Self::Pending, Self::InProgress, Self::Quoted, Self::Approved, Self::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Quoted => "quoted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

/// Quotation lifecycle events that move the owning request along.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotationMilestone {
    Created,
    Priced,
    FinallyApproved,
    /// The request only follows once no other quotation for it is still open.
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRequest {
    pub id: CustomerRequestId,
    pub request_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub company_name: Option<String>,
    pub project_description: String,
    pub quantity: u32,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerRequest {
    pub fn new(
        request_number: impl Into<String>,
        customer_name: impl Into<String>,
        customer_email: impl Into<String>,
        project_description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CustomerRequestId::generate(),
            request_number: request_number.into(),
            customer_name: customer_name.into(),
            customer_email: customer_email.into(),
            customer_phone: None,
            company_name: None,
            project_description: project_description.into(),
            quantity: 1,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.request_number.trim().is_empty() {
            return Err(DomainError::validation("request_number", "must not be blank"));
        }
        if self.customer_name.trim().is_empty() {
            return Err(DomainError::validation("customer_name", "must not be blank"));
        }
        let email = self.customer_email.trim();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(DomainError::validation("customer_email", "must be an email address"));
        }
        if self.project_description.trim().is_empty() {
            return Err(DomainError::validation("project_description", "must not be blank"));
        }
        if self.quantity == 0 {
            return Err(DomainError::validation("quantity", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self.status, next),
            (Pending, InProgress)
                | (InProgress, Quoted)
                | (Quoted, Approved)
                | (Quoted, Rejected)
                | (Quoted, InProgress)
                | (Approved, InProgress)
                | (Rejected, InProgress)
        )
    }

    pub fn transition_to(
        &mut self,
        next: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = now;
            return Ok(());
        }

        Err(DomainError::InvalidRequestTransition { from: self.status, to: next })
    }

    /// Status the request should move to after `milestone`, or `None` when it stays put.
    pub fn status_after(&self, milestone: QuotationMilestone) -> Option<RequestStatus> {
        use RequestStatus::*;
        let next = match (milestone, self.status) {
            (QuotationMilestone::Created, Pending | Approved | Rejected) => InProgress,
            (QuotationMilestone::Priced, InProgress) => Quoted,
            (QuotationMilestone::FinallyApproved, Quoted) => Approved,
            (QuotationMilestone::Rejected, Quoted) => Rejected,
            _ => return None,
        };
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{CustomerRequest, QuotationMilestone, RequestStatus};
    use crate::errors::DomainError;

    fn request(status: RequestStatus) -> CustomerRequest {
        let mut request = CustomerRequest::new(
            "REQ-2026-0001",
            "Ada Systems",
            "buyer@ada.example",
            "Sensor gateway rollout",
            Utc::now(),
        );
        request.status = status;
        request
    }

    #[test]
    fn follows_forward_lifecycle() {
        let mut request = request(RequestStatus::Pending);
        let now = Utc::now();
        request.transition_to(RequestStatus::InProgress, now).expect("pending -> in_progress");
        request.transition_to(RequestStatus::Quoted, now).expect("in_progress -> quoted");
        request.transition_to(RequestStatus::Approved, now).expect("quoted -> approved");
        assert_eq!(request.status, RequestStatus::Approved);
    }

    #[test]
    fn blocks_skipping_ahead() {
        let mut request = request(RequestStatus::Pending);
        let error =
            request.transition_to(RequestStatus::Approved, Utc::now()).expect_err("skip ahead");
        assert_eq!(
            error,
            DomainError::InvalidRequestTransition {
                from: RequestStatus::Pending,
                to: RequestStatus::Approved,
            }
        );
    }

    #[test]
    fn correction_flow_returns_to_in_progress() {
        for status in [RequestStatus::Quoted, RequestStatus::Approved, RequestStatus::Rejected] {
            let mut request = request(status);
            request.transition_to(RequestStatus::InProgress, Utc::now()).expect("correction");
        }
    }

    #[test]
    fn milestones_only_move_matching_statuses() {
        let in_progress = request(RequestStatus::InProgress);
        assert_eq!(
            in_progress.status_after(QuotationMilestone::Priced),
            Some(RequestStatus::Quoted)
        );
        assert_eq!(in_progress.status_after(QuotationMilestone::Created), None);

        let quoted = request(RequestStatus::Quoted);
        assert_eq!(
            quoted.status_after(QuotationMilestone::FinallyApproved),
            Some(RequestStatus::Approved)
        );
        assert_eq!(
            quoted.status_after(QuotationMilestone::Rejected),
            Some(RequestStatus::Rejected)
        );
        let approved = request(RequestStatus::Approved);
        assert_eq!(approved.status_after(QuotationMilestone::Rejected), None);
    }

    #[test]
    fn validation_names_the_offending_field() {
        let mut bad = request(RequestStatus::Pending);
        bad.customer_email = "not-an-email".to_owned();
        assert!(matches!(
            bad.validate(),
            Err(DomainError::Validation { field: "customer_email", .. })
        ));

        let mut zero = request(RequestStatus::Pending);
        zero.quantity = 0;
        assert!(matches!(zero.validate(), Err(DomainError::Validation { field: "quantity", .. })));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in RequestStatus::ALL {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("archived"), None);
    }
}
