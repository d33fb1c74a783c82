use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::LifecycleError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

impl ClaimId {
    pub fn generate() -> Self {
        Self(format!("clm-{}", Uuid::new_v4()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Reimbursed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Reimbursed => "reimbursed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "reimbursed" => Some(Self::Reimbursed),
            _ => None,
        }
    }

    /// No transition ever leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Reimbursed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReimbursementMode {
    BankTransfer,
    Cheque,
}

impl Default for ReimbursementMode {
    fn default() -> Self {
        Self::BankTransfer
    }
}

impl ReimbursementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankTransfer => "bank_transfer",
            Self::Cheque => "cheque",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bank_transfer" => Some(Self::BankTransfer),
            "cheque" => Some(Self::Cheque),
            _ => None,
        }
    }
}

/// One entry in the append-only status history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub entry_id: String,
    pub status: ClaimStatus,
    pub changed_by: String,
    pub comments: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl StatusChange {
    pub fn new(
        status: ClaimStatus,
        changed_by: impl Into<String>,
        comments: Option<String>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: format!("sh-{}", Uuid::new_v4()),
            status,
            changed_by: changed_by.into(),
            comments,
            changed_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub owner_id: String,
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub expense_date: NaiveDate,
    pub status: ClaimStatus,
    pub approver_id: Option<String>,
    pub finance_approver_id: Option<String>,
    pub rejection_reason: Option<String>,
    pub receipt_ref: Option<String>,
    pub reimbursement_mode: Option<ReimbursementMode>,
    pub submission_date: Option<DateTime<Utc>>,
    pub approval_date: Option<DateTime<Utc>>,
    pub reimbursement_date: Option<DateTime<Utc>>,
    pub status_history: Vec<StatusChange>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        use ClaimStatus::{Approved, Draft, Reimbursed, Rejected, Submitted, UnderReview};

        matches!(
            (self.status, next),
            (Draft, Submitted)
                | (Submitted, UnderReview)
                | (Submitted, Approved)
                | (UnderReview, Approved)
                | (UnderReview, Rejected)
                | (Approved, Reimbursed)
                | (Approved, Rejected)
        )
    }

    /// Apply a status transition and append exactly one history entry.
    ///
    /// `changed_by` is always the acting principal's id, never inferred
    /// from claim data.
    pub fn record_status(
        &mut self,
        next: ClaimStatus,
        changed_by: &str,
        comments: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if !self.can_transition_to(next) {
            return Err(LifecycleError::InvalidState {
                action: format!("transition to {}", next.as_str()),
                current: self.status,
            });
        }

        self.status_history.push(StatusChange::new(next, changed_by, comments, at));
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    pub fn recompute_total(&mut self) {
        self.total_amount = self.amount + self.tax_amount;
    }

    /// Invariant: once any history exists, the current status is the
    /// status of the last entry and timestamps never go backwards.
    pub fn history_is_consistent(&self) -> bool {
        let ordered = self
            .status_history
            .windows(2)
            .all(|pair| pair[0].changed_at <= pair[1].changed_at);

        match self.status_history.last() {
            Some(last) => ordered && last.status == self.status,
            None => self.status == ClaimStatus::Draft,
        }
    }
}
