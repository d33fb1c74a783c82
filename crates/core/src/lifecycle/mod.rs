pub mod authorize;
pub mod stores;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::category::{normalize_category, CategoryPolicy};
use crate::domain::claim::{Claim, ClaimId, ClaimStatus, ReimbursementMode, StatusChange};
use crate::domain::principal::Principal;
use crate::errors::LifecycleError;

pub use authorize::{authorize_review, may_view, require_owner, ReviewPath};
pub use stores::{
    ClaimQuery, ClaimStore, InMemoryClaimStore, InMemoryManagerDirectory, InMemoryPolicyLookup,
    InMemoryReceiptBlobStore, ManagerDirectory, PolicyLookup, ReceiptBlobStore, StoreError,
};

/// Claims above this amount go to human review regardless of category
/// policy. The boundary is exclusive: exactly 1000.00 stays below it.
pub fn review_threshold() -> Decimal {
    Decimal::ONE_THOUSAND
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewClaim {
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub currency: Option<String>,
    pub category: String,
    pub description: String,
    pub expense_date: NaiveDate,
    pub receipt_ref: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClaimPatch {
    pub amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub expense_date: Option<NaiveDate>,
    pub receipt_ref: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReviewInput {
    pub comments: Option<String>,
    pub reimbursement_mode: Option<ReimbursementMode>,
}

/// Owns the claim entity and every mutation of it. Each operation reads
/// the current claim, computes the next state synchronously, and writes
/// it back as one version-guarded store update.
pub struct ClaimLifecycle {
    claims: Arc<dyn ClaimStore>,
    policies: Arc<dyn PolicyLookup>,
    directory: Arc<dyn ManagerDirectory>,
    receipts: Arc<dyn ReceiptBlobStore>,
    audit: Arc<dyn AuditSink>,
}

impl ClaimLifecycle {
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        policies: Arc<dyn PolicyLookup>,
        directory: Arc<dyn ManagerDirectory>,
        receipts: Arc<dyn ReceiptBlobStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { claims, policies, directory, receipts, audit }
    }

    pub async fn create(
        &self,
        principal: &Principal,
        input: NewClaim,
    ) -> Result<Claim, LifecycleError> {
        validate_amounts(input.amount, input.tax_amount)?;
        let description = input.description.trim().to_string();
        if description.is_empty() {
            return Err(LifecycleError::Validation("description must not be empty".to_string()));
        }
        let category = normalize_category(&input.category);
        self.active_policy(&category).await?;

        let now = Utc::now();
        let mut claim = Claim {
            id: ClaimId::generate(),
            owner_id: principal.id.clone(),
            amount: input.amount,
            tax_amount: input.tax_amount,
            total_amount: Decimal::ZERO,
            currency: input.currency.unwrap_or_else(|| "USD".to_string()),
            category,
            description,
            expense_date: input.expense_date,
            status: ClaimStatus::Draft,
            approver_id: None,
            finance_approver_id: None,
            rejection_reason: None,
            receipt_ref: input.receipt_ref,
            reimbursement_mode: None,
            submission_date: None,
            approval_date: None,
            reimbursement_date: None,
            status_history: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        claim.recompute_total();

        self.claims.insert(claim.clone()).await.map_err(store_error)?;
        tracing::info!(
            event_name = "lifecycle.claim_created",
            claim_id = %claim.id.0,
            owner_id = %claim.owner_id,
            category = %claim.category,
            "claim created in draft"
        );
        self.emit(
            &claim,
            principal,
            "lifecycle.claim_created",
            AuditCategory::Lifecycle,
            AuditOutcome::Success,
            &[],
        );
        Ok(claim)
    }

    /// Submit a draft. Resolves the approver, appends the `submitted`
    /// entry, and either escalates to review or auto-approves, all in
    /// one persisted write.
    pub async fn submit(
        &self,
        principal: &Principal,
        claim_id: &ClaimId,
    ) -> Result<Claim, LifecycleError> {
        let mut claim = self.load(claim_id).await?;
        require_owner(principal, &claim, "submit")?;
        if claim.status != ClaimStatus::Draft {
            return Err(LifecycleError::InvalidState {
                action: "submit".to_string(),
                current: claim.status,
            });
        }

        let policy = self.active_policy(&claim.category).await?;
        if policy.requires_receipt && claim.receipt_ref.is_none() {
            return Err(LifecycleError::Validation(format!(
                "category `{}` requires a receipt before submission",
                claim.category
            )));
        }

        claim.approver_id = self.resolve_approver(principal).await?;
        if claim.approver_id.is_none() {
            tracing::warn!(
                event_name = "lifecycle.approver_unresolved",
                claim_id = %claim.id.0,
                department = %principal.department,
                "no manager found for submitter; claim will wait unassigned"
            );
        }

        let now = Utc::now();
        claim.submission_date = Some(now);
        claim.record_status(ClaimStatus::Submitted, &principal.id, None, now)?;

        let needs_review = claim.amount > review_threshold() || policy.requires_approval;
        let final_status = if needs_review {
            claim.record_status(ClaimStatus::UnderReview, &principal.id, None, now)?;
            ClaimStatus::UnderReview
        } else {
            claim.approval_date = Some(now);
            claim.record_status(
                ClaimStatus::Approved,
                &principal.id,
                Some("auto-approved below review threshold".to_string()),
                now,
            )?;
            ClaimStatus::Approved
        };

        self.persist(&mut claim).await?;
        tracing::info!(
            event_name = "lifecycle.claim_submitted",
            claim_id = %claim.id.0,
            status = final_status.as_str(),
            approver_id = claim.approver_id.as_deref().unwrap_or("unassigned"),
            "claim submitted"
        );
        self.emit(
            &claim,
            principal,
            "lifecycle.claim_submitted",
            AuditCategory::Lifecycle,
            AuditOutcome::Success,
            &[("to", final_status.as_str())],
        );
        Ok(claim)
    }

    /// Approve a claim. Managers and admins move `under_review` to
    /// `approved`; finance moves `approved` to `reimbursed`.
    pub async fn approve(
        &self,
        principal: &Principal,
        claim_id: &ClaimId,
        input: ReviewInput,
    ) -> Result<Claim, LifecycleError> {
        let mut claim = self.load(claim_id).await?;
        let owner_manager = self.directory.manager_of(&claim.owner_id).await.map_err(store_error)?;
        let path = match authorize_review(principal, &claim, owner_manager.as_deref(), "approve") {
            Ok(path) => path,
            Err(error) => {
                self.emit(
                    &claim,
                    principal,
                    "lifecycle.review_denied",
                    AuditCategory::Authorization,
                    AuditOutcome::Rejected,
                    &[],
                );
                return Err(error);
            }
        };

        let now = Utc::now();
        let event_type = match path {
            ReviewPath::ManagerApproval => {
                if claim.status != ClaimStatus::UnderReview {
                    return Err(LifecycleError::InvalidState {
                        action: "approve".to_string(),
                        current: claim.status,
                    });
                }
                claim.approver_id = Some(principal.id.clone());
                claim.approval_date = Some(now);
                claim.record_status(ClaimStatus::Approved, &principal.id, input.comments, now)?;
                "lifecycle.claim_approved"
            }
            ReviewPath::FinanceReimbursement => {
                if claim.status != ClaimStatus::Approved {
                    return Err(LifecycleError::InvalidState {
                        action: "reimburse".to_string(),
                        current: claim.status,
                    });
                }
                claim.finance_approver_id = Some(principal.id.clone());
                claim.reimbursement_date = Some(now);
                claim.reimbursement_mode = Some(input.reimbursement_mode.unwrap_or_default());
                claim.record_status(ClaimStatus::Reimbursed, &principal.id, input.comments, now)?;
                "lifecycle.claim_reimbursed"
            }
        };

        self.persist(&mut claim).await?;
        tracing::info!(
            event_name = event_type,
            claim_id = %claim.id.0,
            reviewer_id = %principal.id,
            status = claim.status.as_str(),
            "claim reviewed"
        );
        self.emit(
            &claim,
            principal,
            event_type,
            AuditCategory::Lifecycle,
            AuditOutcome::Success,
            &[("to", claim.status.as_str())],
        );
        Ok(claim)
    }

    /// Reject a claim with a mandatory reason. Terminal.
    pub async fn reject(
        &self,
        principal: &Principal,
        claim_id: &ClaimId,
        reason: &str,
    ) -> Result<Claim, LifecycleError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LifecycleError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }

        let mut claim = self.load(claim_id).await?;
        let owner_manager = self.directory.manager_of(&claim.owner_id).await.map_err(store_error)?;
        let path = match authorize_review(principal, &claim, owner_manager.as_deref(), "reject") {
            Ok(path) => path,
            Err(error) => {
                self.emit(
                    &claim,
                    principal,
                    "lifecycle.review_denied",
                    AuditCategory::Authorization,
                    AuditOutcome::Rejected,
                    &[],
                );
                return Err(error);
            }
        };

        let allowed_from = match path {
            ReviewPath::ManagerApproval => claim.status == ClaimStatus::UnderReview,
            ReviewPath::FinanceReimbursement => {
                matches!(claim.status, ClaimStatus::UnderReview | ClaimStatus::Approved)
            }
        };
        if !allowed_from {
            return Err(LifecycleError::InvalidState {
                action: "reject".to_string(),
                current: claim.status,
            });
        }

        let now = Utc::now();
        claim.rejection_reason = Some(reason.to_string());
        claim.record_status(
            ClaimStatus::Rejected,
            &principal.id,
            Some(reason.to_string()),
            now,
        )?;

        self.persist(&mut claim).await?;
        tracing::info!(
            event_name = "lifecycle.claim_rejected",
            claim_id = %claim.id.0,
            reviewer_id = %principal.id,
            "claim rejected"
        );
        self.emit(
            &claim,
            principal,
            "lifecycle.claim_rejected",
            AuditCategory::Lifecycle,
            AuditOutcome::Success,
            &[("reason", reason)],
        );
        Ok(claim)
    }

    /// Replace mutable fields while the claim is still editable.
    pub async fn update(
        &self,
        principal: &Principal,
        claim_id: &ClaimId,
        patch: ClaimPatch,
    ) -> Result<Claim, LifecycleError> {
        let mut claim = self.load(claim_id).await?;
        require_owner(principal, &claim, "update")?;
        if !matches!(claim.status, ClaimStatus::Draft | ClaimStatus::Submitted) {
            return Err(LifecycleError::InvalidState {
                action: "update".to_string(),
                current: claim.status,
            });
        }

        if let Some(amount) = patch.amount {
            claim.amount = amount;
        }
        if let Some(tax_amount) = patch.tax_amount {
            claim.tax_amount = tax_amount;
        }
        validate_amounts(claim.amount, claim.tax_amount)?;

        if let Some(category) = patch.category {
            let category = normalize_category(&category);
            self.active_policy(&category).await?;
            claim.category = category;
        }
        if let Some(description) = patch.description {
            let description = description.trim().to_string();
            if description.is_empty() {
                return Err(LifecycleError::Validation(
                    "description must not be empty".to_string(),
                ));
            }
            claim.description = description;
        }
        if let Some(expense_date) = patch.expense_date {
            claim.expense_date = expense_date;
        }
        if let Some(receipt_ref) = patch.receipt_ref {
            claim.receipt_ref = Some(receipt_ref);
        }

        claim.recompute_total();
        claim.updated_at = Utc::now();
        self.persist(&mut claim).await?;
        self.emit(
            &claim,
            principal,
            "lifecycle.claim_updated",
            AuditCategory::Lifecycle,
            AuditOutcome::Success,
            &[],
        );
        Ok(claim)
    }

    /// Delete a draft. The receipt blob is removed best-effort: a blob
    /// backend failure is logged and does not undo the record deletion.
    pub async fn delete(
        &self,
        principal: &Principal,
        claim_id: &ClaimId,
    ) -> Result<(), LifecycleError> {
        let claim = self.load(claim_id).await?;
        require_owner(principal, &claim, "delete")?;
        if claim.status != ClaimStatus::Draft {
            return Err(LifecycleError::InvalidState {
                action: "delete".to_string(),
                current: claim.status,
            });
        }

        self.claims.delete(claim_id).await.map_err(store_error)?;
        if let Some(receipt_ref) = &claim.receipt_ref {
            if let Err(error) = self.receipts.delete(receipt_ref).await {
                tracing::warn!(
                    event_name = "lifecycle.receipt_delete_failed",
                    claim_id = %claim.id.0,
                    receipt_ref = %receipt_ref,
                    error = %error,
                    "receipt blob not removed; claim record already deleted"
                );
            }
        }

        tracing::info!(
            event_name = "lifecycle.claim_deleted",
            claim_id = %claim.id.0,
            "draft claim deleted"
        );
        self.emit(
            &claim,
            principal,
            "lifecycle.claim_deleted",
            AuditCategory::Lifecycle,
            AuditOutcome::Success,
            &[],
        );
        Ok(())
    }

    pub async fn get(
        &self,
        principal: &Principal,
        claim_id: &ClaimId,
    ) -> Result<Claim, LifecycleError> {
        let claim = self.load(claim_id).await?;
        if !may_view(principal, &claim) {
            return Err(LifecycleError::Authorization {
                principal_id: principal.id.clone(),
                action: format!("view claim `{}`", claim.id.0),
            });
        }
        Ok(claim)
    }

    /// Predicate listing. Employees only ever see their own claims; the
    /// owner filter is forced for them.
    pub async fn list(
        &self,
        principal: &Principal,
        mut query: ClaimQuery,
    ) -> Result<Vec<Claim>, LifecycleError> {
        if matches!(principal.role, crate::domain::principal::Role::Employee) {
            query.owner_id = Some(principal.id.clone());
        }
        self.claims.find(&query).await.map_err(store_error)
    }

    /// History accessor for audit views; same visibility rule as `get`.
    pub async fn history(
        &self,
        principal: &Principal,
        claim_id: &ClaimId,
    ) -> Result<Vec<StatusChange>, LifecycleError> {
        Ok(self.get(principal, claim_id).await?.status_history)
    }

    async fn load(&self, claim_id: &ClaimId) -> Result<Claim, LifecycleError> {
        self.claims
            .get(claim_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| LifecycleError::NotFound(claim_id.0.clone()))
    }

    async fn active_policy(&self, category: &str) -> Result<CategoryPolicy, LifecycleError> {
        let policy = self
            .policies
            .get(category)
            .await
            .map_err(store_error)?
            .filter(|policy| policy.is_active);
        policy.ok_or_else(|| LifecycleError::Policy { category: category.to_string() })
    }

    async fn resolve_approver(
        &self,
        principal: &Principal,
    ) -> Result<Option<String>, LifecycleError> {
        // The submitter's direct manager takes precedence over the
        // department-scoped lookup.
        if let Some(manager_id) = &principal.manager_id {
            return Ok(Some(manager_id.clone()));
        }
        self.directory.department_manager(&principal.department).await.map_err(store_error)
    }

    async fn persist(&self, claim: &mut Claim) -> Result<(), LifecycleError> {
        self.claims.update(claim.clone()).await.map_err(store_error)?;
        // The store committed version + 1; mirror it on the copy we
        // hand back so callers can keep mutating.
        claim.version += 1;
        Ok(())
    }

    fn emit(
        &self,
        claim: &Claim,
        principal: &Principal,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        metadata: &[(&str, &str)],
    ) {
        let mut event = AuditEvent::new(
            Some(claim.id.clone()),
            claim.id.0.clone(),
            event_type,
            category,
            principal.id.clone(),
            outcome,
        );
        for (key, value) in metadata {
            event = event.with_metadata(*key, *value);
        }
        self.audit.emit(event);
    }
}

fn validate_amounts(amount: Decimal, tax_amount: Decimal) -> Result<(), LifecycleError> {
    if amount <= Decimal::ZERO {
        return Err(LifecycleError::Validation("amount must be positive".to_string()));
    }
    if tax_amount < Decimal::ZERO {
        return Err(LifecycleError::Validation("tax amount must not be negative".to_string()));
    }
    Ok(())
}

fn store_error(error: StoreError) -> LifecycleError {
    match error {
        StoreError::VersionConflict { claim_id, expected } => {
            LifecycleError::ConcurrentModification { claim_id, expected }
        }
        StoreError::DuplicateId(id) => {
            LifecycleError::Store(format!("duplicate claim id `{id}`"))
        }
        StoreError::Unavailable(message) => LifecycleError::Store(message),
    }
}
