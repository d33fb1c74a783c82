use crate::domain::claim::Claim;
use crate::domain::principal::{Principal, Role};
use crate::errors::LifecycleError;

/// Which review authority a principal exercises over a claim. Finance
/// "approval" means reimbursement; the status gate for each path lives
/// in the lifecycle operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewPath {
    ManagerApproval,
    FinanceReimbursement,
}

/// Owner-only operations: submit, update, delete.
pub fn require_owner(
    principal: &Principal,
    claim: &Claim,
    action: &str,
) -> Result<(), LifecycleError> {
    if claim.owner_id == principal.id {
        return Ok(());
    }

    Err(LifecycleError::Authorization {
        principal_id: principal.id.clone(),
        action: format!("{action} claim `{}`", claim.id.0),
    })
}

/// Review authorization shared by approve and reject.
///
/// Admin always passes on the manager path. A manager passes when they
/// are the assigned approver or the owner's manager (`owner_manager` is
/// resolved by the caller). Finance passes on the reimbursement path.
pub fn authorize_review(
    principal: &Principal,
    claim: &Claim,
    owner_manager: Option<&str>,
    action: &str,
) -> Result<ReviewPath, LifecycleError> {
    match principal.role {
        Role::Admin => Ok(ReviewPath::ManagerApproval),
        Role::Manager => {
            let assigned = claim.approver_id.as_deref() == Some(principal.id.as_str());
            let owns_reportee = owner_manager == Some(principal.id.as_str());
            if assigned || owns_reportee {
                Ok(ReviewPath::ManagerApproval)
            } else {
                Err(denied(principal, claim, action))
            }
        }
        Role::Finance => Ok(ReviewPath::FinanceReimbursement),
        Role::Employee => Err(denied(principal, claim, action)),
    }
}

/// Read access: the owner, the assigned approver, and any reviewer role.
pub fn may_view(principal: &Principal, claim: &Claim) -> bool {
    claim.owner_id == principal.id
        || claim.approver_id.as_deref() == Some(principal.id.as_str())
        || matches!(principal.role, Role::Manager | Role::Finance | Role::Admin)
}

fn denied(principal: &Principal, claim: &Claim, action: &str) -> LifecycleError {
    LifecycleError::Authorization {
        principal_id: principal.id.clone(),
        action: format!("{action} claim `{}`", claim.id.0),
    }
}
