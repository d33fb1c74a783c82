use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::category::{normalize_category, CategoryPolicy};
use crate::domain::claim::{Claim, ClaimId, ClaimStatus};

/// Failures surfaced by the collaborators the lifecycle depends on.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("claim `{claim_id}` version mismatch (expected {expected})")]
    VersionConflict { claim_id: String, expected: i64 },
    #[error("duplicate claim id `{0}`")]
    DuplicateId(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Simple predicate query over claims. All set fields must match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimQuery {
    pub owner_id: Option<String>,
    pub status: Option<ClaimStatus>,
    pub approver_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Transactional record store keyed by claim id. `update` is atomic per
/// claim and version-guarded: it persists `claim.version + 1` only when
/// the stored row still holds `claim.version`.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn get(&self, id: &ClaimId) -> Result<Option<Claim>, StoreError>;
    async fn insert(&self, claim: Claim) -> Result<(), StoreError>;
    async fn update(&self, claim: Claim) -> Result<(), StoreError>;
    async fn delete(&self, id: &ClaimId) -> Result<(), StoreError>;
    async fn find(&self, query: &ClaimQuery) -> Result<Vec<Claim>, StoreError>;
}

#[async_trait]
pub trait PolicyLookup: Send + Sync {
    async fn get(&self, category: &str) -> Result<Option<CategoryPolicy>, StoreError>;
}

/// Manager resolution used for escalation: the submitter's direct
/// manager first, then the department-scoped manager.
#[async_trait]
pub trait ManagerDirectory: Send + Sync {
    async fn manager_of(&self, user_id: &str) -> Result<Option<String>, StoreError>;
    async fn department_manager(&self, department: &str) -> Result<Option<String>, StoreError>;
}

#[async_trait]
pub trait ReceiptBlobStore: Send + Sync {
    async fn put(&self, bytes: Vec<u8>, filename: &str) -> Result<String, StoreError>;
    async fn delete(&self, reference: &str) -> Result<(), StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryClaimStore {
    claims: Arc<Mutex<HashMap<String, Claim>>>,
}

impl InMemoryClaimStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Claim>> {
        match self.claims.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn get(&self, id: &ClaimId) -> Result<Option<Claim>, StoreError> {
        Ok(self.lock().get(&id.0).cloned())
    }

    async fn insert(&self, claim: Claim) -> Result<(), StoreError> {
        let mut claims = self.lock();
        if claims.contains_key(&claim.id.0) {
            return Err(StoreError::DuplicateId(claim.id.0.clone()));
        }
        claims.insert(claim.id.0.clone(), claim);
        Ok(())
    }

    async fn update(&self, mut claim: Claim) -> Result<(), StoreError> {
        let mut claims = self.lock();
        let current = claims
            .get(&claim.id.0)
            .ok_or_else(|| StoreError::Unavailable(format!("claim `{}` vanished", claim.id.0)))?;
        if current.version != claim.version {
            return Err(StoreError::VersionConflict {
                claim_id: claim.id.0.clone(),
                expected: claim.version,
            });
        }
        claim.version += 1;
        claims.insert(claim.id.0.clone(), claim);
        Ok(())
    }

    async fn delete(&self, id: &ClaimId) -> Result<(), StoreError> {
        self.lock().remove(&id.0);
        Ok(())
    }

    async fn find(&self, query: &ClaimQuery) -> Result<Vec<Claim>, StoreError> {
        let claims = self.lock();
        let mut matched: Vec<Claim> = claims
            .values()
            .filter(|claim| {
                query.owner_id.as_deref().map_or(true, |owner| claim.owner_id == owner)
                    && query.status.map_or(true, |status| claim.status == status)
                    && query
                        .approver_id
                        .as_deref()
                        .map_or(true, |approver| claim.approver_id.as_deref() == Some(approver))
            })
            .cloned()
            .collect();
        matched.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPolicyLookup {
    policies: Arc<Mutex<HashMap<String, CategoryPolicy>>>,
}

impl InMemoryPolicyLookup {
    pub fn with_policies(policies: Vec<CategoryPolicy>) -> Self {
        let map = policies
            .into_iter()
            .map(|policy| (normalize_category(&policy.name), policy))
            .collect();
        Self { policies: Arc::new(Mutex::new(map)) }
    }

    pub fn register(&self, policy: CategoryPolicy) {
        let key = normalize_category(&policy.name);
        match self.policies.lock() {
            Ok(mut policies) => policies.insert(key, policy),
            Err(poisoned) => poisoned.into_inner().insert(key, policy),
        };
    }
}

#[async_trait]
impl PolicyLookup for InMemoryPolicyLookup {
    async fn get(&self, category: &str) -> Result<Option<CategoryPolicy>, StoreError> {
        let key = normalize_category(category);
        let policies = match self.policies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(policies.get(&key).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryManagerDirectory {
    managers_by_user: Arc<Mutex<HashMap<String, String>>>,
    managers_by_department: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryManagerDirectory {
    pub fn assign_manager(&self, user_id: &str, manager_id: &str) {
        match self.managers_by_user.lock() {
            Ok(mut map) => map.insert(user_id.to_string(), manager_id.to_string()),
            Err(poisoned) => {
                poisoned.into_inner().insert(user_id.to_string(), manager_id.to_string())
            }
        };
    }

    pub fn assign_department_manager(&self, department: &str, manager_id: &str) {
        match self.managers_by_department.lock() {
            Ok(mut map) => map.insert(department.to_string(), manager_id.to_string()),
            Err(poisoned) => {
                poisoned.into_inner().insert(department.to_string(), manager_id.to_string())
            }
        };
    }
}

#[async_trait]
impl ManagerDirectory for InMemoryManagerDirectory {
    async fn manager_of(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let map = match self.managers_by_user.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(map.get(user_id).cloned())
    }

    async fn department_manager(&self, department: &str) -> Result<Option<String>, StoreError> {
        let map = match self.managers_by_department.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(map.get(department).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryReceiptBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_deletes: Arc<Mutex<bool>>,
}

impl InMemoryReceiptBlobStore {
    pub fn contains(&self, reference: &str) -> bool {
        match self.blobs.lock() {
            Ok(blobs) => blobs.contains_key(reference),
            Err(poisoned) => poisoned.into_inner().contains_key(reference),
        }
    }

    /// Make subsequent deletes fail, for exercising the best-effort
    /// deletion path.
    pub fn fail_deletes(&self) {
        match self.fail_deletes.lock() {
            Ok(mut flag) => *flag = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
    }
}

#[async_trait]
impl ReceiptBlobStore for InMemoryReceiptBlobStore {
    async fn put(&self, bytes: Vec<u8>, filename: &str) -> Result<String, StoreError> {
        let reference = format!("receipts/{}-{filename}", uuid::Uuid::new_v4());
        match self.blobs.lock() {
            Ok(mut blobs) => blobs.insert(reference.clone(), bytes),
            Err(poisoned) => poisoned.into_inner().insert(reference.clone(), bytes),
        };
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> Result<(), StoreError> {
        let failing = match self.fail_deletes.lock() {
            Ok(flag) => *flag,
            Err(poisoned) => *poisoned.into_inner(),
        };
        if failing {
            return Err(StoreError::Unavailable("blob backend offline".to_string()));
        }
        match self.blobs.lock() {
            Ok(mut blobs) => blobs.remove(reference),
            Err(poisoned) => poisoned.into_inner().remove(reference),
        };
        Ok(())
    }
}
