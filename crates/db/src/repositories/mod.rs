use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use claimdesk_core::lifecycle::StoreError;
use claimdesk_core::Principal;

pub mod category;
pub mod claim;
pub mod user;

pub use category::SqlCategoryRepository;
pub use claim::SqlClaimRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        StoreError::Unavailable(value.to_string())
    }
}

/// Directory row behind a `Principal`. The name is carried for display
/// surfaces; the lifecycle itself only sees the principal fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub role: claimdesk_core::Role,
    pub manager_id: Option<String>,
    pub department: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id.clone(),
            role: self.role,
            manager_id: self.manager_id.clone(),
            department: self.department.clone(),
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, RepositoryError>;
    async fn save(&self, user: UserRecord) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}
