pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;

pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, NoopAuditSink,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::category::{builtin_categories, normalize_category, CategoryPolicy};
pub use domain::claim::{Claim, ClaimId, ClaimStatus, ReimbursementMode, StatusChange};
pub use domain::principal::{Principal, Role};
pub use errors::{InterfaceError, LifecycleError};
pub use lifecycle::{
    authorize_review, may_view, require_owner, review_threshold, ClaimLifecycle, ClaimPatch,
    ClaimQuery, ClaimStore, ManagerDirectory, NewClaim, PolicyLookup, ReceiptBlobStore,
    ReviewInput, ReviewPath, StoreError,
};
