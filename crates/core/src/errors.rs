use thiserror::Error;

use crate::domain::claim::ClaimStatus;

/// Terminal per-operation failures. Nothing here implies a partial
/// write: an operation either commits fully or surfaces one of these.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("principal `{principal_id}` may not {action}")]
    Authorization { principal_id: String, action: String },
    #[error("cannot {action} while claim is {}", current.as_str())]
    InvalidState { action: String, current: ClaimStatus },
    #[error("category `{category}` is unknown or inactive")]
    Policy { category: String },
    #[error("claim `{0}` not found")]
    NotFound(String),
    #[error("claim `{claim_id}` was modified concurrently (expected version {expected})")]
    ConcurrentModification { claim_id: String, expected: i64 },
    // Transient store failures propagate unchanged; retry is the
    // caller's concern.
    #[error("store failure: {0}")]
    Store(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not permitted to perform this action.",
            Self::NotFound { .. } => "The requested claim does not exist.",
            Self::Conflict { .. } => {
                "The claim changed while processing. Reload it and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }
}

impl LifecycleError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => {
                *id = correlation_id;
            }
        }
        mapped
    }
}

impl From<LifecycleError> for InterfaceError {
    fn from(value: LifecycleError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            LifecycleError::Validation(_) | LifecycleError::Policy { .. } => {
                Self::BadRequest { message, correlation_id }
            }
            LifecycleError::Authorization { .. } => Self::Forbidden { message, correlation_id },
            LifecycleError::NotFound(_) => Self::NotFound { message, correlation_id },
            LifecycleError::InvalidState { .. } | LifecycleError::ConcurrentModification { .. } => {
                Self::Conflict { message, correlation_id }
            }
            LifecycleError::Store(_) => Self::ServiceUnavailable { message, correlation_id },
        }
    }
}
