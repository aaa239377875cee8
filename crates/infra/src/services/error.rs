use std::time::Duration;

use logiport_auth::AuthzError;
use logiport_core::DomainError;

use crate::artifacts::ArtifactError;
use crate::features::Feature;
use crate::jobs::QueueError;
use crate::store::StoreError;

/// Error surfaced by every command handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Bad input shape or values; not retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Illegal transition or lost race; the caller may re-query.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    /// Blocked subject, missing capability or foreign company.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("feature '{0}' is disabled for this company")]
    FeatureDisabled(Feature),

    /// Rate limited or out of stock.
    #[error("resource exhausted: {reason}")]
    Exhausted {
        reason: String,
        retry_after: Option<Duration>,
    },

    /// Store or queue unavailable; safe to retry later.
    #[error("temporarily unavailable: {0}")]
    Transient(String),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl ServiceError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                ServiceError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => ServiceError::Invariant(msg),
            DomainError::NotFound => ServiceError::NotFound,
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::ResourceExhausted {
                reason,
                retry_after,
            } => ServiceError::Exhausted {
                reason,
                retry_after,
            },
            DomainError::Unauthorized => ServiceError::Unauthorized("unauthorized".to_string()),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        ServiceError::Unauthorized(value.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::DuplicateReference(code) => {
                ServiceError::Conflict(format!("reference code {code} already in use"))
            }
            StoreError::InsufficientStock { .. } => ServiceError::Exhausted {
                reason: logiport_products::INSUFFICIENT_STOCK.to_string(),
                retry_after: None,
            },
            StoreError::Unavailable(msg) => ServiceError::Transient(msg),
        }
    }
}

impl From<QueueError> for ServiceError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::NotFound(_) | QueueError::CompanyIsolation => ServiceError::NotFound,
            QueueError::AlreadyExists(id) => ServiceError::Conflict(format!("job {id} already exists")),
            QueueError::Unavailable(msg) => ServiceError::Transient(msg),
        }
    }
}

impl From<ArtifactError> for ServiceError {
    fn from(value: ArtifactError) -> Self {
        match value {
            ArtifactError::NotFound(_) => ServiceError::NotFound,
            ArtifactError::InvalidName(msg) => ServiceError::Invariant(msg),
            ArtifactError::Io(e) => ServiceError::Transient(e.to_string()),
            ArtifactError::Unavailable(msg) => ServiceError::Transient(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert_eq!(ServiceError::from(StoreError::NotFound), ServiceError::NotFound);
        assert!(ServiceError::from(StoreError::Conflict("stale".into())).is_conflict());
        assert!(matches!(
            ServiceError::from(StoreError::Unavailable("down".into())),
            ServiceError::Transient(_)
        ));
        assert!(matches!(
            ServiceError::from(StoreError::InsufficientStock { available: 1 }),
            ServiceError::Exhausted { ref reason, .. } if reason == "insufficient stock"
        ));
    }

    #[test]
    fn authz_errors_are_unauthorized() {
        assert!(matches!(
            ServiceError::from(AuthzError::Blocked),
            ServiceError::Unauthorized(ref msg) if msg.contains("blocked")
        ));
    }
}
