use thiserror::Error;

use logiport_core::{CompanyId, DomainError};

use crate::{Capability, Subject};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("subject is blocked")]
    Blocked,

    #[error("company mismatch")]
    CompanyMismatch,

    #[error("forbidden: missing capability '{0}'")]
    Forbidden(Capability),
}

impl From<AuthzError> for DomainError {
    fn from(_: AuthzError) -> Self {
        DomainError::Unauthorized
    }
}

/// Check that `subject` may exercise `required`.
///
/// - No IO
/// - No panics
/// - Blocked subjects are always rejected, even unrestricted ones
pub fn authorize(subject: &Subject, required: Capability) -> Result<(), AuthzError> {
    if subject.is_blocked {
        return Err(AuthzError::Blocked);
    }
    if subject.unrestricted || subject.role.grants(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required))
    }
}

/// Tenancy guard: the subject may only touch records of its own company.
pub fn ensure_same_company(subject: &Subject, owner: CompanyId) -> Result<(), AuthzError> {
    if subject.company_id == owner {
        Ok(())
    } else {
        Err(AuthzError::CompanyMismatch)
    }
}
