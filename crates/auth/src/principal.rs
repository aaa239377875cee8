use serde::{Deserialize, Serialize};

use logiport_core::{CompanyId, UserId};

use crate::Role;

/// Identity handed over by the auth boundary for every inbound call.
///
/// Downstream components trust it as-is: the limiter keys buckets on
/// `user_id`, commands scope every lookup to `company_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub role: Role,
    pub is_blocked: bool,
    /// Superuser-equivalent: bypasses rate limiting and role checks.
    #[serde(default)]
    pub unrestricted: bool,
}

impl Subject {
    pub fn new(user_id: UserId, company_id: CompanyId, role: Role) -> Self {
        Self {
            user_id,
            company_id,
            role,
            is_blocked: false,
            unrestricted: false,
        }
    }

    pub fn blocked(mut self) -> Self {
        self.is_blocked = true;
        self
    }

    pub fn unrestricted(mut self) -> Self {
        self.unrestricted = true;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.unrestricted || self.role == Role::Admin
    }
}
