//! Command handlers shared by every interface (HTTP, admin tooling, tests).
//!
//! Each handler takes the caller's [`Subject`] and scopes every lookup to
//! `subject.company_id`; records of another company are reported as not
//! found.

pub mod admin;
pub mod error;
pub mod exports;
pub mod orders;

use logiport_auth::{authorize, AuthzError, Capability, Subject};
use logiport_orders::Order;

use crate::features::{Feature, FeatureGate};
use crate::store::DirectoryStore;

pub use admin::{AdminCommands, AdminReport, REPEAT_OFFENDER_THRESHOLD};
pub use error::ServiceError;
pub use exports::{Download, ExportService};
pub use orders::{NewOrder, OrderService, MAX_BULK_LINES};

/// Capability check plus the stored block flag.
///
/// The profile may have been blocked after the auth boundary minted the
/// subject, so the store has the final word.
pub(crate) async fn admit(
    directory: &dyn DirectoryStore,
    subject: &Subject,
    required: Capability,
) -> Result<(), ServiceError> {
    authorize(subject, required)?;
    let profile = directory.profile(subject.company_id, subject.user_id).await?;
    if profile.is_some_and(|p| p.is_blocked) {
        return Err(AuthzError::Blocked.into());
    }
    Ok(())
}

pub(crate) async fn require_feature(
    gate: &FeatureGate,
    subject: &Subject,
    feature: Feature,
) -> Result<(), ServiceError> {
    if gate.is_enabled(subject.company_id, feature).await? {
        Ok(())
    } else {
        Err(ServiceError::FeatureDisabled(feature))
    }
}

/// Admins see every company order; everyone else only what they placed.
pub(crate) fn visible_to(subject: &Subject, order: &Order) -> bool {
    order.company_id() == Some(subject.company_id)
        && (subject.is_admin() || order.requested_by() == Some(subject.user_id))
}
