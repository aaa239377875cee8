//! `logiport-auth` — pure authorization boundary.
//!
//! Authentication happens upstream; this crate only models the identity the
//! auth boundary hands over and the policy checks made against it. It is
//! intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, ensure_same_company, AuthzError};
pub use permissions::Capability;
pub use principal::Subject;
pub use roles::Role;
