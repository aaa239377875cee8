//! Identity handed over by the upstream auth gateway.
//!
//! Authentication happens before requests reach this service; the gateway
//! forwards the authenticated identity in these headers.

use axum::http::HeaderMap;
use thiserror::Error;

use logiport_auth::{Role, Subject};
use logiport_core::{CompanyId, UserId};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const COMPANY_ID_HEADER: &str = "x-company-id";
pub const ROLE_HEADER: &str = "x-role";
pub const BLOCKED_HEADER: &str = "x-blocked";
pub const UNRESTRICTED_HEADER: &str = "x-unrestricted";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("missing identity header '{0}'")]
    Missing(&'static str),

    #[error("malformed identity header '{0}'")]
    Malformed(&'static str),
}

pub fn subject_from_headers(headers: &HeaderMap) -> Result<Subject, IdentityError> {
    let user_id: UserId = required(headers, USER_ID_HEADER)?
        .parse()
        .map_err(|_| IdentityError::Malformed(USER_ID_HEADER))?;
    let company_id: CompanyId = required(headers, COMPANY_ID_HEADER)?
        .parse()
        .map_err(|_| IdentityError::Malformed(COMPANY_ID_HEADER))?;
    let role: Role = required(headers, ROLE_HEADER)?
        .parse()
        .map_err(|_| IdentityError::Malformed(ROLE_HEADER))?;

    let mut subject = Subject::new(user_id, company_id, role);
    subject.is_blocked = flag(headers, BLOCKED_HEADER)?;
    subject.unrestricted = flag(headers, UNRESTRICTED_HEADER)?;
    Ok(subject)
}

fn required<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, IdentityError> {
    let value = headers.get(name).ok_or(IdentityError::Missing(name))?;
    let value = value.to_str().map_err(|_| IdentityError::Malformed(name))?.trim();
    if value.is_empty() {
        return Err(IdentityError::Missing(name));
    }
    Ok(value)
}

fn flag(headers: &HeaderMap, name: &'static str) -> Result<bool, IdentityError> {
    match headers.get(name) {
        None => Ok(false),
        Some(value) => match value.to_str().map(str::trim) {
            Ok("true") | Ok("1") => Ok(true),
            Ok("false") | Ok("0") => Ok(false),
            _ => Err(IdentityError::Malformed(name)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn full_identity_is_parsed() {
        let user = UserId::new();
        let company = CompanyId::new();
        let subject = subject_from_headers(&headers(&[
            (USER_ID_HEADER, user.to_string()),
            (COMPANY_ID_HEADER, company.to_string()),
            (ROLE_HEADER, "Operator".to_string()),
            (BLOCKED_HEADER, "true".to_string()),
        ]))
        .unwrap();
        assert_eq!(subject.user_id, user);
        assert_eq!(subject.company_id, company);
        assert_eq!(subject.role, Role::Operator);
        assert!(subject.is_blocked);
        assert!(!subject.unrestricted);
    }

    #[test]
    fn missing_and_malformed_headers_are_reported() {
        assert_eq!(
            subject_from_headers(&HeaderMap::new()),
            Err(IdentityError::Missing(USER_ID_HEADER))
        );
        assert_eq!(
            subject_from_headers(&headers(&[
                (USER_ID_HEADER, "nope".to_string()),
                (COMPANY_ID_HEADER, CompanyId::new().to_string()),
                (ROLE_HEADER, "admin".to_string()),
            ])),
            Err(IdentityError::Malformed(USER_ID_HEADER))
        );
    }
}
