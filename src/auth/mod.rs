//! Authentication for Cabeceo
//!
//! Resolves a bearer JWT into the acting [`Principal`]. Each call is
//! independent; nothing is cached across requests.

pub mod jwt;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput};

use chrono::{DateTime, TimeZone, Utc};

/// The authenticated actor for one request.
///
/// Carries the derived facts authorization needs beyond the opaque id:
/// whether the account's email is verified and when it was created
/// (both used by event-join throttling).
#[derive(Debug, Clone)]
pub struct Principal {
    /// Opaque principal identifier
    pub id: String,
    /// Human-readable identifier (email/username), for logging only
    pub identifier: String,
    /// Whether the account's email has been verified
    pub email_verified: bool,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl Principal {
    /// Build a principal from verified token claims
    pub fn from_claims(claims: Claims) -> Self {
        let created_at = Utc
            .timestamp_opt(claims.account_created_at as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: claims.sub,
            identifier: claims.identifier,
            email_verified: claims.email_verified,
            created_at,
        }
    }
}

/// Resolve the acting principal from an Authorization header.
///
/// Fails when the header is absent, malformed, or the token is rejected.
pub fn resolve_principal(
    validator: &JwtValidator,
    auth_header: Option<&str>,
) -> Option<Principal> {
    let token = extract_token_from_header(auth_header)?;
    let result = validator.verify_token(token);
    result.claims.map(Principal::from_claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            3600,
        )
        .unwrap()
    }

    fn token_for(id: &str) -> String {
        validator()
            .generate_token(TokenInput {
                sub: id.into(),
                identifier: format!("{}@example.com", id),
                email_verified: true,
            })
            .unwrap()
    }

    #[test]
    fn test_resolve_principal() {
        let header = format!("Bearer {}", token_for("dancer-1"));
        let principal = resolve_principal(&validator(), Some(&header)).unwrap();
        assert_eq!(principal.id, "dancer-1");
        assert!(principal.email_verified);
    }

    #[test]
    fn test_resolve_principal_missing_header() {
        assert!(resolve_principal(&validator(), None).is_none());
    }

    #[test]
    fn test_resolve_principal_garbage_token() {
        assert!(resolve_principal(&validator(), Some("Bearer not-a-jwt")).is_none());
    }
}
