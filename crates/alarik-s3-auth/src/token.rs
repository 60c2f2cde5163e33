//! Bearer tokens for the admin JSON API.
//!
//! The administrative console authenticates with an HS256 JWT signed by
//! a process-local secret (`JWT_SECRET`). Claims carry the user id and
//! admin flag; expiry is enforced by the library.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Default token lifetime in seconds (12 hours).
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 12 * 3600;

/// Claims carried by an Alarik bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// The authenticated user id.
    pub sub: i64,
    /// Whether the user holds the admin flag.
    pub admin: bool,
    /// Expiration, seconds since the Unix epoch.
    pub exp: i64,
}

/// Issue a token for a user.
///
/// # Errors
///
/// Returns [`AuthError::InvalidToken`] if encoding fails (which only
/// happens with a malformed secret).
pub fn issue_token(secret: &str, user_id: i64, is_admin: bool) -> Result<String, AuthError> {
    let claims = TokenClaims {
        sub: user_id,
        admin: is_admin,
        exp: chrono::Utc::now().timestamp() + DEFAULT_TOKEN_LIFETIME_SECS,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Verify a bearer token and return its claims.
///
/// # Errors
///
/// Returns [`AuthError::InvalidToken`] for bad signatures, wrong
/// algorithms, or expired tokens.
pub fn verify_token(secret: &str, token: &str) -> Result<TokenClaims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_round_trip_token_claims() {
        let token = issue_token("topsecret", 42, true).unwrap();
        let claims = verify_token("topsecret", &token).unwrap();
        assert_eq!(claims.sub, 42);
        assert!(claims.admin);
    }

    #[test]
    fn test_should_reject_token_signed_with_other_secret() {
        let token = issue_token("secret-a", 1, false).unwrap();
        assert!(matches!(
            verify_token("secret-b", &token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_should_reject_garbage_token() {
        assert!(matches!(
            verify_token("secret", "not.a.jwt"),
            Err(AuthError::InvalidToken)
        ));
    }
}
