//! Credential resolution for SigV4 verification.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::AuthError;

/// A resolved credential for an access key id.
#[derive(Debug, Clone)]
pub struct Credential {
    /// The owning user.
    pub user_id: i64,
    /// The 40-character secret. Used only for key derivation.
    pub secret_key: String,
    /// Optional expiration; expired keys must be rejected.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Resolves access key ids to credentials.
///
/// The production implementation consults the credential cache with a
/// metadata-store fallback; tests use [`StaticCredentialProvider`].
pub trait CredentialProvider: Send + Sync {
    /// Resolve the credential for an access key id.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownAccessKey`] if the id is not
    /// registered.
    fn lookup(&self, access_key_id: &str) -> Result<Credential, AuthError>;
}

/// In-memory provider for tests and development.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    credentials: HashMap<String, Credential>,
}

impl StaticCredentialProvider {
    /// Build a provider from `(access_key_id, secret_key)` pairs, all
    /// owned by user 1 and never expiring.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            credentials: pairs
                .into_iter()
                .map(|(id, secret)| {
                    (
                        id,
                        Credential {
                            user_id: 1,
                            secret_key: secret,
                            expires_at: None,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Insert a fully specified credential.
    pub fn insert(&mut self, access_key_id: impl Into<String>, credential: Credential) {
        self.credentials.insert(access_key_id.into(), credential);
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn lookup(&self, access_key_id: &str) -> Result<Credential, AuthError> {
        self.credentials
            .get(access_key_id)
            .cloned()
            .ok_or_else(|| AuthError::UnknownAccessKey(access_key_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_resolve_known_key() {
        let provider =
            StaticCredentialProvider::new(vec![("AKID".to_owned(), "secret".to_owned())]);
        let cred = provider.lookup("AKID").unwrap();
        assert_eq!(cred.secret_key, "secret");
    }

    #[test]
    fn test_should_reject_unknown_key() {
        let provider = StaticCredentialProvider::default();
        assert!(matches!(
            provider.lookup("NOPE"),
            Err(AuthError::UnknownAccessKey(_))
        ));
    }
}
