//! Request authentication for Alarik.
//!
//! Two schemes are supported, tried in order by the HTTP layer:
//!
//! 1. **AWS Signature Version 4** ([`sigv4`]): the S3 data-plane scheme,
//!    canonical-request assembly included; verification of
//!    `aws-chunked` streaming payloads lives in [`chunked`].
//! 2. **Bearer tokens** ([`token`]): HS256 JWTs used by the admin
//!    console against the admin JSON API.
//!
//! Secrets are resolved through the [`CredentialProvider`] trait so the
//! crate stays independent of the metadata store.

pub mod chunked;
pub mod credentials;
pub mod error;
pub mod sigv4;
pub mod token;

pub use credentials::{Credential, CredentialProvider, StaticCredentialProvider};
pub use error::AuthError;
pub use sigv4::{AuthResult, hash_payload, verify_sigv4};
pub use token::{TokenClaims, issue_token, verify_token};
