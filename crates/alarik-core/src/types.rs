//! Domain records: users, access keys, buckets, and object versions.
//!
//! Relationships between records are id-based; ownership lives in the
//! metadata store, not in the types themselves.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user account.
///
/// Users own buckets and access keys. The password is stored as a bcrypt
/// hash and is only used by the admin console login flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique numeric id.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// Bcrypt hash of the password. Never serialized to API responses.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Whether this user may call admin routes.
    pub is_admin: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An S3 access key pair.
///
/// The access key id is a 20-character identifier (ASCII `A-Z`/`0-9`);
/// the secret is 40 characters and is only used for constant-time
/// comparison during signature verification.
#[derive(Debug, Clone)]
pub struct AccessKey {
    /// The public 20-character identifier.
    pub access_key_id: String,
    /// The 40-character secret. Never leaves the process.
    pub secret_key: String,
    /// The owning user.
    pub user_id: i64,
    /// Optional expiration; an expired key authenticates nothing.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessKey {
    /// Whether this key is expired at time `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Whether this key is expired right now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Versioning state of a bucket.
///
/// Transitions follow S3 semantics: `Disabled -> Enabled`,
/// `Enabled -> Suspended`, and `Suspended -> Enabled` are allowed;
/// a bucket can never return to `Disabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VersioningStatus {
    /// Versioning has never been enabled.
    #[default]
    Disabled,
    /// New writes allocate fresh version ids.
    Enabled,
    /// New writes overwrite the `"null"` version; history is retained.
    Suspended,
}

impl VersioningStatus {
    /// The wire representation used by `VersioningConfiguration` bodies.
    ///
    /// `Disabled` has no wire form; S3 omits the `Status` element.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::Enabled => "Enabled",
            Self::Suspended => "Suspended",
        }
    }
}

impl FromStr for VersioningStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Disabled" => Ok(Self::Disabled),
            "Enabled" => Ok(Self::Enabled),
            "Suspended" => Ok(Self::Suspended),
            other => Err(format!("unknown versioning status: {other}")),
        }
    }
}

impl fmt::Display for VersioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bucket record.
///
/// Invariant: a bucket row exists if and only if its directory exists
/// under the storage root.
#[derive(Debug, Clone)]
pub struct BucketRecord {
    /// Globally unique bucket name (DNS-label rules).
    pub name: String,
    /// The owning user.
    pub user_id: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Current versioning state.
    pub versioning: VersioningStatus,
}

/// The version id used for objects in non-versioned (and suspended)
/// buckets.
pub const NULL_VERSION_ID: &str = "null";

/// One version of an object.
///
/// Identity is the `(bucket, key, version_id)` triple. Non-versioned
/// buckets hold at most one record per key, with the literal version id
/// `"null"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVersionRecord {
    /// The containing bucket.
    pub bucket: String,
    /// The object key.
    pub key: String,
    /// The version id (`"null"` or a 48-char sortable hex id).
    pub version_id: String,
    /// Object size in bytes (0 for delete markers).
    pub size: u64,
    /// Declared content type, if any.
    pub content_type: Option<String>,
    /// Hex MD5 for single-part objects, `<hex>-<n>` for multipart.
    pub etag: String,
    /// User metadata (`x-amz-meta-*`), keys lowercased.
    pub user_metadata: HashMap<String, String>,
    /// Last-modified timestamp.
    pub last_modified: DateTime<Utc>,
    /// Whether this version is a delete marker.
    pub is_delete_marker: bool,
}

impl ObjectVersionRecord {
    /// Whether this record carries the `"null"` version id.
    #[must_use]
    pub fn is_null_version(&self) -> bool {
        self.version_id == NULL_VERSION_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_versioning_status_round_trip() {
        for status in [
            VersioningStatus::Disabled,
            VersioningStatus::Enabled,
            VersioningStatus::Suspended,
        ] {
            let parsed: VersioningStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_should_reject_unknown_versioning_status() {
        assert!("Paused".parse::<VersioningStatus>().is_err());
    }

    #[test]
    fn test_should_detect_expired_access_key() {
        let now = Utc::now();
        let expired = AccessKey {
            access_key_id: "AKIAEXAMPLE000000001".to_owned(),
            secret_key: "x".repeat(40),
            user_id: 1,
            expires_at: Some(now - chrono::Duration::minutes(1)),
        };
        assert!(expired.is_expired_at(now));

        let live = AccessKey {
            expires_at: Some(now + chrono::Duration::minutes(1)),
            ..expired.clone()
        };
        assert!(!live.is_expired_at(now));

        let eternal = AccessKey {
            expires_at: None,
            ..expired
        };
        assert!(!eternal.is_expired_at(now));
    }
}
