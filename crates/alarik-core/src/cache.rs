//! Process-wide credential and versioning caches.
//!
//! Five maps, each serialized by its own mutex, consulted on every
//! authenticated request so the hot path avoids a metadata-store hit:
//!
//! - access key id -> owning user id
//! - access key id -> secret key (secrets never leave the process)
//! - user id -> set of access key ids (reverse index)
//! - access key id -> set of buckets the key may touch
//! - bucket -> versioning status
//!
//! The cache is a read-only optimization: a miss falls back to the
//! metadata store. Mutating components update the cache synchronously
//! after the metadata commit succeeds and before returning success.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::MetadataError;
use crate::metadata::MetadataStore;
use crate::types::{AccessKey, VersioningStatus};

/// The credential cache. Construct one per process and share it behind
/// an `Arc`; tests construct isolated instances.
#[derive(Debug, Default)]
pub struct CredentialCache {
    key_to_user: Mutex<HashMap<String, i64>>,
    key_to_secret: Mutex<HashMap<String, String>>,
    user_to_keys: Mutex<HashMap<i64, HashSet<String>>>,
    key_to_buckets: Mutex<HashMap<String, HashSet<String>>>,
    bucket_versioning: Mutex<HashMap<String, VersioningStatus>>,
    /// Expirations for cached keys, so entries are evicted lazily once
    /// their key expires.
    key_expiry: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CredentialCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate every map from the metadata store. Called once at
    /// startup; expired keys are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] if the store cannot be read.
    pub fn warm(&self, store: &MetadataStore) -> Result<(), MetadataError> {
        let keys = store.all_access_keys()?;
        let buckets = store.list_buckets(None)?;

        let mut user_buckets: HashMap<i64, HashSet<String>> = HashMap::new();
        {
            let mut versioning = self.bucket_versioning.lock();
            for bucket in &buckets {
                versioning.insert(bucket.name.clone(), bucket.versioning);
                user_buckets
                    .entry(bucket.user_id)
                    .or_default()
                    .insert(bucket.name.clone());
            }
        }

        let mut live = 0usize;
        for key in keys {
            if key.is_expired() {
                continue;
            }
            let owned = user_buckets.get(&key.user_id).cloned().unwrap_or_default();
            self.insert_key_with_buckets(&key, owned);
            live += 1;
        }

        debug!(
            access_keys = live,
            buckets = buckets.len(),
            "warmed credential cache"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Access keys
    // -----------------------------------------------------------------------

    /// Insert a key and seed its bucket set.
    pub fn insert_key_with_buckets(&self, key: &AccessKey, buckets: HashSet<String>) {
        self.key_to_user
            .lock()
            .insert(key.access_key_id.clone(), key.user_id);
        self.key_to_secret
            .lock()
            .insert(key.access_key_id.clone(), key.secret_key.clone());
        self.user_to_keys
            .lock()
            .entry(key.user_id)
            .or_default()
            .insert(key.access_key_id.clone());
        self.key_to_buckets
            .lock()
            .insert(key.access_key_id.clone(), buckets);
        if let Some(expires_at) = key.expires_at {
            self.key_expiry
                .lock()
                .insert(key.access_key_id.clone(), expires_at);
        }
    }

    /// Remove one key from every map.
    pub fn remove_key(&self, access_key_id: &str) {
        let user = self.key_to_user.lock().remove(access_key_id);
        self.key_to_secret.lock().remove(access_key_id);
        self.key_to_buckets.lock().remove(access_key_id);
        self.key_expiry.lock().remove(access_key_id);
        if let Some(user_id) = user {
            if let Some(keys) = self.user_to_keys.lock().get_mut(&user_id) {
                keys.remove(access_key_id);
            }
        }
    }

    /// Evict the key if its recorded expiration has passed. Returns
    /// `true` if the key was evicted.
    fn evict_if_expired(&self, access_key_id: &str) -> bool {
        let expired = self
            .key_expiry
            .lock()
            .get(access_key_id)
            .is_some_and(|exp| *exp <= Utc::now());
        if expired {
            debug!(access_key_id, "evicting expired access key from cache");
            self.remove_key(access_key_id);
        }
        expired
    }

    /// The secret for a key, if cached and not expired.
    #[must_use]
    pub fn secret_for(&self, access_key_id: &str) -> Option<String> {
        if self.evict_if_expired(access_key_id) {
            return None;
        }
        self.key_to_secret.lock().get(access_key_id).cloned()
    }

    /// The owning user for a key, if cached and not expired.
    #[must_use]
    pub fn user_for(&self, access_key_id: &str) -> Option<i64> {
        if self.evict_if_expired(access_key_id) {
            return None;
        }
        self.key_to_user.lock().get(access_key_id).copied()
    }

    /// Whether the key is authorized for the bucket, if the key is
    /// cached. `None` means "not cached, fall back to the store".
    #[must_use]
    pub fn key_owns_bucket(&self, access_key_id: &str, bucket: &str) -> Option<bool> {
        self.key_to_buckets
            .lock()
            .get(access_key_id)
            .map(|set| set.contains(bucket))
    }

    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    /// Register a new bucket: every access key of the owning user gains
    /// it, and its versioning status is recorded.
    pub fn add_bucket(&self, owner: i64, bucket: &str, versioning: VersioningStatus) {
        let keys = self
            .user_to_keys
            .lock()
            .get(&owner)
            .cloned()
            .unwrap_or_default();
        {
            let mut map = self.key_to_buckets.lock();
            for key in keys {
                map.entry(key).or_default().insert(bucket.to_owned());
            }
        }
        self.bucket_versioning
            .lock()
            .insert(bucket.to_owned(), versioning);
    }

    /// Drop a bucket from every key's set and from the versioning map.
    pub fn remove_bucket(&self, bucket: &str) {
        for set in self.key_to_buckets.lock().values_mut() {
            set.remove(bucket);
        }
        self.bucket_versioning.lock().remove(bucket);
    }

    /// The cached versioning status of a bucket.
    #[must_use]
    pub fn versioning(&self, bucket: &str) -> Option<VersioningStatus> {
        self.bucket_versioning.lock().get(bucket).copied()
    }

    /// Update the cached versioning status.
    pub fn set_versioning(&self, bucket: &str, status: VersioningStatus) {
        self.bucket_versioning
            .lock()
            .insert(bucket.to_owned(), status);
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Evict a user and all their keys (user-delete cascade).
    pub fn remove_user(&self, user_id: i64) {
        let keys = self.user_to_keys.lock().remove(&user_id).unwrap_or_default();
        for key in keys {
            self.key_to_user.lock().remove(&key);
            self.key_to_secret.lock().remove(&key);
            self.key_to_buckets.lock().remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str, user_id: i64) -> AccessKey {
        AccessKey {
            access_key_id: id.to_owned(),
            secret_key: "s".repeat(40),
            user_id,
            expires_at: None,
        }
    }

    #[test]
    fn test_should_resolve_secret_and_user_after_insert() {
        let cache = CredentialCache::new();
        cache.insert_key_with_buckets(&key("AKIA0000000000000001", 7), HashSet::new());

        assert_eq!(cache.user_for("AKIA0000000000000001"), Some(7));
        assert_eq!(
            cache.secret_for("AKIA0000000000000001"),
            Some("s".repeat(40))
        );
        assert_eq!(cache.user_for("AKIA0000000000000002"), None);
    }

    #[test]
    fn test_should_grant_bucket_to_all_keys_of_owner() {
        let cache = CredentialCache::new();
        cache.insert_key_with_buckets(&key("AKIA0000000000000001", 7), HashSet::new());
        cache.insert_key_with_buckets(&key("AKIA0000000000000002", 7), HashSet::new());
        cache.insert_key_with_buckets(&key("AKIA0000000000000003", 8), HashSet::new());

        cache.add_bucket(7, "photos", VersioningStatus::Disabled);

        assert_eq!(cache.key_owns_bucket("AKIA0000000000000001", "photos"), Some(true));
        assert_eq!(cache.key_owns_bucket("AKIA0000000000000002", "photos"), Some(true));
        assert_eq!(cache.key_owns_bucket("AKIA0000000000000003", "photos"), Some(false));
        assert_eq!(cache.versioning("photos"), Some(VersioningStatus::Disabled));
    }

    #[test]
    fn test_should_remove_bucket_everywhere() {
        let cache = CredentialCache::new();
        cache.insert_key_with_buckets(&key("AKIA0000000000000001", 7), HashSet::new());
        cache.add_bucket(7, "photos", VersioningStatus::Enabled);
        cache.remove_bucket("photos");

        assert_eq!(cache.key_owns_bucket("AKIA0000000000000001", "photos"), Some(false));
        assert_eq!(cache.versioning("photos"), None);
    }

    #[test]
    fn test_should_evict_user_cascade() {
        let cache = CredentialCache::new();
        cache.insert_key_with_buckets(&key("AKIA0000000000000001", 7), HashSet::new());
        cache.insert_key_with_buckets(&key("AKIA0000000000000002", 7), HashSet::new());

        cache.remove_user(7);

        assert_eq!(cache.user_for("AKIA0000000000000001"), None);
        assert_eq!(cache.secret_for("AKIA0000000000000002"), None);
        assert_eq!(cache.key_owns_bucket("AKIA0000000000000001", "x"), None);
    }

    #[test]
    fn test_should_evict_key_lazily_once_expired() {
        let cache = CredentialCache::new();
        cache.insert_key_with_buckets(
            &AccessKey {
                expires_at: Some(chrono::Utc::now() - chrono::Duration::seconds(1)),
                ..key("AKIA0000000000000001", 7)
            },
            HashSet::new(),
        );

        assert_eq!(cache.secret_for("AKIA0000000000000001"), None);
        assert_eq!(cache.user_for("AKIA0000000000000001"), None);
    }

    #[test]
    fn test_should_warm_from_store_and_skip_expired_keys() {
        let store = MetadataStore::open_in_memory().unwrap();
        let user = store.create_user("alice", "pw", false).unwrap();
        store
            .create_bucket(&crate::types::BucketRecord {
                name: "b1".to_owned(),
                user_id: user.id,
                created_at: chrono::Utc::now(),
                versioning: VersioningStatus::Enabled,
            })
            .unwrap();
        store
            .create_access_key(&key("AKIALIVE000000000001", user.id))
            .unwrap();
        store
            .create_access_key(&AccessKey {
                expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
                ..key("AKIADEAD000000000001", user.id)
            })
            .unwrap();

        let cache = CredentialCache::new();
        cache.warm(&store).unwrap();

        assert_eq!(cache.user_for("AKIALIVE000000000001"), Some(user.id));
        assert_eq!(cache.user_for("AKIADEAD000000000001"), None);
        assert_eq!(cache.key_owns_bucket("AKIALIVE000000000001", "b1"), Some(true));
        assert_eq!(cache.versioning("b1"), Some(VersioningStatus::Enabled));
    }
}
