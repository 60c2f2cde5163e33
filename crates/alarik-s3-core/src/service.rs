//! The service state object wired into every handler.
//!
//! [`AlarikS3`] owns the metadata store handle, the credential cache,
//! the filesystem store, the per-key lock table, and the multipart
//! registry. It is constructed once at startup and shared behind an
//! `Arc`; tests construct isolated instances over temp directories and
//! in-memory stores.

use std::sync::Arc;

use rand::RngExt;
use tracing::{info, warn};

use alarik_core::cache::CredentialCache;
use alarik_core::metadata::MetadataStore;
use alarik_core::types::{BucketRecord, VersioningStatus};
use alarik_s3_auth::credentials::{Credential, CredentialProvider};
use alarik_s3_auth::error::AuthError;
use alarik_s3_model::error::S3Error;

use crate::keylock::KeyLockTable;
use crate::storage::FsStore;
use crate::uploads::UploadRegistry;

/// The authenticated principal attached to a request.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    /// The authenticated user.
    pub user_id: i64,
    /// Whether the user holds the admin flag (bearer-token requests
    /// from the console; S3 requests are never admin).
    pub is_admin: bool,
}

/// Shared state for the S3 service.
#[derive(Debug)]
pub struct AlarikS3 {
    region: String,
    store: MetadataStore,
    cache: Arc<CredentialCache>,
    fs: FsStore,
    pub(crate) locks: KeyLockTable,
    pub(crate) uploads: UploadRegistry,
    /// Process-local key signing continuation tokens.
    pub(crate) token_key: Vec<u8>,
}

impl AlarikS3 {
    /// Assemble the service state.
    #[must_use]
    pub fn new(
        region: impl Into<String>,
        fs: FsStore,
        store: MetadataStore,
        cache: Arc<CredentialCache>,
    ) -> Self {
        let mut token_key = vec![0u8; 32];
        rand::rng().fill(token_key.as_mut_slice());
        Self {
            region: region.into(),
            store,
            cache,
            fs,
            locks: KeyLockTable::default(),
            uploads: UploadRegistry::new(),
            token_key,
        }
    }

    /// Warm the caches, repair the bucket-directory invariant, and
    /// rehydrate open multipart uploads from their staging manifests.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store or the storage root
    /// cannot be read.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        self.cache.warm(&self.store)?;

        let buckets = self.store.list_buckets(None)?;
        for bucket in &buckets {
            let dir = self.fs.bucket_dir(&bucket.name);
            if !dir.is_dir() {
                warn!(bucket = %bucket.name, "bucket directory missing, recreating");
                tokio::fs::create_dir_all(&dir).await?;
            }

            for upload in self.fs.load_open_uploads(&bucket.name).await? {
                self.uploads.insert(upload);
            }
        }

        // The reverse invariant: every top-level directory should have a
        // bucket row. Strays are reported, not deleted.
        let known: std::collections::HashSet<&str> =
            buckets.iter().map(|b| b.name.as_str()).collect();
        let mut entries = tokio::fs::read_dir(self.fs.root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(".tmp") && !known.contains(name.as_ref()) {
                warn!(directory = %name, "storage directory has no bucket record");
            }
        }

        info!(buckets = buckets.len(), "service state bootstrapped");
        Ok(())
    }

    /// The configured region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The metadata store handle.
    #[must_use]
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// The credential cache.
    #[must_use]
    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// A clone of the cache handle, for wiring into the HTTP layer.
    #[must_use]
    pub fn cache_handle(&self) -> Arc<CredentialCache> {
        Arc::clone(&self.cache)
    }

    /// The filesystem store.
    #[must_use]
    pub fn fs(&self) -> &FsStore {
        &self.fs
    }

    /// Load a bucket record, enforcing existence and ownership.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket` if the bucket is not registered; `AccessDenied`
    /// if the caller neither owns it nor is an admin.
    pub(crate) fn require_bucket(
        &self,
        auth: &AuthContext,
        name: &str,
    ) -> Result<BucketRecord, S3Error> {
        let bucket = self
            .store
            .bucket(name)
            .map_err(crate::ops::internal_error)?
            .ok_or_else(|| S3Error::no_such_bucket(name))?;
        if bucket.user_id != auth.user_id && !auth.is_admin {
            return Err(S3Error::access_denied(name));
        }
        Ok(bucket)
    }

    /// The versioning status of a bucket, from the cache with a
    /// metadata fallback.
    #[must_use]
    pub(crate) fn versioning_of(&self, bucket: &BucketRecord) -> VersioningStatus {
        self.cache
            .versioning(&bucket.name)
            .unwrap_or(bucket.versioning)
    }
}

/// [`CredentialProvider`] backed by the cache with a metadata-store
/// fallback, per the cache-is-an-optimization rule.
pub struct CacheBackedCredentials {
    cache: Arc<CredentialCache>,
    store: MetadataStore,
}

impl std::fmt::Debug for CacheBackedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBackedCredentials").finish_non_exhaustive()
    }
}

impl CacheBackedCredentials {
    /// Wire a provider over the given cache and store.
    #[must_use]
    pub fn new(cache: Arc<CredentialCache>, store: MetadataStore) -> Self {
        Self { cache, store }
    }
}

impl CredentialProvider for CacheBackedCredentials {
    fn lookup(&self, access_key_id: &str) -> Result<Credential, AuthError> {
        // Hot path: the cache only holds unexpired keys.
        if let (Some(user_id), Some(secret_key)) = (
            self.cache.user_for(access_key_id),
            self.cache.secret_for(access_key_id),
        ) {
            return Ok(Credential {
                user_id,
                secret_key,
                expires_at: None,
            });
        }

        let key = self
            .store
            .access_key(access_key_id)
            .map_err(|e| {
                warn!(access_key_id, error = %e, "credential lookup failed");
                AuthError::UnknownAccessKey(access_key_id.to_owned())
            })?
            .ok_or_else(|| AuthError::UnknownAccessKey(access_key_id.to_owned()))?;

        Ok(Credential {
            user_id: key.user_id,
            secret_key: key.secret_key,
            expires_at: key.expires_at,
        })
    }
}
