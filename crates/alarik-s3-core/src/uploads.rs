//! The in-memory multipart upload registry.
//!
//! Every open upload has a staging directory on disk with a JSON
//! manifest sidecar; the registry is the fast in-memory view,
//! rehydrated from the manifests at startup. Mutations update the
//! manifest first (through [`crate::storage::FsStore`]) and the
//! registry second, so a crash never loses a durably staged part.

use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One staged part of an open upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    /// Part number, 1..=10000.
    pub part_number: u32,
    /// Size of the staged file in bytes.
    pub size: u64,
    /// Unquoted hex MD5 of the part bytes.
    pub etag: String,
    /// When the part was last (re-)uploaded.
    pub last_modified: DateTime<Utc>,
}

/// An open multipart upload.
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    /// Opaque upload id (64-char hex).
    pub upload_id: String,
    /// The bucket the upload belongs to.
    pub bucket: String,
    /// The key the completed object will be published under.
    pub key: String,
    /// Declared content type for the final object.
    pub content_type: Option<String>,
    /// User metadata for the final object, keys lowercased.
    pub user_metadata: HashMap<String, String>,
    /// Creation timestamp.
    pub initiated: DateTime<Utc>,
    /// Staged parts, ordered by part number.
    pub parts: BTreeMap<u32, PartRecord>,
}

/// The durable manifest sidecar, stored as JSON at
/// `.multipart/<uploadId>/manifest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadManifest {
    /// The target key.
    pub key: String,
    /// Declared content type.
    pub content_type: Option<String>,
    /// User metadata for the final object.
    pub user_metadata: HashMap<String, String>,
    /// Creation timestamp.
    pub initiated: DateTime<Utc>,
    /// Staged parts by part number.
    pub parts: BTreeMap<u32, PartRecord>,
}

impl MultipartUpload {
    /// Build the manifest view of this upload.
    #[must_use]
    pub fn manifest(&self) -> UploadManifest {
        UploadManifest {
            key: self.key.clone(),
            content_type: self.content_type.clone(),
            user_metadata: self.user_metadata.clone(),
            initiated: self.initiated,
            parts: self.parts.clone(),
        }
    }

    /// Rehydrate an upload from its manifest.
    #[must_use]
    pub fn from_manifest(bucket: &str, upload_id: &str, manifest: UploadManifest) -> Self {
        Self {
            upload_id: upload_id.to_owned(),
            bucket: bucket.to_owned(),
            key: manifest.key,
            content_type: manifest.content_type,
            user_metadata: manifest.user_metadata,
            initiated: manifest.initiated,
            parts: manifest.parts,
        }
    }
}

/// Process-wide registry of open uploads, keyed by upload id.
#[derive(Debug, Default)]
pub struct UploadRegistry {
    uploads: DashMap<String, MultipartUpload>,
}

impl UploadRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an upload.
    pub fn insert(&self, upload: MultipartUpload) {
        self.uploads.insert(upload.upload_id.clone(), upload);
    }

    /// Snapshot an upload by id.
    #[must_use]
    pub fn get(&self, upload_id: &str) -> Option<MultipartUpload> {
        self.uploads.get(upload_id).map(|entry| entry.clone())
    }

    /// Record (or replace) a staged part. Returns the updated upload,
    /// or `None` if the upload is gone.
    #[must_use]
    pub fn put_part(&self, upload_id: &str, part: PartRecord) -> Option<MultipartUpload> {
        let mut entry = self.uploads.get_mut(upload_id)?;
        entry.parts.insert(part.part_number, part);
        Some(entry.clone())
    }

    /// Remove an upload (Complete or Abort). Returns the removed state.
    #[must_use]
    pub fn remove(&self, upload_id: &str) -> Option<MultipartUpload> {
        self.uploads.remove(upload_id).map(|(_, upload)| upload)
    }

    /// Open uploads in a bucket, ordered by (key, initiated).
    #[must_use]
    pub fn list_for_bucket(&self, bucket: &str) -> Vec<MultipartUpload> {
        let mut uploads: Vec<MultipartUpload> = self
            .uploads
            .iter()
            .filter(|entry| entry.bucket == bucket)
            .map(|entry| entry.clone())
            .collect();
        uploads.sort_by(|a, b| a.key.cmp(&b.key).then(a.initiated.cmp(&b.initiated)));
        uploads
    }

    /// Drop every upload belonging to a bucket (bucket force-delete).
    pub fn remove_bucket(&self, bucket: &str) {
        self.uploads.retain(|_, upload| upload.bucket != bucket);
    }
}
