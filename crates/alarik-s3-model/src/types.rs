//! Wire-level request and response body types.
//!
//! These are the shapes the XML codec reads and writes. They carry no
//! behavior; the service core fills them in and the HTTP layer serializes
//! them.

use chrono::{DateTime, Utc};

/// Bucket or object owner, as reported in listings.
#[derive(Debug, Clone, Default)]
pub struct Owner {
    /// Owner id (Alarik uses the numeric user id, stringified).
    pub id: String,
    /// Display name (the username).
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// ListBuckets
// ---------------------------------------------------------------------------

/// One bucket in a `ListAllMyBucketsResult`.
#[derive(Debug, Clone)]
pub struct BucketSummary {
    /// The bucket name.
    pub name: String,
    /// Creation timestamp.
    pub creation_date: DateTime<Utc>,
}

/// Body of `GET /` (ListBuckets).
#[derive(Debug, Clone)]
pub struct ListAllMyBucketsResult {
    /// The requesting owner.
    pub owner: Owner,
    /// The owner's buckets.
    pub buckets: Vec<BucketSummary>,
}

// ---------------------------------------------------------------------------
// ListObjectsV2
// ---------------------------------------------------------------------------

/// One object in a `ListBucketResult`.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    /// The object key.
    pub key: String,
    /// Last-modified timestamp.
    pub last_modified: DateTime<Utc>,
    /// Quoted ETag.
    pub etag: String,
    /// Object size in bytes.
    pub size: u64,
}

/// A grouped common prefix (delimiter listing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonPrefix {
    /// The prefix, ending with the delimiter.
    pub prefix: String,
}

/// Body of `GET /{bucket}?list-type=2`.
#[derive(Debug, Clone)]
pub struct ListBucketResult {
    /// The bucket name.
    pub name: String,
    /// The request prefix.
    pub prefix: String,
    /// The request delimiter, if any.
    pub delimiter: Option<String>,
    /// The effective max-keys.
    pub max_keys: u64,
    /// Number of keys plus common prefixes returned.
    pub key_count: u64,
    /// Whether more results remain.
    pub is_truncated: bool,
    /// Echo of the request continuation token.
    pub continuation_token: Option<String>,
    /// Token for the next page, when truncated.
    pub next_continuation_token: Option<String>,
    /// Echo of start-after.
    pub start_after: Option<String>,
    /// The returned objects, in bytewise key order.
    pub contents: Vec<ObjectSummary>,
    /// Deduplicated common prefixes.
    pub common_prefixes: Vec<CommonPrefix>,
}

// ---------------------------------------------------------------------------
// ListObjectVersions
// ---------------------------------------------------------------------------

/// A real (non-delete-marker) version in a `ListVersionsResult`.
#[derive(Debug, Clone)]
pub struct VersionEntry {
    /// The object key.
    pub key: String,
    /// The version id.
    pub version_id: String,
    /// Whether this is the most recent version of the key.
    pub is_latest: bool,
    /// Last-modified timestamp.
    pub last_modified: DateTime<Utc>,
    /// Quoted ETag.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
}

/// A delete marker in a `ListVersionsResult`.
#[derive(Debug, Clone)]
pub struct DeleteMarkerEntry {
    /// The object key.
    pub key: String,
    /// The marker's version id.
    pub version_id: String,
    /// Whether the marker is the most recent version of the key.
    pub is_latest: bool,
    /// Creation timestamp of the marker.
    pub last_modified: DateTime<Utc>,
}

/// Body of `GET /{bucket}?versions`.
#[derive(Debug, Clone)]
pub struct ListVersionsResult {
    /// The bucket name.
    pub name: String,
    /// The request prefix.
    pub prefix: String,
    /// Echo of the key marker.
    pub key_marker: Option<String>,
    /// The effective max-keys.
    pub max_keys: u64,
    /// Whether more results remain.
    pub is_truncated: bool,
    /// Key marker for the next page, when truncated.
    pub next_key_marker: Option<String>,
    /// Real versions, key ascending then newest first.
    pub versions: Vec<VersionEntry>,
    /// Delete markers, same order.
    pub delete_markers: Vec<DeleteMarkerEntry>,
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

/// Body of `POST /{bucket}/{key}?uploads`.
#[derive(Debug, Clone)]
pub struct InitiateMultipartUploadResult {
    /// The bucket name.
    pub bucket: String,
    /// The object key.
    pub key: String,
    /// The new upload id.
    pub upload_id: String,
}

/// Body of a successful `CompleteMultipartUpload`.
#[derive(Debug, Clone)]
pub struct CompleteMultipartUploadResult {
    /// Location URL of the new object.
    pub location: String,
    /// The bucket name.
    pub bucket: String,
    /// The object key.
    pub key: String,
    /// The composite ETag (`"<hex>-<n>"`).
    pub etag: String,
}

/// One part in a `ListPartsResult`.
#[derive(Debug, Clone)]
pub struct PartEntry {
    /// The part number (1..=10000).
    pub part_number: u32,
    /// When the part was uploaded.
    pub last_modified: DateTime<Utc>,
    /// Quoted hex-MD5 ETag of the part bytes.
    pub etag: String,
    /// Part size in bytes.
    pub size: u64,
}

/// Body of `GET /{bucket}/{key}?uploadId=ID`.
#[derive(Debug, Clone)]
pub struct ListPartsResult {
    /// The bucket name.
    pub bucket: String,
    /// The object key.
    pub key: String,
    /// The upload id.
    pub upload_id: String,
    /// Parts in ascending part-number order.
    pub parts: Vec<PartEntry>,
}

/// One in-progress upload in a `ListMultipartUploadsResult`.
#[derive(Debug, Clone)]
pub struct UploadEntry {
    /// The object key the upload targets.
    pub key: String,
    /// The upload id.
    pub upload_id: String,
    /// When the upload was created.
    pub initiated: DateTime<Utc>,
}

/// Body of `GET /{bucket}?uploads`.
#[derive(Debug, Clone)]
pub struct ListMultipartUploadsResult {
    /// The bucket name.
    pub bucket: String,
    /// Open uploads in (key, initiated) order.
    pub uploads: Vec<UploadEntry>,
}

/// Decoded body of `POST /{bucket}/{key}?uploadId=ID`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedMultipartUpload {
    /// The client-supplied part list, in the order given.
    pub parts: Vec<CompletedPart>,
}

/// One `(partNumber, ETag)` tuple in a complete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// The part number.
    pub part_number: u32,
    /// The client-claimed ETag for the part.
    pub etag: String,
}

// ---------------------------------------------------------------------------
// CopyObject
// ---------------------------------------------------------------------------

/// Body of a successful `CopyObject`.
#[derive(Debug, Clone)]
pub struct CopyObjectResult {
    /// ETag of the destination object.
    pub etag: String,
    /// Last-modified of the destination object.
    pub last_modified: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// DeleteObjects
// ---------------------------------------------------------------------------

/// Decoded body of `POST /{bucket}?delete`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delete {
    /// The objects to remove.
    pub objects: Vec<ObjectIdentifier>,
    /// Quiet mode suppresses per-key success entries.
    pub quiet: bool,
}

/// One object in a batch delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIdentifier {
    /// The object key.
    pub key: String,
    /// An explicit version to delete, if given.
    pub version_id: Option<String>,
}

/// One successful entry in a `DeleteResult`.
#[derive(Debug, Clone)]
pub struct DeletedObject {
    /// The deleted key.
    pub key: String,
    /// Version id removed, if an explicit version was named.
    pub version_id: Option<String>,
    /// Whether a delete marker was created (or removed).
    pub delete_marker: bool,
    /// The delete marker's version id, if one was created.
    pub delete_marker_version_id: Option<String>,
}

/// One failed entry in a `DeleteResult`.
#[derive(Debug, Clone)]
pub struct DeleteErrorEntry {
    /// The key that failed.
    pub key: String,
    /// The S3 error code.
    pub code: String,
    /// The error message.
    pub message: String,
}

/// Body of a `DeleteObjects` response.
#[derive(Debug, Clone, Default)]
pub struct DeleteResult {
    /// Successfully deleted entries (omitted in quiet mode).
    pub deleted: Vec<DeletedObject>,
    /// Per-key failures.
    pub errors: Vec<DeleteErrorEntry>,
}

// ---------------------------------------------------------------------------
// Versioning configuration
// ---------------------------------------------------------------------------

/// Decoded/encoded `VersioningConfiguration` body.
///
/// `status` is `None` for buckets that never had versioning enabled;
/// S3 omits the `Status` element in that case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersioningConfiguration {
    /// `"Enabled"` or `"Suspended"`.
    pub status: Option<String>,
}
