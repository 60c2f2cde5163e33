//! The set of S3 operations Alarik serves.

use std::fmt;

/// An S3 operation, identified by the router from the HTTP method, path
/// shape, query parameters, and headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S3Operation {
    // Service-level
    /// `GET /` — list the caller's buckets.
    ListBuckets,

    // Bucket-level
    /// `PUT /{bucket}` — create a bucket.
    CreateBucket,
    /// `DELETE /{bucket}` — delete an empty bucket.
    DeleteBucket,
    /// `HEAD /{bucket}` — existence/access probe.
    HeadBucket,
    /// `GET /{bucket}?location`.
    GetBucketLocation,
    /// `GET /{bucket}?versioning`.
    GetBucketVersioning,
    /// `PUT /{bucket}?versioning`.
    PutBucketVersioning,
    /// `GET /{bucket}?list-type=2`.
    ListObjectsV2,
    /// `GET /{bucket}?versions`.
    ListObjectVersions,
    /// `GET /{bucket}?uploads`.
    ListMultipartUploads,
    /// `POST /{bucket}?delete` — batch delete.
    DeleteObjects,

    // Object-level
    /// `PUT /{bucket}/{key}`.
    PutObject,
    /// `PUT /{bucket}/{key}` with `x-amz-copy-source`.
    CopyObject,
    /// `GET /{bucket}/{key}`.
    GetObject,
    /// `HEAD /{bucket}/{key}`.
    HeadObject,
    /// `DELETE /{bucket}/{key}`.
    DeleteObject,

    // Multipart
    /// `POST /{bucket}/{key}?uploads`.
    CreateMultipartUpload,
    /// `PUT /{bucket}/{key}?partNumber=N&uploadId=ID`.
    UploadPart,
    /// `POST /{bucket}/{key}?uploadId=ID`.
    CompleteMultipartUpload,
    /// `DELETE /{bucket}/{key}?uploadId=ID`.
    AbortMultipartUpload,
    /// `GET /{bucket}/{key}?uploadId=ID`.
    ListParts,
}

impl S3Operation {
    /// The operation name as used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListBuckets => "ListBuckets",
            Self::CreateBucket => "CreateBucket",
            Self::DeleteBucket => "DeleteBucket",
            Self::HeadBucket => "HeadBucket",
            Self::GetBucketLocation => "GetBucketLocation",
            Self::GetBucketVersioning => "GetBucketVersioning",
            Self::PutBucketVersioning => "PutBucketVersioning",
            Self::ListObjectsV2 => "ListObjectsV2",
            Self::ListObjectVersions => "ListObjectVersions",
            Self::ListMultipartUploads => "ListMultipartUploads",
            Self::DeleteObjects => "DeleteObjects",
            Self::PutObject => "PutObject",
            Self::CopyObject => "CopyObject",
            Self::GetObject => "GetObject",
            Self::HeadObject => "HeadObject",
            Self::DeleteObject => "DeleteObject",
            Self::CreateMultipartUpload => "CreateMultipartUpload",
            Self::UploadPart => "UploadPart",
            Self::CompleteMultipartUpload => "CompleteMultipartUpload",
            Self::AbortMultipartUpload => "AbortMultipartUpload",
            Self::ListParts => "ListParts",
        }
    }
}

impl fmt::Display for S3Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
