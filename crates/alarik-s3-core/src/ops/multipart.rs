//! The multipart upload coordinator.
//!
//! Uploads move through a single OPEN state: parts may be uploaded and
//! replaced until the upload is completed (publishing an object
//! version) or aborted (dropping the staging directory). Distinct part
//! numbers never contend; manifest rewrites are serialized per upload.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info};

use alarik_core::types::{NULL_VERSION_ID, ObjectVersionRecord, VersioningStatus};
use alarik_s3_model::error::{S3Error, S3ErrorCode};
use alarik_s3_model::types::{
    CompleteMultipartUploadResult, CompletedMultipartUpload, InitiateMultipartUploadResult,
    ListMultipartUploadsResult, ListPartsResult, PartEntry, UploadEntry,
};

use crate::checksums::{multipart_etag, quote_etag, unquote_etag};
use crate::service::{AlarikS3, AuthContext};
use crate::uploads::{MultipartUpload, PartRecord};
use crate::utils::{generate_upload_id, generate_version_id};
use crate::validation::validate_object_key;

use super::internal_error;
use super::object::PutObjectParams;

/// Minimum size of any non-final part, enforced at Complete.
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Valid part number range.
const PART_NUMBER_RANGE: std::ops::RangeInclusive<u32> = 1..=10_000;

impl AlarikS3 {
    /// Open a new multipart upload.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `InvalidArgument` (bad key), or
    /// `InternalError`.
    pub async fn create_multipart_upload(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        key: &str,
        params: PutObjectParams,
    ) -> Result<InitiateMultipartUploadResult, S3Error> {
        validate_object_key(key)?;
        self.require_bucket(auth, bucket_name)?;

        let upload = MultipartUpload {
            upload_id: generate_upload_id(),
            bucket: bucket_name.to_owned(),
            key: key.to_owned(),
            content_type: params.content_type,
            user_metadata: params.user_metadata,
            initiated: Utc::now(),
            parts: BTreeMap::new(),
        };

        self.fs()
            .write_manifest(bucket_name, &upload.upload_id, &upload.manifest())
            .await
            .map_err(internal_error)?;
        let upload_id = upload.upload_id.clone();
        self.uploads.insert(upload);

        info!(bucket = bucket_name, key, upload_id = %upload_id, "created multipart upload");
        Ok(InitiateMultipartUploadResult {
            bucket: bucket_name.to_owned(),
            key: key.to_owned(),
            upload_id,
        })
    }

    /// Stage one part. Re-uploading a part number atomically replaces
    /// the staged file and its ETag.
    ///
    /// # Errors
    ///
    /// `NoSuchUpload`, `InvalidArgument` for a part number outside
    /// `[1, 10000]` or an empty body, or `InternalError`.
    pub async fn upload_part(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String, S3Error> {
        self.require_bucket(auth, bucket_name)?;

        if !PART_NUMBER_RANGE.contains(&part_number) {
            return Err(S3Error::invalid_argument(
                "Part number must be an integer between 1 and 10000, inclusive",
            ));
        }
        if data.is_empty() {
            return Err(S3Error::invalid_argument("Part body must not be empty"));
        }

        let upload = self
            .uploads
            .get(upload_id)
            .filter(|u| u.bucket == bucket_name)
            .ok_or_else(|| S3Error::no_such_upload(upload_id))?;

        let (md5_hex, size) = self
            .fs()
            .write_part(bucket_name, upload_id, part_number, &data)
            .await
            .map_err(internal_error)?;

        let part = PartRecord {
            part_number,
            size,
            etag: md5_hex.clone(),
            last_modified: Utc::now(),
        };

        // Manifest rewrites are serialized per upload id; concurrent
        // parts of the same upload would otherwise race the sidecar.
        let _manifest_guard = self.locks.lock(bucket_name, upload_id).await;
        let updated = self
            .uploads
            .put_part(upload_id, part)
            .ok_or_else(|| S3Error::no_such_upload(upload_id))?;
        self.fs()
            .write_manifest(bucket_name, upload_id, &updated.manifest())
            .await
            .map_err(internal_error)?;

        debug!(
            bucket = bucket_name,
            key = %upload.key,
            upload_id,
            part_number,
            size,
            "staged part"
        );
        Ok(quote_etag(&md5_hex))
    }

    /// List staged parts in ascending part-number order.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, or `NoSuchUpload`.
    pub fn list_parts(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<ListPartsResult, S3Error> {
        self.require_bucket(auth, bucket_name)?;
        let upload = self
            .uploads
            .get(upload_id)
            .filter(|u| u.bucket == bucket_name)
            .ok_or_else(|| S3Error::no_such_upload(upload_id))?;

        Ok(ListPartsResult {
            bucket: bucket_name.to_owned(),
            key: key.to_owned(),
            upload_id: upload_id.to_owned(),
            parts: upload
                .parts
                .values()
                .map(|p| PartEntry {
                    part_number: p.part_number,
                    last_modified: p.last_modified,
                    etag: quote_etag(&p.etag),
                    size: p.size,
                })
                .collect(),
        })
    }

    /// List open uploads in the bucket in (key, initiated) order.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket` or `AccessDenied`.
    pub fn list_multipart_uploads(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
    ) -> Result<ListMultipartUploadsResult, S3Error> {
        self.require_bucket(auth, bucket_name)?;
        Ok(ListMultipartUploadsResult {
            bucket: bucket_name.to_owned(),
            uploads: self
                .uploads
                .list_for_bucket(bucket_name)
                .into_iter()
                .map(|u| UploadEntry {
                    key: u.key,
                    upload_id: u.upload_id,
                    initiated: u.initiated,
                })
                .collect(),
        })
    }

    /// Assemble the listed parts into the final object version.
    ///
    /// Validation, in order: the list is non-empty, part numbers are
    /// strictly ascending, every listed part exists with a matching
    /// ETag, and every non-final part is at least 5 MiB. On failure the
    /// upload stays OPEN and Complete may be retried.
    ///
    /// # Errors
    ///
    /// `NoSuchUpload`, `MalformedXML`, `InvalidPartOrder`,
    /// `InvalidPart`, `EntityTooSmall`, or `InternalError`.
    pub async fn complete_multipart_upload(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        key: &str,
        upload_id: &str,
        request: &CompletedMultipartUpload,
    ) -> Result<(CompleteMultipartUploadResult, Option<String>), S3Error> {
        let bucket = self.require_bucket(auth, bucket_name)?;
        let versioning = self.versioning_of(&bucket);

        let upload = self
            .uploads
            .get(upload_id)
            .filter(|u| u.bucket == bucket_name && u.key == key)
            .ok_or_else(|| S3Error::no_such_upload(upload_id))?;

        if request.parts.is_empty() {
            return Err(S3Error::new(S3ErrorCode::MalformedXML).with_resource(upload_id));
        }

        let mut previous = 0u32;
        let mut part_numbers = Vec::with_capacity(request.parts.len());
        let mut part_md5s = Vec::with_capacity(request.parts.len());
        for (index, requested) in request.parts.iter().enumerate() {
            if requested.part_number <= previous {
                return Err(S3Error::new(S3ErrorCode::InvalidPartOrder).with_resource(upload_id));
            }
            previous = requested.part_number;

            let staged = upload.parts.get(&requested.part_number).ok_or_else(|| {
                S3Error::with_message(
                    S3ErrorCode::InvalidPart,
                    format!("Part number {} was not uploaded", requested.part_number),
                )
            })?;
            if unquote_etag(&requested.etag) != staged.etag {
                return Err(S3Error::with_message(
                    S3ErrorCode::InvalidPart,
                    format!("ETag mismatch for part {}", requested.part_number),
                ));
            }

            let is_final = index + 1 == request.parts.len();
            if !is_final && staged.size < MIN_PART_SIZE {
                return Err(S3Error::new(S3ErrorCode::EntityTooSmall).with_resource(upload_id));
            }

            part_numbers.push(requested.part_number);
            part_md5s.push(staged.etag.clone());
        }

        let staged = self
            .fs()
            .assemble_parts(bucket_name, upload_id, key, &part_numbers)
            .await
            .map_err(internal_error)?;
        let etag = multipart_etag(&part_md5s);
        let size = staged.size;

        let version_id = match versioning {
            VersioningStatus::Enabled => generate_version_id(),
            VersioningStatus::Disabled | VersioningStatus::Suspended => {
                NULL_VERSION_ID.to_owned()
            }
        };

        // Publish under the per-key lock, exactly like a PUT.
        {
            let _guard = self.locks.lock(bucket_name, key).await;

            if versioning != VersioningStatus::Disabled {
                let previous_live = self
                    .store()
                    .latest_live_version(bucket_name, key)
                    .map_err(internal_error)?;
                if let Some(previous_live) = previous_live {
                    if previous_live.version_id != version_id {
                        self.fs()
                            .archive_canonical(bucket_name, key, &previous_live.version_id)
                            .await
                            .map_err(internal_error)?;
                    }
                }
            }

            let record = ObjectVersionRecord {
                bucket: bucket_name.to_owned(),
                key: key.to_owned(),
                version_id: version_id.clone(),
                size,
                content_type: upload.content_type.clone(),
                etag: etag.clone(),
                user_metadata: upload.user_metadata.clone(),
                last_modified: Utc::now(),
                is_delete_marker: false,
            };
            let target = self.fs().object_path(bucket_name, key);
            self.commit_record(record, staged, target).await?;
        }

        // The upload is gone once the version is durable.
        let _ = self.uploads.remove(upload_id);
        self.fs()
            .remove_upload_dir(bucket_name, upload_id)
            .await
            .map_err(internal_error)?;

        info!(
            bucket = bucket_name,
            key,
            upload_id,
            parts = part_numbers.len(),
            size,
            version_id = %version_id,
            "completed multipart upload"
        );

        let reported_version = match versioning {
            VersioningStatus::Disabled => None,
            _ => Some(version_id),
        };
        Ok((
            CompleteMultipartUploadResult {
                location: format!("/{bucket_name}/{key}"),
                bucket: bucket_name.to_owned(),
                key: key.to_owned(),
                etag: quote_etag(&etag),
            },
            reported_version,
        ))
    }

    /// Drop an open upload and its staging directory.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `NoSuchUpload`, or
    /// `InternalError`.
    pub async fn abort_multipart_upload(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        upload_id: &str,
    ) -> Result<(), S3Error> {
        self.require_bucket(auth, bucket_name)?;

        self.uploads
            .get(upload_id)
            .filter(|u| u.bucket == bucket_name)
            .ok_or_else(|| S3Error::no_such_upload(upload_id))?;
        let _ = self.uploads.remove(upload_id);
        self.fs()
            .remove_upload_dir(bucket_name, upload_id)
            .await
            .map_err(internal_error)?;

        info!(bucket = bucket_name, upload_id, "aborted multipart upload");
        Ok(())
    }
}
