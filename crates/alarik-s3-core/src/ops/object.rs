//! Object operations: put, get/head, delete, copy, and batch delete.
//!
//! Writes and version-producing deletes for a `(bucket, key)` run under
//! the sharded per-key lock, so the version order recorded in metadata
//! matches the order responses are sent. Reads resolve by version id
//! and take no locks.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, error, info};

use alarik_core::MetadataError;
use alarik_core::types::{NULL_VERSION_ID, ObjectVersionRecord, VersioningStatus};
use alarik_s3_model::error::{S3Error, S3ErrorCode};
use alarik_s3_model::types::{
    CopyObjectResult, Delete, DeleteErrorEntry, DeleteResult, DeletedObject,
};

use crate::checksums::quote_etag;
use crate::service::{AlarikS3, AuthContext};
use crate::utils::{generate_version_id, parse_range};
use crate::validation::validate_object_key;

use super::internal_error;

/// Write-side attributes of a PUT (or the REPLACE arm of a copy).
#[derive(Debug, Clone, Default)]
pub struct PutObjectParams {
    /// Declared `Content-Type`.
    pub content_type: Option<String>,
    /// User metadata from `x-amz-meta-*`, keys lowercased.
    pub user_metadata: HashMap<String, String>,
}

/// Result of a successful PUT.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    /// Quoted ETag for the response header.
    pub etag: String,
    /// `x-amz-version-id` value, absent for non-versioned buckets.
    pub version_id: Option<String>,
}

/// A resolved object read.
#[derive(Debug)]
pub enum GetOutcome {
    /// The version exists and is a real object.
    Found(FoundObject),
    /// The resolved version is a delete marker. `explicit` is true when
    /// the client named the marker's version id (405); false when the
    /// current version happens to be a marker (404).
    DeleteMarker {
        /// The marker's version id.
        version_id: String,
        /// Whether the marker was addressed by version id.
        explicit: bool,
    },
}

/// A readable object version.
#[derive(Debug)]
pub struct FoundObject {
    /// The version record (etag unquoted, as stored).
    pub record: ObjectVersionRecord,
    /// The payload; `None` for HEAD.
    pub body: Option<Bytes>,
    /// `(start, end, total)` when a range was applied.
    pub content_range: Option<(u64, u64, u64)>,
}

/// Result of a DELETE.
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    /// The affected version id, when the bucket is versioned.
    pub version_id: Option<String>,
    /// Whether a delete marker was created (or an existing marker
    /// removed by a version-addressed delete).
    pub delete_marker: bool,
}

/// How a copy treats destination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataDirective {
    /// Carry the source object's content type and user metadata.
    #[default]
    Copy,
    /// Use the metadata supplied with the copy request.
    Replace,
}

impl AlarikS3 {
    // -----------------------------------------------------------------------
    // PUT
    // -----------------------------------------------------------------------

    /// Store an object.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `InvalidArgument` (bad key), or
    /// `InternalError`.
    pub async fn put_object(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        key: &str,
        data: Bytes,
        params: PutObjectParams,
    ) -> Result<PutOutcome, S3Error> {
        validate_object_key(key)?;
        let bucket = self.require_bucket(auth, bucket_name)?;
        let versioning = self.versioning_of(&bucket);

        let _guard = self.locks.lock(bucket_name, key).await;

        let target = self.fs().object_path(bucket_name, key);
        let staged = self
            .fs()
            .stage(&target, &data)
            .await
            .map_err(internal_error)?;

        let version_id = match versioning {
            VersioningStatus::Enabled => generate_version_id(),
            VersioningStatus::Disabled | VersioningStatus::Suspended => {
                NULL_VERSION_ID.to_owned()
            }
        };

        // Preserve the bytes of the previous canonical holder before the
        // rename overwrites them. Never applies to non-versioned buckets.
        if versioning != VersioningStatus::Disabled {
            let previous = self
                .store()
                .latest_live_version(bucket_name, key)
                .map_err(internal_error)?;
            if let Some(previous) = previous {
                if previous.version_id != version_id {
                    self.fs()
                        .archive_canonical(bucket_name, key, &previous.version_id)
                        .await
                        .map_err(internal_error)?;
                }
            }
        }

        let record = ObjectVersionRecord {
            bucket: bucket_name.to_owned(),
            key: key.to_owned(),
            version_id: version_id.clone(),
            size: staged.size,
            content_type: params.content_type,
            etag: staged.md5_hex.clone(),
            user_metadata: params.user_metadata,
            last_modified: Utc::now(),
            is_delete_marker: false,
        };

        self.commit_record(record.clone(), staged, target).await?;

        // A suspended-bucket overwrite of the "null" slot can leave a
        // stale archive entry or delete-marker sentinel behind.
        if version_id == NULL_VERSION_ID && versioning == VersioningStatus::Suspended {
            let _ = self
                .fs()
                .remove_version_file(bucket_name, key, NULL_VERSION_ID, false)
                .await;
            let _ = self
                .fs()
                .remove_version_file(bucket_name, key, NULL_VERSION_ID, true)
                .await;
        }

        debug!(
            bucket = bucket_name,
            key,
            version_id = %version_id,
            size = record.size,
            "put object"
        );

        let reported_version = match versioning {
            VersioningStatus::Disabled => None,
            _ => Some(version_id),
        };
        Ok(PutOutcome {
            etag: quote_etag(&record.etag),
            version_id: reported_version,
        })
    }

    /// Run the insert-publish-commit sequence on the blocking pool.
    pub(crate) async fn commit_record(
        &self,
        record: ObjectVersionRecord,
        staged: crate::storage::StagedFile,
        target: std::path::PathBuf,
    ) -> Result<(), S3Error> {
        let store = self.store().clone();
        let commit_target = target.clone();
        let result = tokio::task::spawn_blocking(move || {
            store.commit_version_with(&record, move || staged.persist(&commit_target))
        })
        .await
        .map_err(internal_error)?;

        match result {
            Ok(()) => Ok(()),
            Err(MetadataError::CommitFailedAfterPublish(e)) => {
                // Durable file without a record: remove the file so the
                // filesystem does not drift from metadata.
                let _ = tokio::fs::remove_file(&target).await;
                Err(internal_error(e))
            }
            Err(e) => Err(internal_error(e)),
        }
    }

    // -----------------------------------------------------------------------
    // GET / HEAD
    // -----------------------------------------------------------------------

    /// Resolve and read an object version.
    ///
    /// `version_id` of `None` resolves the current version. `range` is
    /// the raw `Range` header. `want_body` is false for HEAD.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `NoSuchKey`, `NoSuchVersion`,
    /// `InvalidRange`, or `InternalError` for a committed version whose
    /// file is missing.
    pub async fn get_object(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
        range: Option<&str>,
        want_body: bool,
    ) -> Result<GetOutcome, S3Error> {
        self.require_bucket(auth, bucket_name)?;

        let record = match version_id {
            Some(vid) => self
                .store()
                .version(bucket_name, key, vid)
                .map_err(internal_error)?
                .ok_or_else(|| S3Error::no_such_version(vid))?,
            None => self
                .store()
                .current_version(bucket_name, key)
                .map_err(internal_error)?
                .ok_or_else(|| S3Error::no_such_key(key))?,
        };

        if record.is_delete_marker {
            return Ok(GetOutcome::DeleteMarker {
                version_id: record.version_id,
                explicit: version_id.is_some(),
            });
        }

        let holds_canonical = self
            .store()
            .latest_live_version(bucket_name, key)
            .map_err(internal_error)?
            .is_some_and(|latest| latest.version_id == record.version_id);
        let path = self
            .fs()
            .version_file(bucket_name, key, &record.version_id, holds_canonical);

        let parsed_range = range.map(|r| parse_range(r, record.size)).transpose()?;
        let content_range = parsed_range.map(|(start, end)| (start, end, record.size));

        let body = if want_body {
            let data = self
                .fs()
                .read_file(&path, parsed_range)
                .await
                .map_err(|e| {
                    error!(
                        bucket = bucket_name,
                        key,
                        version_id = %record.version_id,
                        path = %path.display(),
                        error = %e,
                        "repair needed: committed version has no readable file"
                    );
                    internal_error(e)
                })?;
            Some(data)
        } else {
            None
        };

        Ok(GetOutcome::Found(FoundObject {
            record,
            body,
            content_range,
        }))
    }

    // -----------------------------------------------------------------------
    // DELETE
    // -----------------------------------------------------------------------

    /// Delete an object or a specific version.
    ///
    /// Without `version_id`: non-versioned buckets remove the file and
    /// record; versioned buckets insert a delete marker. With
    /// `version_id`: that version is permanently removed, repointing
    /// the canonical file when the current version was deleted.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `NoSuchVersion`, or
    /// `InternalError`.
    pub async fn delete_object(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<DeleteOutcome, S3Error> {
        validate_object_key(key)?;
        let bucket = self.require_bucket(auth, bucket_name)?;
        let versioning = self.versioning_of(&bucket);

        let _guard = self.locks.lock(bucket_name, key).await;

        if let Some(vid) = version_id {
            return self.delete_specific_version(bucket_name, key, vid).await;
        }

        match versioning {
            VersioningStatus::Disabled => {
                // Idempotent: deleting an absent key still succeeds.
                if let Some(record) = self
                    .store()
                    .version(bucket_name, key, NULL_VERSION_ID)
                    .map_err(internal_error)?
                {
                    self.store()
                        .delete_version(bucket_name, key, &record.version_id)
                        .map_err(internal_error)?;
                    self.fs()
                        .remove_canonical(bucket_name, key)
                        .await
                        .map_err(internal_error)?;
                }
                Ok(DeleteOutcome {
                    version_id: None,
                    delete_marker: false,
                })
            }
            VersioningStatus::Enabled | VersioningStatus::Suspended => {
                let marker_vid = if versioning == VersioningStatus::Enabled {
                    generate_version_id()
                } else {
                    // A suspended bucket's marker takes the "null" slot,
                    // permanently displacing any existing "null" version.
                    if let Some(null_version) = self
                        .store()
                        .version(bucket_name, key, NULL_VERSION_ID)
                        .map_err(internal_error)?
                    {
                        self.remove_version_row_and_bytes(bucket_name, key, &null_version)
                            .await?;
                    }
                    NULL_VERSION_ID.to_owned()
                };

                self.fs()
                    .write_delete_marker(bucket_name, key, &marker_vid)
                    .await
                    .map_err(internal_error)?;
                let record = ObjectVersionRecord {
                    bucket: bucket_name.to_owned(),
                    key: key.to_owned(),
                    version_id: marker_vid.clone(),
                    size: 0,
                    content_type: None,
                    etag: String::new(),
                    user_metadata: HashMap::new(),
                    last_modified: Utc::now(),
                    is_delete_marker: true,
                };
                self.store().put_version(&record).map_err(internal_error)?;

                info!(bucket = bucket_name, key, version_id = %marker_vid, "inserted delete marker");
                Ok(DeleteOutcome {
                    version_id: Some(marker_vid),
                    delete_marker: true,
                })
            }
        }
    }

    /// Permanently delete one version.
    async fn delete_specific_version(
        &self,
        bucket_name: &str,
        key: &str,
        vid: &str,
    ) -> Result<DeleteOutcome, S3Error> {
        let record = self
            .store()
            .version(bucket_name, key, vid)
            .map_err(internal_error)?
            .ok_or_else(|| S3Error::no_such_version(vid))?;

        self.remove_version_row_and_bytes(bucket_name, key, &record)
            .await?;

        info!(
            bucket = bucket_name,
            key,
            version_id = vid,
            delete_marker = record.is_delete_marker,
            "deleted version"
        );
        Ok(DeleteOutcome {
            version_id: Some(record.version_id),
            delete_marker: record.is_delete_marker,
        })
    }

    /// Remove a version row and its on-disk bytes, repointing the
    /// canonical file when the deleted version held it.
    async fn remove_version_row_and_bytes(
        &self,
        bucket_name: &str,
        key: &str,
        record: &ObjectVersionRecord,
    ) -> Result<(), S3Error> {
        let was_canonical_holder = !record.is_delete_marker
            && self
                .store()
                .latest_live_version(bucket_name, key)
                .map_err(internal_error)?
                .is_some_and(|latest| latest.version_id == record.version_id);

        self.store()
            .delete_version(bucket_name, key, &record.version_id)
            .map_err(|e| match e {
                MetadataError::NotFound { .. } => S3Error::no_such_version(&record.version_id),
                other => internal_error(other),
            })?;

        if record.is_delete_marker {
            self.fs()
                .remove_version_file(bucket_name, key, &record.version_id, true)
                .await
                .map_err(internal_error)?;
        } else if was_canonical_holder {
            let successor = self
                .store()
                .latest_live_version(bucket_name, key)
                .map_err(internal_error)?;
            match successor {
                Some(successor) => self
                    .fs()
                    .promote_archived(bucket_name, key, &successor.version_id)
                    .await
                    .map_err(internal_error)?,
                None => self
                    .fs()
                    .remove_canonical(bucket_name, key)
                    .await
                    .map_err(internal_error)?,
            }
        } else {
            self.fs()
                .remove_version_file(bucket_name, key, &record.version_id, false)
                .await
                .map_err(internal_error)?;
        }
        Ok(())
    }

    /// Batch delete. Failures are reported per key, never as a whole.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket` or `AccessDenied` for the bucket itself.
    pub async fn delete_objects(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        delete: Delete,
    ) -> Result<DeleteResult, S3Error> {
        self.require_bucket(auth, bucket_name)?;

        let mut result = DeleteResult::default();
        for object in delete.objects {
            match self
                .delete_object(auth, bucket_name, &object.key, object.version_id.as_deref())
                .await
            {
                Ok(outcome) => {
                    if !delete.quiet {
                        result.deleted.push(DeletedObject {
                            key: object.key,
                            version_id: object.version_id,
                            delete_marker: outcome.delete_marker,
                            delete_marker_version_id: if outcome.delete_marker {
                                outcome.version_id
                            } else {
                                None
                            },
                        });
                    }
                }
                Err(e) => result.errors.push(DeleteErrorEntry {
                    key: object.key,
                    code: e.code.as_str().to_owned(),
                    message: e.message,
                }),
            }
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // COPY
    // -----------------------------------------------------------------------

    /// Server-side copy.
    ///
    /// # Errors
    ///
    /// Source resolution errors (`NoSuchKey`, `NoSuchVersion`,
    /// `InvalidRequest` when the source is a delete marker addressed by
    /// version id), plus the destination's PUT errors.
    #[allow(clippy::too_many_arguments)]
    pub async fn copy_object(
        &self,
        auth: &AuthContext,
        src_bucket: &str,
        src_key: &str,
        src_version: Option<&str>,
        dst_bucket: &str,
        dst_key: &str,
        directive: MetadataDirective,
        params: PutObjectParams,
    ) -> Result<(CopyObjectResult, Option<String>), S3Error> {
        let source = self
            .get_object(auth, src_bucket, src_key, src_version, None, true)
            .await?;

        let source = match source {
            GetOutcome::Found(found) => found,
            GetOutcome::DeleteMarker { explicit: true, .. } => {
                return Err(S3Error::invalid_request(
                    "The source of a copy request may not be a delete marker",
                ));
            }
            GetOutcome::DeleteMarker { .. } => {
                return Err(S3Error::no_such_key(src_key));
            }
        };

        let effective = match directive {
            MetadataDirective::Copy => PutObjectParams {
                content_type: source.record.content_type.clone(),
                user_metadata: source.record.user_metadata.clone(),
            },
            MetadataDirective::Replace => params,
        };

        let body = source.body.unwrap_or_default();
        let outcome = self
            .put_object(auth, dst_bucket, dst_key, body, effective)
            .await?;

        Ok((
            CopyObjectResult {
                etag: outcome.etag.clone(),
                last_modified: Utc::now(),
            },
            outcome.version_id,
        ))
    }
}
