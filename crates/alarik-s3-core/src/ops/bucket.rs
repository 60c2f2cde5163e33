//! Bucket operations: create, delete, head, versioning, location,
//! and the service-level bucket listing.

use chrono::Utc;
use tracing::{info, warn};

use alarik_core::types::{BucketRecord, VersioningStatus};
use alarik_s3_model::error::{S3Error, S3ErrorCode};
use alarik_s3_model::types::{
    BucketSummary, ListAllMyBucketsResult, Owner, VersioningConfiguration,
};

use crate::service::{AlarikS3, AuthContext};
use crate::validation::validate_bucket_name;

use super::internal_error;

impl AlarikS3 {
    /// Create a bucket owned by the caller.
    ///
    /// The directory is created before the row; any failure after that
    /// removes the directory again so the row-iff-directory invariant
    /// holds.
    ///
    /// # Errors
    ///
    /// `InvalidBucketName`, `BucketAlreadyExists`, or `InternalError`.
    pub async fn create_bucket(&self, auth: &AuthContext, name: &str) -> Result<(), S3Error> {
        validate_bucket_name(name)?;

        if self
            .store()
            .bucket(name)
            .map_err(internal_error)?
            .is_some()
        {
            return Err(S3Error::new(S3ErrorCode::BucketAlreadyExists).with_resource(name));
        }

        self.fs().create_bucket_dir(name).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                S3Error::new(S3ErrorCode::BucketAlreadyExists).with_resource(name)
            } else {
                internal_error(e)
            }
        })?;

        let record = BucketRecord {
            name: name.to_owned(),
            user_id: auth.user_id,
            created_at: Utc::now(),
            versioning: VersioningStatus::Disabled,
        };
        if let Err(e) = self.store().create_bucket(&record) {
            // Roll the directory back; losing the race to another
            // creator surfaces as BucketAlreadyExists.
            if let Err(rm) = self.fs().remove_bucket_dir(name).await {
                warn!(bucket = name, error = %rm, "failed to roll back bucket directory");
            }
            return Err(match e {
                alarik_core::MetadataError::AlreadyExists { .. } => {
                    S3Error::new(S3ErrorCode::BucketAlreadyExists).with_resource(name)
                }
                other => internal_error(other),
            });
        }

        self.cache()
            .add_bucket(auth.user_id, name, VersioningStatus::Disabled);

        info!(bucket = name, owner = auth.user_id, "created bucket");
        Ok(())
    }

    /// Delete a bucket.
    ///
    /// Without `force`, the bucket must hold no live objects. With
    /// `force` (admin routes), every version row and the whole
    /// directory are cascaded away. Cache entries go first, the row and
    /// directory last.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `BucketNotEmpty`, or
    /// `InternalError`.
    pub async fn delete_bucket(
        &self,
        auth: &AuthContext,
        name: &str,
        force: bool,
    ) -> Result<(), S3Error> {
        self.require_bucket(auth, name)?;

        if !force {
            let live = self
                .store()
                .count_live_objects(name)
                .map_err(internal_error)?;
            if live > 0 {
                return Err(S3Error::new(S3ErrorCode::BucketNotEmpty).with_resource(name));
            }
        }

        self.cache().remove_bucket(name);
        self.uploads.remove_bucket(name);
        self.store().delete_bucket(name).map_err(internal_error)?;
        self.fs()
            .remove_bucket_dir(name)
            .await
            .map_err(internal_error)?;

        info!(bucket = name, force, "deleted bucket");
        Ok(())
    }

    /// Existence and access probe.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket` or `AccessDenied`.
    pub fn head_bucket(&self, auth: &AuthContext, name: &str) -> Result<(), S3Error> {
        self.require_bucket(auth, name).map(|_| ())
    }

    /// List the caller's buckets (all buckets for admins).
    ///
    /// # Errors
    ///
    /// `InternalError` on store failure.
    pub fn list_buckets(&self, auth: &AuthContext) -> Result<ListAllMyBucketsResult, S3Error> {
        let owner_filter = if auth.is_admin {
            None
        } else {
            Some(auth.user_id)
        };
        let buckets = self
            .store()
            .list_buckets(owner_filter)
            .map_err(internal_error)?;

        let display_name = self
            .store()
            .user_by_id(auth.user_id)
            .map_err(internal_error)?
            .map(|u| u.username)
            .unwrap_or_default();

        Ok(ListAllMyBucketsResult {
            owner: Owner {
                id: auth.user_id.to_string(),
                display_name,
            },
            buckets: buckets
                .into_iter()
                .map(|b| BucketSummary {
                    name: b.name,
                    creation_date: b.created_at,
                })
                .collect(),
        })
    }

    /// Report the bucket's versioning configuration. A bucket that
    /// never had versioning enabled reports no `Status`.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket` or `AccessDenied`.
    pub fn get_bucket_versioning(
        &self,
        auth: &AuthContext,
        name: &str,
    ) -> Result<VersioningConfiguration, S3Error> {
        let bucket = self.require_bucket(auth, name)?;
        let status = match self.versioning_of(&bucket) {
            VersioningStatus::Disabled => None,
            status => Some(status.as_str().to_owned()),
        };
        Ok(VersioningConfiguration { status })
    }

    /// Apply a versioning configuration.
    ///
    /// Permitted transitions: `Disabled -> Enabled`,
    /// `Enabled <-> Suspended`, `Disabled -> Suspended`. A bucket never
    /// returns to `Disabled` (the wire format cannot even express it).
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `MalformedXML` for an unknown
    /// status value, or `InternalError`.
    pub fn put_bucket_versioning(
        &self,
        auth: &AuthContext,
        name: &str,
        config: &VersioningConfiguration,
    ) -> Result<(), S3Error> {
        let bucket = self.require_bucket(auth, name)?;

        let target = match config.status.as_deref() {
            Some("Enabled") => VersioningStatus::Enabled,
            Some("Suspended") => VersioningStatus::Suspended,
            _ => return Err(S3Error::new(S3ErrorCode::MalformedXML).with_resource(name)),
        };

        if bucket.versioning == target {
            return Ok(());
        }

        self.store()
            .set_bucket_versioning(name, target)
            .map_err(internal_error)?;
        self.cache().set_versioning(name, target);

        info!(bucket = name, status = %target, "updated bucket versioning");
        Ok(())
    }

    /// The bucket's region.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket` or `AccessDenied`.
    pub fn get_bucket_location(&self, auth: &AuthContext, name: &str) -> Result<String, S3Error> {
        self.require_bucket(auth, name)?;
        Ok(self.region().to_owned())
    }
}
