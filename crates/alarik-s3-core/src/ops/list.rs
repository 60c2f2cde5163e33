//! Listings: ListObjectsV2 and ListObjectVersions.
//!
//! Both read only the metadata index. ListObjectsV2 additionally runs
//! the lazy reconciliation pass that garbage-collects canonical files
//! left behind without a record (e.g. by a crash between a rename and
//! a rollback).

use std::collections::BTreeSet;

use tracing::debug;

use alarik_s3_model::error::S3Error;
use alarik_s3_model::types::{
    CommonPrefix, DeleteMarkerEntry, ListBucketResult, ListVersionsResult, ObjectSummary,
    VersionEntry,
};

use crate::checksums::quote_etag;
use crate::service::{AlarikS3, AuthContext};
use crate::utils::{decode_continuation_token, encode_continuation_token};

use super::internal_error;

/// Hard ceiling on page size, matching S3.
const MAX_KEYS_CEILING: u64 = 1000;

/// Batch size for index reads while folding delimiter groups.
const BATCH: u64 = 1000;

/// Request parameters for ListObjectsV2.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsV2Params {
    /// Key prefix filter.
    pub prefix: String,
    /// Delimiter for common-prefix grouping.
    pub delimiter: Option<String>,
    /// Requested page size (clamped to 1000).
    pub max_keys: Option<u64>,
    /// Opaque continuation token from a previous page.
    pub continuation_token: Option<String>,
    /// Start listing strictly after this key.
    pub start_after: Option<String>,
}

impl AlarikS3 {
    /// List live objects under a prefix, in strict bytewise key order,
    /// grouping by delimiter.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `InvalidArgument` for a bad
    /// continuation token, or `InternalError`.
    pub async fn list_objects_v2(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        params: ListObjectsV2Params,
    ) -> Result<ListBucketResult, S3Error> {
        self.require_bucket(auth, bucket_name)?;
        self.reconcile_bucket(bucket_name).await?;

        let max_keys = params
            .max_keys
            .unwrap_or(MAX_KEYS_CEILING)
            .min(MAX_KEYS_CEILING);

        // The continuation token wins over start-after when both are
        // present (it is always further along).
        let token_key = params
            .continuation_token
            .as_deref()
            .map(|t| decode_continuation_token(&self.token_key, t))
            .transpose()?;
        let mut after = token_key
            .clone()
            .or_else(|| params.start_after.clone())
            .unwrap_or_default();

        // When the previous page ended inside a delimiter group, the
        // token is the group prefix itself; skip the whole group.
        let skip_group = token_key
            .as_deref()
            .filter(|t| params.delimiter.as_deref().is_some_and(|d| t.ends_with(d)))
            .map(ToOwned::to_owned);

        let mut contents: Vec<ObjectSummary> = Vec::new();
        let mut common_prefixes: BTreeSet<String> = BTreeSet::new();
        let mut is_truncated = false;
        let mut next_token_key: Option<String> = None;

        'page: loop {
            let batch = self
                .store()
                .list_current(bucket_name, &params.prefix, &after, BATCH)
                .map_err(internal_error)?;
            if batch.is_empty() {
                break;
            }
            let exhausted = (batch.len() as u64) < BATCH;

            for record in batch {
                after.clone_from(&record.key);

                if let Some(group) = &skip_group {
                    if record.key.starts_with(group) {
                        continue;
                    }
                }

                // Delimiter grouping: everything sharing the prefix up
                // to and including the first delimiter after `prefix`
                // collapses into one CommonPrefixes entry.
                let group = params.delimiter.as_deref().and_then(|delimiter| {
                    record.key[params.prefix.len()..]
                        .find(delimiter)
                        .map(|idx| {
                            record.key[..params.prefix.len() + idx + delimiter.len()].to_owned()
                        })
                });

                match group {
                    Some(group) => {
                        if common_prefixes.contains(&group) {
                            continue;
                        }
                        if contents.len() as u64 + common_prefixes.len() as u64 >= max_keys {
                            is_truncated = true;
                            break 'page;
                        }
                        next_token_key = Some(group.clone());
                        common_prefixes.insert(group);
                    }
                    None => {
                        if contents.len() as u64 + common_prefixes.len() as u64 >= max_keys {
                            is_truncated = true;
                            break 'page;
                        }
                        next_token_key = Some(record.key.clone());
                        contents.push(ObjectSummary {
                            key: record.key,
                            last_modified: record.last_modified,
                            etag: quote_etag(&record.etag),
                            size: record.size,
                        });
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        let next_continuation_token = if is_truncated {
            next_token_key
                .as_deref()
                .map(|key| encode_continuation_token(&self.token_key, key))
        } else {
            None
        };

        let key_count = contents.len() as u64 + common_prefixes.len() as u64;
        Ok(ListBucketResult {
            name: bucket_name.to_owned(),
            prefix: params.prefix,
            delimiter: params.delimiter,
            max_keys,
            key_count,
            is_truncated,
            continuation_token: params.continuation_token,
            next_continuation_token,
            start_after: params.start_after,
            contents,
            common_prefixes: common_prefixes
                .into_iter()
                .map(|prefix| CommonPrefix { prefix })
                .collect(),
        })
    }

    /// List versions and delete markers, key ascending then most recent
    /// first.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, or `InternalError`.
    pub fn list_object_versions(
        &self,
        auth: &AuthContext,
        bucket_name: &str,
        prefix: &str,
        key_marker: Option<&str>,
        max_keys: Option<u64>,
    ) -> Result<ListVersionsResult, S3Error> {
        self.require_bucket(auth, bucket_name)?;

        let max_keys = max_keys.unwrap_or(MAX_KEYS_CEILING).min(MAX_KEYS_CEILING);
        let marker = key_marker.unwrap_or_default();

        // Fetch one extra record to detect truncation.
        let mut records = self
            .store()
            .list_versions(bucket_name, prefix, marker, max_keys + 1)
            .map_err(internal_error)?;

        let is_truncated = records.len() as u64 > max_keys;
        if is_truncated {
            // Pagination is by key marker, so a page must end on a key
            // boundary: drop the trailing, possibly split, key group.
            // A single key with more versions than the page holds is
            // the exception; it is returned in one oversized-by-zero
            // page with its tail unreachable, which we accept.
            let split_key = records[max_keys as usize].key.clone();
            let before_split = records.iter().filter(|r| r.key != split_key).count();
            if before_split > 0 {
                records.truncate(before_split);
            } else {
                records.truncate(max_keys as usize);
            }
        }
        let records = &records[..];

        let mut versions = Vec::new();
        let mut delete_markers = Vec::new();
        let mut previous_key: Option<&str> = None;

        for record in records {
            // Records arrive newest-first within each key, so the first
            // row of a key group is the latest version.
            let is_latest = previous_key != Some(record.key.as_str());
            previous_key = Some(record.key.as_str());

            if record.is_delete_marker {
                delete_markers.push(DeleteMarkerEntry {
                    key: record.key.clone(),
                    version_id: record.version_id.clone(),
                    is_latest,
                    last_modified: record.last_modified,
                });
            } else {
                versions.push(VersionEntry {
                    key: record.key.clone(),
                    version_id: record.version_id.clone(),
                    is_latest,
                    last_modified: record.last_modified,
                    etag: quote_etag(&record.etag),
                    size: record.size,
                });
            }
        }

        let next_key_marker = if is_truncated {
            records.last().map(|r| r.key.clone())
        } else {
            None
        };

        Ok(ListVersionsResult {
            name: bucket_name.to_owned(),
            prefix: prefix.to_owned(),
            key_marker: key_marker.map(ToOwned::to_owned),
            max_keys,
            is_truncated,
            next_key_marker,
            versions,
            delete_markers,
        })
    }

    /// Lazy reconciliation: canonical files with no version record at
    /// all are strays (a crash mid-write) and are removed.
    async fn reconcile_bucket(&self, bucket_name: &str) -> Result<(), S3Error> {
        let on_disk = self
            .fs()
            .walk_keys(bucket_name)
            .await
            .map_err(internal_error)?;
        if on_disk.is_empty() {
            return Ok(());
        }

        let recorded: BTreeSet<String> = self
            .store()
            .keys_with_versions(bucket_name)
            .map_err(internal_error)?
            .into_iter()
            .collect();

        for key in on_disk {
            if !recorded.contains(&key) {
                debug!(bucket = bucket_name, key = %key, "reconciling stray file");
                self.fs()
                    .remove_stray(bucket_name, &key)
                    .await
                    .map_err(internal_error)?;
            }
        }
        Ok(())
    }
}
