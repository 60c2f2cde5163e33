//! The on-disk storage layout.
//!
//! Below the configured root, each bucket owns one directory. Within a
//! bucket:
//!
//! ```text
//! <root>/<bucket>/<key...>                              canonical files
//! <root>/<bucket>/.versions/<sha256(key)>/<version-id>  archived versions
//! <root>/<bucket>/.versions/<sha256(key)>/<vid>.delmark delete markers
//! <root>/<bucket>/.multipart/<uploadId>/<partNumber>    staged parts
//! <root>/<bucket>/.multipart/<uploadId>/manifest        upload manifest
//! ```
//!
//! Every write stages to `<target>.tmp.<rand>` and renames into place.
//! Staged files carry a drop guard, so an abandoned write (error,
//! cancellation, request deadline) leaves no temp file behind.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, trace, warn};

use sha2::{Digest, Sha256};

use crate::checksums::Md5Stream;
use crate::uploads::{MultipartUpload, UploadManifest};
use crate::utils::temp_suffix;

/// Internal directory for archived versions and delete markers.
const VERSIONS_DIR: &str = ".versions";

/// Internal directory for multipart staging.
const MULTIPART_DIR: &str = ".multipart";

/// Suffix marking a zero-byte delete-marker sentinel.
const DELMARK_SUFFIX: &str = ".delmark";

// ---------------------------------------------------------------------------
// StagedFile
// ---------------------------------------------------------------------------

/// A fully written temp file awaiting its rename into place.
///
/// Dropping a staged file that was never persisted removes the temp
/// file, which is what cleans up after mid-request failures.
#[derive(Debug)]
pub struct StagedFile {
    path: Option<PathBuf>,
    /// Unquoted hex MD5 of the staged bytes.
    pub md5_hex: String,
    /// Size of the staged bytes.
    pub size: u64,
}

impl StagedFile {
    /// The temp path, while not yet persisted.
    ///
    /// # Panics
    ///
    /// Panics if called after [`StagedFile::persist`].
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_deref().expect("staged file already persisted")
    }

    /// Rename the staged file into its final location. Synchronous by
    /// design: this is the publish step that runs between a metadata
    /// insert and commit.
    ///
    /// # Errors
    ///
    /// Returns the rename error; the temp file is removed either way.
    pub fn persist(mut self, target: &Path) -> io::Result<()> {
        let path = self.path.take().expect("staged file already persisted");
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&path, target).inspect_err(|_| {
            let _ = std::fs::remove_file(&path);
        })
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove staged temp file");
                }
            } else {
                trace!(path = %path.display(), "removed abandoned staged file");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FsStore
// ---------------------------------------------------------------------------

/// Filesystem storage rooted at a configured directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store over `root`. The directory must already exist (the
    /// binary checks accessibility at startup).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    // -----------------------------------------------------------------------
    // Path mapping
    // -----------------------------------------------------------------------

    /// The directory for a bucket.
    #[must_use]
    pub fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    /// The canonical (mirrored) path of a key. The key must already have
    /// passed [`crate::validation::validate_object_key`].
    #[must_use]
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.bucket_dir(bucket);
        for segment in key.split('/') {
            path.push(segment);
        }
        path
    }

    /// The per-key archive directory, named by the SHA-256 of the key.
    #[must_use]
    pub fn versions_dir(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_dir(bucket)
            .join(VERSIONS_DIR)
            .join(hex::encode(Sha256::digest(key.as_bytes())))
    }

    /// The archived file for one version.
    #[must_use]
    pub fn version_path(&self, bucket: &str, key: &str, version_id: &str) -> PathBuf {
        self.versions_dir(bucket, key).join(version_id)
    }

    /// The zero-byte sentinel for a delete marker.
    #[must_use]
    pub fn delete_marker_path(&self, bucket: &str, key: &str, version_id: &str) -> PathBuf {
        self.versions_dir(bucket, key)
            .join(format!("{version_id}{DELMARK_SUFFIX}"))
    }

    /// The staging directory of a multipart upload.
    #[must_use]
    pub fn multipart_dir(&self, bucket: &str, upload_id: &str) -> PathBuf {
        self.bucket_dir(bucket).join(MULTIPART_DIR).join(upload_id)
    }

    /// The staged file of one part.
    #[must_use]
    pub fn part_path(&self, bucket: &str, upload_id: &str, part_number: u32) -> PathBuf {
        self.multipart_dir(bucket, upload_id)
            .join(part_number.to_string())
    }

    /// Where a version's bytes live: the canonical path if this version
    /// currently holds the canonical file, the archive otherwise.
    #[must_use]
    pub fn version_file(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        holds_canonical: bool,
    ) -> PathBuf {
        if holds_canonical {
            self.object_path(bucket, key)
        } else {
            self.version_path(bucket, key, version_id)
        }
    }

    // -----------------------------------------------------------------------
    // Bucket directories
    // -----------------------------------------------------------------------

    /// Create a bucket directory.
    ///
    /// # Errors
    ///
    /// Propagates the `mkdir` error.
    pub async fn create_bucket_dir(&self, bucket: &str) -> io::Result<()> {
        tokio::fs::create_dir(self.bucket_dir(bucket)).await
    }

    /// Recursively remove a bucket directory, tolerating absence.
    ///
    /// # Errors
    ///
    /// Propagates removal errors other than `NotFound`.
    pub async fn remove_bucket_dir(&self, bucket: &str) -> io::Result<()> {
        match tokio::fs::remove_dir_all(self.bucket_dir(bucket)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // Staged writes
    // -----------------------------------------------------------------------

    /// Write `data` to `<target>.tmp.<rand>`, computing the MD5 along
    /// the way. The parent directory is created if needed.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors; no temp file is left behind on failure.
    pub async fn stage(&self, target: &Path, data: &Bytes) -> io::Result<StagedFile> {
        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no file name"))?;
        let temp_path = target.with_file_name(format!("{file_name}.tmp.{}", temp_suffix()));

        if let Some(parent) = temp_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut md5 = Md5Stream::new();
        md5.update(data);

        let mut file = tokio::fs::File::create(&temp_path).await.inspect_err(|e| {
            warn!(path = %temp_path.display(), error = %e, "failed to create temp file");
        })?;
        // From here on the guard owns cleanup of the temp file.
        let mut staged = StagedFile {
            path: Some(temp_path),
            md5_hex: String::new(),
            size: data.len() as u64,
        };
        file.write_all(data).await?;
        file.sync_all().await?;

        staged.md5_hex = md5.finish_hex();
        Ok(staged)
    }

    // -----------------------------------------------------------------------
    // Version archive
    // -----------------------------------------------------------------------

    /// Preserve the current canonical bytes of `key` under the archive
    /// entry for `version_id`, before the canonical file is overwritten.
    ///
    /// Uses a hard link; falls back to a copy when the link fails (e.g.
    /// crossing filesystems). Replaces any stale archive entry.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the link/copy.
    pub async fn archive_canonical(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> io::Result<()> {
        let canonical = self.object_path(bucket, key);
        let archive = self.version_path(bucket, key, version_id);
        if let Some(parent) = archive.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::remove_file(&archive).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        match tokio::fs::hard_link(&canonical, &archive).await {
            Ok(()) => Ok(()),
            Err(link_err) => {
                debug!(
                    bucket, key, version_id, error = %link_err,
                    "hard link failed, copying archive instead"
                );
                tokio::fs::copy(&canonical, &archive).await.map(|_| ())
            }
        }
    }

    /// Write the zero-byte sentinel for a delete marker.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors.
    pub async fn write_delete_marker(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> io::Result<()> {
        let path = self.delete_marker_path(bucket, key, version_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, b"").await
    }

    /// Remove the on-disk trace of one version (archive file or delete
    /// marker sentinel). Tolerates absence.
    ///
    /// # Errors
    ///
    /// Propagates removal errors other than `NotFound`.
    pub async fn remove_version_file(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        is_delete_marker: bool,
    ) -> io::Result<()> {
        let path = if is_delete_marker {
            self.delete_marker_path(bucket, key, version_id)
        } else {
            self.version_path(bucket, key, version_id)
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Repoint the canonical file from an archived version (after the
    /// canonical-holding version was deleted). The rename atomically
    /// replaces the canonical bytes.
    ///
    /// # Errors
    ///
    /// Propagates the rename error.
    pub async fn promote_archived(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> io::Result<()> {
        let archive = self.version_path(bucket, key, version_id);
        let canonical = self.object_path(bucket, key);
        if let Some(parent) = canonical.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&archive, &canonical).await
    }

    /// Remove the canonical file of a key and prune now-empty parent
    /// directories up to the bucket root.
    ///
    /// # Errors
    ///
    /// Propagates removal errors other than `NotFound`.
    pub async fn remove_canonical(&self, bucket: &str, key: &str) -> io::Result<()> {
        let path = self.object_path(bucket, key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        }

        // Best-effort cleanup of empty key-mirror directories.
        let bucket_dir = self.bucket_dir(bucket);
        let mut dir = path.parent().map(Path::to_path_buf);
        while let Some(current) = dir {
            if current == bucket_dir {
                break;
            }
            if tokio::fs::remove_dir(&current).await.is_err() {
                break;
            }
            dir = current.parent().map(Path::to_path_buf);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Read a file, optionally restricted to an inclusive byte range.
    ///
    /// # Errors
    ///
    /// Propagates open/seek/read errors; the caller maps a missing file
    /// on a committed version to `InternalError`.
    pub async fn read_file(&self, path: &Path, range: Option<(u64, u64)>) -> io::Result<Bytes> {
        let mut file = tokio::fs::File::open(path).await?;
        match range {
            Some((start, end)) => {
                let len = usize::try_from(end - start + 1)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "range too large"))?;
                file.seek(io::SeekFrom::Start(start)).await?;
                let mut buf = vec![0u8; len];
                file.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
            None => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Multipart staging
    // -----------------------------------------------------------------------

    /// Persist the manifest sidecar for an upload (atomically, like any
    /// other write).
    ///
    /// # Errors
    ///
    /// Propagates I/O and serialization errors.
    pub async fn write_manifest(
        &self,
        bucket: &str,
        upload_id: &str,
        manifest: &UploadManifest,
    ) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let target = self.multipart_dir(bucket, upload_id).join("manifest");
        let staged = self.stage(&target, &Bytes::from(json)).await?;
        staged.persist(&target)
    }

    /// Stage a part body and rename it to its part-number file name.
    /// Replacing an existing part is atomic.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors.
    pub async fn write_part(
        &self,
        bucket: &str,
        upload_id: &str,
        part_number: u32,
        data: &Bytes,
    ) -> io::Result<(String, u64)> {
        let target = self.part_path(bucket, upload_id, part_number);
        let staged = self.stage(&target, data).await?;
        let (md5_hex, size) = (staged.md5_hex.clone(), staged.size);
        staged.persist(&target)?;
        trace!(bucket, upload_id, part_number, size, "staged part");
        Ok((md5_hex, size))
    }

    /// Concatenate staged parts, in the given order, into a staged file
    /// next to the upload's target key.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors; a missing part file surfaces as the
    /// underlying `NotFound`.
    pub async fn assemble_parts(
        &self,
        bucket: &str,
        upload_id: &str,
        key: &str,
        part_numbers: &[u32],
    ) -> io::Result<StagedFile> {
        let target = self.object_path(bucket, key);
        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no file name"))?;
        let temp_path = target.with_file_name(format!("{file_name}.tmp.{}", temp_suffix()));
        if let Some(parent) = temp_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut out = tokio::fs::File::create(&temp_path).await?;
        let mut guard = StagedFile {
            path: Some(temp_path),
            md5_hex: String::new(),
            size: 0,
        };

        let mut total = 0u64;
        for &part_number in part_numbers {
            let part_path = self.part_path(bucket, upload_id, part_number);
            let mut part = tokio::fs::File::open(&part_path).await?;
            total += tokio::io::copy(&mut part, &mut out).await?;
        }
        out.sync_all().await?;

        guard.size = total;
        Ok(guard)
    }

    /// Remove an upload's staging directory, tolerating absence.
    ///
    /// # Errors
    ///
    /// Propagates removal errors other than `NotFound`.
    pub async fn remove_upload_dir(&self, bucket: &str, upload_id: &str) -> io::Result<()> {
        match tokio::fs::remove_dir_all(self.multipart_dir(bucket, upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Rehydrate the open uploads of a bucket from their manifests.
    /// Unreadable manifests are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Propagates directory-read errors other than `NotFound`.
    pub async fn load_open_uploads(&self, bucket: &str) -> io::Result<Vec<MultipartUpload>> {
        let dir = self.bucket_dir(bucket).join(MULTIPART_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut uploads = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(upload_id) = entry.file_name().to_str().map(ToOwned::to_owned) else {
                continue;
            };
            let manifest_path = entry.path().join("manifest");
            match tokio::fs::read(&manifest_path).await {
                Ok(raw) => match serde_json::from_slice::<UploadManifest>(&raw) {
                    Ok(manifest) => {
                        uploads.push(MultipartUpload::from_manifest(bucket, &upload_id, manifest));
                    }
                    Err(e) => {
                        warn!(bucket, upload_id = %upload_id, error = %e, "skipping unreadable upload manifest");
                    }
                },
                Err(e) => {
                    warn!(bucket, upload_id = %upload_id, error = %e, "skipping upload without manifest");
                }
            }
        }
        Ok(uploads)
    }

    // -----------------------------------------------------------------------
    // Walks (blocking pool)
    // -----------------------------------------------------------------------

    /// List every canonical key in a bucket by walking the mirror tree,
    /// skipping the internal directories. Runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Propagates walk errors.
    pub async fn walk_keys(&self, bucket: &str) -> io::Result<Vec<String>> {
        let bucket_dir = self.bucket_dir(bucket);
        tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            walk_mirror(&bucket_dir, &bucket_dir, &mut keys)?;
            keys.sort();
            Ok(keys)
        })
        .await
        .map_err(|e| io::Error::other(format!("walk task failed: {e}")))?
    }

    /// Total bytes stored under the root (canonical, archived, and
    /// staged). Runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Propagates walk errors.
    pub async fn disk_usage(&self) -> io::Result<u64> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || du(&root))
            .await
            .map_err(|e| io::Error::other(format!("du task failed: {e}")))?
    }

    /// Capacity of the filesystem holding the root: `(total, available)`
    /// bytes.
    ///
    /// # Errors
    ///
    /// Propagates the `statvfs` error.
    pub fn filesystem_stats(&self) -> io::Result<(u64, u64)> {
        let stats = nix::sys::statvfs::statvfs(&self.root).map_err(io::Error::from)?;
        let frag = stats.fragment_size() as u64;
        Ok((
            stats.blocks() as u64 * frag,
            stats.blocks_available() as u64 * frag,
        ))
    }

    /// Remove a stray canonical file that has no metadata record
    /// (listing reconciliation).
    ///
    /// # Errors
    ///
    /// Propagates removal errors other than `NotFound`.
    pub async fn remove_stray(&self, bucket: &str, key: &str) -> io::Result<()> {
        warn!(bucket, key, "removing file without metadata record");
        self.remove_canonical(bucket, key).await
    }
}

/// Recursive mirror walk collecting keys relative to `bucket_dir`.
fn walk_mirror(bucket_dir: &Path, dir: &Path, keys: &mut Vec<String>) -> io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();

        // Skip internal directories at the bucket root and in-flight
        // temp files anywhere.
        if dir == bucket_dir && (name == VERSIONS_DIR || name == MULTIPART_DIR) {
            continue;
        }
        if name.contains(".tmp.") {
            continue;
        }

        if entry.file_type()?.is_dir() {
            walk_mirror(bucket_dir, &path, keys)?;
        } else if let Ok(relative) = path.strip_prefix(bucket_dir) {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            keys.push(key);
        }
    }
    Ok(())
}

/// Recursive size sum.
fn du(dir: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += du(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::collections::HashMap;

    fn store() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStore::new(dir.path());
        (dir, store)
    }

    async fn put_canonical(store: &FsStore, bucket: &str, key: &str, data: &[u8]) -> StagedFile {
        store
            .stage(&store.object_path(bucket, key), &Bytes::copy_from_slice(data))
            .await
            .expect("stage")
    }

    #[tokio::test]
    async fn test_should_stage_and_persist_atomically() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();

        let target = store.object_path("b", "a/b/c.txt");
        let staged = put_canonical(&store, "b", "a/b/c.txt", b"hello").await;
        assert_eq!(staged.size, 5);
        assert_eq!(staged.md5_hex, crate::checksums::md5_hex(b"hello"));
        assert!(staged.path().exists());
        assert!(!target.exists());

        staged.persist(&target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_should_remove_temp_on_drop() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();

        let staged = put_canonical(&store, "b", "k", b"data").await;
        let temp = staged.path().to_path_buf();
        drop(staged);
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn test_should_archive_and_promote_versions() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();

        let target = store.object_path("b", "k");
        put_canonical(&store, "b", "k", b"version-one")
            .await
            .persist(&target)
            .unwrap();

        store.archive_canonical("b", "k", "v1").await.unwrap();
        put_canonical(&store, "b", "k", b"version-two")
            .await
            .persist(&target)
            .unwrap();

        // Archive holds the old bytes; canonical the new ones.
        let archived = store
            .read_file(&store.version_path("b", "k", "v1"), None)
            .await
            .unwrap();
        assert_eq!(archived.as_ref(), b"version-one");
        let canonical = store.read_file(&target, None).await.unwrap();
        assert_eq!(canonical.as_ref(), b"version-two");

        // Deleting the current version repoints from the archive.
        store.promote_archived("b", "k", "v1").await.unwrap();
        let restored = store.read_file(&target, None).await.unwrap();
        assert_eq!(restored.as_ref(), b"version-one");
        assert!(!store.version_path("b", "k", "v1").exists());
    }

    #[tokio::test]
    async fn test_should_read_byte_ranges() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();
        let target = store.object_path("b", "k");
        put_canonical(&store, "b", "k", b"hello world")
            .await
            .persist(&target)
            .unwrap();

        let range = store.read_file(&target, Some((6, 10))).await.unwrap();
        assert_eq!(range.as_ref(), b"world");
        let first = store.read_file(&target, Some((0, 0))).await.unwrap();
        assert_eq!(first.as_ref(), b"h");
    }

    #[tokio::test]
    async fn test_should_write_and_remove_delete_marker() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();

        store.write_delete_marker("b", "k", "v9").await.unwrap();
        let path = store.delete_marker_path("b", "k", "v9");
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        store.remove_version_file("b", "k", "v9", true).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_should_assemble_parts_in_listed_order() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();

        store
            .write_part("b", "up1", 1, &Bytes::from_static(b"hello "))
            .await
            .unwrap();
        store
            .write_part("b", "up1", 2, &Bytes::from_static(b"world"))
            .await
            .unwrap();

        let staged = store.assemble_parts("b", "up1", "big.bin", &[1, 2]).await.unwrap();
        assert_eq!(staged.size, 11);
        let target = store.object_path("b", "big.bin");
        staged.persist(&target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_should_replace_part_atomically() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();

        let (etag1, _) = store
            .write_part("b", "up1", 1, &Bytes::from_static(b"first"))
            .await
            .unwrap();
        let (etag2, size2) = store
            .write_part("b", "up1", 1, &Bytes::from_static(b"second"))
            .await
            .unwrap();
        assert_ne!(etag1, etag2);
        assert_eq!(size2, 6);

        let data = store
            .read_file(&store.part_path("b", "up1", 1), None)
            .await
            .unwrap();
        assert_eq!(data.as_ref(), b"second");
    }

    #[tokio::test]
    async fn test_should_rehydrate_uploads_from_manifests() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();

        let manifest = UploadManifest {
            key: "big.bin".to_owned(),
            content_type: Some("application/octet-stream".to_owned()),
            user_metadata: HashMap::new(),
            initiated: chrono::Utc::now(),
            parts: BTreeMap::new(),
        };
        store.write_manifest("b", "up1", &manifest).await.unwrap();

        let uploads = store.load_open_uploads("b").await.unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].upload_id, "up1");
        assert_eq!(uploads[0].key, "big.bin");

        store.remove_upload_dir("b", "up1").await.unwrap();
        assert!(store.load_open_uploads("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_walk_keys_skipping_internal_dirs() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();

        for key in ["a.txt", "nested/deep/c.txt"] {
            let target = store.object_path("b", key);
            put_canonical(&store, "b", key, b"x")
                .await
                .persist(&target)
                .unwrap();
        }
        store.write_delete_marker("b", "a.txt", "v1").await.unwrap();
        store
            .write_part("b", "up1", 1, &Bytes::from_static(b"p"))
            .await
            .unwrap();

        let keys = store.walk_keys("b").await.unwrap();
        assert_eq!(keys, vec!["a.txt", "nested/deep/c.txt"]);
    }

    #[tokio::test]
    async fn test_should_prune_empty_dirs_on_remove_canonical() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();
        let target = store.object_path("b", "x/y/z.txt");
        put_canonical(&store, "b", "x/y/z.txt", b"data")
            .await
            .persist(&target)
            .unwrap();

        store.remove_canonical("b", "x/y/z.txt").await.unwrap();
        assert!(!store.bucket_dir("b").join("x").exists());
        assert!(store.bucket_dir("b").exists());
    }

    #[tokio::test]
    async fn test_should_report_disk_usage() {
        let (_dir, store) = store();
        store.create_bucket_dir("b").await.unwrap();
        let target = store.object_path("b", "k");
        put_canonical(&store, "b", "k", b"0123456789")
            .await
            .persist(&target)
            .unwrap();

        assert_eq!(store.disk_usage().await.unwrap(), 10);

        let (total, available) = store.filesystem_stats().unwrap();
        assert!(total > 0);
        assert!(available <= total);
    }
}
