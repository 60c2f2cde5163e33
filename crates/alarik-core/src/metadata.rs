//! SQLite-backed metadata store.
//!
//! Persists users, buckets, access keys, and the object-version index.
//! The index is authoritative for listing versions; the filesystem is
//! authoritative for bytes.
//!
//! All methods are synchronous and take the connection lock for the
//! duration of a statement or transaction. Callers on the async runtime
//! are expected to wrap mutating calls in `spawn_blocking`; the store is
//! `Clone` (cheap, `Arc` inside) to make that convenient.
//!
//! # Publish ordering
//!
//! [`MetadataStore::commit_version_with`] implements the write protocol
//! for object versions: the version row is inserted inside an open
//! transaction, then the caller-supplied publish step (a filesystem
//! rename) runs, and only if it succeeds is the transaction committed.
//! A failed publish rolls the row back; a failed commit reports the
//! path so the caller can delete the renamed file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, warn};

use crate::error::MetadataError;
use crate::types::{AccessKey, BucketRecord, ObjectVersionRecord, User, VersioningStatus};

/// The SQLite schema, applied idempotently at open.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    is_admin      INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS access_keys (
    access_key_id TEXT PRIMARY KEY,
    secret_key    TEXT NOT NULL,
    user_id       INTEGER NOT NULL REFERENCES users(id),
    expires_at    TEXT
);
CREATE TABLE IF NOT EXISTS buckets (
    name       TEXT PRIMARY KEY,
    user_id    INTEGER NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL,
    versioning TEXT NOT NULL DEFAULT 'Disabled'
);
CREATE TABLE IF NOT EXISTS object_versions (
    bucket           TEXT NOT NULL,
    key              TEXT NOT NULL,
    version_id       TEXT NOT NULL,
    size             INTEGER NOT NULL,
    content_type     TEXT,
    etag             TEXT NOT NULL,
    user_metadata    TEXT NOT NULL DEFAULT '{}',
    last_modified    TEXT NOT NULL,
    is_delete_marker INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (bucket, key, version_id)
);
CREATE INDEX IF NOT EXISTS idx_versions_bucket_key
    ON object_versions (bucket, key);
";

/// A page of users plus the total count, for the admin listing.
#[derive(Debug)]
pub struct UserPage {
    /// The users on this page.
    pub users: Vec<User>,
    /// Total number of users across all pages.
    pub total: u64,
}

/// Handle to the metadata store. Cheap to clone.
#[derive(Clone)]
pub struct MetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore").finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Open (or create) the store at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] if the database cannot be opened
    /// or the schema cannot be applied; a corrupt store surfaces here and
    /// is fatal at startup.
    pub fn open(path: &Path) -> Result<Self, MetadataError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "opened metadata store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, MetadataError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Create a user. The password is bcrypt-hashed here.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::AlreadyExists`] if the username is taken.
    pub fn create_user(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<User, MetadataError> {
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        let created_at = Utc::now();
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (username, password_hash, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, password_hash, is_admin, created_at.to_rfc3339()],
        );
        match result {
            Ok(_) => Ok(User {
                id: conn.last_insert_rowid(),
                username: username.to_owned(),
                password_hash,
                is_admin,
                created_at,
            }),
            Err(e) if is_unique_violation(&e) => Err(MetadataError::AlreadyExists {
                entity: "user",
                id: username.to_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn user_by_id(&self, id: i64) -> Result<Option<User>, MetadataError> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, username, password_hash, is_admin, created_at
                 FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Look up a user by username.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn user_by_name(&self, username: &str) -> Result<Option<User>, MetadataError> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, username, password_hash, is_admin, created_at
                 FROM users WHERE username = ?1",
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// List users, paginated, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn list_users(&self, limit: u64, offset: u64) -> Result<UserPage, MetadataError> {
        let conn = self.conn.lock();
        let total: u64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, is_admin, created_at
             FROM users ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let users = stmt
            .query_map(params![limit, offset], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(UserPage { users, total })
    }

    /// Update a user's name, password, or admin flag.
    ///
    /// `password` of `None` leaves the hash untouched.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::NotFound`] if the user does not exist.
    pub fn update_user(
        &self,
        id: i64,
        username: Option<&str>,
        password: Option<&str>,
        is_admin: Option<bool>,
    ) -> Result<User, MetadataError> {
        let password_hash = password
            .map(|p| bcrypt::hash(p, bcrypt::DEFAULT_COST))
            .transpose()?;
        {
            let conn = self.conn.lock();
            let changed = conn.execute(
                "UPDATE users SET
                     username      = COALESCE(?2, username),
                     password_hash = COALESCE(?3, password_hash),
                     is_admin      = COALESCE(?4, is_admin)
                 WHERE id = ?1",
                params![id, username, password_hash, is_admin],
            )?;
            if changed == 0 {
                return Err(MetadataError::NotFound {
                    entity: "user",
                    id: id.to_string(),
                });
            }
        }
        self.user_by_id(id)?.ok_or(MetadataError::NotFound {
            entity: "user",
            id: id.to_string(),
        })
    }

    /// Delete a user and cascade to their access keys, buckets, and
    /// object versions, all in one transaction.
    ///
    /// Returns the deleted bucket names and access key ids so the caller
    /// can wipe directories and evict cache entries.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::NotFound`] if the user does not exist.
    pub fn delete_user_cascade(&self, id: i64) -> Result<(Vec<String>, Vec<String>), MetadataError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let buckets: Vec<String> = {
            let mut stmt = tx.prepare("SELECT name FROM buckets WHERE user_id = ?1")?;
            stmt.query_map(params![id], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        let keys: Vec<String> = {
            let mut stmt = tx.prepare("SELECT access_key_id FROM access_keys WHERE user_id = ?1")?;
            stmt.query_map(params![id], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };

        for bucket in &buckets {
            tx.execute(
                "DELETE FROM object_versions WHERE bucket = ?1",
                params![bucket],
            )?;
        }
        tx.execute("DELETE FROM buckets WHERE user_id = ?1", params![id])?;
        tx.execute("DELETE FROM access_keys WHERE user_id = ?1", params![id])?;
        let changed = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(MetadataError::NotFound {
                entity: "user",
                id: id.to_string(),
            });
        }
        tx.commit()?;
        Ok((buckets, keys))
    }

    /// Total number of users.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn count_users(&self) -> Result<u64, MetadataError> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?)
    }

    // -----------------------------------------------------------------------
    // Access keys
    // -----------------------------------------------------------------------

    /// Insert an access key.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::AlreadyExists`] on id collision.
    pub fn create_access_key(&self, key: &AccessKey) -> Result<(), MetadataError> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO access_keys (access_key_id, secret_key, user_id, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                key.access_key_id,
                key.secret_key,
                key.user_id,
                key.expires_at.map(|t| t.to_rfc3339())
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(MetadataError::AlreadyExists {
                entity: "access key",
                id: key.access_key_id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up an access key by id.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn access_key(&self, access_key_id: &str) -> Result<Option<AccessKey>, MetadataError> {
        let conn = self.conn.lock();
        let key = conn
            .query_row(
                "SELECT access_key_id, secret_key, user_id, expires_at
                 FROM access_keys WHERE access_key_id = ?1",
                params![access_key_id],
                access_key_from_row,
            )
            .optional()?;
        Ok(key)
    }

    /// Delete an access key.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::NotFound`] if the key does not exist.
    pub fn delete_access_key(&self, access_key_id: &str) -> Result<(), MetadataError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM access_keys WHERE access_key_id = ?1",
            params![access_key_id],
        )?;
        if changed == 0 {
            return Err(MetadataError::NotFound {
                entity: "access key",
                id: access_key_id.to_owned(),
            });
        }
        Ok(())
    }

    /// All access keys in the store. Used to warm the credential cache.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn all_access_keys(&self) -> Result<Vec<AccessKey>, MetadataError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT access_key_id, secret_key, user_id, expires_at FROM access_keys",
        )?;
        let keys = stmt
            .query_map([], access_key_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    /// Insert a bucket row.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::AlreadyExists`] if the name is taken
    /// (global uniqueness).
    pub fn create_bucket(&self, bucket: &BucketRecord) -> Result<(), MetadataError> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO buckets (name, user_id, created_at, versioning)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                bucket.name,
                bucket.user_id,
                bucket.created_at.to_rfc3339(),
                bucket.versioning.as_str()
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(MetadataError::AlreadyExists {
                entity: "bucket",
                id: bucket.name.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a bucket by name.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn bucket(&self, name: &str) -> Result<Option<BucketRecord>, MetadataError> {
        let conn = self.conn.lock();
        let bucket = conn
            .query_row(
                "SELECT name, user_id, created_at, versioning FROM buckets WHERE name = ?1",
                params![name],
                bucket_from_row,
            )
            .optional()?;
        Ok(bucket)
    }

    /// List buckets, optionally restricted to one owner, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn list_buckets(&self, owner: Option<i64>) -> Result<Vec<BucketRecord>, MetadataError> {
        let conn = self.conn.lock();
        let buckets = match owner {
            Some(user_id) => {
                let mut stmt = conn.prepare(
                    "SELECT name, user_id, created_at, versioning
                     FROM buckets WHERE user_id = ?1 ORDER BY name",
                )?;
                let rows = stmt.query_map(params![user_id], bucket_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT name, user_id, created_at, versioning FROM buckets ORDER BY name",
                )?;
                let rows = stmt.query_map([], bucket_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(buckets)
    }

    /// Delete a bucket row and its version index entries.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::NotFound`] if the bucket does not exist.
    pub fn delete_bucket(&self, name: &str) -> Result<(), MetadataError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM object_versions WHERE bucket = ?1",
            params![name],
        )?;
        let changed = tx.execute("DELETE FROM buckets WHERE name = ?1", params![name])?;
        if changed == 0 {
            return Err(MetadataError::NotFound {
                entity: "bucket",
                id: name.to_owned(),
            });
        }
        tx.commit()?;
        Ok(())
    }

    /// Update a bucket's versioning status.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::NotFound`] if the bucket does not exist.
    pub fn set_bucket_versioning(
        &self,
        name: &str,
        status: VersioningStatus,
    ) -> Result<(), MetadataError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE buckets SET versioning = ?2 WHERE name = ?1",
            params![name, status.as_str()],
        )?;
        if changed == 0 {
            return Err(MetadataError::NotFound {
                entity: "bucket",
                id: name.to_owned(),
            });
        }
        Ok(())
    }

    /// Total number of buckets.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn count_buckets(&self) -> Result<u64, MetadataError> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM buckets", [], |r| r.get(0))?)
    }

    // -----------------------------------------------------------------------
    // Object versions
    // -----------------------------------------------------------------------

    /// Insert (or, for the `"null"` version id, replace) a version row
    /// inside a transaction, run the caller's publish step, and commit.
    ///
    /// The publish step is the filesystem rename that makes the new bytes
    /// visible. Ordering per the write protocol:
    ///
    /// 1. caller stages bytes under a temp name (before calling this)
    /// 2. begin transaction; upsert the row
    /// 3. publish (rename temp into place); on failure, roll back
    /// 4. commit; on commit failure the caller deletes the renamed file
    ///
    /// # Errors
    ///
    /// [`MetadataError::PublishFailed`] if the publish step fails (the
    /// row has been rolled back); [`MetadataError::Sqlite`] if the
    /// commit fails (the caller must delete the published file).
    pub fn commit_version_with<F>(
        &self,
        record: &ObjectVersionRecord,
        publish: F,
    ) -> Result<(), MetadataError>
    where
        F: FnOnce() -> std::io::Result<()>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        upsert_version(&tx, record)?;
        if let Err(io_err) = publish() {
            drop(tx); // rolls back
            return Err(MetadataError::PublishFailed(io_err));
        }
        tx.commit().map_err(MetadataError::CommitFailedAfterPublish)?;
        Ok(())
    }

    /// Insert (or replace) a version row with no publish step. Used for
    /// delete markers, whose bytes are a zero-length sentinel written
    /// before the row.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on insert failure.
    pub fn put_version(&self, record: &ObjectVersionRecord) -> Result<(), MetadataError> {
        let conn = self.conn.lock();
        upsert_version(&conn, record)?;
        Ok(())
    }

    /// Look up one version.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<Option<ObjectVersionRecord>, MetadataError> {
        let conn = self.conn.lock();
        let rec = conn
            .query_row(
                "SELECT bucket, key, version_id, size, content_type, etag,
                        user_metadata, last_modified, is_delete_marker
                 FROM object_versions
                 WHERE bucket = ?1 AND key = ?2 AND version_id = ?3",
                params![bucket, key, version_id],
                version_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    /// The most recently written version of a key (delete markers
    /// included), or `None` if the key has no versions.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn current_version(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectVersionRecord>, MetadataError> {
        let conn = self.conn.lock();
        let rec = conn
            .query_row(
                "SELECT bucket, key, version_id, size, content_type, etag,
                        user_metadata, last_modified, is_delete_marker
                 FROM object_versions
                 WHERE bucket = ?1 AND key = ?2
                 ORDER BY rowid DESC LIMIT 1",
                params![bucket, key],
                version_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    /// The most recent non-delete-marker version of a key. This version
    /// is the one whose bytes live at the canonical (mirrored) path.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn latest_live_version(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectVersionRecord>, MetadataError> {
        let conn = self.conn.lock();
        let rec = conn
            .query_row(
                "SELECT bucket, key, version_id, size, content_type, etag,
                        user_metadata, last_modified, is_delete_marker
                 FROM object_versions
                 WHERE bucket = ?1 AND key = ?2 AND is_delete_marker = 0
                 ORDER BY rowid DESC LIMIT 1",
                params![bucket, key],
                version_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    /// All versions in a bucket under `prefix`, ordered by key ascending
    /// then newest first, restricted to keys strictly after
    /// `key_marker` (pass `""` for the first page).
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn list_versions(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        limit: u64,
    ) -> Result<Vec<ObjectVersionRecord>, MetadataError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT bucket, key, version_id, size, content_type, etag,
                    user_metadata, last_modified, is_delete_marker
             FROM object_versions
             WHERE bucket = ?1
               AND key > ?2
               AND key GLOB ?3
             ORDER BY key ASC, rowid DESC
             LIMIT ?4",
        )?;
        let glob = format!("{}*", glob_escape(prefix));
        let rows = stmt.query_map(params![bucket, key_marker, glob, limit], version_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Current live objects (latest version per key, delete markers
    /// excluded) under `prefix`, strictly after `start_after`, in
    /// bytewise key order.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn list_current(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: &str,
        limit: u64,
    ) -> Result<Vec<ObjectVersionRecord>, MetadataError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT v.bucket, v.key, v.version_id, v.size, v.content_type, v.etag,
                    v.user_metadata, v.last_modified, v.is_delete_marker
             FROM object_versions v
             JOIN (SELECT key, MAX(rowid) AS latest
                   FROM object_versions
                   WHERE bucket = ?1 AND key > ?2 AND key GLOB ?3
                   GROUP BY key) newest
               ON v.rowid = newest.latest
             WHERE v.is_delete_marker = 0
             ORDER BY v.key ASC
             LIMIT ?4",
        )?;
        let glob = format!("{}*", glob_escape(prefix));
        let rows = stmt.query_map(params![bucket, start_after, glob, limit], version_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The set of keys that currently have any version row. Used by
    /// listing reconciliation to spot stray files.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn keys_with_versions(&self, bucket: &str) -> Result<Vec<String>, MetadataError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT DISTINCT key FROM object_versions WHERE bucket = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![bucket], |r| r.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete one version row.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::NotFound`] if the version does not exist.
    pub fn delete_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<(), MetadataError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM object_versions
             WHERE bucket = ?1 AND key = ?2 AND version_id = ?3",
            params![bucket, key, version_id],
        )?;
        if changed == 0 {
            return Err(MetadataError::NotFound {
                entity: "object version",
                id: format!("{bucket}/{key}?versionId={version_id}"),
            });
        }
        Ok(())
    }

    /// Number of live objects (latest version per key, not a delete
    /// marker) in a bucket. Zero means the bucket may be deleted.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn count_live_objects(&self, bucket: &str) -> Result<u64, MetadataError> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row(
            "SELECT COUNT(*)
             FROM object_versions v
             JOIN (SELECT key, MAX(rowid) AS latest
                   FROM object_versions WHERE bucket = ?1 GROUP BY key) newest
               ON v.rowid = newest.latest
             WHERE v.is_delete_marker = 0",
            params![bucket],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Sum of all version sizes across all buckets. Feeds the admin
    /// storage statistics.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Sqlite`] on query failure.
    pub fn total_object_bytes(&self) -> Result<u64, MetadataError> {
        let conn = self.conn.lock();
        let total: Option<u64> = conn.query_row(
            "SELECT SUM(size) FROM object_versions WHERE is_delete_marker = 0",
            [],
            |r| r.get(0),
        )?;
        Ok(total.unwrap_or(0))
    }
}

/// Insert or replace a version row. `INSERT OR REPLACE` gives the row a
/// fresh rowid, which is what makes a suspended-bucket overwrite of the
/// `"null"` version become the current version again.
fn upsert_version(conn: &Connection, record: &ObjectVersionRecord) -> rusqlite::Result<()> {
    let metadata_json =
        serde_json::to_string(&record.user_metadata).unwrap_or_else(|_| "{}".to_owned());
    conn.execute(
        "INSERT OR REPLACE INTO object_versions
             (bucket, key, version_id, size, content_type, etag,
              user_metadata, last_modified, is_delete_marker)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.bucket,
            record.key,
            record.version_id,
            record.size,
            record.content_type,
            record.etag,
            metadata_json,
            record.last_modified.to_rfc3339(),
            record.is_delete_marker,
        ],
    )?;
    Ok(())
}

/// Escape SQLite GLOB metacharacters in a literal prefix.
fn glob_escape(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        match ch {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(ch);
                out.push(']');
            }
            _ => out.push(ch),
        }
    }
    out
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map_or_else(
        |e| {
            warn!(raw, error = %e, "unparseable timestamp in metadata store");
            Utc::now()
        },
        |t| t.with_timezone(&Utc),
    )
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let created_at: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        is_admin: row.get(3)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn access_key_from_row(row: &Row<'_>) -> rusqlite::Result<AccessKey> {
    let expires_at: Option<String> = row.get(3)?;
    Ok(AccessKey {
        access_key_id: row.get(0)?,
        secret_key: row.get(1)?,
        user_id: row.get(2)?,
        expires_at: expires_at.as_deref().map(parse_timestamp),
    })
}

fn bucket_from_row(row: &Row<'_>) -> rusqlite::Result<BucketRecord> {
    let created_at: String = row.get(2)?;
    let versioning: String = row.get(3)?;
    Ok(BucketRecord {
        name: row.get(0)?,
        user_id: row.get(1)?,
        created_at: parse_timestamp(&created_at),
        versioning: versioning.parse().unwrap_or_default(),
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<ObjectVersionRecord> {
    let metadata_json: String = row.get(6)?;
    let last_modified: String = row.get(7)?;
    let user_metadata: HashMap<String, String> =
        serde_json::from_str(&metadata_json).unwrap_or_default();
    Ok(ObjectVersionRecord {
        bucket: row.get(0)?,
        key: row.get(1)?,
        version_id: row.get(2)?,
        size: row.get(3)?,
        content_type: row.get(4)?,
        etag: row.get(5)?,
        user_metadata,
        last_modified: parse_timestamp(&last_modified),
        is_delete_marker: row.get(8)?,
    })
}

/// Whether a rusqlite error is a UNIQUE / PRIMARY KEY violation.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MetadataStore {
        MetadataStore::open_in_memory().unwrap_or_else(|e| panic!("open failed: {e}"))
    }

    fn version_record(bucket: &str, key: &str, vid: &str, marker: bool) -> ObjectVersionRecord {
        ObjectVersionRecord {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            version_id: vid.to_owned(),
            size: 3,
            content_type: Some("text/plain".to_owned()),
            etag: "900150983cd24fb0d6963f7d28e17f72".to_owned(),
            user_metadata: HashMap::new(),
            last_modified: Utc::now(),
            is_delete_marker: marker,
        }
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_create_and_fetch_user() {
        let store = store();
        let user = store.create_user("alice", "hunter22", false).unwrap();
        assert!(user.id > 0);

        let fetched = store.user_by_name("alice").unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert!(!fetched.is_admin);
        assert!(bcrypt::verify("hunter22", &fetched.password_hash).unwrap());
    }

    #[test]
    fn test_should_reject_duplicate_username() {
        let store = store();
        store.create_user("alice", "pw", false).unwrap();
        let err = store.create_user("alice", "pw2", false).unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists { .. }));
    }

    #[test]
    fn test_should_paginate_users() {
        let store = store();
        for i in 0..5 {
            store.create_user(&format!("user{i}"), "pw", false).unwrap();
        }
        let page = store.list_users(2, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.users.len(), 2);
        assert_eq!(page.users[0].username, "user2");
    }

    #[test]
    fn test_should_cascade_user_delete() {
        let store = store();
        let user = store.create_user("bob", "pw", false).unwrap();
        store
            .create_access_key(&AccessKey {
                access_key_id: "AKIABOB0000000000001".to_owned(),
                secret_key: "s".repeat(40),
                user_id: user.id,
                expires_at: None,
            })
            .unwrap();
        store
            .create_bucket(&BucketRecord {
                name: "bob-bucket".to_owned(),
                user_id: user.id,
                created_at: Utc::now(),
                versioning: VersioningStatus::Disabled,
            })
            .unwrap();
        store
            .put_version(&version_record("bob-bucket", "a.txt", "null", false))
            .unwrap();

        let (buckets, keys) = store.delete_user_cascade(user.id).unwrap();
        assert_eq!(buckets, vec!["bob-bucket"]);
        assert_eq!(keys, vec!["AKIABOB0000000000001"]);
        assert!(store.user_by_id(user.id).unwrap().is_none());
        assert!(store.bucket("bob-bucket").unwrap().is_none());
        assert!(
            store
                .version("bob-bucket", "a.txt", "null")
                .unwrap()
                .is_none()
        );
    }

    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_enforce_global_bucket_uniqueness() {
        let store = store();
        let alice = store.create_user("alice", "pw", false).unwrap();
        let bob = store.create_user("bob", "pw", false).unwrap();
        let record = BucketRecord {
            name: "shared-name".to_owned(),
            user_id: alice.id,
            created_at: Utc::now(),
            versioning: VersioningStatus::Disabled,
        };
        store.create_bucket(&record).unwrap();
        let err = store
            .create_bucket(&BucketRecord {
                user_id: bob.id,
                ..record
            })
            .unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists { .. }));
    }

    #[test]
    fn test_should_update_bucket_versioning() {
        let store = store();
        let user = store.create_user("alice", "pw", false).unwrap();
        store
            .create_bucket(&BucketRecord {
                name: "b1".to_owned(),
                user_id: user.id,
                created_at: Utc::now(),
                versioning: VersioningStatus::Disabled,
            })
            .unwrap();
        store
            .set_bucket_versioning("b1", VersioningStatus::Enabled)
            .unwrap();
        let bucket = store.bucket("b1").unwrap().unwrap();
        assert_eq!(bucket.versioning, VersioningStatus::Enabled);
    }

    // -----------------------------------------------------------------------
    // Versions
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_track_current_version_order() {
        let store = store();
        store
            .put_version(&version_record("b", "k", "v1-aaaa", false))
            .unwrap();
        store
            .put_version(&version_record("b", "k", "v2-bbbb", false))
            .unwrap();

        let current = store.current_version("b", "k").unwrap().unwrap();
        assert_eq!(current.version_id, "v2-bbbb");
    }

    #[test]
    fn test_should_replace_null_version_on_upsert() {
        let store = store();
        store
            .put_version(&version_record("b", "k", "null", false))
            .unwrap();
        store
            .put_version(&version_record("b", "k", "versioned-1", false))
            .unwrap();
        // Suspended-bucket overwrite: the replaced "null" row becomes
        // current again.
        store
            .put_version(&version_record("b", "k", "null", false))
            .unwrap();

        let current = store.current_version("b", "k").unwrap().unwrap();
        assert_eq!(current.version_id, "null");

        let versions = store.list_versions("b", "", "", 100).unwrap();
        assert_eq!(versions.len(), 2);
    }

    #[test]
    fn test_should_exclude_delete_markers_from_live_listing() {
        let store = store();
        store
            .put_version(&version_record("b", "a", "v1", false))
            .unwrap();
        store
            .put_version(&version_record("b", "b", "v1", false))
            .unwrap();
        store
            .put_version(&version_record("b", "b", "v2-marker", true))
            .unwrap();

        let live = store.list_current("b", "", "", 100).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].key, "a");

        assert_eq!(store.count_live_objects("b").unwrap(), 1);
    }

    #[test]
    fn test_should_list_current_with_prefix_and_start_after() {
        let store = store();
        for key in ["logs/a", "logs/b", "logs/c", "other/x"] {
            store
                .put_version(&version_record("b", key, "null", false))
                .unwrap();
        }
        let page = store.list_current("b", "logs/", "logs/a", 10).unwrap();
        let keys: Vec<&str> = page.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["logs/b", "logs/c"]);
    }

    #[test]
    fn test_should_treat_glob_metacharacters_in_prefix_literally() {
        let store = store();
        store
            .put_version(&version_record("b", "a*b/k", "null", false))
            .unwrap();
        store
            .put_version(&version_record("b", "axb/k", "null", false))
            .unwrap();
        let page = store.list_current("b", "a*b/", "", 10).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].key, "a*b/k");
    }

    #[test]
    fn test_should_roll_back_version_on_publish_failure() {
        let store = store();
        let record = version_record("b", "k", "v1", false);
        let err = store
            .commit_version_with(&record, || {
                Err(std::io::Error::other("simulated rename failure"))
            })
            .unwrap_err();
        assert!(matches!(err, MetadataError::PublishFailed(_)));
        assert!(store.version("b", "k", "v1").unwrap().is_none());
    }

    #[test]
    fn test_should_commit_version_when_publish_succeeds() {
        let store = store();
        let record = version_record("b", "k", "v1", false);
        store.commit_version_with(&record, || Ok(())).unwrap();
        assert!(store.version("b", "k", "v1").unwrap().is_some());
    }

    #[test]
    fn test_should_delete_specific_version() {
        let store = store();
        store
            .put_version(&version_record("b", "k", "v1", false))
            .unwrap();
        store
            .put_version(&version_record("b", "k", "v2", false))
            .unwrap();
        store.delete_version("b", "k", "v2").unwrap();

        let current = store.current_version("b", "k").unwrap().unwrap();
        assert_eq!(current.version_id, "v1");

        let err = store.delete_version("b", "k", "v2").unwrap_err();
        assert!(matches!(err, MetadataError::NotFound { .. }));
    }
}
