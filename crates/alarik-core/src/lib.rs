//! Core domain types, configuration, metadata store, and credential cache
//! for Alarik.
//!
//! This crate holds everything below the S3 protocol layer that is not
//! byte storage:
//!
//! - [`types`]: users, access keys, buckets, object versions
//! - [`config`]: environment-driven server configuration
//! - [`metadata`]: the SQLite-backed metadata store
//! - [`cache`]: process-wide credential and versioning caches
//!
//! The metadata store is the source of truth for records; the filesystem
//! (owned by `alarik-s3-core`) is the source of truth for bytes.

pub mod cache;
pub mod config;
pub mod error;
pub mod metadata;
pub mod types;

pub use cache::CredentialCache;
pub use config::ServerConfig;
pub use error::MetadataError;
pub use metadata::MetadataStore;
pub use types::{AccessKey, BucketRecord, ObjectVersionRecord, User, VersioningStatus};
