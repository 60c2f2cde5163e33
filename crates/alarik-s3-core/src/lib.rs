//! The Alarik S3 service core.
//!
//! This crate owns everything between the HTTP layer and the metadata
//! store:
//!
//! - [`storage`]: the on-disk layout (canonical mirrors, version
//!   archive, multipart staging) with atomic writes
//! - [`ops`]: the bucket, object, listing, and multipart operation
//!   handlers
//! - [`uploads`]: the durable multipart upload registry
//! - [`keylock`]: the sharded per-key advisory lock table
//! - [`service`]: the [`AlarikS3`] state object wired into each handler
//!
//! # Architecture
//!
//! ```text
//! alarik-s3-http (routing, auth, XML)
//!        |
//!        v
//!   AlarikS3 (ops: bucket / object / list / multipart)
//!      |                |
//!      v                v
//!  MetadataStore     FsStore
//!  (records)         (bytes)
//! ```

pub mod checksums;
pub mod keylock;
pub mod ops;
pub mod service;
pub mod storage;
pub mod uploads;
pub mod utils;
pub mod validation;

pub use ops::list::ListObjectsV2Params;
pub use ops::object::{
    DeleteOutcome, FoundObject, GetOutcome, MetadataDirective, PutObjectParams, PutOutcome,
};
pub use service::{AlarikS3, AuthContext, CacheBackedCredentials};
pub use storage::FsStore;
