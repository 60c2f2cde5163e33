//! S3 wire model for Alarik: the operation enum, request/response body
//! types, and the error taxonomy.
//!
//! This crate is deliberately dependency-light so the XML codec, the
//! HTTP layer, and the service core can all share it.

pub mod error;
pub mod operations;
pub mod types;

pub use error::{S3Error, S3ErrorCode};
pub use operations::S3Operation;
