//! Operation handlers, grouped the way the protocol groups them.

pub mod bucket;
pub mod list;
pub mod multipart;
pub mod object;

use alarik_s3_model::error::S3Error;
use tracing::error;

/// Map an infrastructure failure onto `InternalError`, logging the
/// cause (the wire message stays generic).
pub(crate) fn internal_error(err: impl std::fmt::Display) -> S3Error {
    error!(error = %err, "internal storage error");
    S3Error::internal("We encountered an internal error. Please try again.")
}
