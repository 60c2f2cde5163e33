//! Request validation: bucket names, object keys, and user metadata.

use std::collections::HashMap;

use alarik_s3_model::error::{S3Error, S3ErrorCode};

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Maximum object key length in bytes.
const MAX_KEY_BYTES: usize = 1024;

/// Directory names reserved for internal bucket layout.
const RESERVED_PREFIXES: [&str; 2] = [".versions", ".multipart"];

/// Validate a bucket name against the DNS-label rules: 3-63 characters,
/// lowercase `a-z`/`0-9`/hyphen, not starting or ending with a hyphen.
///
/// # Errors
///
/// Returns `InvalidBucketName` describing the violated rule.
pub fn validate_bucket_name(name: &str) -> Result<(), S3Error> {
    let invalid = |reason: &str| {
        S3Error::with_message(
            S3ErrorCode::InvalidBucketName,
            format!("Invalid bucket name \"{name}\": {reason}"),
        )
        .with_resource(name)
    };

    let len = name.len();
    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        return Err(invalid(&format!(
            "must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN} characters long"
        )));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid(
            "must contain only lowercase letters, numbers, and hyphens",
        ));
    }

    let bytes = name.as_bytes();
    if bytes[0] == b'-' || bytes[len - 1] == b'-' {
        return Err(invalid("must not start or end with a hyphen"));
    }

    Ok(())
}

/// Validate an object key for use as a mirrored filesystem path.
///
/// Keys must be 1-1024 bytes, must not resolve outside the bucket
/// directory (`.`/`..` segments, absolute paths, empty segments), must
/// not end with a separator, and must not begin with a reserved
/// internal directory.
///
/// # Errors
///
/// Returns `InvalidArgument` describing the violation.
pub fn validate_object_key(key: &str) -> Result<(), S3Error> {
    let invalid = |reason: &str| {
        S3Error::with_message(S3ErrorCode::InvalidArgument, format!("Invalid key: {reason}"))
            .with_resource(key)
    };

    if key.is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(invalid("key exceeds 1024 bytes"));
    }
    if key.starts_with('/') || key.ends_with('/') {
        return Err(invalid("key must not start or end with '/'"));
    }
    if key.contains('\0') {
        return Err(invalid("key must not contain NUL"));
    }

    for segment in key.split('/') {
        if segment.is_empty() {
            return Err(invalid("key must not contain empty path segments"));
        }
        if segment == "." || segment == ".." {
            return Err(invalid("key must not contain '.' or '..' segments"));
        }
    }

    let first = key.split('/').next().unwrap_or(key);
    if RESERVED_PREFIXES.contains(&first) {
        return Err(invalid("key uses a reserved internal prefix"));
    }

    Ok(())
}

/// Extract and normalize user metadata from `x-amz-meta-*` headers:
/// names are lowercased and the prefix stripped.
#[must_use]
pub fn normalize_user_metadata<'a>(
    headers: impl Iterator<Item = (&'a str, &'a str)>,
) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    for (name, value) in headers {
        let lower = name.to_lowercase();
        if let Some(stripped) = lower.strip_prefix("x-amz-meta-") {
            if !stripped.is_empty() {
                metadata.insert(stripped.to_owned(), value.to_owned());
            }
        }
    }
    metadata
}
