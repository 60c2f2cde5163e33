//! Request-side helpers: header extraction and copy-source parsing.

use alarik_s3_core::PutObjectParams;
use alarik_s3_core::validation::normalize_user_metadata;
use alarik_s3_model::error::S3Error;

/// A parsed `x-amz-copy-source` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    /// Source bucket.
    pub bucket: String,
    /// Source key.
    pub key: String,
    /// Source version, from the `?versionId=` suffix.
    pub version_id: Option<String>,
}

/// Parse `x-amz-copy-source`: `/bucket/key`, `bucket/key`, with an
/// optional `?versionId=...` suffix. The value is percent-encoded.
///
/// # Errors
///
/// `InvalidRequest` when the value has no key component.
pub fn parse_copy_source(raw: &str) -> Result<CopySource, S3Error> {
    let decoded = percent_encoding::percent_decode_str(raw)
        .decode_utf8_lossy()
        .into_owned();

    let (path, version_id) = match decoded.split_once('?') {
        Some((path, query)) => {
            let version = query
                .split('&')
                .find_map(|p| p.strip_prefix("versionId="))
                .map(ToOwned::to_owned);
            (path.to_owned(), version)
        }
        None => (decoded, None),
    };

    let path = path.strip_prefix('/').unwrap_or(&path);
    match path.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(CopySource {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            version_id,
        }),
        _ => Err(S3Error::invalid_request(
            "x-amz-copy-source must name a bucket and key",
        )),
    }
}

/// Extract the write-side attributes of a PUT-like request: the
/// declared content type and the `x-amz-meta-*` metadata headers.
#[must_use]
pub fn put_params(headers: &http::HeaderMap) -> PutObjectParams {
    let content_type = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);

    let user_metadata = normalize_user_metadata(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    );

    PutObjectParams {
        content_type,
        user_metadata,
    }
}

/// The raw `Range` header value, if present.
#[must_use]
pub fn range_header(headers: &http::HeaderMap) -> Option<String> {
    headers
        .get(http::header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}
