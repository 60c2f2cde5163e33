//! ID generation, range parsing, timestamps, and continuation tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use rand::RngExt;
use sha2::Sha256;
use uuid::Uuid;

use alarik_s3_model::error::{S3Error, S3ErrorCode};

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// ID generation
// ---------------------------------------------------------------------------

/// Allocate a version id: 24 bytes (8-byte big-endian microsecond
/// timestamp followed by 16 random bytes), hex-encoded.
///
/// Hex preserves byte order, so ids sort lexicographically in
/// allocation order. Allocation is serialized per key by the caller,
/// which is what makes the ordering strict.
#[must_use]
pub fn generate_version_id() -> String {
    let micros = Utc::now().timestamp_micros().max(0) as u64;
    let mut buf = [0u8; 24];
    buf[..8].copy_from_slice(&micros.to_be_bytes());
    rand::rng().fill(&mut buf[8..]);
    hex::encode(buf)
}

/// Allocate an opaque multipart upload id: 32 random bytes, hex-encoded.
#[must_use]
pub fn generate_upload_id() -> String {
    let mut buf = [0u8; 32];
    rand::rng().fill(&mut buf);
    hex::encode(buf)
}

/// Allocate a request id (UUID v4 without dashes).
#[must_use]
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Random suffix for temp-file names.
#[must_use]
pub fn temp_suffix() -> String {
    let mut buf = [0u8; 4];
    rand::rng().fill(&mut buf);
    hex::encode(buf)
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Format a timestamp as RFC 7231 IMF-fixdate, used by `Last-Modified`.
#[must_use]
pub fn imf_fixdate(ts: &DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// ---------------------------------------------------------------------------
// Range header parsing
// ---------------------------------------------------------------------------

/// Parse an HTTP `Range` header into an inclusive `(start, end)` pair.
///
/// Supports `bytes=N-M`, `bytes=N-`, and `bytes=-N` (suffix). `end` is
/// clamped to the object size.
///
/// # Errors
///
/// Returns `InvalidRange` for malformed or unsatisfiable ranges.
pub fn parse_range(range: &str, content_length: u64) -> Result<(u64, u64), S3Error> {
    let invalid = || S3Error::new(S3ErrorCode::InvalidRange).with_resource(range);
    let spec = range.strip_prefix("bytes=").ok_or_else(invalid)?;

    if content_length == 0 {
        return Err(invalid());
    }

    if let Some(suffix) = spec.strip_prefix('-') {
        // Last N bytes.
        let n: u64 = suffix.parse().map_err(|_| invalid())?;
        if n == 0 {
            return Err(invalid());
        }
        let start = content_length.saturating_sub(n);
        Ok((start, content_length - 1))
    } else if let Some(prefix) = spec.strip_suffix('-') {
        // From N to the end.
        let start: u64 = prefix.parse().map_err(|_| invalid())?;
        if start >= content_length {
            return Err(invalid());
        }
        Ok((start, content_length - 1))
    } else {
        let (raw_start, raw_end) = spec.split_once('-').ok_or_else(invalid)?;
        let start: u64 = raw_start.parse().map_err(|_| invalid())?;
        let end: u64 = raw_end.parse().map_err(|_| invalid())?;
        if start > end || start >= content_length {
            return Err(invalid());
        }
        Ok((start, end.min(content_length - 1)))
    }
}

// ---------------------------------------------------------------------------
// Continuation tokens
// ---------------------------------------------------------------------------

/// Encode a continuation token for the given key: base64 of the key
/// plus a truncated HMAC tag under a process-local secret, so a client
/// cannot forge or tamper with tokens.
#[must_use]
pub fn encode_continuation_token(secret: &[u8], key: &str) -> String {
    let tag = token_tag(secret, key);
    format!("{}.{tag}", URL_SAFE_NO_PAD.encode(key.as_bytes()))
}

/// Decode and verify a continuation token, returning the embedded key.
///
/// # Errors
///
/// Returns `InvalidArgument` for malformed or tampered tokens.
pub fn decode_continuation_token(secret: &[u8], token: &str) -> Result<String, S3Error> {
    let invalid = || S3Error::invalid_argument("The continuation token provided is incorrect");
    let (encoded, tag) = token.split_once('.').ok_or_else(invalid)?;
    let raw = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| invalid())?;
    let key = String::from_utf8(raw).map_err(|_| invalid())?;
    if token_tag(secret, &key) != tag {
        return Err(invalid());
    }
    Ok(key)
}

/// First 16 hex chars of HMAC-SHA256 over the key.
fn token_tag(secret: &[u8], key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(key.as_bytes());
    let digest = mac.finalize().into_bytes();
    hex::encode(&digest[..8])
}
