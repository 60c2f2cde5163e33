//! Authentication error types.

/// Errors produced while authenticating a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header is missing.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    MalformedAuthHeader,

    /// The signing algorithm is not `AWS4-HMAC-SHA256`.
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The credential scope does not match
    /// `AKID/date/region/s3/aws4_request`.
    #[error("Invalid credential scope")]
    InvalidCredentialScope,

    /// A header listed in `SignedHeaders` is missing from the request.
    #[error("Missing signed header: {0}")]
    MissingHeader(String),

    /// The access key id is not registered.
    #[error("Unknown access key: {0}")]
    UnknownAccessKey(String),

    /// The access key is expired.
    #[error("Access key is expired: {0}")]
    ExpiredAccessKey(String),

    /// The computed signature does not match the provided one.
    #[error("Signature does not match")]
    SignatureMismatch,

    /// The signed timestamp is outside the allowed clock-skew window.
    #[error("Request timestamp is outside the allowed window: {0}")]
    TimeTooSkewed(String),

    /// A chunk in an `aws-chunked` body failed framing or signature
    /// verification.
    #[error("Invalid streaming chunk: {0}")]
    InvalidChunk(String),

    /// A bearer token failed verification.
    #[error("Invalid bearer token")]
    InvalidToken,
}
