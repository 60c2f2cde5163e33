//! S3 error codes and the error envelope.
//!
//! Every failure surfaced to an S3 client maps to one of these codes,
//! which carry their default HTTP status and message. The HTTP layer
//! renders them as the standard XML envelope
//! `<Error><Code/><Message/><Resource/><RequestId/></Error>`.

use std::fmt;

/// Well-known S3 error codes produced by Alarik.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum S3ErrorCode {
    /// Authorization failed or the access key is expired.
    AccessDenied,
    /// The `Authorization` header could not be parsed.
    AuthorizationHeaderMalformed,
    /// The bucket name is taken (global uniqueness).
    BucketAlreadyExists,
    /// The bucket still contains live objects.
    BucketNotEmpty,
    /// A non-final multipart part is smaller than 5 MiB.
    EntityTooSmall,
    /// A storage invariant was violated or an I/O operation failed.
    InternalError,
    /// The access key id is not registered.
    InvalidAccessKeyId,
    /// A request argument is invalid.
    InvalidArgument,
    /// The bucket name fails the DNS-label rules.
    InvalidBucketName,
    /// A listed part does not exist or its ETag does not match.
    InvalidPart,
    /// The part list is not in strictly ascending order.
    InvalidPartOrder,
    /// The requested byte range cannot be satisfied.
    InvalidRange,
    /// The method/resource combination is not a known S3 operation.
    InvalidRequest,
    /// The request XML body is not well-formed.
    MalformedXML,
    /// The method is not allowed against this resource.
    MethodNotAllowed,
    /// `Content-Length` is required and missing.
    MissingContentLength,
    /// The bucket does not exist.
    NoSuchBucket,
    /// The key does not exist (or only delete markers remain).
    NoSuchKey,
    /// The upload id is unknown.
    NoSuchUpload,
    /// The version id is unknown.
    NoSuchVersion,
    /// The signed timestamp is outside the allowed clock-skew window.
    RequestTimeTooSkewed,
    /// SigV4 signature verification failed.
    SignatureDoesNotMatch,
}

impl S3ErrorCode {
    /// The wire representation of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::AuthorizationHeaderMalformed => "AuthorizationHeaderMalformed",
            Self::BucketAlreadyExists => "BucketAlreadyExists",
            Self::BucketNotEmpty => "BucketNotEmpty",
            Self::EntityTooSmall => "EntityTooSmall",
            Self::InternalError => "InternalError",
            Self::InvalidAccessKeyId => "InvalidAccessKeyId",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidBucketName => "InvalidBucketName",
            Self::InvalidPart => "InvalidPart",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::InvalidRange => "InvalidRange",
            Self::InvalidRequest => "InvalidRequest",
            Self::MalformedXML => "MalformedXML",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::MissingContentLength => "MissingContentLength",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchKey => "NoSuchKey",
            Self::NoSuchUpload => "NoSuchUpload",
            Self::NoSuchVersion => "NoSuchVersion",
            Self::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
        }
    }

    /// The HTTP status this code is served with.
    #[must_use]
    pub fn status_code(self) -> http::StatusCode {
        match self {
            Self::AuthorizationHeaderMalformed
            | Self::EntityTooSmall
            | Self::InvalidArgument
            | Self::InvalidBucketName
            | Self::InvalidPart
            | Self::InvalidPartOrder
            | Self::InvalidRequest
            | Self::MalformedXML => http::StatusCode::BAD_REQUEST,
            Self::AccessDenied
            | Self::InvalidAccessKeyId
            | Self::RequestTimeTooSkewed
            | Self::SignatureDoesNotMatch => http::StatusCode::FORBIDDEN,
            Self::NoSuchBucket | Self::NoSuchKey | Self::NoSuchUpload | Self::NoSuchVersion => {
                http::StatusCode::NOT_FOUND
            }
            Self::MethodNotAllowed => http::StatusCode::METHOD_NOT_ALLOWED,
            Self::BucketAlreadyExists | Self::BucketNotEmpty => http::StatusCode::CONFLICT,
            Self::MissingContentLength => http::StatusCode::LENGTH_REQUIRED,
            Self::InvalidRange => http::StatusCode::RANGE_NOT_SATISFIABLE,
            Self::InternalError => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The default human-readable message.
    #[must_use]
    pub fn default_message(self) -> &'static str {
        match self {
            Self::AccessDenied => "Access Denied",
            Self::AuthorizationHeaderMalformed => {
                "The authorization header you provided is invalid"
            }
            Self::BucketAlreadyExists => "The requested bucket name is not available",
            Self::BucketNotEmpty => "The bucket you tried to delete is not empty",
            Self::EntityTooSmall => {
                "Your proposed upload is smaller than the minimum allowed object size"
            }
            Self::InternalError => "We encountered an internal error. Please try again.",
            Self::InvalidAccessKeyId => {
                "The AWS access key Id you provided does not exist in our records"
            }
            Self::InvalidArgument => "Invalid Argument",
            Self::InvalidBucketName => "The specified bucket is not valid",
            Self::InvalidPart => "One or more of the specified parts could not be found",
            Self::InvalidPartOrder => "The list of parts was not in ascending order",
            Self::InvalidRange => "The requested range is not satisfiable",
            Self::InvalidRequest => "Invalid Request",
            Self::MalformedXML => "The XML you provided was not well-formed",
            Self::MethodNotAllowed => "The specified method is not allowed against this resource",
            Self::MissingContentLength => "You must provide the Content-Length HTTP header",
            Self::NoSuchBucket => "The specified bucket does not exist",
            Self::NoSuchKey => "The specified key does not exist",
            Self::NoSuchUpload => "The specified upload does not exist",
            Self::NoSuchVersion => "The specified version does not exist",
            Self::RequestTimeTooSkewed => {
                "The difference between the request time and the server's time is too large"
            }
            Self::SignatureDoesNotMatch => {
                "The request signature we calculated does not match the signature you provided"
            }
        }
    }
}

impl fmt::Display for S3ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An S3 error response.
#[derive(Debug)]
pub struct S3Error {
    /// The error code.
    pub code: S3ErrorCode,
    /// A human-readable message.
    pub message: String,
    /// The resource (bucket, key, upload id) that caused the error.
    pub resource: Option<String>,
    /// The request id, filled in by the HTTP layer.
    pub request_id: Option<String>,
}

impl fmt::Display for S3Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for S3Error {}

impl S3Error {
    /// Create an error with the code's default message.
    #[must_use]
    pub fn new(code: S3ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_owned(),
            resource: None,
            request_id: None,
        }
    }

    /// Create an error with a custom message.
    #[must_use]
    pub fn with_message(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            resource: None,
            request_id: None,
        }
    }

    /// Attach the resource that caused the error.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// The HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        self.code.status_code()
    }

    /// Create a `NoSuchBucket` error.
    #[must_use]
    pub fn no_such_bucket(bucket: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NoSuchBucket).with_resource(bucket)
    }

    /// Create a `NoSuchKey` error.
    #[must_use]
    pub fn no_such_key(key: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NoSuchKey).with_resource(key)
    }

    /// Create a `NoSuchVersion` error.
    #[must_use]
    pub fn no_such_version(version_id: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NoSuchVersion).with_resource(version_id)
    }

    /// Create a `NoSuchUpload` error.
    #[must_use]
    pub fn no_such_upload(upload_id: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NoSuchUpload).with_resource(upload_id)
    }

    /// Create an `AccessDenied` error.
    #[must_use]
    pub fn access_denied(resource: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::AccessDenied).with_resource(resource)
    }

    /// Create an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InvalidArgument, message)
    }

    /// Create an `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InvalidRequest, message)
    }

    /// Create an `InternalError` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InternalError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_codes_to_expected_statuses() {
        let cases = [
            (S3ErrorCode::NoSuchBucket, 404),
            (S3ErrorCode::NoSuchKey, 404),
            (S3ErrorCode::NoSuchVersion, 404),
            (S3ErrorCode::NoSuchUpload, 404),
            (S3ErrorCode::BucketAlreadyExists, 409),
            (S3ErrorCode::BucketNotEmpty, 409),
            (S3ErrorCode::InvalidBucketName, 400),
            (S3ErrorCode::EntityTooSmall, 400),
            (S3ErrorCode::InvalidPart, 400),
            (S3ErrorCode::InvalidPartOrder, 400),
            (S3ErrorCode::SignatureDoesNotMatch, 403),
            (S3ErrorCode::AccessDenied, 403),
            (S3ErrorCode::RequestTimeTooSkewed, 403),
            (S3ErrorCode::MethodNotAllowed, 405),
            (S3ErrorCode::MissingContentLength, 411),
            (S3ErrorCode::InvalidRange, 416),
            (S3ErrorCode::InternalError, 500),
        ];
        for (code, status) in cases {
            assert_eq!(code.status_code().as_u16(), status, "code {code}");
        }
    }

    #[test]
    fn test_should_build_error_with_resource() {
        let err = S3Error::no_such_bucket("photos");
        assert_eq!(err.code, S3ErrorCode::NoSuchBucket);
        assert_eq!(err.resource.as_deref(), Some("photos"));
        assert_eq!(err.status_code().as_u16(), 404);
    }

    #[test]
    fn test_should_display_code_and_message() {
        let err = S3Error::with_message(S3ErrorCode::InvalidPart, "etag mismatch for part 2");
        assert_eq!(err.to_string(), "InvalidPart: etag mismatch for part 2");
    }
}
