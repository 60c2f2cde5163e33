//! S3 request routing.
//!
//! Maps method + path shape + query parameters + headers to an
//! [`S3Operation`]. Bucket-level and object-level requests are told
//! apart by whether the path has a key component; sub-resources by
//! query parameters (`?versioning`, `?uploads`, `?uploadId=`, ...).
//! Both path-style (`/bucket/key`) and virtual-host-style
//! (`bucket.domain/key`) addressing are supported.

use http::Method;
use percent_encoding::percent_decode_str;

use alarik_s3_model::error::{S3Error, S3ErrorCode};
use alarik_s3_model::operations::S3Operation;

/// Router configuration.
#[derive(Debug, Clone)]
pub struct S3Router {
    /// Base domain for virtual-hosted-style addressing.
    pub domain: String,
    /// Whether virtual hosting is honored at all.
    pub virtual_hosting: bool,
}

/// A routed request.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    /// The resolved bucket, if the path names one.
    pub bucket: Option<String>,
    /// The resolved key, if the path names one.
    pub key: Option<String>,
    /// The identified operation.
    pub operation: S3Operation,
    /// Decoded query parameters.
    pub query_params: Vec<(String, String)>,
}

impl RoutingContext {
    /// Look up a query parameter value.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl S3Router {
    /// Create a router.
    #[must_use]
    pub fn new(domain: impl Into<String>, virtual_hosting: bool) -> Self {
        Self {
            domain: domain.into(),
            virtual_hosting,
        }
    }

    /// Resolve a request to its operation, bucket, and key.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` or `MethodNotAllowed` for combinations that are
    /// not S3 operations.
    pub fn resolve<B>(&self, req: &http::Request<B>) -> Result<RoutingContext, S3Error> {
        let query_params = parse_query(req.uri().query().unwrap_or(""));

        let vhost_bucket = if self.virtual_hosting {
            extract_vhost_bucket(req.headers(), &self.domain)
        } else {
            None
        };

        let path = req.uri().path();
        let (bucket, key) = match vhost_bucket {
            Some(bucket) => {
                let trimmed = path.strip_prefix('/').unwrap_or(path);
                let key = if trimmed.is_empty() {
                    None
                } else {
                    Some(decode_component(trimmed))
                };
                (Some(bucket), key)
            }
            None => split_path(path),
        };

        let operation = identify(req.method(), bucket.as_ref(), key.as_ref(), &query_params, req.headers())?;

        Ok(RoutingContext {
            bucket,
            key,
            operation,
            query_params,
        })
    }
}

/// Extract the bucket from a `Host` header like `photos.s3.example:8080`.
fn extract_vhost_bucket(headers: &http::HeaderMap, domain: &str) -> Option<String> {
    let host = headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())?;
    let host = host.split(':').next().unwrap_or(host);
    let suffix = format!(".{domain}");
    let bucket = host.strip_suffix(&suffix)?;
    if bucket.is_empty() {
        None
    } else {
        Some(bucket.to_owned())
    }
}

/// Split `/bucket/key...` into its components.
fn split_path(path: &str) -> (Option<String>, Option<String>) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return (None, None);
    }
    match trimmed.split_once('/') {
        Some((bucket, rest)) if !rest.is_empty() => {
            (Some(decode_component(bucket)), Some(decode_component(rest)))
        }
        Some((bucket, _)) => (Some(decode_component(bucket)), None),
        None => (Some(decode_component(trimmed)), None),
    }
}

fn decode_component(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_component(k), decode_component(v)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

fn has(params: &[(String, String)], name: &str) -> bool {
    params.iter().any(|(k, _)| k == name)
}

fn identify(
    method: &Method,
    bucket: Option<&String>,
    key: Option<&String>,
    params: &[(String, String)],
    headers: &http::HeaderMap,
) -> Result<S3Operation, S3Error> {
    match (bucket.is_some(), key.is_some()) {
        (false, false) => {
            if *method == Method::GET {
                Ok(S3Operation::ListBuckets)
            } else {
                Err(S3Error::new(S3ErrorCode::MethodNotAllowed)
                    .with_resource(method.as_str().to_owned()))
            }
        }
        (true, false) => identify_bucket_op(method, params),
        (true, true) => identify_object_op(method, params, headers),
        (false, true) => Err(S3Error::invalid_request("Object key without a bucket")),
    }
}

fn identify_bucket_op(
    method: &Method,
    params: &[(String, String)],
) -> Result<S3Operation, S3Error> {
    match *method {
        Method::GET => {
            if has(params, "location") {
                Ok(S3Operation::GetBucketLocation)
            } else if has(params, "versioning") {
                Ok(S3Operation::GetBucketVersioning)
            } else if has(params, "versions") {
                Ok(S3Operation::ListObjectVersions)
            } else if has(params, "uploads") {
                Ok(S3Operation::ListMultipartUploads)
            } else if params
                .iter()
                .any(|(k, v)| k == "list-type" && v == "2")
            {
                Ok(S3Operation::ListObjectsV2)
            } else {
                // Only the V2 listing is served; V1 requests are not a
                // recognized operation here.
                Err(S3Error::invalid_request(
                    "List requests must use list-type=2",
                ))
            }
        }
        Method::PUT => {
            if has(params, "versioning") {
                Ok(S3Operation::PutBucketVersioning)
            } else if params.is_empty() {
                Ok(S3Operation::CreateBucket)
            } else {
                Err(S3Error::invalid_request("Unknown bucket sub-resource"))
            }
        }
        Method::DELETE => {
            if params.is_empty() {
                Ok(S3Operation::DeleteBucket)
            } else {
                Err(S3Error::invalid_request("Unknown bucket sub-resource"))
            }
        }
        Method::HEAD => Ok(S3Operation::HeadBucket),
        Method::POST => {
            if has(params, "delete") {
                Ok(S3Operation::DeleteObjects)
            } else {
                Err(S3Error::invalid_request("Unknown bucket POST"))
            }
        }
        _ => Err(S3Error::new(S3ErrorCode::MethodNotAllowed)
            .with_resource(method.as_str().to_owned())),
    }
}

fn identify_object_op(
    method: &Method,
    params: &[(String, String)],
    headers: &http::HeaderMap,
) -> Result<S3Operation, S3Error> {
    let has_copy_source = headers.contains_key("x-amz-copy-source");

    match *method {
        Method::GET => {
            if has(params, "uploadId") {
                Ok(S3Operation::ListParts)
            } else {
                Ok(S3Operation::GetObject)
            }
        }
        Method::HEAD => Ok(S3Operation::HeadObject),
        Method::PUT => {
            if has(params, "partNumber") && has(params, "uploadId") {
                if has_copy_source {
                    Err(S3Error::invalid_request(
                        "UploadPartCopy is not supported",
                    ))
                } else {
                    Ok(S3Operation::UploadPart)
                }
            } else if has_copy_source {
                Ok(S3Operation::CopyObject)
            } else {
                Ok(S3Operation::PutObject)
            }
        }
        Method::DELETE => {
            if has(params, "uploadId") {
                Ok(S3Operation::AbortMultipartUpload)
            } else {
                Ok(S3Operation::DeleteObject)
            }
        }
        Method::POST => {
            if has(params, "uploads") {
                Ok(S3Operation::CreateMultipartUpload)
            } else if has(params, "uploadId") {
                Ok(S3Operation::CompleteMultipartUpload)
            } else {
                Err(S3Error::invalid_request("Unknown object POST"))
            }
        }
        _ => Err(S3Error::new(S3ErrorCode::MethodNotAllowed)
            .with_resource(method.as_str().to_owned())),
    }
}
