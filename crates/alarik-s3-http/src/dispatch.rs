//! Operation dispatch: one handler arm per routed S3 operation.

use bytes::Bytes;
use http::StatusCode;
use tracing::debug;

use alarik_s3_core::{AlarikS3, AuthContext, GetOutcome, ListObjectsV2Params, MetadataDirective};
use alarik_s3_model::error::{S3Error, S3ErrorCode};
use alarik_s3_model::operations::S3Operation;
use alarik_s3_model::types::{CompletedMultipartUpload, Delete, VersioningConfiguration};
use alarik_s3_xml::from_xml;
use alarik_s3_xml::serialize::location_constraint_to_xml;

use crate::body::ResponseBody;
use crate::request::{parse_copy_source, put_params, range_header};
use crate::response::{
    build, empty_response, error_response, object_response, raw_xml_response, xml_response,
};
use crate::router::RoutingContext;

/// Dispatch a routed, authenticated request to the service core and
/// render its response.
///
/// # Errors
///
/// Whatever the operation produces; the caller renders it as the XML
/// envelope.
pub async fn dispatch(
    s3: &AlarikS3,
    auth: &AuthContext,
    ctx: &RoutingContext,
    parts: &http::request::Parts,
    body: Bytes,
    request_id: &str,
) -> Result<http::Response<ResponseBody>, S3Error> {
    debug!(
        operation = %ctx.operation,
        bucket = ?ctx.bucket,
        key = ?ctx.key,
        request_id,
        "dispatching S3 operation"
    );

    match ctx.operation {
        S3Operation::ListBuckets => {
            let result = s3.list_buckets(auth)?;
            xml_response("ListAllMyBucketsResult", &result)
        }

        // -- Bucket ---------------------------------------------------------
        S3Operation::CreateBucket => {
            let bucket = required_bucket(ctx)?;
            s3.create_bucket(auth, bucket).await?;
            build(
                http::Response::builder()
                    .status(StatusCode::OK)
                    .header(http::header::LOCATION, format!("/{bucket}")),
                ResponseBody::empty(),
            )
        }
        S3Operation::DeleteBucket => {
            let bucket = required_bucket(ctx)?;
            s3.delete_bucket(auth, bucket, false).await?;
            empty_response(StatusCode::NO_CONTENT)
        }
        S3Operation::HeadBucket => {
            let bucket = required_bucket(ctx)?;
            s3.head_bucket(auth, bucket)?;
            empty_response(StatusCode::OK)
        }
        S3Operation::GetBucketLocation => {
            let bucket = required_bucket(ctx)?;
            let region = s3.get_bucket_location(auth, bucket)?;
            raw_xml_response(location_constraint_to_xml(&region))
        }
        S3Operation::GetBucketVersioning => {
            let bucket = required_bucket(ctx)?;
            let config = s3.get_bucket_versioning(auth, bucket)?;
            xml_response("VersioningConfiguration", &config)
        }
        S3Operation::PutBucketVersioning => {
            let bucket = required_bucket(ctx)?;
            let config: VersioningConfiguration = from_xml(&body)
                .map_err(|_| S3Error::new(S3ErrorCode::MalformedXML).with_resource(bucket))?;
            s3.put_bucket_versioning(auth, bucket, &config)?;
            empty_response(StatusCode::OK)
        }

        // -- Listings -------------------------------------------------------
        S3Operation::ListObjectsV2 => {
            let bucket = required_bucket(ctx)?;
            let params = ListObjectsV2Params {
                prefix: ctx.query("prefix").unwrap_or_default().to_owned(),
                delimiter: ctx.query("delimiter").map(ToOwned::to_owned),
                max_keys: parse_u64(ctx, "max-keys")?,
                continuation_token: ctx.query("continuation-token").map(ToOwned::to_owned),
                start_after: ctx.query("start-after").map(ToOwned::to_owned),
            };
            let result = s3.list_objects_v2(auth, bucket, params).await?;
            xml_response("ListBucketResult", &result)
        }
        S3Operation::ListObjectVersions => {
            let bucket = required_bucket(ctx)?;
            let result = s3.list_object_versions(
                auth,
                bucket,
                ctx.query("prefix").unwrap_or_default(),
                ctx.query("key-marker"),
                parse_u64(ctx, "max-keys")?,
            )?;
            xml_response("ListVersionsResult", &result)
        }

        // -- Objects --------------------------------------------------------
        S3Operation::PutObject => {
            let (bucket, key) = required_object(ctx)?;
            require_content_length(parts)?;
            let outcome = s3
                .put_object(auth, bucket, key, body, put_params(&parts.headers))
                .await?;
            let mut builder = http::Response::builder()
                .status(StatusCode::OK)
                .header(http::header::ETAG, outcome.etag);
            if let Some(version_id) = outcome.version_id {
                builder = builder.header("x-amz-version-id", version_id);
            }
            build(builder, ResponseBody::empty())
        }
        S3Operation::CopyObject => {
            let (bucket, key) = required_object(ctx)?;
            let source_header = parts
                .headers
                .get("x-amz-copy-source")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| S3Error::invalid_request("Missing x-amz-copy-source"))?;
            let source = parse_copy_source(source_header)?;
            let directive = match parts
                .headers
                .get("x-amz-metadata-directive")
                .and_then(|v| v.to_str().ok())
            {
                Some("REPLACE") => MetadataDirective::Replace,
                _ => MetadataDirective::Copy,
            };

            let (result, version_id) = s3
                .copy_object(
                    auth,
                    &source.bucket,
                    &source.key,
                    source.version_id.as_deref(),
                    bucket,
                    key,
                    directive,
                    put_params(&parts.headers),
                )
                .await?;

            let mut response = xml_response("CopyObjectResult", &result)?;
            if let Some(version_id) = version_id {
                if let Ok(value) = http::header::HeaderValue::from_str(&version_id) {
                    response.headers_mut().insert("x-amz-version-id", value);
                }
            }
            Ok(response)
        }
        S3Operation::GetObject | S3Operation::HeadObject => {
            let (bucket, key) = required_object(ctx)?;
            let head_only = ctx.operation == S3Operation::HeadObject;
            let outcome = s3
                .get_object(
                    auth,
                    bucket,
                    key,
                    ctx.query("versionId"),
                    range_header(&parts.headers).as_deref(),
                    !head_only,
                )
                .await?;
            match outcome {
                GetOutcome::Found(found) => object_response(found, head_only),
                GetOutcome::DeleteMarker {
                    version_id,
                    explicit,
                } => Ok(delete_marker_response(key, &version_id, explicit, request_id)),
            }
        }
        S3Operation::DeleteObject => {
            let (bucket, key) = required_object(ctx)?;
            let outcome = s3
                .delete_object(auth, bucket, key, ctx.query("versionId"))
                .await?;
            let mut builder = http::Response::builder().status(StatusCode::NO_CONTENT);
            if let Some(version_id) = outcome.version_id {
                builder = builder.header("x-amz-version-id", version_id);
            }
            if outcome.delete_marker {
                builder = builder.header("x-amz-delete-marker", "true");
            }
            build(builder, ResponseBody::empty())
        }
        S3Operation::DeleteObjects => {
            let bucket = required_bucket(ctx)?;
            let delete: Delete = from_xml(&body)
                .map_err(|_| S3Error::new(S3ErrorCode::MalformedXML).with_resource(bucket))?;
            let result = s3.delete_objects(auth, bucket, delete).await?;
            xml_response("DeleteResult", &result)
        }

        // -- Multipart ------------------------------------------------------
        S3Operation::CreateMultipartUpload => {
            let (bucket, key) = required_object(ctx)?;
            let result = s3
                .create_multipart_upload(auth, bucket, key, put_params(&parts.headers))
                .await?;
            xml_response("InitiateMultipartUploadResult", &result)
        }
        S3Operation::UploadPart => {
            let (bucket, _key) = required_object(ctx)?;
            let upload_id = required_query(ctx, "uploadId")?;
            let part_number: u32 = required_query(ctx, "partNumber")?
                .parse()
                .map_err(|_| S3Error::invalid_argument("partNumber must be an integer"))?;
            let etag = s3
                .upload_part(auth, bucket, upload_id, part_number, body)
                .await?;
            build(
                http::Response::builder()
                    .status(StatusCode::OK)
                    .header(http::header::ETAG, etag),
                ResponseBody::empty(),
            )
        }
        S3Operation::CompleteMultipartUpload => {
            let (bucket, key) = required_object(ctx)?;
            let upload_id = required_query(ctx, "uploadId")?;
            let request: CompletedMultipartUpload = from_xml(&body)
                .map_err(|_| S3Error::new(S3ErrorCode::MalformedXML).with_resource(upload_id))?;
            let (result, version_id) = s3
                .complete_multipart_upload(auth, bucket, key, upload_id, &request)
                .await?;
            let mut response = xml_response("CompleteMultipartUploadResult", &result)?;
            if let Some(version_id) = version_id {
                if let Ok(value) = http::header::HeaderValue::from_str(&version_id) {
                    response.headers_mut().insert("x-amz-version-id", value);
                }
            }
            Ok(response)
        }
        S3Operation::AbortMultipartUpload => {
            let bucket = required_bucket(ctx)?;
            let upload_id = required_query(ctx, "uploadId")?;
            s3.abort_multipart_upload(auth, bucket, upload_id).await?;
            empty_response(StatusCode::NO_CONTENT)
        }
        S3Operation::ListParts => {
            let (bucket, key) = required_object(ctx)?;
            let upload_id = required_query(ctx, "uploadId")?;
            let result = s3.list_parts(auth, bucket, key, upload_id)?;
            xml_response("ListPartsResult", &result)
        }
        S3Operation::ListMultipartUploads => {
            let bucket = required_bucket(ctx)?;
            let result = s3.list_multipart_uploads(auth, bucket)?;
            xml_response("ListMultipartUploadsResult", &result)
        }
    }
}

/// The 404/405 response for delete-marker reads, carrying the marker
/// headers on top of the error envelope.
fn delete_marker_response(
    key: &str,
    version_id: &str,
    explicit: bool,
    request_id: &str,
) -> http::Response<ResponseBody> {
    let err = if explicit {
        S3Error::new(S3ErrorCode::MethodNotAllowed).with_resource(key)
    } else {
        S3Error::no_such_key(key)
    };
    let mut response = error_response(&err, request_id);
    let headers = response.headers_mut();
    headers.insert(
        "x-amz-delete-marker",
        http::header::HeaderValue::from_static("true"),
    );
    if let Ok(value) = http::header::HeaderValue::from_str(version_id) {
        headers.insert("x-amz-version-id", value);
    }
    response
}

fn required_bucket(ctx: &RoutingContext) -> Result<&str, S3Error> {
    ctx.bucket
        .as_deref()
        .ok_or_else(|| S3Error::invalid_request("Request requires a bucket"))
}

fn required_object(ctx: &RoutingContext) -> Result<(&str, &str), S3Error> {
    let bucket = required_bucket(ctx)?;
    let key = ctx
        .key
        .as_deref()
        .ok_or_else(|| S3Error::invalid_request("Request requires an object key"))?;
    Ok((bucket, key))
}

fn required_query<'a>(ctx: &'a RoutingContext, name: &str) -> Result<&'a str, S3Error> {
    ctx.query(name)
        .ok_or_else(|| S3Error::invalid_request(format!("Missing required parameter {name}")))
}

fn parse_u64(ctx: &RoutingContext, name: &str) -> Result<Option<u64>, S3Error> {
    ctx.query(name)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| S3Error::invalid_argument(format!("{name} must be a non-negative integer")))
        })
        .transpose()
}

/// `Content-Length` is mandatory for PUTs unless the body is an
/// `aws-chunked` stream (already decoded by the service pipeline).
fn require_content_length(parts: &http::request::Parts) -> Result<(), S3Error> {
    let streaming = parts
        .headers
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("STREAMING-"));
    if streaming || parts.headers.contains_key(http::header::CONTENT_LENGTH) {
        Ok(())
    } else {
        Err(S3Error::new(S3ErrorCode::MissingContentLength))
    }
}
