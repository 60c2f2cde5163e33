//! Response construction: XML payloads, object responses, and the
//! error envelope.

use alarik_core::types::{NULL_VERSION_ID, ObjectVersionRecord};
use alarik_s3_core::FoundObject;
use alarik_s3_core::utils::imf_fixdate;
use alarik_s3_model::error::S3Error;
use alarik_s3_xml::{S3Serialize, error_to_xml, to_xml};
use http::header::HeaderValue;

use crate::body::ResponseBody;

/// Render an S3 error as its XML envelope.
#[must_use]
pub fn error_response(err: &S3Error, request_id: &str) -> http::Response<ResponseBody> {
    let xml = error_to_xml(
        err.code.as_str(),
        &err.message,
        err.resource.as_deref(),
        request_id,
    );
    http::Response::builder()
        .status(err.status_code())
        .header(http::header::CONTENT_TYPE, "application/xml")
        .body(ResponseBody::from_bytes(xml))
        .unwrap_or_else(|_| {
            let mut fallback = http::Response::new(ResponseBody::empty());
            *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

/// Render a serializable result as a 200 XML response.
///
/// # Errors
///
/// `InternalError` if serialization fails.
pub fn xml_response<T: S3Serialize>(
    root: &str,
    value: &T,
) -> Result<http::Response<ResponseBody>, S3Error> {
    let xml = to_xml(root, value)
        .map_err(|e| S3Error::internal(format!("failed to serialize {root}: {e}")))?;
    build(
        http::Response::builder()
            .status(http::StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "application/xml"),
        ResponseBody::from_bytes(xml),
    )
}

/// A bodiless response with the given status.
///
/// # Errors
///
/// `InternalError` if response construction fails.
pub fn empty_response(status: http::StatusCode) -> Result<http::Response<ResponseBody>, S3Error> {
    build(
        http::Response::builder().status(status),
        ResponseBody::empty(),
    )
}

/// A raw-bytes XML response (for pre-rendered documents).
///
/// # Errors
///
/// `InternalError` if response construction fails.
pub fn raw_xml_response(xml: Vec<u8>) -> Result<http::Response<ResponseBody>, S3Error> {
    build(
        http::Response::builder()
            .status(http::StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "application/xml"),
        ResponseBody::from_bytes(xml),
    )
}

/// Build the 200/206 response for a resolved object read (GET or HEAD).
///
/// # Errors
///
/// `InternalError` if response construction fails.
pub fn object_response(
    found: FoundObject,
    head_only: bool,
) -> Result<http::Response<ResponseBody>, S3Error> {
    let record = &found.record;
    let status = if found.content_range.is_some() {
        http::StatusCode::PARTIAL_CONTENT
    } else {
        http::StatusCode::OK
    };

    let mut builder = http::Response::builder()
        .status(status)
        .header(http::header::ETAG, format!("\"{}\"", record.etag))
        .header(
            http::header::LAST_MODIFIED,
            imf_fixdate(&record.last_modified),
        )
        .header(http::header::ACCEPT_RANGES, "bytes");

    builder = builder.header(
        http::header::CONTENT_TYPE,
        record
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream"),
    );

    let content_length = match found.content_range {
        Some((start, end, total)) => {
            builder = builder.header(
                http::header::CONTENT_RANGE,
                format!("bytes {start}-{end}/{total}"),
            );
            end - start + 1
        }
        None => record.size,
    };
    builder = builder.header(http::header::CONTENT_LENGTH, content_length);
    builder = version_headers(builder, record);
    builder = metadata_headers(builder, record);

    let body = match (head_only, found.body) {
        (false, Some(data)) => ResponseBody::from_bytes(data),
        _ => ResponseBody::empty(),
    };
    build(builder, body)
}

/// Attach `x-amz-version-id` for versioned records.
fn version_headers(
    builder: http::response::Builder,
    record: &ObjectVersionRecord,
) -> http::response::Builder {
    if record.version_id == NULL_VERSION_ID {
        builder
    } else {
        builder.header("x-amz-version-id", record.version_id.as_str())
    }
}

/// Attach `x-amz-meta-*` headers.
fn metadata_headers(
    mut builder: http::response::Builder,
    record: &ObjectVersionRecord,
) -> http::response::Builder {
    for (name, value) in &record.user_metadata {
        if let Ok(value) = HeaderValue::from_str(value) {
            builder = builder.header(format!("x-amz-meta-{name}"), value);
        }
    }
    builder
}

/// Finish a response, converting builder errors.
pub(crate) fn build(
    builder: http::response::Builder,
    body: ResponseBody,
) -> Result<http::Response<ResponseBody>, S3Error> {
    builder
        .body(body)
        .map_err(|e| S3Error::internal(format!("failed to build response: {e}")))
}

/// Stamp the headers every response carries.
pub fn add_common_headers(
    mut response: http::Response<ResponseBody>,
    request_id: &str,
) -> http::Response<ResponseBody> {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", value);
    }
    headers.insert("Server", HeaderValue::from_static("Alarik"));
    response
}
