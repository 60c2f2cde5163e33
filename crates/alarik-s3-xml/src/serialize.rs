//! Encoding of S3 response bodies.

use std::io::{self, Write};

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

use alarik_s3_model::types::{
    BucketSummary, CommonPrefix, CompleteMultipartUploadResult, CopyObjectResult,
    DeleteErrorEntry, DeleteMarkerEntry, DeleteResult, DeletedObject,
    InitiateMultipartUploadResult, ListAllMyBucketsResult, ListBucketResult,
    ListMultipartUploadsResult, ListPartsResult, ListVersionsResult, ObjectSummary, Owner,
    PartEntry, UploadEntry, VersionEntry, VersioningConfiguration,
};

use crate::error::XmlError;

/// The S3 XML namespace attached to every root element.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Trait for encoding a response type as XML child elements.
///
/// The root element and namespace are written by [`to_xml`];
/// implementors emit their children into the provided writer.
pub trait S3Serialize {
    /// Write this value's child elements.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the underlying writer fails.
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()>;
}

/// Encode a value as a complete S3 XML document.
///
/// # Errors
///
/// Returns [`XmlError`] if serialization fails.
pub fn to_xml<T: S3Serialize>(root: &str, value: &T) -> Result<Vec<u8>, XmlError> {
    let mut buf = Vec::with_capacity(512);
    let mut writer = Writer::new(&mut buf);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer
        .create_element(root)
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(|w| value.serialize_xml(w))?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Element helpers
// ---------------------------------------------------------------------------

fn text<W: Write>(writer: &mut Writer<W>, tag: &str, value: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(value))?;
    Ok(())
}

fn opt_text<W: Write>(writer: &mut Writer<W>, tag: &str, value: Option<&str>) -> io::Result<()> {
    if let Some(v) = value {
        text(writer, tag, v)?;
    }
    Ok(())
}

fn bool_text<W: Write>(writer: &mut Writer<W>, tag: &str, value: bool) -> io::Result<()> {
    text(writer, tag, if value { "true" } else { "false" })
}

/// ISO 8601 with millisecond precision, as S3 renders timestamps.
fn timestamp(value: &chrono::DateTime<chrono::Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn owner_element<W: Write>(writer: &mut Writer<W>, owner: &Owner) -> io::Result<()> {
    writer.create_element("Owner").write_inner_content(|w| {
        text(w, "ID", &owner.id)?;
        text(w, "DisplayName", &owner.display_name)?;
        Ok(())
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// ListBuckets
// ---------------------------------------------------------------------------

impl S3Serialize for ListAllMyBucketsResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        owner_element(writer, &self.owner)?;
        writer.create_element("Buckets").write_inner_content(|w| {
            for bucket in &self.buckets {
                bucket.serialize_xml(w)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for BucketSummary {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Bucket").write_inner_content(|w| {
            text(w, "Name", &self.name)?;
            text(w, "CreationDate", &timestamp(&self.creation_date))?;
            Ok(())
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ListObjectsV2
// ---------------------------------------------------------------------------

impl S3Serialize for ListBucketResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Name", &self.name)?;
        text(writer, "Prefix", &self.prefix)?;
        opt_text(writer, "Delimiter", self.delimiter.as_deref())?;
        text(writer, "MaxKeys", &self.max_keys.to_string())?;
        text(writer, "KeyCount", &self.key_count.to_string())?;
        bool_text(writer, "IsTruncated", self.is_truncated)?;
        opt_text(
            writer,
            "ContinuationToken",
            self.continuation_token.as_deref(),
        )?;
        opt_text(
            writer,
            "NextContinuationToken",
            self.next_continuation_token.as_deref(),
        )?;
        opt_text(writer, "StartAfter", self.start_after.as_deref())?;
        for object in &self.contents {
            object.serialize_xml(writer)?;
        }
        for prefix in &self.common_prefixes {
            prefix.serialize_xml(writer)?;
        }
        Ok(())
    }
}

impl S3Serialize for ObjectSummary {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Contents").write_inner_content(|w| {
            text(w, "Key", &self.key)?;
            text(w, "LastModified", &timestamp(&self.last_modified))?;
            text(w, "ETag", &self.etag)?;
            text(w, "Size", &self.size.to_string())?;
            text(w, "StorageClass", "STANDARD")?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for CommonPrefix {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer
            .create_element("CommonPrefixes")
            .write_inner_content(|w| text(w, "Prefix", &self.prefix))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ListObjectVersions
// ---------------------------------------------------------------------------

impl S3Serialize for ListVersionsResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Name", &self.name)?;
        text(writer, "Prefix", &self.prefix)?;
        opt_text(writer, "KeyMarker", self.key_marker.as_deref())?;
        text(writer, "MaxKeys", &self.max_keys.to_string())?;
        bool_text(writer, "IsTruncated", self.is_truncated)?;
        opt_text(writer, "NextKeyMarker", self.next_key_marker.as_deref())?;
        for version in &self.versions {
            version.serialize_xml(writer)?;
        }
        for marker in &self.delete_markers {
            marker.serialize_xml(writer)?;
        }
        Ok(())
    }
}

impl S3Serialize for VersionEntry {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Version").write_inner_content(|w| {
            text(w, "Key", &self.key)?;
            text(w, "VersionId", &self.version_id)?;
            bool_text(w, "IsLatest", self.is_latest)?;
            text(w, "LastModified", &timestamp(&self.last_modified))?;
            text(w, "ETag", &self.etag)?;
            text(w, "Size", &self.size.to_string())?;
            text(w, "StorageClass", "STANDARD")?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for DeleteMarkerEntry {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer
            .create_element("DeleteMarker")
            .write_inner_content(|w| {
                text(w, "Key", &self.key)?;
                text(w, "VersionId", &self.version_id)?;
                bool_text(w, "IsLatest", self.is_latest)?;
                text(w, "LastModified", &timestamp(&self.last_modified))?;
                Ok(())
            })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

impl S3Serialize for InitiateMultipartUploadResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Bucket", &self.bucket)?;
        text(writer, "Key", &self.key)?;
        text(writer, "UploadId", &self.upload_id)?;
        Ok(())
    }
}

impl S3Serialize for CompleteMultipartUploadResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Location", &self.location)?;
        text(writer, "Bucket", &self.bucket)?;
        text(writer, "Key", &self.key)?;
        text(writer, "ETag", &self.etag)?;
        Ok(())
    }
}

impl S3Serialize for ListPartsResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Bucket", &self.bucket)?;
        text(writer, "Key", &self.key)?;
        text(writer, "UploadId", &self.upload_id)?;
        for part in &self.parts {
            part.serialize_xml(writer)?;
        }
        Ok(())
    }
}

impl S3Serialize for PartEntry {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Part").write_inner_content(|w| {
            text(w, "PartNumber", &self.part_number.to_string())?;
            text(w, "LastModified", &timestamp(&self.last_modified))?;
            text(w, "ETag", &self.etag)?;
            text(w, "Size", &self.size.to_string())?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for ListMultipartUploadsResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Bucket", &self.bucket)?;
        for upload in &self.uploads {
            upload.serialize_xml(writer)?;
        }
        Ok(())
    }
}

impl S3Serialize for UploadEntry {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Upload").write_inner_content(|w| {
            text(w, "Key", &self.key)?;
            text(w, "UploadId", &self.upload_id)?;
            text(w, "Initiated", &timestamp(&self.initiated))?;
            Ok(())
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CopyObject
// ---------------------------------------------------------------------------

impl S3Serialize for CopyObjectResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "ETag", &self.etag)?;
        text(writer, "LastModified", &timestamp(&self.last_modified))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DeleteObjects
// ---------------------------------------------------------------------------

impl S3Serialize for DeleteResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        for deleted in &self.deleted {
            deleted.serialize_xml(writer)?;
        }
        for error in &self.errors {
            error.serialize_xml(writer)?;
        }
        Ok(())
    }
}

impl S3Serialize for DeletedObject {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Deleted").write_inner_content(|w| {
            text(w, "Key", &self.key)?;
            opt_text(w, "VersionId", self.version_id.as_deref())?;
            if self.delete_marker {
                bool_text(w, "DeleteMarker", true)?;
            }
            opt_text(
                w,
                "DeleteMarkerVersionId",
                self.delete_marker_version_id.as_deref(),
            )?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for DeleteErrorEntry {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Error").write_inner_content(|w| {
            text(w, "Key", &self.key)?;
            text(w, "Code", &self.code)?;
            text(w, "Message", &self.message)?;
            Ok(())
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Versioning / location
// ---------------------------------------------------------------------------

impl S3Serialize for VersioningConfiguration {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        opt_text(writer, "Status", self.status.as_deref())?;
        Ok(())
    }
}

/// Encode a `LocationConstraint` body. `us-east-1` is rendered as an
/// empty element per the AWS convention.
#[must_use]
pub fn location_constraint_to_xml(region: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(160);
    let mut writer = Writer::new(&mut buf);
    let result: Result<(), XmlError> = (|| {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let element = writer
            .create_element("LocationConstraint")
            .with_attribute(("xmlns", S3_NAMESPACE));
        if region == "us-east-1" {
            element.write_empty()?;
        } else {
            element.write_text_content(BytesText::new(region))?;
        }
        Ok(())
    })();
    if let Err(e) = result {
        tracing::error!(error = %e, "failed to render LocationConstraint");
        buf.clear();
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_should_serialize_list_bucket_result() {
        let result = ListBucketResult {
            name: "photos".to_owned(),
            prefix: "2024/".to_owned(),
            delimiter: Some("/".to_owned()),
            max_keys: 1000,
            key_count: 2,
            is_truncated: false,
            continuation_token: None,
            next_continuation_token: None,
            start_after: None,
            contents: vec![ObjectSummary {
                key: "2024/a.jpg".to_owned(),
                last_modified: ts(),
                etag: "\"abc\"".to_owned(),
                size: 10,
            }],
            common_prefixes: vec![CommonPrefix {
                prefix: "2024/june/".to_owned(),
            }],
        };
        let xml = to_xml("ListBucketResult", &result).unwrap();
        let s = std::str::from_utf8(&xml).unwrap();
        assert!(s.contains("xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\""));
        assert!(s.contains("<Key>2024/a.jpg</Key>"));
        assert!(s.contains("<KeyCount>2</KeyCount>"));
        assert!(s.contains("<IsTruncated>false</IsTruncated>"));
        assert!(s.contains("<CommonPrefixes><Prefix>2024/june/</Prefix></CommonPrefixes>"));
        assert!(s.contains("<LastModified>2024-06-01T12:00:00.000Z</LastModified>"));
    }

    #[test]
    fn test_should_serialize_versions_and_delete_markers() {
        let result = ListVersionsResult {
            name: "b".to_owned(),
            prefix: String::new(),
            key_marker: None,
            max_keys: 1000,
            is_truncated: false,
            next_key_marker: None,
            versions: vec![VersionEntry {
                key: "k".to_owned(),
                version_id: "v1".to_owned(),
                is_latest: false,
                last_modified: ts(),
                etag: "\"e1\"".to_owned(),
                size: 1,
            }],
            delete_markers: vec![DeleteMarkerEntry {
                key: "k".to_owned(),
                version_id: "v2".to_owned(),
                is_latest: true,
                last_modified: ts(),
            }],
        };
        let xml = to_xml("ListVersionsResult", &result).unwrap();
        let s = std::str::from_utf8(&xml).unwrap();
        assert!(s.contains("<Version><Key>k</Key><VersionId>v1</VersionId>"));
        assert!(s.contains("<DeleteMarker><Key>k</Key><VersionId>v2</VersionId>"));
        assert!(s.contains("<IsLatest>true</IsLatest>"));
    }

    #[test]
    fn test_should_serialize_initiate_multipart_result() {
        let result = InitiateMultipartUploadResult {
            bucket: "b".to_owned(),
            key: "big.bin".to_owned(),
            upload_id: "abc123".to_owned(),
        };
        let xml = to_xml("InitiateMultipartUploadResult", &result).unwrap();
        let s = std::str::from_utf8(&xml).unwrap();
        assert!(s.contains("<Bucket>b</Bucket>"));
        assert!(s.contains("<UploadId>abc123</UploadId>"));
    }

    #[test]
    fn test_should_serialize_versioning_configuration_without_status() {
        let xml = to_xml(
            "VersioningConfiguration",
            &VersioningConfiguration { status: None },
        )
        .unwrap();
        let s = std::str::from_utf8(&xml).unwrap();
        assert!(!s.contains("<Status>"));
    }

    #[test]
    fn test_should_render_us_east_1_location_as_empty_element() {
        let s = String::from_utf8(location_constraint_to_xml("us-east-1")).unwrap();
        assert!(s.contains("<LocationConstraint xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"/>"));

        let s = String::from_utf8(location_constraint_to_xml("eu-west-1")).unwrap();
        assert!(s.contains(">eu-west-1</LocationConstraint>"));
    }

    #[test]
    fn test_should_escape_keys_with_markup() {
        let result = DeleteResult {
            deleted: vec![DeletedObject {
                key: "a&b<c".to_owned(),
                version_id: None,
                delete_marker: false,
                delete_marker_version_id: None,
            }],
            errors: vec![],
        };
        let xml = to_xml("DeleteResult", &result).unwrap();
        let s = std::str::from_utf8(&xml).unwrap();
        assert!(s.contains("<Key>a&amp;b&lt;c</Key>"));
    }
}
