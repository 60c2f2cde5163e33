//! Decoding of S3 request bodies.
//!
//! Alarik decodes three request bodies: `CompleteMultipartUpload`,
//! `VersioningConfiguration`, and `Delete` (batch delete).

use quick_xml::Reader;
use quick_xml::events::Event;

use alarik_s3_model::types::{
    CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier, VersioningConfiguration,
};

use crate::error::XmlError;

/// Trait for decoding a request body type from XML.
///
/// The reader is positioned just after the root start tag; the
/// implementation consumes through the matching end tag.
pub trait S3Deserialize: Sized {
    /// Decode an instance from the reader.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError`] if the document is malformed or required
    /// elements are missing.
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError>;
}

/// Decode a complete XML document into a request body type.
///
/// # Errors
///
/// Returns [`XmlError`] if the document is malformed.
pub fn from_xml<T: S3Deserialize>(xml: &[u8]) -> Result<T, XmlError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    // Skip the declaration and position after the root start tag.
    loop {
        match reader.read_event()? {
            Event::Start(_) => return T::deserialize_xml(&mut reader),
            Event::Eof => return Err(XmlError::MissingElement("root element".to_owned())),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Reader helpers
// ---------------------------------------------------------------------------

/// Read the text content of the current element through its end tag.
fn read_text(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseValue(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| XmlError::ParseValue(err.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::End(_) => return Ok(text),
            Event::Eof => {
                return Err(XmlError::UnexpectedContent(
                    "EOF while reading element text".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

/// Skip the current element and everything inside it.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedContent(
                    "EOF while skipping element".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

fn element_name(e: &quick_xml::events::BytesStart<'_>) -> Result<String, XmlError> {
    std::str::from_utf8(e.name().as_ref())
        .map(ToOwned::to_owned)
        .map_err(|err| XmlError::ParseValue(err.to_string()))
}

// ---------------------------------------------------------------------------
// CompleteMultipartUpload
// ---------------------------------------------------------------------------

impl S3Deserialize for CompletedMultipartUpload {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut parts = Vec::new();
        loop {
            match reader.read_event()? {
                Event::Start(e) => match element_name(&e)?.as_str() {
                    "Part" => parts.push(CompletedPart::deserialize_xml(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => return Ok(Self { parts }),
                Event::Eof => {
                    return Err(XmlError::UnexpectedContent(
                        "EOF inside CompleteMultipartUpload".to_owned(),
                    ));
                }
                _ => {}
            }
        }
    }
}

impl S3Deserialize for CompletedPart {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut part_number = None;
        let mut etag = None;
        loop {
            match reader.read_event()? {
                Event::Start(e) => match element_name(&e)?.as_str() {
                    "PartNumber" => {
                        let raw = read_text(reader)?;
                        part_number = Some(raw.parse::<u32>().map_err(|_| {
                            XmlError::ParseValue(format!("invalid PartNumber: {raw}"))
                        })?);
                    }
                    "ETag" => etag = Some(read_text(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => {
                    return Ok(Self {
                        part_number: part_number
                            .ok_or_else(|| XmlError::MissingElement("PartNumber".to_owned()))?,
                        etag: etag.ok_or_else(|| XmlError::MissingElement("ETag".to_owned()))?,
                    });
                }
                Event::Eof => {
                    return Err(XmlError::UnexpectedContent("EOF inside Part".to_owned()));
                }
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// VersioningConfiguration
// ---------------------------------------------------------------------------

impl S3Deserialize for VersioningConfiguration {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut status = None;
        loop {
            match reader.read_event()? {
                Event::Start(e) => match element_name(&e)?.as_str() {
                    "Status" => status = Some(read_text(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => return Ok(Self { status }),
                Event::Eof => {
                    return Err(XmlError::UnexpectedContent(
                        "EOF inside VersioningConfiguration".to_owned(),
                    ));
                }
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Delete (batch delete)
// ---------------------------------------------------------------------------

impl S3Deserialize for Delete {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut objects = Vec::new();
        let mut quiet = false;
        loop {
            match reader.read_event()? {
                Event::Start(e) => match element_name(&e)?.as_str() {
                    "Object" => objects.push(ObjectIdentifier::deserialize_xml(reader)?),
                    "Quiet" => {
                        let raw = read_text(reader)?;
                        quiet = raw == "true";
                    }
                    _ => skip_element(reader)?,
                },
                Event::End(_) => return Ok(Self { objects, quiet }),
                Event::Eof => {
                    return Err(XmlError::UnexpectedContent("EOF inside Delete".to_owned()));
                }
                _ => {}
            }
        }
    }
}

impl S3Deserialize for ObjectIdentifier {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut key = None;
        let mut version_id = None;
        loop {
            match reader.read_event()? {
                Event::Start(e) => match element_name(&e)?.as_str() {
                    "Key" => key = Some(read_text(reader)?),
                    "VersionId" => version_id = Some(read_text(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => {
                    return Ok(Self {
                        key: key.ok_or_else(|| XmlError::MissingElement("Key".to_owned()))?,
                        version_id,
                    });
                }
                Event::Eof => {
                    return Err(XmlError::UnexpectedContent("EOF inside Object".to_owned()));
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_decode_complete_multipart_upload() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
            <CompleteMultipartUpload>
                <Part><PartNumber>1</PartNumber><ETag>"etag1"</ETag></Part>
                <Part><ETag>"etag2"</ETag><PartNumber>2</PartNumber></Part>
            </CompleteMultipartUpload>"#;
        let decoded: CompletedMultipartUpload = from_xml(xml).unwrap();
        assert_eq!(decoded.parts.len(), 2);
        assert_eq!(decoded.parts[0].part_number, 1);
        assert_eq!(decoded.parts[0].etag, "\"etag1\"");
        assert_eq!(decoded.parts[1].part_number, 2);
    }

    #[test]
    fn test_should_reject_part_without_number() {
        let xml = br#"<CompleteMultipartUpload>
                <Part><ETag>"e"</ETag></Part>
            </CompleteMultipartUpload>"#;
        let result: Result<CompletedMultipartUpload, _> = from_xml(xml);
        assert!(matches!(result, Err(XmlError::MissingElement(_))));
    }

    #[test]
    fn test_should_reject_non_numeric_part_number() {
        let xml = br"<CompleteMultipartUpload>
                <Part><PartNumber>one</PartNumber><ETag>e</ETag></Part>
            </CompleteMultipartUpload>";
        let result: Result<CompletedMultipartUpload, _> = from_xml(xml);
        assert!(matches!(result, Err(XmlError::ParseValue(_))));
    }

    #[test]
    fn test_should_decode_versioning_configuration() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
            <VersioningConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
                <Status>Enabled</Status>
            </VersioningConfiguration>"#;
        let decoded: VersioningConfiguration = from_xml(xml).unwrap();
        assert_eq!(decoded.status.as_deref(), Some("Enabled"));
    }

    #[test]
    fn test_should_decode_versioning_configuration_without_status() {
        let xml = br"<VersioningConfiguration></VersioningConfiguration>";
        let decoded: VersioningConfiguration = from_xml(xml).unwrap();
        assert!(decoded.status.is_none());
    }

    #[test]
    fn test_should_decode_batch_delete() {
        let xml = br"<Delete>
                <Quiet>true</Quiet>
                <Object><Key>a.txt</Key></Object>
                <Object><Key>b.txt</Key><VersionId>v7</VersionId></Object>
            </Delete>";
        let decoded: Delete = from_xml(xml).unwrap();
        assert!(decoded.quiet);
        assert_eq!(decoded.objects.len(), 2);
        assert_eq!(decoded.objects[1].version_id.as_deref(), Some("v7"));
    }

    #[test]
    fn test_should_unescape_entity_references_in_keys() {
        let xml = br"<Delete><Object><Key>a&amp;b</Key></Object></Delete>";
        let decoded: Delete = from_xml(xml).unwrap();
        assert_eq!(decoded.objects[0].key, "a&b");
    }

    #[test]
    fn test_should_reject_empty_document() {
        let result: Result<Delete, _> = from_xml(b"   ");
        assert!(matches!(result, Err(XmlError::MissingElement(_))));
    }
}
