//! XML codec errors and the S3 error envelope.

use std::io;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

/// Errors produced by the XML codec.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// I/O failure while writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure in the underlying quick-xml reader/writer.
    #[error("XML processing error: {0}")]
    QuickXml(#[from] quick_xml::Error),

    /// A required element is missing from a request body.
    #[error("missing required XML element: {0}")]
    MissingElement(String),

    /// The document structure is not what the decoder expected.
    #[error("unexpected XML content: {0}")]
    UnexpectedContent(String),

    /// Element text failed to parse into the target type.
    #[error("failed to parse value: {0}")]
    ParseValue(String),
}

/// Render the S3 error envelope.
///
/// S3 errors are a flat `<Error>` element (no outer wrapper):
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>NoSuchKey</Code>
///   <Message>The specified key does not exist</Message>
///   <Resource>/bucket/key</Resource>
///   <RequestId>...</RequestId>
/// </Error>
/// ```
#[must_use]
pub fn error_to_xml(
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    if let Err(e) = write_error(&mut buf, code, message, resource, request_id) {
        // Writing into a Vec cannot fail for I/O reasons; reaching this
        // indicates a codec bug.
        tracing::error!(error = %e, "failed to render error envelope");
        buf.clear();
    }
    buf
}

fn write_error(
    buf: &mut Vec<u8>,
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> io::Result<()> {
    let mut writer = Writer::new(buf);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.create_element("Error").write_inner_content(|w| {
        w.create_element("Code")
            .write_text_content(BytesText::new(code))?;
        w.create_element("Message")
            .write_text_content(BytesText::new(message))?;
        if let Some(resource) = resource {
            w.create_element("Resource")
                .write_text_content(BytesText::new(resource))?;
        }
        w.create_element("RequestId")
            .write_text_content(BytesText::new(request_id))?;
        Ok(())
    })?;
    Ok(())
}
