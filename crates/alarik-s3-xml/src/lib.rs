//! S3 XML codec for Alarik.
//!
//! Response bodies are encoded through the [`S3Serialize`] trait and
//! [`to_xml`]; request bodies (`CompleteMultipartUpload`,
//! `VersioningConfiguration`, `Delete`) are decoded through
//! [`S3Deserialize`] and [`from_xml`]. The error envelope has its own
//! entry point, [`error_to_xml`].
//!
//! Output follows the AWS RestXml conventions: UTF-8 with the canonical
//! declaration, the `http://s3.amazonaws.com/doc/2006-03-01/` namespace
//! on root elements, lowercase booleans, and ISO 8601 timestamps with
//! millisecond precision.

pub mod deserialize;
pub mod error;
pub mod serialize;

pub use deserialize::{S3Deserialize, from_xml};
pub use error::{XmlError, error_to_xml};
pub use serialize::{S3Serialize, to_xml};
