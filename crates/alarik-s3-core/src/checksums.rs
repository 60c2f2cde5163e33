//! ETag computation.
//!
//! Single-part objects carry the lowercase hex MD5 of their bytes.
//! Multipart objects carry `hex(md5(concat of each part's raw MD5
//! bytes))-<part count>`.

use md5::{Digest, Md5};

/// Incremental MD5 state for streaming writes.
#[derive(Debug, Default)]
pub struct Md5Stream {
    hasher: Md5,
}

impl Md5Stream {
    /// Start a fresh digest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Finish and return the lowercase hex digest.
    #[must_use]
    pub fn finish_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Lowercase hex MD5 of a byte slice.
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Composite multipart ETag: the hex MD5 of the concatenated raw MD5
/// digests of each part, suffixed with the part count.
///
/// Part digests that fail hex-decoding are skipped; they cannot occur
/// for digests we computed ourselves.
#[must_use]
pub fn multipart_etag(part_md5_hexes: &[String]) -> String {
    let mut concatenated = Vec::with_capacity(part_md5_hexes.len() * 16);
    for part in part_md5_hexes {
        if let Ok(raw) = hex::decode(part) {
            concatenated.extend_from_slice(&raw);
        }
    }
    format!(
        "{}-{}",
        hex::encode(Md5::digest(&concatenated)),
        part_md5_hexes.len()
    )
}

/// Wrap an unquoted ETag value in the double quotes the wire format
/// requires.
#[must_use]
pub fn quote_etag(etag: &str) -> String {
    format!("\"{etag}\"")
}

/// Strip surrounding quotes from a client-supplied ETag.
#[must_use]
pub fn unquote_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_compute_known_md5() {
        // md5("hi"), as used by the smoke scenario in the docs.
        assert_eq!(md5_hex(b"hi"), "49f68a5c8493ec2c0bf489821c21fc3b");
    }

    #[test]
    fn test_should_match_streaming_and_one_shot_md5() {
        let mut stream = Md5Stream::new();
        stream.update(b"hello ");
        stream.update(b"world");
        assert_eq!(stream.finish_hex(), md5_hex(b"hello world"));
    }

    #[test]
    fn test_should_compute_composite_etag_from_part_digests() {
        let p1 = md5_hex(b"part-one");
        let p2 = md5_hex(b"part-two");

        let mut concatenated = Vec::new();
        concatenated.extend_from_slice(&hex::decode(&p1).unwrap());
        concatenated.extend_from_slice(&hex::decode(&p2).unwrap());
        let expected = format!("{}-2", md5_hex(&concatenated));

        assert_eq!(multipart_etag(&[p1, p2]), expected);
    }

    #[test]
    fn test_should_quote_and_unquote_etag() {
        assert_eq!(quote_etag("abc"), "\"abc\"");
        assert_eq!(unquote_etag("\"abc\""), "abc");
        assert_eq!(unquote_etag("abc"), "abc");
    }
}
