//! Entry names carry the asset metadata
//!
//! The file name is base64 of `"<content_type>:<content_length>"`, so the
//! directory listing is the whole index. Content types must not contain `:`;
//! such names decode wrongly and are treated as corrupt on read.

use crate::error::{CacheError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const DELIMITER: char = ':';

pub fn encode(content_type: &str, content_length: u64) -> String {
    STANDARD.encode(format!("{}{}{}", content_type, DELIMITER, content_length))
}

pub fn decode(name: &str) -> Result<(String, u64)> {
    let bytes = STANDARD
        .decode(name)
        .map_err(|e| CacheError::CorruptEntry(format!("{}: {}", name, e)))?;
    let decoded = String::from_utf8(bytes)
        .map_err(|_| CacheError::CorruptEntry(format!("{}: not UTF-8", name)))?;

    let (content_type, content_length) = decoded
        .split_once(DELIMITER)
        .ok_or_else(|| CacheError::CorruptEntry(format!("{}: missing delimiter", name)))?;
    let content_length = content_length
        .parse::<u64>()
        .map_err(|_| CacheError::CorruptEntry(format!("{}: bad length", name)))?;

    Ok((content_type.to_string(), content_length))
}

/// Whether an encoded name can sit directly inside a leaf directory.
///
/// Standard base64 emits `/` for some inputs (a `?` in the content type, for
/// instance), which would turn the name into a nested path.
pub fn is_valid_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_value() {
        assert_eq!(encode("image/png", 4096), "aW1hZ2UvcG5nOjQwOTY=");
        assert_eq!(encode("text/plain", 13), "dGV4dC9wbGFpbjoxMw==");
    }

    #[test]
    fn test_decode_known_value() {
        let (content_type, content_length) = decode("aW1hZ2UvcG5nOjQwOTY=").unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(content_length, 4096);
    }

    #[test]
    fn test_round_trip_edge_values() {
        for (ct, len) in [("", 0), ("application/octet-stream", u64::MAX)] {
            assert_eq!(decode(&encode(ct, len)).unwrap(), (ct.to_string(), len));
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode("not base64!"),
            Err(CacheError::CorruptEntry(_))
        ));
        // "no-delimiter"
        assert!(decode("bm8tZGVsaW1pdGVy").is_err());
        // "image/png:abc"
        assert!(decode("aW1hZ2UvcG5nOmFiYw==").is_err());
    }

    #[test]
    fn test_delimiter_in_content_type_is_corrupt() {
        // Splits on the first ':' so the length half is not a number
        let name = encode("text/x:y", 10);
        assert!(decode(&name).is_err());
    }

    #[test]
    fn test_valid_file_name() {
        assert!(is_valid_file_name(&encode("image/png", 4096)));
        // '?' as the third byte of a group encodes to '/'
        let name = encode("ab?", 1);
        assert_eq!(name, "YWI/OjE=");
        assert!(!is_valid_file_name(&name));
        assert!(!is_valid_file_name(""));
    }
}
