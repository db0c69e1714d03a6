//! Error types for the sharded blob cache

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    /// The fetcher could not obtain the asset
    Retrieval(String),
    Http(Box<reqwest::Error>),
    /// Directory creation, read, write or delete failed
    Io(Box<std::io::Error>),
    /// Leaf directory is empty or its entry name cannot be decoded
    CorruptEntry(String),
    /// Content type cannot be encoded into a single path component
    InvalidContentType(String),
    Eviction(String),
    Join(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Retrieval(msg) => write!(f, "Retrieval error: {}", msg),
            CacheError::Http(err) => write!(f, "HTTP error: {}", err),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::CorruptEntry(msg) => write!(f, "Corrupt cache entry: {}", msg),
            CacheError::InvalidContentType(ct) => {
                write!(f, "Content type cannot be used as an entry name: {}", ct)
            }
            CacheError::Eviction(msg) => write!(f, "Eviction error: {}", msg),
            CacheError::Join(msg) => write!(f, "Background task failed: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Http(err) => Some(err.as_ref()),
            CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Http(Box::new(err))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Join(err.to_string())
    }
}

impl CacheError {
    /// True for failures that should be reported as "could not fetch"
    pub fn is_retrieval(&self) -> bool {
        matches!(self, CacheError::Retrieval(_) | CacheError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_error_display() {
        let err = CacheError::Retrieval("upstream returned 503".to_string());
        assert_eq!(format!("{}", err), "Retrieval error: upstream returned 503");
        assert!(err.is_retrieval());
    }

    #[test]
    fn test_io_error_has_source() {
        let err = CacheError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        ));
        assert!(format!("{}", err).contains("read-only filesystem"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_retrieval());
    }

    #[test]
    fn test_corrupt_entry_display() {
        let err = CacheError::CorruptEntry("empty leaf directory".to_string());
        assert_eq!(
            format!("{}", err),
            "Corrupt cache entry: empty leaf directory"
        );
    }

    #[test]
    fn test_error_is_debug() {
        let err = CacheError::Eviction("test".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Eviction"));
    }
}
