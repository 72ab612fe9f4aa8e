use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelicError {
    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    #[error("Truncated input: needed {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Read out of range: {count} sector(s) at LBA {lba}, medium has {total}")]
    OutOfRange { lba: u64, count: u64, total: u64 },

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Filesystem is not mounted")]
    NotMounted,

    #[error("Filesystem is already mounted")]
    AlreadyMounted,

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("No such extended attribute: {0}")]
    NoSuchXattr(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl RelicError {
    /// True for conditions that only mean "this is not the format being probed".
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            RelicError::FormatMismatch(_)
                | RelicError::Truncated { .. }
                | RelicError::OutOfRange { .. }
        )
    }

    /// True when an extended-contract operation is simply not offered.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, RelicError::Unsupported(_))
    }

    pub fn mismatch(what: impl Into<String>) -> Self {
        RelicError::FormatMismatch(what.into())
    }

    pub fn unsupported(op: impl Into<String>) -> Self {
        RelicError::Unsupported(op.into())
    }
}

pub type Result<T> = std::result::Result<T, RelicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_classification() {
        assert!(RelicError::mismatch("bad magic").is_mismatch());
        assert!(RelicError::Truncated { needed: 64, available: 10 }.is_mismatch());
        assert!(RelicError::OutOfRange { lba: 9, count: 1, total: 4 }.is_mismatch());

        let io = RelicError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(!io.is_mismatch());
        assert!(!RelicError::unsupported("mount").is_mismatch());
    }

    #[test]
    fn test_unsupported_is_distinct() {
        let err = RelicError::unsupported("read_link");
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "Operation not supported: read_link");
    }
}
