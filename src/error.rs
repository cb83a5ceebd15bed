//! Error types for the object layer

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the object layer, its backends and the server
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Validation Errors
    // =========================================================================
    /// Bucket name violates the naming grammar
    #[error("Bucket name invalid: {0}")]
    InvalidBucketName(String),

    /// Object name violates the naming grammar
    #[error("Object name invalid: {bucket}#{object}")]
    InvalidObjectName { bucket: String, object: String },

    /// Requested window lies outside the object
    #[error(
        "The requested range \"bytes {offset}-{end}/{size}\" is not satisfiable.",
        end = range_end(.offset, .length)
    )]
    InvalidRange { offset: i64, length: i64, size: i64 },

    /// Caller contract violation (negative offset/length, missing sink)
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    // =========================================================================
    // Namespace Errors
    // =========================================================================
    /// Bucket does not exist
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Bucket already exists
    #[error("Bucket exists: {0}")]
    BucketExists(String),

    /// Object does not exist
    #[error("Object not found: {bucket}#{object}")]
    ObjectNotFound { bucket: String, object: String },

    /// I/O error from a backend read or a sink write
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Erasure Coding Errors
    // =========================================================================
    /// EC encoding failed
    #[error("EC encoding failed: {0}")]
    EcEncodingFailed(String),

    /// EC reconstruction failed
    #[error("EC reconstruction failed for block {block}: {reason}")]
    EcReconstructionFailed { block: u64, reason: String },

    /// Insufficient shards for reconstruction
    #[error("Insufficient shards for reconstruction: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    /// Invalid EC configuration
    #[error("Invalid EC configuration: {0}")]
    InvalidEcConfig(String),

    /// Too few disks agree on the object metadata
    #[error("Read quorum not met for {bucket}#{object}: {available}/{required} disks")]
    ReadQuorum {
        bucket: String,
        object: String,
        available: usize,
        required: usize,
    },

    /// Too few disks accepted a write
    #[error("Write quorum not met: {available}/{required} disks")]
    WriteQuorum { available: usize, required: usize },

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn range_end(offset: &i64, length: &i64) -> i64 {
    offset.saturating_add(*length)
}

impl Error {
    /// Shorthand for an object-not-found error
    pub fn object_not_found(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Error::ObjectNotFound {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    /// True for missing buckets and missing objects
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::BucketNotFound(_) | Error::ObjectNotFound { .. })
    }

    /// True for errors caused by the request itself rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidBucketName(_)
                | Error::InvalidObjectName { .. }
                | Error::InvalidRange { .. }
                | Error::Unexpected(_)
                | Error::BucketExists(_)
        ) || self.is_not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_range_display_carries_inputs() {
        let err = Error::InvalidRange {
            offset: 100,
            length: 50,
            size: 120,
        };
        assert_eq!(
            err.to_string(),
            "The requested range \"bytes 100-150/120\" is not satisfiable."
        );
    }

    #[test]
    fn test_invalid_range_display_saturates() {
        let err = Error::InvalidRange {
            offset: i64::MAX,
            length: 1,
            size: 10,
        };
        assert!(err.to_string().contains(&i64::MAX.to_string()));
    }

    #[test]
    fn test_name_errors_display() {
        assert_eq!(
            Error::InvalidBucketName(".test".into()).to_string(),
            "Bucket name invalid: .test"
        );
        let err = Error::InvalidObjectName {
            bucket: "bucket".into(),
            object: String::new(),
        };
        assert_eq!(err.to_string(), "Object name invalid: bucket#");
    }

    #[test]
    fn test_classification() {
        assert!(Error::object_not_found("b", "o").is_not_found());
        assert!(Error::BucketNotFound("b".into()).is_client_error());
        assert!(!Error::Internal("boom".into()).is_client_error());
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(!io.is_client_error());
    }
}
