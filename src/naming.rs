//! Bucket and Object Name Validation
//!
//! Pure checks run before any backend or cache access. A [`BucketName`] or
//! [`ObjectKey`] can only be obtained through validation, so code that
//! receives one never validates again.

use std::fmt;

use crate::error::{Error, Result};

/// Minimum bucket name length
pub const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length
pub const MAX_BUCKET_NAME_LEN: usize = 63;

/// Maximum object name length in bytes
pub const MAX_OBJECT_NAME_LEN: usize = 1024;

/// Path separator reserved for directory markers
pub const SLASH_SEPARATOR: char = '/';

/// Characters never accepted in object names
const RESERVED_OBJECT_CHARS: &[char] = &['`', '^', '*', '|', '\\', '"'];

/// A validated bucket name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketName(String);

impl BucketName {
    /// Validate and wrap a bucket name
    pub fn parse(name: &str) -> Result<Self> {
        if is_valid_bucket_name(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(Error::InvalidBucketName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BucketName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated object key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validate and wrap an object key; `bucket` is only used for the error
    pub fn parse(bucket: &str, name: &str) -> Result<Self> {
        if is_valid_object_name(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(Error::InvalidObjectName {
                bucket: bucket.to_string(),
                object: name.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a bucket name
pub fn validate_bucket_name(name: &str) -> Result<BucketName> {
    BucketName::parse(name)
}

/// Validate an object name within `bucket`
pub fn validate_object_name(bucket: &str, name: &str) -> Result<ObjectKey> {
    ObjectKey::parse(bucket, name)
}

/// Check the bucket naming grammar.
///
/// 3-63 characters of `[a-z0-9.-]`, alphanumeric at both ends, no `..`,
/// and not shaped like an IPv4 address.
pub fn is_valid_bucket_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() < MIN_BUCKET_NAME_LEN || bytes.len() > MAX_BUCKET_NAME_LEN {
        return false;
    }

    let is_edge = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let is_inner = |b: u8| is_edge(b) || b == b'.' || b == b'-';

    if !is_edge(bytes[0]) || !is_edge(bytes[bytes.len() - 1]) {
        return false;
    }
    if !bytes.iter().all(|&b| is_inner(b)) {
        return false;
    }
    if name.contains("..") {
        return false;
    }

    !looks_like_ipv4(name)
}

/// Matches `^(\d+\.){3}\d+$`
fn looks_like_ipv4(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Check the object naming grammar.
///
/// Non-empty, at most 1024 bytes, no leading or trailing `/`, no `.` or
/// `..` path segments, and none of the reserved characters.
pub fn is_valid_object_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_OBJECT_NAME_LEN {
        return false;
    }
    if name.starts_with(SLASH_SEPARATOR) || name.ends_with(SLASH_SEPARATOR) {
        return false;
    }
    if name
        .split(SLASH_SEPARATOR)
        .any(|segment| segment == "." || segment == "..")
    {
        return false;
    }
    !name.contains(RESERVED_OBJECT_CHARS) && !name.contains('\0')
}

// =============================================================================
// Tests
// =============================================================================
