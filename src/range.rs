//! Byte Range Resolution
//!
//! Turns a requested `(offset, length)` into a [`ByteRange`] that is
//! guaranteed to lie inside the object. Requests reaching past the end are
//! rejected, never truncated.

use crate::error::{Error, Result};

/// A legal byte window `[start, start + length)` of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: i64,
    length: i64,
}

impl ByteRange {
    /// The whole object
    pub fn full(size: i64) -> Result<Self> {
        resolve(0, size, size)
    }

    #[inline]
    pub fn start(&self) -> i64 {
        self.start
    }

    #[inline]
    pub fn length(&self) -> i64 {
        self.length
    }

    /// Exclusive end offset
    #[inline]
    pub fn end(&self) -> i64 {
        self.start + self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// True when the window spans an object of `size` bytes entirely
    #[inline]
    pub fn covers(&self, size: i64) -> bool {
        self.start == 0 && self.length == size
    }
}

/// Resolve a requested window against the true object size.
///
/// Negative inputs are caller errors (`Unexpected`); windows outside
/// `[0, size]` are `InvalidRange` carrying the original inputs.
pub fn resolve(offset: i64, length: i64, size: i64) -> Result<ByteRange> {
    if offset < 0 {
        return Err(Error::Unexpected(format!("negative offset {}", offset)));
    }
    if length < 0 {
        return Err(Error::Unexpected(format!("negative length {}", length)));
    }

    let invalid = || Error::InvalidRange {
        offset,
        length,
        size,
    };

    if offset > size {
        return Err(invalid());
    }
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(ByteRange {
            start: offset,
            length,
        }),
        _ => Err(invalid()),
    }
}

// =============================================================================
// Tests
// =============================================================================
