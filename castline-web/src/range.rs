//! HTTP Range header handling for partial content responses
//!
//! Parsing is deliberately forgiving: remote players send a wide variety of
//! malformed or out-of-bounds ranges, and a best-effort interval serves them
//! better than a 416. Only ranges that cannot overlap the resource at all are
//! reported, and the caller answers those with the full content.

use thiserror::Error;

/// Inclusive byte interval of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Number of bytes in the interval, at least one.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Range that cannot be served as partial content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("range not satisfiable for resource of {total} bytes")]
    Unsatisfiable { total: u64 },
}

/// Parses a `Range` header value against a resource of `total` bytes.
///
/// Unparsable starts default to 0 and unparsable or missing ends default to
/// the last byte. Ends past the resource are clamped, and an end before the
/// start makes the range open-ended. Suffix ranges are not supported:
/// `bytes=-500` reads as `0-500`.
///
/// # Errors
///
/// - `RangeError::Unsatisfiable` - The resource is empty or the start lies past its end
///
/// # Examples
/// ```
/// use castline_web::range::parse_range_header;
///
/// let range = parse_range_header("bytes=500-", 1000).unwrap();
/// assert_eq!((range.start, range.end, range.length()), (500, 999, 500));
/// ```
pub fn parse_range_header(value: &str, total: u64) -> Result<ByteRange, RangeError> {
    if total == 0 {
        return Err(RangeError::Unsatisfiable { total });
    }
    let last = total - 1;

    let bounds = value.trim();
    let bounds = bounds.strip_prefix("bytes=").unwrap_or(bounds);
    let mut parts = bounds.split('-');

    let start = parts
        .next()
        .and_then(|token| token.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let end = match parts.next().map(str::trim) {
        Some(token) if !token.is_empty() => token.parse::<u64>().unwrap_or(last),
        _ => last,
    };

    if start > last {
        return Err(RangeError::Unsatisfiable { total });
    }

    let end = end.min(last);
    let end = if end < start { last } else { end };

    Ok(ByteRange { start, end, total })
}
