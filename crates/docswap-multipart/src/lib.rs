//! docswap-multipart: Zero-dependency single-file multipart extractor
//!
//! Pulls one file payload out of a `multipart/form-data` body without a
//! full multipart grammar. Used by the upload handler in docswap-core.
//!
//! ## Policy
//! - The boundary token is whatever follows the first `boundary=` in the
//!   `Content-Type` header, up to the next `;`. No quoting or escaping.
//! - The payload starts right after the first `\r\n\r\n` in the body.
//! - The payload ends at the first `\r\n--<boundary>` after that point.
//! - Only the first part is considered; field names and filenames are ignored.
//!
//! ## Complexity
//! [`find`] is a first-byte-match-then-verify scan: O(n·m) in the worst case.
//! Uploads are expected to be small documents, so no suffix automaton is used.
//!
//! ## Example
//! ```
//! use docswap_multipart::{boundary, extract_file};
//!
//! let content_type = "multipart/form-data; boundary=XYZ";
//! let body = b"--XYZ\r\n\
//!     Content-Disposition: form-data; name=\"file\"; filename=\"index.html\"\r\n\
//!     \r\n\
//!     hello world!\r\n\
//!     --XYZ--\r\n";
//!
//! let token = boundary(content_type).unwrap();
//! assert_eq!(token, "XYZ");
//! assert_eq!(extract_file(body, token).unwrap(), b"hello world!");
//! ```

use std::fmt;

/// Header/payload separator inside a part
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Content type prefix accepted for uploads
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

const BOUNDARY_PARAM: &str = "boundary=";

/// Reasons a body yields no payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractError {
    /// No `\r\n\r\n` in the body
    MissingHeaderTerminator,
    /// No `\r\n--<boundary>` after the part headers
    MissingClosingBoundary,
    /// Both markers found but nothing between them
    EmptyPayload,
}

impl ExtractError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractError::MissingHeaderTerminator => "part header terminator not found",
            ExtractError::MissingClosingBoundary => "closing boundary not found",
            ExtractError::EmptyPayload => "file payload is empty",
        }
    }
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ExtractError {}

/// Check whether a `Content-Type` value announces form data
///
/// Prefix match only, parameters are not inspected.
pub fn is_form_data(content_type: &str) -> bool {
    content_type.starts_with(MULTIPART_FORM_DATA)
}

/// Extract the boundary token from a `Content-Type` header value
///
/// Returns `None` if there is no `boundary=` or the token is empty.
///
/// # Example
/// ```
/// use docswap_multipart::boundary;
///
/// assert_eq!(boundary("multipart/form-data; boundary=----abc"), Some("----abc"));
/// assert_eq!(boundary("multipart/form-data"), None);
/// ```
pub fn boundary(content_type: &str) -> Option<&str> {
    let start = content_type.find(BOUNDARY_PARAM)? + BOUNDARY_PARAM.len();
    let rest = &content_type[start..];
    let token = match rest.find(';') {
        Some(end) => &rest[..end],
        None => rest,
    };
    let token = token.trim();

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Find the first occurrence of `needle` in `haystack` at or after `from`
///
/// Scans for the needle's first byte, then verifies the remaining bytes.
/// An empty needle matches at `from`. Returns `None` when `from` is past the
/// end of the haystack.
pub fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    let Some((&first, rest)) = needle.split_first() else {
        return Some(from);
    };
    if needle.len() > haystack.len() {
        return None;
    }

    let last_start = haystack.len() - needle.len();
    (from..=last_start)
        .find(|&i| haystack[i] == first && &haystack[i + 1..i + needle.len()] == rest)
}

/// Build the marker that ends the file payload: `\r\n--<boundary>`
pub fn closing_marker(boundary: &str) -> Vec<u8> {
    let mut marker = Vec::with_capacity(4 + boundary.len());
    marker.extend_from_slice(b"\r\n--");
    marker.extend_from_slice(boundary.as_bytes());
    marker
}

/// Extract the single file payload from a multipart body
///
/// The returned slice borrows from `body`.
pub fn extract_file<'a>(body: &'a [u8], boundary: &str) -> Result<&'a [u8], ExtractError> {
    let start = find(body, HEADER_TERMINATOR, 0)
        .ok_or(ExtractError::MissingHeaderTerminator)?
        + HEADER_TERMINATOR.len();

    let marker = closing_marker(boundary);
    let end = find(body, &marker, start).ok_or(ExtractError::MissingClosingBoundary)?;

    let payload = &body[start..end];
    if payload.is_empty() {
        return Err(ExtractError::EmptyPayload);
    }
    Ok(payload)
}
