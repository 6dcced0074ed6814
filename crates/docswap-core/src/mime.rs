//! Suffix to MIME type table
//!
//! Single table shared by the static file handler and its tests. Lookup is
//! a case-insensitive `.<suffix>` match on the end of the file name.

use std::path::Path;

/// Served when the extension is missing or unknown
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// Extension -> Content-Type
pub const MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("json", "application/json"),
    ("ico", "image/x-icon"),
];

/// Content type for a file path
pub fn mime_type(path: impl AsRef<Path>) -> &'static str {
    let name = path.as_ref().to_string_lossy().to_lowercase();

    MIME_TYPES
        .iter()
        .find(|(suffix, _)| {
            name.len() > suffix.len()
                && name.ends_with(suffix)
                && name.as_bytes()[name.len() - suffix.len() - 1] == b'.'
        })
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
}
