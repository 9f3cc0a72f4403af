//! Utility functions for the upload service
//!
//! Filename handling lives here: sanitisation of client-supplied names,
//! extension checks, and generation of storage names.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

/// Path and filename utilities
pub mod path {
    use super::*;
    use std::path::{Component, Path};

    /// Anything outside this set is replaced when building a storage name.
    static UNSAFE_CHARS: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[^a-zA-Z0-9.\-_%()]").expect("static regex is valid"));

    /// Sanitize filename for safe storage
    pub fn sanitize_filename(filename: &str) -> String {
        UNSAFE_CHARS.replace_all(filename, "_").into_owned()
    }

    /// Case-insensitive check that `filename` ends with `.{extension}`
    pub fn has_extension(filename: &str, extension: &str) -> bool {
        let suffix = format!(".{}", extension.trim_start_matches('.'));
        filename.to_lowercase().ends_with(&suffix.to_lowercase())
    }

    /// Storage name for an upload: `<epoch-millis>-<sanitized-name>`
    pub fn storage_name(timestamp_millis: i64, original_name: &str) -> String {
        format!("{}-{}", timestamp_millis, sanitize_filename(original_name))
    }

    /// Milliseconds since the Unix epoch
    pub fn current_timestamp_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Render a relative path with `/` separators regardless of platform
    pub fn to_slash_path(path: &Path) -> String {
        path.components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                Component::ParentDir => Some("..".to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}
