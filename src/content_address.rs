//! Content-addressed asset naming.
//!
//! An asset's file name is the lowercase hex SHA-256 of its bytes followed by
//! a normalized extension, so identical images always land on the same name.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Extension used when neither the MIME type nor the source name tells us
/// what the bytes are.
pub const DEFAULT_EXTENSION: &str = ".img";

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `{sha256}{extension}`, where an empty extension becomes [`DEFAULT_EXTENSION`].
pub fn content_address(bytes: &[u8], extension: &str) -> String {
    format!("{}{}", content_hash(bytes), normalize_extension(extension))
}

/// Ensure a leading dot and fall back to [`DEFAULT_EXTENSION`].
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim();
    if trimmed.is_empty() || trimmed == "." {
        DEFAULT_EXTENSION.to_string()
    } else if trimmed.starts_with('.') {
        trimmed.to_string()
    } else {
        format!(".{}", trimmed)
    }
}

/// Extension of `path` including the dot, or an empty string.
pub fn path_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

pub fn extension_from_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/gif" => ".gif",
        "image/bmp" => ".bmp",
        "image/svg+xml" => ".svg",
        _ => DEFAULT_EXTENSION,
    }
}

pub fn mime_from_extension(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}
