//! Signature name sanitization.

use once_cell::sync::Lazy;
use regex::Regex;

/// Name used when sanitization leaves nothing behind.
pub const PLACEHOLDER_NAME: &str = "Firma";

pub const MAX_NAME_LEN: usize = 100;

/// Characters rejected in file names on at least one supported platform.
const INVALID_CHARS: &[char] = &['"', '<', '>', '|', ':', '*', '?', '\\', '/'];

static REPEATED_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// Make `name` safe as a file stem.
///
/// Invalid characters become `_`, runs of `_` collapse, leading and trailing
/// `_`/spaces are trimmed and the result is capped at [`MAX_NAME_LEN`]
/// characters. Empty results fall back to [`PLACEHOLDER_NAME`].
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_control() || INVALID_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches(|c| c == '_' || c == ' ');

    let capped: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    let capped = capped.trim_end_matches(|c| c == '_' || c == ' ');

    if capped.is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else {
        capped.to_string()
    }
}

/// `"{base}"` or `"{base} ({identifier})"`, both parts sanitized.
pub fn build_final_signature_name(base_name: &str, identifier: Option<&str>) -> String {
    let base = sanitize_file_name(base_name);
    match identifier.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("{} ({})", base, sanitize_file_name(id)),
        None => base,
    }
}
