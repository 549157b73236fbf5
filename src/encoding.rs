//! Decoding HTML written in whatever charset the office suite chose.
//!
//! Word's filtered HTML is frequently `windows-1252`, so bytes are never
//! assumed to be UTF-8. Detection order:
//!
//! 1. a byte order mark
//! 2. valid UTF-8
//! 3. the `<meta charset>` / `http-equiv` declaration
//! 4. a statistical guess from `chardetng`
//!
//! Undecodable sequences become U+FFFD; decoding never fails.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use regex::Regex;

/// How far into the document a charset declaration is looked for.
const META_SCAN_LIMIT: usize = 4096;

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*charset\s*=\s*["']?\s*([A-Za-z0-9_:.\-]+)"#).unwrap()
});

/// Decode `bytes` to a `String`, detecting the encoding.
pub fn decode_html(bytes: &[u8]) -> String {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_with_bom_removal(bytes);
        return text.into_owned();
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let encoding = declared_charset(bytes).unwrap_or_else(|| {
        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        detector.guess(None, true)
    });
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        tracing::debug!(encoding = encoding.name(), "replaced undecodable bytes");
    }
    text.into_owned()
}

/// The encoding named by a `<meta>` tag near the top of the document.
fn declared_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(META_SCAN_LIMIT)]);
    let label = META_CHARSET.captures(&head)?.get(1)?.as_str();
    Encoding::for_label(label.as_bytes())
}
