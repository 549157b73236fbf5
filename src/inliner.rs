//! CSS inlining.
//!
//! Mail clients ignore most `<style>` blocks, so selector-matched
//! declarations are moved into each element's `style` attribute by
//! [`css_inline`]. When that transform fails the markup degrades instead:
//! style blocks and every `class` attribute are dropped.

use crate::dom;

/// Inline `<style>` rules and return the body's inner markup.
pub fn inline_css(html: &str) -> String {
    let wrapped = wrap_html(html);
    let inliner = css_inline::CSSInliner::options()
        .keep_style_tags(false)
        .build();

    match inliner.inline(&wrapped) {
        Ok(inlined) => dom::body_inner_html(&inlined),
        Err(e) => {
            tracing::warn!(error = %e, "CSS inlining failed, stripping style blocks and classes");
            fallback_inline(html)
        }
    }
}

/// Wrap a fragment in a minimal document shell; full documents pass through.
fn wrap_html(html: &str) -> String {
    if html.to_ascii_lowercase().contains("<html") {
        html.to_string()
    } else {
        format!("<html><head></head><body>{}</body></html>", html)
    }
}

/// Degraded mode: drop `<style>` elements and all `class` attributes.
///
/// Lossy even on input that never needed inlining.
pub fn fallback_inline(html: &str) -> String {
    let doc = dom::parse(html);
    for node in dom::descendants(&doc.document) {
        if dom::is_element(&node, "style") {
            dom::detach(&node);
        } else {
            dom::remove_attr(&node, "class");
        }
    }
    dom::inner_html(&dom::body(&doc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_style_rules_inline_and_drops_style_block() {
        let html = r#"<style>.brand { color: red; }</style><p class="brand">Mario Rossi</p>"#;
        let out = inline_css(html);
        assert!(!out.contains("<style"), "{}", out);
        assert!(out.contains("style="), "{}", out);
        assert!(out.contains("red"), "{}", out);
        assert!(out.contains("Mario Rossi"));
    }

    #[test]
    fn full_document_returns_body_markup_only() {
        let html = "<html><head><style>p { font-size: 10pt; }</style></head>\
                    <body><p>Line</p></body></html>";
        let out = inline_css(html);
        assert!(out.trim_start().starts_with("<p"), "{}", out);
        assert!(!out.contains("<body"));
        assert!(out.contains("10pt"));
    }

    #[test]
    fn input_without_style_blocks_is_unchanged() {
        let html = r#"<p style="color: blue">Hi</p>"#;
        let once = inline_css(html);
        assert!(once.contains("Hi"));
        assert!(once.contains("blue"));
        assert_eq!(inline_css(&once), once);
    }

    #[test]
    fn fallback_removes_styles_and_classes() {
        let html = r#"<style>.a{color:red}</style><div class="a"><span class="b">x</span></div>"#;
        assert_eq!(fallback_inline(html), "<div><span>x</span></div>");
    }
}
