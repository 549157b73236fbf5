//! Plain-text rendition of signature HTML.

use markup5ever_rcdom::{Handle, NodeData};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dom;

/// Elements whose end marks a line boundary in the text rendition.
const BLOCK_ELEMENTS: &[&str] = &["br", "p", "div", "tr"];

/// Elements whose text content is never visible.
const INVISIBLE_ELEMENTS: &[&str] = &["script", "style", "title", "head"];

static LINE_ENDINGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n|\r").unwrap());
static HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static WS_AROUND_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]*\n[ \t]*").unwrap());
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Derive the visible text of `html`, one line per block element.
pub fn build_plain_text(html: &str) -> String {
    let doc = dom::parse(html);
    let body = dom::body(&doc);

    for node in dom::elements(&body) {
        if BLOCK_ELEMENTS.iter().any(|tag| dom::is_element(&node, tag)) {
            dom::append_text(&node, "\n");
        }
    }

    let mut text = String::new();
    collect_text(&body, &mut text);
    let text = text.replace('\u{a0}', " ");

    let text = LINE_ENDINGS.replace_all(&text, "\n");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = WS_AROUND_NEWLINE.replace_all(&text, "\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

fn collect_text(node: &Handle, out: &mut String) {
    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            NodeData::Element { .. } => {
                if !INVISIBLE_ELEMENTS.iter().any(|tag| dom::is_element(child, tag)) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}
