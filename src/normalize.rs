//! Subtractive cleanup of word-processor HTML for mail clients.
//!
//! Only known-unsupported constructs are removed: fonts, colors, spacing,
//! alignment and list formatting survive untouched. The optional table
//! border fix counters the Outlook Classic regression that paints visible
//! borders on layout tables.
//!
//! Steps run in a fixed order:
//!
//! 1. drop non-rendering nodes (script, meta, xml islands, `o:p`, comments,
//!    `w:*` elements)
//! 2. filter every `style` attribute (vendor `mso-*` and `tab-stops`)
//! 3. optionally force borders off on `table`, `td` and `th`

use markup5ever_rcdom::{Handle, NodeData};

use crate::dom;

/// Elements with no visual effect in a mail client.
const NON_RENDERING_ELEMENTS: &[&str] = &["script", "meta", "xml", "o:p"];

/// Element prefix of the word-processor namespace.
const VENDOR_ELEMENT_PREFIX: &str = "w:";

/// The one vendor declaration Outlook still honors.
const ALLOWED_VENDOR_DECLARATION: &str = "mso-line-height-rule";

const TABLE_BORDER_FIX: &[&str] = &[
    "border:none",
    "border-collapse:collapse",
    "mso-table-lspace:0pt",
    "mso-table-rspace:0pt",
];

const CELL_BORDER_FIX: &[&str] = &["border:none", "mso-border-alt:none"];

const VENDOR_BORDER_COLOR_ATTRIBUTES: &[&str] = &["bordercolor", "bordercolorlight", "bordercolordark"];

/// Normalize `html` and return the cleaned body markup.
pub fn normalize(html: &str, apply_table_border_fix: bool) -> String {
    let doc = dom::parse(html);
    let body = dom::body(&doc);

    remove_non_rendering_nodes(&body);
    cleanup_styles(&body);

    if apply_table_border_fix {
        fix_table_borders(&body);
    }

    dom::inner_html(&body)
}

fn remove_non_rendering_nodes(root: &Handle) {
    for node in dom::descendants(root) {
        let remove = match &node.data {
            NodeData::Comment { .. } => true,
            NodeData::Element { name, .. } => {
                let tag = name.local.as_ref();
                NON_RENDERING_ELEMENTS
                    .iter()
                    .any(|n| tag.eq_ignore_ascii_case(n))
                    || tag.to_ascii_lowercase().starts_with(VENDOR_ELEMENT_PREFIX)
            }
            _ => false,
        };
        if remove {
            dom::detach(&node);
        }
    }
}

fn cleanup_styles(root: &Handle) {
    for node in dom::elements(root) {
        let Some(style) = dom::get_attr(&node, "style") else {
            continue;
        };
        let cleaned = remove_unsupported_declarations(&style);
        if cleaned.trim().is_empty() {
            dom::remove_attr(&node, "style");
        } else {
            dom::set_attr(&node, "style", &cleaned);
        }
    }
}

fn declarations(style: &str) -> impl Iterator<Item = &str> {
    style.split(';').map(str::trim).filter(|d| !d.is_empty())
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value.len() >= prefix.len()
        && value.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Keep everything except `mso-*` (bar the line-height rule) and tab stops.
pub fn remove_unsupported_declarations(style: &str) -> String {
    declarations(style)
        .filter(|decl| {
            if starts_with_ignore_case(decl, "mso-") {
                return starts_with_ignore_case(decl, ALLOWED_VENDOR_DECLARATION);
            }
            !decl.to_ascii_lowercase().contains("tab-stops")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Drop `border*` declarations and the vendor `windowtext` border color.
fn remove_border_declarations(style: &str) -> Vec<&str> {
    declarations(style)
        .filter(|decl| {
            !starts_with_ignore_case(decl, "border")
                && !decl.to_ascii_lowercase().contains("windowtext")
        })
        .collect()
}

fn with_fix(style: &str, fix: &[&str]) -> String {
    let mut decls = remove_border_declarations(style);
    decls.extend_from_slice(fix);
    decls.join("; ")
}

fn fix_table_borders(root: &Handle) {
    for node in dom::elements(root) {
        if dom::is_element(&node, "table") {
            dom::set_attr(&node, "border", "0");
            dom::set_attr(&node, "cellpadding", "0");
            dom::set_attr(&node, "cellspacing", "0");
            for attr in VENDOR_BORDER_COLOR_ATTRIBUTES {
                dom::remove_attr(&node, attr);
            }
            let style = dom::get_attr(&node, "style").unwrap_or_default();
            dom::set_attr(&node, "style", &with_fix(&style, TABLE_BORDER_FIX));
        } else if dom::is_element(&node, "td") || dom::is_element(&node, "th") {
            dom::remove_attr(&node, "border");
            for attr in VENDOR_BORDER_COLOR_ATTRIBUTES {
                dom::remove_attr(&node, attr);
            }
            let style = dom::get_attr(&node, "style").unwrap_or_default();
            dom::set_attr(&node, "style", &with_fix(&style, CELL_BORDER_FIX));
        }
    }
}
