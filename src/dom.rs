//! Thin helpers over the `html5ever` / `markup5ever_rcdom` tree.
//!
//! Every pipeline stage parses with [`parse`], edits the reference-counted
//! tree in place, and serializes the `<body>` children back with
//! [`inner_html`]. The parser is the HTML5 tree builder, so malformed input
//! never fails: it is repaired the way a browser would repair it.

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{Attribute, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::cell::RefCell;
use std::rc::Rc;

/// Parse a full document or a bare fragment into a DOM.
///
/// Fragments are wrapped in the implied `html`/`head`/`body` elements.
pub fn parse(html: &str) -> RcDom {
    html5ever::parse_document(RcDom::default(), ParseOpts::default()).one(html)
}

/// The `<body>` element, or the document node if no body was produced.
pub fn body(dom: &RcDom) -> Handle {
    find_first(&dom.document, "body").unwrap_or_else(|| dom.document.clone())
}

/// Parse `html` and return only the inner markup of its body.
pub fn body_inner_html(html: &str) -> String {
    let dom = parse(html);
    inner_html(&body(&dom))
}

/// Serialize the children of `node` (not the node itself).
pub fn inner_html(node: &Handle) -> String {
    let mut buf = Vec::new();
    let handle: SerializableHandle = node.clone().into();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..Default::default()
    };
    if let Err(e) = serialize(&mut buf, &handle, opts) {
        tracing::warn!(error = %e, "HTML serialization failed");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Local tag name of an element, `None` for non-element nodes.
pub fn tag_name(node: &Handle) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

pub fn is_element(node: &Handle, name: &str) -> bool {
    tag_name(node).is_some_and(|tag| tag.eq_ignore_ascii_case(name))
}

/// All descendants of `node` in document order, excluding `node`.
///
/// Returned as an owned list so callers can detach nodes while iterating.
pub fn descendants(node: &Handle) -> Vec<Handle> {
    let mut out = Vec::new();
    let mut stack: Vec<Handle> = node.children.borrow().iter().rev().cloned().collect();
    while let Some(current) = stack.pop() {
        stack.extend(current.children.borrow().iter().rev().cloned());
        out.push(current);
    }
    out
}

/// All descendant elements of `node` in document order.
pub fn elements(node: &Handle) -> Vec<Handle> {
    descendants(node)
        .into_iter()
        .filter(|n| matches!(n.data, NodeData::Element { .. }))
        .collect()
}

pub fn find_first(node: &Handle, name: &str) -> Option<Handle> {
    descendants(node).into_iter().find(|n| is_element(n, name))
}

/// Remove `node` from its parent. A node without a parent is left alone.
pub fn detach(node: &Handle) {
    let parent = node.parent.take().and_then(|weak| weak.upgrade());
    if let Some(parent) = parent {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
}

pub fn append_text(parent: &Handle, text: &str) {
    let child = Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    });
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// Attribute name as written in markup, including any namespace prefix
/// (`xlink:href` parsed inside SVG keeps its prefix here).
pub fn attr_key(attr: &Attribute) -> String {
    match &attr.name.prefix {
        Some(prefix) => format!("{}:{}", prefix, attr.name.local),
        None => attr.name.local.to_string(),
    }
}

pub fn get_attr(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| attr_key(a).eq_ignore_ascii_case(name))
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

pub fn has_attr(node: &Handle, name: &str) -> bool {
    get_attr(node, name).is_some()
}

/// Set an attribute, replacing the existing value in place or appending a
/// new attribute at the end.
pub fn set_attr(node: &Handle, name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        if let Some(existing) = attrs
            .iter_mut()
            .find(|a| attr_key(a).eq_ignore_ascii_case(name))
        {
            existing.value = StrTendril::from_slice(value);
            return;
        }
        attrs.push(Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
            value: StrTendril::from_slice(value),
        });
    }
}

pub fn remove_attr(node: &Handle, name: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs
            .borrow_mut()
            .retain(|a| !attr_key(a).eq_ignore_ascii_case(name));
    }
}
