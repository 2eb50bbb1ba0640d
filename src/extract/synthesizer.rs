use crate::dom::selector::{is_plain_ident, quote_attr_value};
use crate::dom::{Document, NodeId};

/// Class-based selectors are accepted once they match at most this many
/// elements.
pub const DEFAULT_CLASS_MATCH_THRESHOLD: usize = 3;

/// Builds a minimal selector for an element, scoped to its own document.
///
/// Tries, in order: `#id`, `[name="…"]`, `tag[type="…"]` narrowed by
/// classes, a parent-context prefix, and finally a structural index among
/// siblings sharing the same tag and type. Never fails; the last step may
/// still be ambiguous when the tree offers nothing better.
#[derive(Debug, Clone, Copy)]
pub struct SelectorSynthesizer {
    class_match_threshold: usize,
}

impl Default for SelectorSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_CLASS_MATCH_THRESHOLD)
    }
}

impl SelectorSynthesizer {
    pub fn new(class_match_threshold: usize) -> Self {
        Self {
            class_match_threshold: class_match_threshold.max(1),
        }
    }

    pub fn class_match_threshold(&self) -> usize {
        self.class_match_threshold
    }

    pub fn synthesize(&self, doc: &Document, node: NodeId) -> String {
        if let Some(id) = doc.non_empty_attr(node, "id") {
            let selector = id_token(id);
            if doc.count(&selector) == 1 {
                return selector;
            }
        }

        if let Some(name) = doc.non_empty_attr(node, "name") {
            let selector = format!("[name={}]", quote_attr_value(name));
            if doc.count(&selector) == 1 {
                return selector;
            }
        }

        let base = base_selector(doc, node);
        let mut selector = base.clone();
        let mut narrowed = base.clone();
        for class_name in doc.classes(node).iter().filter(|c| is_plain_ident(c)) {
            narrowed.push('.');
            narrowed.push_str(class_name);
            if doc.count(&narrowed) <= self.class_match_threshold {
                selector = narrowed;
                break;
            }
        }

        if doc.count(&selector) > 1 {
            if let Some(parent) = doc.parent_element(node).filter(|p| doc.tag_name(*p) != Some("body")) {
                selector = format!("{} > {}", parent_token(doc, parent), selector);
            }
        }

        if doc.count(&selector) > 1 {
            if let Some(parent) = doc.parent(node) {
                let peers: Vec<NodeId> = doc
                    .element_children(parent)
                    .into_iter()
                    .filter(|sibling| doc.matches(*sibling, &base).unwrap_or(false))
                    .collect();
                if peers.len() > 1 {
                    if let Some(pos) = peers.iter().position(|p| *p == node) {
                        selector = format!("{selector}:nth-child({} of {base})", pos + 1);
                    }
                }
            }
        }

        selector
    }
}

fn id_token(id: &str) -> String {
    if is_plain_ident(id) {
        format!("#{id}")
    } else {
        format!("[id={}]", quote_attr_value(id))
    }
}

/// `tag`, plus `[type="…"]` when the attribute is present.
fn base_selector(doc: &Document, node: NodeId) -> String {
    let tag = doc.tag_name(node).unwrap_or("*");
    match doc.attr(node, "type") {
        Some(kind) => format!("{tag}[type={}]", quote_attr_value(kind)),
        None => tag.to_string(),
    }
}

fn parent_token(doc: &Document, parent: NodeId) -> String {
    if let Some(id) = doc.non_empty_attr(parent, "id").filter(|id| is_plain_ident(id)) {
        return format!("#{id}");
    }
    if let Some(first) = doc.classes(parent).into_iter().next().filter(|c| is_plain_ident(c)) {
        return format!(".{first}");
    }
    doc.tag_name(parent).unwrap_or("*").to_string()
}
