use serde::{Deserialize, Serialize};

use crate::dom::selector::quote_attr_value;
use crate::dom::{Document, Element, NodeId};

const CONTROL_TAGS: &[&str] = &["input", "select", "button", "textarea"];

/// Which label-derivation chain extraction uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    #[default]
    Original,
    /// Also consults fieldset legends and nearby label-like containers.
    Enhanced,
}

/// Human-readable label for a control. Always non-empty: falls back to
/// `<tag>_<type>`.
pub fn derive_label(doc: &Document, node: NodeId, mode: LabelMode) -> String {
    let mut strategies: Vec<fn(&Document, NodeId) -> Option<String>> = vec![
        for_label,
        wrapping_label,
        aria_label,
        |doc: &Document, node: NodeId| attr_text(doc, node, "placeholder"),
        |doc: &Document, node: NodeId| attr_text(doc, node, "title"),
        previous_sibling_text,
        table_header,
    ];
    if mode == LabelMode::Enhanced {
        strategies.push(fieldset_legend);
        strategies.push(nearby_text);
    }
    strategies.push(own_text);

    strategies
        .into_iter()
        .find_map(|strategy| strategy(doc, node))
        .unwrap_or_else(|| fallback_label(doc, node))
}

fn is_control(el: &Element) -> bool {
    CONTROL_TAGS.contains(&el.tag_name.as_str())
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn contains_control(doc: &Document, node: NodeId) -> bool {
    doc.descendants(node)
        .into_iter()
        .any(|d| doc.element(d).is_some_and(is_control))
}

fn for_label(doc: &Document, node: NodeId) -> Option<String> {
    let id = doc.non_empty_attr(node, "id")?;
    let label = doc
        .query_selector(&format!("label[for={}]", quote_attr_value(id)))
        .ok()
        .flatten()?;
    non_blank(doc.text_content(label))
}

fn wrapping_label(doc: &Document, node: NodeId) -> Option<String> {
    let label = doc.closest(node, "label")?;
    non_blank(doc.text_content_excluding(label, is_control))
}

fn aria_label(doc: &Document, node: NodeId) -> Option<String> {
    if let Some(label) = doc.attr(node, "aria-label").and_then(|v| non_blank(v.to_string())) {
        return Some(label);
    }
    let target = doc.non_empty_attr(node, "aria-labelledby")?;
    let labelled_by = doc
        .all_elements()
        .into_iter()
        .find(|n| doc.attr(*n, "id") == Some(target))?;
    non_blank(doc.text_content(labelled_by))
}

fn attr_text(doc: &Document, node: NodeId, name: &str) -> Option<String> {
    doc.attr(node, name).and_then(|v| non_blank(v.to_string()))
}

fn previous_sibling_text(doc: &Document, node: NodeId) -> Option<String> {
    previous_siblings(doc, node).find_map(|sibling| sibling_text(doc, sibling))
}

/// Text of a sibling that holds no controls of its own.
fn sibling_text(doc: &Document, sibling: NodeId) -> Option<String> {
    if contains_control(doc, sibling) {
        return None;
    }
    non_blank(doc.text_content(sibling))
}

fn previous_siblings(doc: &Document, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    std::iter::successors(doc.previous_element_sibling(node), move |n| {
        doc.previous_element_sibling(*n)
    })
}

/// Header text of the column the control sits in.
fn table_header(doc: &Document, node: NodeId) -> Option<String> {
    let cell = doc.closest(node, "td")?;
    let row = doc.parent_element(cell)?;
    let column = doc.element_children(row).iter().position(|c| *c == cell)?;
    let table = doc.closest(row, "table")?;
    let thead = doc.query_selector_all_from(table, "thead").ok()?.into_iter().next()?;
    let header_row = doc
        .query_selector_all_from(thead, "tr")
        .ok()?
        .into_iter()
        .find_map(|tr| doc.element_children(tr).get(column).copied())?;
    non_blank(doc.text_content(header_row))
}

fn fieldset_legend(doc: &Document, node: NodeId) -> Option<String> {
    let fieldset = doc.closest(node, "fieldset")?;
    let legend = doc.query_selector_all_from(fieldset, "legend").ok()?.into_iter().next()?;
    non_blank(doc.text_content(legend))
}

fn nearby_text(doc: &Document, node: NodeId) -> Option<String> {
    let container = doc.closest(node, r#"[class*="label"], [class*="field"], [class*="form"]"#);
    if let Some(text) = container.and_then(|c| non_blank(doc.text_content_excluding(c, is_control))) {
        return Some(text);
    }
    previous_siblings(doc, node)
        .take(2)
        .find_map(|sibling| sibling_text(doc, sibling))
}

fn own_text(doc: &Document, node: NodeId) -> Option<String> {
    matches!(doc.tag_name(node), Some("button") | Some("a"))
        .then(|| non_blank(doc.text_content(node)))
        .flatten()
}

fn fallback_label(doc: &Document, node: NodeId) -> String {
    format!(
        "{}_{}",
        doc.tag_name(node).unwrap_or("element"),
        doc.control_type(node).unwrap_or_else(|| "unknown".into())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    fn label_of(html: &str, selector: &str, mode: LabelMode) -> String {
        let doc = parse_html("https://example.com/", html).unwrap();
        let node = doc.query_selector(selector).unwrap().unwrap();
        derive_label(&doc, node, mode)
    }

    #[test]
    fn test_label_sources_in_priority_order() {
        let html = r#"<label for="email">Email address</label>
            <input id="email" placeholder="you@example.com">"#;
        assert_eq!(label_of(html, "#email", LabelMode::Original), "Email address");

        let html = r#"<label>Remember me <input type="checkbox" id="remember"></label>"#;
        assert_eq!(label_of(html, "#remember", LabelMode::Original), "Remember me");

        let html = r#"<span id="cap">Card number</span><div><input aria-labelledby="cap"></div>"#;
        assert_eq!(label_of(html, "input", LabelMode::Original), "Card number");

        let html = r#"<input placeholder="Search" title="Find things">"#;
        assert_eq!(label_of(html, "input", LabelMode::Original), "Search");

        let html = r#"<div><span>Zip</span><input name="zip"></div>"#;
        assert_eq!(label_of(html, "input", LabelMode::Original), "Zip");
    }

    #[test]
    fn test_table_header_column() {
        let html = r#"<table>
            <thead><tr><th>Name</th><th>Qty</th></tr></thead>
            <tbody><tr><td>Widget</td><td><input name="qty"></td></tr></tbody>
        </table>"#;
        assert_eq!(label_of(html, "input", LabelMode::Original), "Qty");
    }

    #[test]
    fn test_enhanced_mode_reads_legend() {
        let html = r#"<fieldset><legend>Shipping</legend><div><input name="street"></div></fieldset>"#;
        assert_eq!(label_of(html, "input", LabelMode::Original), "input_text");
        assert_eq!(label_of(html, "input", LabelMode::Enhanced), "Shipping");
    }

    #[test]
    fn test_enhanced_mode_reads_nearby_container() {
        let html = r#"<div class="form-row"><b>Phone</b><div><input name="phone"></div></div>"#;
        assert_eq!(label_of(html, "input", LabelMode::Original), "input_text");
        assert_eq!(label_of(html, "input", LabelMode::Enhanced), "Phone");
    }

    #[test]
    fn test_button_text_and_fallback() {
        assert_eq!(label_of("<button> Pay now </button>", "button", LabelMode::Original), "Pay now");
        assert_eq!(label_of(r#"<select name="x"></select>"#, "select", LabelMode::Original), "select_select-one");
        assert_eq!(label_of(r#"<div role="button"></div>"#, "div", LabelMode::Original), "div_unknown");
    }
}
