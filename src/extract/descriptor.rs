use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::dom::{Document, NodeId, Rect};
use crate::frame::{encode, join_scoped, FrameLocator, TOP_FRAME_MARKER};
use crate::store::override_key;

use super::labels::{derive_label, LabelMode};
use super::synthesizer::SelectorSynthesizer;

const KEY_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "class",
    "placeholder",
    "value",
    "maxlength",
    "required",
    "readonly",
    "disabled",
];

fn top_frame_marker() -> String {
    TOP_FRAME_MARKER.to_string()
}

/// Identity snapshot of one selected element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub label: String,
    /// Selector scoped to the element's own document.
    pub selector: String,
    /// Canonical frame context; `"document"` for the top frame.
    #[serde(alias = "frameContext", default = "top_frame_marker")]
    pub context_document: String,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub validation: Validation,
    #[serde(default)]
    pub accessibility: Accessibility,
    #[serde(default)]
    pub position: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default)]
    pub frame: FrameInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
}

impl ElementDescriptor {
    /// Deduplication identity: `(context, selector, label, type)`. The same
    /// frame-local selector in two different frames names two elements.
    pub fn identity(&self) -> (&str, &str, &str, &str) {
        (
            self.context_document.trim(),
            &self.selector,
            &self.label,
            &self.element_type,
        )
    }

    pub fn override_key(&self) -> String {
        override_key(&self.context_document, &self.selector)
    }

    /// `"<frame locator> >>> <selector>"`, or the bare selector at top.
    pub fn scoped_selector(&self) -> String {
        let locator = crate::frame::decode(&self.context_document).map(|raw| FrameLocator::parse(&raw));
        join_scoped(locator.as_ref(), &self.selector)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessibility {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_describedby: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub tab_index: i32,
}

/// Where the element was captured from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    pub in_frame: bool,
    pub url: String,
    /// Raw frame locator, empty at top.
    pub selector_prefix: String,
}

/// The frame a descriptor is extracted in, as seen by its parent.
#[derive(Debug, Clone)]
pub struct FrameScope {
    pub url: String,
    pub locator: Option<FrameLocator>,
}

pub fn describe(
    doc: &Document,
    node: NodeId,
    synthesizer: &SelectorSynthesizer,
    scope: &FrameScope,
    mode: LabelMode,
) -> ElementDescriptor {
    let selector = synthesizer.synthesize(doc, node);
    let prefix = scope.locator.as_ref().map(ToString::to_string).unwrap_or_default();
    let context_document = match &scope.locator {
        Some(locator) => encode(&locator.to_string()),
        None => top_frame_marker(),
    };

    ElementDescriptor {
        label: derive_label(doc, node, mode),
        selector,
        context_document,
        element_type: element_type(doc, node),
        attributes: key_attributes(doc, node),
        validation: validation(doc, node),
        accessibility: accessibility(doc, node),
        position: doc.rect(node),
        html: Some(doc.outer_html(node)),
        frame: FrameInfo {
            in_frame: scope.locator.is_some(),
            url: scope.url.clone(),
            selector_prefix: prefix,
        },
        group: None,
        sample: None,
    }
}

/// `tag[type]` using the effective control type, or the bare tag.
pub fn element_type(doc: &Document, node: NodeId) -> String {
    let tag = doc.tag_name(node).unwrap_or_default();
    match doc.control_type(node) {
        Some(kind) => format!("{tag}[{kind}]"),
        None => tag.to_string(),
    }
}

fn key_attributes(doc: &Document, node: NodeId) -> BTreeMap<String, String> {
    KEY_ATTRIBUTES
        .iter()
        .filter_map(|name| doc.attr(node, name).map(|v| (name.to_string(), v.to_string())))
        .collect()
}

fn validation(doc: &Document, node: NodeId) -> Validation {
    let text = |name: &str| doc.non_empty_attr(node, name).map(str::to_string);
    let length = |name: &str| {
        doc.attr(node, name)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
    };
    Validation {
        required: doc.has_attr(node, "required").then_some(true),
        pattern: text("pattern"),
        min_length: length("minlength"),
        max_length: length("maxlength"),
        min: text("min"),
        max: text("max"),
        step: text("step"),
    }
}

fn accessibility(doc: &Document, node: NodeId) -> Accessibility {
    let text = |name: &str| doc.non_empty_attr(node, name).map(str::to_string);
    Accessibility {
        aria_label: text("aria-label"),
        aria_describedby: text("aria-describedby"),
        role: text("role"),
        tab_index: doc.tab_index(node),
    }
}

/// Keeps the first descriptor of each [`ElementDescriptor::identity`].
pub fn dedupe_descriptors(descriptors: Vec<ElementDescriptor>) -> Vec<ElementDescriptor> {
    let mut seen = HashSet::new();
    descriptors
        .into_iter()
        .filter(|d| {
            let (context, selector, label, kind) = d.identity();
            seen.insert((
                context.to_string(),
                selector.to_string(),
                label.to_string(),
                kind.to_string(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::frame::{split_scoped, FrameContext};

    fn top_scope(url: &str) -> FrameScope {
        FrameScope {
            url: url.to_string(),
            locator: None,
        }
    }

    #[test]
    fn test_describe_top_frame_input() {
        let doc = parse_html(
            "https://shop.example.com/checkout",
            r#"<label for="email">Email</label>
            <input id="email" type="email" required maxlength="80" data-rect="10,20,200,24" aria-describedby="hint">"#,
        )
        .unwrap();
        let node = doc.query_selector("#email").unwrap().unwrap();
        let d = describe(
            &doc,
            node,
            &SelectorSynthesizer::default(),
            &top_scope(doc.url()),
            LabelMode::Original,
        );

        assert_eq!(d.selector, "#email");
        assert_eq!(d.context_document, "document");
        assert_eq!(d.label, "Email");
        assert_eq!(d.element_type, "input[email]");
        assert_eq!(d.attributes.get("maxlength").map(String::as_str), Some("80"));
        assert!(d.attributes.contains_key("required"));
        assert_eq!(d.validation.required, Some(true));
        assert_eq!(d.validation.max_length, Some(80));
        assert_eq!(d.accessibility.aria_describedby.as_deref(), Some("hint"));
        assert_eq!(d.accessibility.tab_index, 0);
        assert_eq!(
            d.position,
            Rect {
                x: 10,
                y: 20,
                width: 200,
                height: 24
            }
        );
        assert!(!d.frame.in_frame);
        assert_eq!(d.scoped_selector(), "#email");
    }

    #[test]
    fn test_describe_in_child_frame_scopes_context() {
        let doc = parse_html("https://shop.example.com/billing", r#"<input name="card">"#).unwrap();
        let node = doc.query_selector("input").unwrap().unwrap();
        let scope = FrameScope {
            url: doc.url().to_string(),
            locator: Some(FrameLocator::Name("billing".into())),
        };
        let d = describe(&doc, node, &SelectorSynthesizer::default(), &scope, LabelMode::Original);

        assert_eq!(d.selector, r#"[name="card"]"#);
        assert_eq!(d.frame.selector_prefix, r#"iframe[name="billing"]"#);
        assert!(d.frame.in_frame);
        assert_eq!(
            FrameContext::parse(&d.context_document),
            FrameContext::Iframe(FrameLocator::Name("billing".into()))
        );

        let scoped = d.scoped_selector();
        assert_eq!(scoped, r#"iframe[name="billing"] >>> [name="card"]"#);
        assert_eq!(split_scoped(&scoped), (d.context_document.clone(), d.selector.clone()));
    }

    #[test]
    fn test_dedupe_keeps_first_of_each_identity() {
        let doc = parse_html("https://example.com/", r#"<input id="a"><input id="b">"#).unwrap();
        let synth = SelectorSynthesizer::default();
        let scope = top_scope(doc.url());
        let all: Vec<_> = doc
            .query_selector_all("input")
            .unwrap()
            .into_iter()
            .map(|n| describe(&doc, n, &synth, &scope, LabelMode::Original))
            .collect();

        let mut doubled = all.clone();
        doubled.extend(all.clone());
        let unique = dedupe_descriptors(doubled);
        assert_eq!(unique, all);
    }

    #[test]
    fn test_same_selector_in_different_frames_is_kept() {
        let doc = parse_html("https://shop.example.com/frame", r#"<input id="zip" placeholder="Zip">"#).unwrap();
        let node = doc.query_selector("#zip").unwrap().unwrap();
        let synth = SelectorSynthesizer::default();
        let in_frame = |name: &str| FrameScope {
            url: doc.url().to_string(),
            locator: Some(FrameLocator::Name(name.to_string())),
        };

        let shipping = describe(&doc, node, &synth, &in_frame("shipping"), LabelMode::Original);
        let billing = describe(&doc, node, &synth, &in_frame("billing"), LabelMode::Original);
        assert_eq!(shipping.selector, billing.selector);
        assert_ne!(shipping.identity(), billing.identity());

        let unique = dedupe_descriptors(vec![shipping.clone(), billing.clone(), shipping.clone()]);
        assert_eq!(unique, vec![shipping, billing]);
    }

    #[test]
    fn test_accepts_frame_context_alias() {
        let d: ElementDescriptor = serde_json::from_value(serde_json::json!({
            "label": "Email",
            "selector": "#email",
            "frameContext": "document",
            "type": "input[email]"
        }))
        .unwrap();
        assert_eq!(d.context_document, "document");
        assert_eq!(d.override_key(), "document >>> #email");
    }
}
