use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::selector::SelectorList;
use super::{DocumentHandle, DomError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Layout box in document coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Parses `"x,y,w,h"` as written in a `data-rect` attribute.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<i32> = raw
            .split(',')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [x, y, width, height] => Some(Self {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Focus,
    Input,
    Change,
    Click,
}

/// A notification dispatched to page logic, recorded in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomEvent {
    pub target: NodeId,
    pub kind: EventKind,
}

/// What an `<iframe>` element exposes to the document that embeds it.
#[derive(Debug, Clone)]
pub enum FrameContent {
    Accessible(DocumentHandle),
    CrossOrigin,
}

#[derive(Debug)]
pub struct Element {
    pub tag_name: String,
    pub attrs: BTreeMap<String, String>,
    pub value: String,
    pub checked: bool,
    pub rect: Rect,
    pub frame: Option<FrameContent>,
}

impl Element {
    fn new(tag_name: &str, attrs: Vec<(String, String)>) -> Self {
        let mut map = BTreeMap::new();
        for (name, value) in attrs {
            map.entry(name.to_ascii_lowercase()).or_insert(value);
        }
        let tag_name = tag_name.to_ascii_lowercase();
        let value = match tag_name.as_str() {
            "input" | "button" | "option" => map.get("value").cloned().unwrap_or_default(),
            _ => String::new(),
        };
        let checked = map.contains_key("checked");
        let rect = map
            .get("data-rect")
            .and_then(|raw| Rect::parse(raw))
            .unwrap_or_default();

        Self {
            tag_name,
            attrs: map,
            value,
            checked,
            rect,
            frame: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attrs
            .get("class")
            .map(String::as_str)
            .unwrap_or("")
            .split_whitespace()
    }

    pub fn has_class(&self, class_name: &str) -> bool {
        self.classes().any(|c| c == class_name)
    }
}

#[derive(Debug)]
enum NodeKind {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    url: String,
    events: Vec<DomEvent>,
    focused: Option<NodeId>,
}

impl Document {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root: NodeId(0),
            url: url.into(),
            events: Vec::new(),
            focused: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Text of the first `<title>` element, trimmed.
    pub fn title(&self) -> String {
        self.query_selector("title")
            .ok()
            .flatten()
            .map(|t| self.text_content(t).trim().to_string())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Tree construction
    // ------------------------------------------------------------------

    pub fn create_element(
        &mut self,
        parent: NodeId,
        tag_name: &str,
        attrs: Vec<(String, String)>,
    ) -> Result<NodeId, DomError> {
        self.node(parent)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind: NodeKind::Element(Element::new(tag_name, attrs)),
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId, DomError> {
        self.node(parent)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind: NodeKind::Text(text.to_string()),
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Removes a node (and its subtree) from the tree. The arena slot stays
    /// allocated so that stale ids keep resolving to "disconnected".
    pub fn detach(&mut self, node: NodeId) -> Result<(), DomError> {
        let parent = self.node(node)?.parent;
        if let Some(parent) = parent {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
        self.nodes[node.0].parent = None;
        if self.focused.is_some_and(|f| self.is_inclusive_ancestor(node, f)) {
            self.focused = None;
        }
        Ok(())
    }

    /// Seeds `value`/`checked` state from markup once the tree is built.
    pub(crate) fn init_form_controls(&mut self) {
        for node in self.all_elements() {
            let tag = self.tag_name(node).unwrap_or_default().to_string();
            match tag.as_str() {
                "textarea" => {
                    let text = self.text_content(node);
                    if let Some(el) = self.element_mut(node) {
                        el.value = text;
                    }
                }
                "select" => {
                    let options = self.options(node);
                    let selected = options
                        .iter()
                        .copied()
                        .find(|o| self.has_attr(*o, "selected"))
                        .or_else(|| options.first().copied());
                    let value = selected.map(|o| self.option_value(o)).unwrap_or_default();
                    if let Some(el) = self.element_mut(node) {
                        el.value = value;
                    }
                }
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub(crate) fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_or_err(&self, id: NodeId) -> Result<&Element, DomError> {
        self.node(id)?;
        self.element(id).ok_or(DomError::NotAnElement(id))
    }

    fn element_mut_or_err(&mut self, id: NodeId) -> Result<&mut Element, DomError> {
        self.node(id)?;
        self.element_mut(id).ok_or(DomError::NotAnElement(id))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag_name.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    /// Attribute value if present and not blank.
    pub fn non_empty_attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attr(id, name).filter(|v| !v.trim().is_empty())
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let el = self.element_mut_or_err(id)?;
        el.attrs.insert(name.to_ascii_lowercase(), value.to_string());
        Ok(())
    }

    pub fn classes(&self, id: NodeId) -> Vec<String> {
        self.element(id)
            .map(|el| el.classes().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|p| self.element(*p).is_some())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.element(*c).is_some())
            .collect()
    }

    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == id)?;
        siblings[..pos]
            .iter()
            .rev()
            .copied()
            .find(|c| self.element(*c).is_some())
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            if node == self.root {
                return true;
            }
            cursor = self.parent(node);
        }
        false
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Element descendants of `scope` in document order, `scope` excluded.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.element(node).is_some() {
                out.push(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    pub fn all_elements(&self) -> Vec<NodeId> {
        self.descendants(self.root)
    }

    pub fn text_content(&self, id: NodeId) -> String {
        self.text_content_excluding(id, |_| false)
    }

    /// Concatenated text of the subtree, skipping element subtrees for which
    /// `skip` returns true.
    pub fn text_content_excluding(&self, id: NodeId, skip: impl Fn(&Element) -> bool) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let Some(entry) = self.nodes.get(node.0) else {
                continue;
            };
            match &entry.kind {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Element(el) if node != id && skip(el) => continue,
                _ => {}
            }
            stack.extend(entry.children.iter().rev().copied());
        }
        out
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        self.query_selector_all_from(self.root, selector)
    }

    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, DomError> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    pub fn query_selector_all_from(
        &self,
        scope: NodeId,
        selector: &str,
    ) -> Result<Vec<NodeId>, DomError> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .descendants(scope)
            .into_iter()
            .filter(|node| list.matches(self, *node))
            .collect())
    }

    /// Number of matches, treating an unparseable selector as matching nothing.
    pub fn count(&self, selector: &str) -> usize {
        self.query_selector_all(selector).map(|m| m.len()).unwrap_or(0)
    }

    pub fn matches(&self, id: NodeId, selector: &str) -> Result<bool, DomError> {
        Ok(SelectorList::parse(selector)?.matches(self, id))
    }

    /// Nearest inclusive ancestor matching `selector`.
    pub fn closest(&self, id: NodeId, selector: &str) -> Option<NodeId> {
        let list = SelectorList::parse(selector).ok()?;
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            if list.matches(self, node) {
                return Some(node);
            }
            cursor = self.parent_element(node);
        }
        None
    }

    // ------------------------------------------------------------------
    // Form controls
    // ------------------------------------------------------------------

    /// Effective control type, as the page's scripting would observe it.
    pub fn control_type(&self, id: NodeId) -> Option<String> {
        let el = self.element(id)?;
        let declared = el.attr("type").map(|t| t.trim().to_ascii_lowercase());
        match el.tag_name.as_str() {
            "input" => Some(declared.filter(|t| !t.is_empty()).unwrap_or_else(|| "text".into())),
            "button" => Some(
                declared
                    .filter(|t| matches!(t.as_str(), "submit" | "reset" | "button"))
                    .unwrap_or_else(|| "submit".into()),
            ),
            "select" if el.attrs.contains_key("multiple") => Some("select-multiple".into()),
            "select" => Some("select-one".into()),
            "textarea" => Some("textarea".into()),
            _ => declared.filter(|t| !t.is_empty()),
        }
    }

    pub fn value(&self, id: NodeId) -> String {
        match self.element(id) {
            Some(el) if el.tag_name == "input" && is_checkable(el) && el.attr("value").is_none() => {
                "on".to_string()
            }
            Some(el) => el.value.clone(),
            None => String::new(),
        }
    }

    /// Writes a control value. A `<select>` only takes values matching one of
    /// its options; anything else clears the selection.
    pub fn set_value(&mut self, id: NodeId, value: &str) -> Result<(), DomError> {
        if self.tag_name(id) == Some("select") {
            let options = self.options(id);
            let matched = options.iter().copied().find(|o| self.option_value(*o) == value);
            for option in options {
                if let Some(el) = self.element_mut(option) {
                    if Some(option) == matched {
                        el.attrs.insert("selected".into(), String::new());
                    } else {
                        el.attrs.remove("selected");
                    }
                }
            }
            let el = self.element_mut_or_err(id)?;
            el.value = if matched.is_some() { value.to_string() } else { String::new() };
            return Ok(());
        }

        self.element_mut_or_err(id)?.value = value.to_string();
        Ok(())
    }

    pub fn checked(&self, id: NodeId) -> bool {
        self.element(id).is_some_and(|el| el.checked)
    }

    /// Sets checkedness. Checking a named radio unchecks the rest of its group.
    pub fn set_checked(&mut self, id: NodeId, checked: bool) -> Result<(), DomError> {
        let el = self.element_or_err(id)?;
        let group = (checked && el.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("radio")))
            .then(|| el.attr("name").map(str::to_string))
            .flatten();

        if let Some(name) = group {
            for other in self.all_elements() {
                if other == id {
                    continue;
                }
                let same_group = self.element(other).is_some_and(|o| {
                    o.tag_name == "input"
                        && o.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("radio"))
                        && o.attr("name") == Some(name.as_str())
                });
                if same_group {
                    if let Some(o) = self.element_mut(other) {
                        o.checked = false;
                    }
                }
            }
        }

        self.element_mut_or_err(id)?.checked = checked;
        Ok(())
    }

    pub fn options(&self, select: NodeId) -> Vec<NodeId> {
        self.descendants(select)
            .into_iter()
            .filter(|n| self.tag_name(*n) == Some("option"))
            .collect()
    }

    pub fn option_value(&self, option: NodeId) -> String {
        match self.attr(option, "value") {
            Some(v) => v.to_string(),
            None => self.option_text(option),
        }
    }

    pub fn option_text(&self, option: NodeId) -> String {
        self.text_content(option).trim().to_string()
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn focus(&mut self, id: NodeId) -> Result<(), DomError> {
        self.element_or_err(id)?;
        self.focused = Some(id);
        self.dispatch(id, EventKind::Focus)
    }

    /// Activates an element: toggles checkboxes, checks radios, then records
    /// the click.
    pub fn click(&mut self, id: NodeId) -> Result<(), DomError> {
        let el = self.element_or_err(id)?;
        let kind = (el.tag_name == "input")
            .then(|| el.attr("type").map(str::to_ascii_lowercase))
            .flatten();
        let was_checked = el.checked;
        self.dispatch(id, EventKind::Click)?;
        match kind.as_deref() {
            Some("checkbox") => {
                self.set_checked(id, !was_checked)?;
                self.dispatch(id, EventKind::Change)
            }
            Some("radio") if !was_checked => {
                self.set_checked(id, true)?;
                self.dispatch(id, EventKind::Change)
            }
            _ => Ok(()),
        }
    }

    pub fn dispatch(&mut self, target: NodeId, kind: EventKind) -> Result<(), DomError> {
        self.element_or_err(target)?;
        self.events.push(DomEvent { target, kind });
        Ok(())
    }

    pub fn events(&self) -> &[DomEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DomEvent> {
        std::mem::take(&mut self.events)
    }

    /// `tabIndex` as scripting reports it: the attribute when it parses,
    /// otherwise 0 for natively focusable elements and -1 for the rest.
    pub fn tab_index(&self, id: NodeId) -> i32 {
        let Some(el) = self.element(id) else {
            return -1;
        };
        if let Some(explicit) = el.attr("tabindex").and_then(|t| t.trim().parse().ok()) {
            return explicit;
        }
        match el.tag_name.as_str() {
            "input" | "select" | "textarea" | "button" | "iframe" => 0,
            "a" if el.attrs.contains_key("href") => 0,
            _ => -1,
        }
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            let Some(el) = self.element(node) else {
                break;
            };
            if el.attrs.contains_key("hidden") {
                return false;
            }
            if let Some(style) = el.attr("style") {
                let compact: String = style
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>()
                    .to_ascii_lowercase();
                if compact.contains("display:none")
                    || compact.contains("visibility:hidden")
                    || compact.contains("opacity:0;")
                    || compact.ends_with("opacity:0")
                {
                    return false;
                }
            }
            cursor = self.parent_element(node);
        }
        true
    }

    pub fn rect(&self, id: NodeId) -> Rect {
        self.element(id).map(|el| el.rect).unwrap_or_default()
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Rect) -> Result<(), DomError> {
        self.element_mut_or_err(id)?.rect = rect;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Embedded frames
    // ------------------------------------------------------------------

    pub fn frame_content(&self, id: NodeId) -> Option<&FrameContent> {
        self.element(id)?.frame.as_ref()
    }

    pub fn set_frame_content(&mut self, id: NodeId, content: FrameContent) -> Result<(), DomError> {
        let el = self.element_mut_or_err(id)?;
        if el.tag_name != "iframe" {
            return Err(DomError::NotAnElement(id));
        }
        el.frame = Some(content);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Document => {
                for child in &node.children {
                    self.write_html(*child, out);
                }
            }
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.tag_name);
                for (name, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape_text(value).replace('"', "&quot;"));
                        out.push('"');
                    }
                }
                out.push('>');
                if super::html::is_void_element(&el.tag_name) {
                    return;
                }
                for child in &node.children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag_name);
                out.push('>');
            }
        }
    }
}

fn is_checkable(el: &Element) -> bool {
    el.attr("type")
        .is_some_and(|t| t.eq_ignore_ascii_case("checkbox") || t.eq_ignore_ascii_case("radio"))
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
