//! CSS selector parsing and matching over [`Document`].
//!
//! Covers what selector synthesis emits plus the handful of forms the frame
//! agent queries with: type/universal, `#id`, `.class`, attribute
//! conditions, the four combinators, groups, `:not()`, `:first-child`,
//! `:last-child`, `:first-of-type`, `:checked`, `:nth-of-type(n)` and
//! `:nth-child(n of S)`.

use super::document::{Document, NodeId};
use super::DomError;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(Vec<ComplexSelector>);

#[derive(Debug, Clone, PartialEq)]
struct ComplexSelector(Vec<SelectorPart>);

#[derive(Debug, Clone, PartialEq)]
struct SelectorPart {
    /// Combinator between the previous part and this one.
    combinator: Option<Combinator>,
    step: CompoundSelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct CompoundSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
    pseudo_classes: Vec<PseudoClass>,
}

#[derive(Debug, Clone, PartialEq)]
enum AttrCondition {
    Exists { key: String },
    Eq { key: String, value: String },
    StartsWith { key: String, value: String },
    EndsWith { key: String, value: String },
    Contains { key: String, value: String },
    Includes { key: String, value: String },
    DashMatch { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
enum PseudoClass {
    FirstChild,
    LastChild,
    FirstOfType,
    Checked,
    NthOfType(usize),
    NthChild {
        index: usize,
        of: Option<SelectorList>,
    },
    Not(SelectorList),
}

impl SelectorList {
    pub fn parse(selector: &str) -> Result<Self, DomError> {
        let groups = split_selector_groups(selector)?;
        let mut parsed = Vec::with_capacity(groups.len());
        for group in groups {
            parsed.push(parse_complex(&group)?);
        }
        Ok(Self(parsed))
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.element(node).is_some() && self.0.iter().any(|c| matches_complex(doc, node, &c.0))
    }
}

// ----------------------------------------------------------------------
// Helpers shared with selector synthesis
// ----------------------------------------------------------------------

/// True when `value` can be written bare after `#` or `.`.
pub fn is_plain_ident(value: &str) -> bool {
    let mut chars = value.chars();
    let first_ok = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => true,
        Some('-') => value
            .chars()
            .nth(1)
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '-'),
        _ => false,
    };
    first_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Double-quoted attribute value with `\` and `"` escaped.
pub fn quote_attr_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

// ----------------------------------------------------------------------
// Matching
// ----------------------------------------------------------------------

fn matches_complex(doc: &Document, node: NodeId, parts: &[SelectorPart]) -> bool {
    let Some((last, rest)) = parts.split_last() else {
        return false;
    };
    if !matches_compound(doc, node, &last.step) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }

    match last.combinator.unwrap_or(Combinator::Descendant) {
        Combinator::Child => doc
            .parent_element(node)
            .is_some_and(|parent| matches_complex(doc, parent, rest)),
        Combinator::Descendant => {
            let mut cursor = doc.parent_element(node);
            while let Some(ancestor) = cursor {
                if matches_complex(doc, ancestor, rest) {
                    return true;
                }
                cursor = doc.parent_element(ancestor);
            }
            false
        }
        Combinator::AdjacentSibling => doc
            .previous_element_sibling(node)
            .is_some_and(|sibling| matches_complex(doc, sibling, rest)),
        Combinator::GeneralSibling => {
            let mut cursor = doc.previous_element_sibling(node);
            while let Some(sibling) = cursor {
                if matches_complex(doc, sibling, rest) {
                    return true;
                }
                cursor = doc.previous_element_sibling(sibling);
            }
            false
        }
    }
}

fn matches_compound(doc: &Document, node: NodeId, step: &CompoundSelector) -> bool {
    let Some(element) = doc.element(node) else {
        return false;
    };

    if let Some(tag) = &step.tag {
        if !element.tag_name.eq_ignore_ascii_case(tag) {
            return false;
        }
    }

    if let Some(id) = &step.id {
        if element.attr("id") != Some(id.as_str()) {
            return false;
        }
    }

    if step.classes.iter().any(|c| !element.has_class(c)) {
        return false;
    }

    for cond in &step.attrs {
        let matched = match cond {
            AttrCondition::Exists { key } => element.attrs.contains_key(key),
            AttrCondition::Eq { key, value } => element.attr(key) == Some(value.as_str()),
            AttrCondition::StartsWith { key, value } => {
                !value.is_empty() && element.attr(key).is_some_and(|a| a.starts_with(value.as_str()))
            }
            AttrCondition::EndsWith { key, value } => {
                !value.is_empty() && element.attr(key).is_some_and(|a| a.ends_with(value.as_str()))
            }
            AttrCondition::Contains { key, value } => {
                !value.is_empty() && element.attr(key).is_some_and(|a| a.contains(value.as_str()))
            }
            AttrCondition::Includes { key, value } => element
                .attr(key)
                .is_some_and(|a| a.split_whitespace().any(|token| token == value.as_str())),
            AttrCondition::DashMatch { key, value } => element
                .attr(key)
                .is_some_and(|a| a == value.as_str() || a.starts_with(&format!("{value}-"))),
        };
        if !matched {
            return false;
        }
    }

    step.pseudo_classes
        .iter()
        .all(|pseudo| matches_pseudo(doc, node, pseudo))
}

fn matches_pseudo(doc: &Document, node: NodeId, pseudo: &PseudoClass) -> bool {
    match pseudo {
        PseudoClass::FirstChild => doc.previous_element_sibling(node).is_none(),
        PseudoClass::LastChild => element_siblings(doc, node).last() == Some(&node),
        PseudoClass::FirstOfType => position_of_type(doc, node) == Some(1),
        PseudoClass::Checked => {
            doc.checked(node)
                || (doc.tag_name(node) == Some("option") && doc.has_attr(node, "selected"))
        }
        PseudoClass::NthOfType(n) => position_of_type(doc, node) == Some(*n),
        PseudoClass::NthChild { index, of } => {
            let candidates: Vec<NodeId> = element_siblings(doc, node)
                .into_iter()
                .filter(|s| of.as_ref().map_or(true, |list| list.matches(doc, *s)))
                .collect();
            candidates.iter().position(|s| *s == node).map(|p| p + 1) == Some(*index)
        }
        PseudoClass::Not(list) => !list.matches(doc, node),
    }
}

fn element_siblings(doc: &Document, node: NodeId) -> Vec<NodeId> {
    match doc.parent(node) {
        Some(parent) => doc.element_children(parent),
        None => vec![node],
    }
}

fn position_of_type(doc: &Document, node: NodeId) -> Option<usize> {
    let tag = doc.tag_name(node)?;
    element_siblings(doc, node)
        .into_iter()
        .filter(|s| doc.tag_name(*s) == Some(tag))
        .position(|s| s == node)
        .map(|p| p + 1)
}

// ----------------------------------------------------------------------
// Parsing
// ----------------------------------------------------------------------

fn unsupported(selector: &str) -> DomError {
    DomError::UnsupportedSelector(selector.to_string())
}

/// Walks `selector`, calling `on_top_level` for every char outside brackets,
/// parentheses and quotes. Returns false to request a split at that char.
fn scan_top_level(
    selector: &str,
    mut on_top_level: impl FnMut(char) -> bool,
) -> Result<Vec<(String, Option<char>)>, DomError> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut bracket_depth = 0usize;
    let mut paren_depth = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = selector.chars();

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '\\' => {
                current.push(ch);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '[' => {
                bracket_depth += 1;
                current.push(ch);
            }
            ']' => {
                bracket_depth = bracket_depth.checked_sub(1).ok_or_else(|| unsupported(selector))?;
                current.push(ch);
            }
            '(' => {
                paren_depth += 1;
                current.push(ch);
            }
            ')' => {
                paren_depth = paren_depth.checked_sub(1).ok_or_else(|| unsupported(selector))?;
                current.push(ch);
            }
            _ if bracket_depth == 0 && paren_depth == 0 && !on_top_level(ch) => {
                pieces.push((std::mem::take(&mut current), Some(ch)));
            }
            _ => current.push(ch),
        }
    }

    if bracket_depth != 0 || paren_depth != 0 || quote.is_some() {
        return Err(unsupported(selector));
    }
    pieces.push((current, None));
    Ok(pieces)
}

fn split_selector_groups(selector: &str) -> Result<Vec<String>, DomError> {
    let pieces = scan_top_level(selector, |ch| ch != ',')?;
    pieces
        .into_iter()
        .map(|(group, _)| {
            let trimmed = group.trim();
            if trimmed.is_empty() {
                Err(unsupported(selector))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_complex(group: &str) -> Result<ComplexSelector, DomError> {
    let pieces = scan_top_level(group, |ch| !matches!(ch, '>' | '+' | '~') && !ch.is_whitespace())?;

    let mut parts: Vec<SelectorPart> = Vec::new();
    let mut pending: Option<Combinator> = None;

    for (text, separator) in pieces {
        let text = text.trim();
        if !text.is_empty() {
            let combinator = if parts.is_empty() {
                if pending.is_some() {
                    return Err(unsupported(group));
                }
                None
            } else {
                Some(pending.take().unwrap_or(Combinator::Descendant))
            };
            parts.push(SelectorPart {
                combinator,
                step: parse_compound(text)?,
            });
        }

        let explicit = match separator {
            Some('>') => Combinator::Child,
            Some('+') => Combinator::AdjacentSibling,
            Some('~') => Combinator::GeneralSibling,
            _ => continue,
        };
        if pending.is_some() || parts.is_empty() {
            return Err(unsupported(group));
        }
        pending = Some(explicit);
    }

    if parts.is_empty() || pending.is_some() {
        return Err(unsupported(group));
    }
    Ok(ComplexSelector(parts))
}

fn parse_compound(part: &str) -> Result<CompoundSelector, DomError> {
    let bytes = part.as_bytes();
    let mut i = 0usize;
    let mut step = CompoundSelector::default();

    while i < bytes.len() {
        match bytes[i] {
            b'*' if i == 0 => i += 1,
            b'#' => {
                let (id, next) = parse_ident(part, i + 1).ok_or_else(|| unsupported(part))?;
                if step.id.replace(id).is_some() {
                    return Err(unsupported(part));
                }
                i = next;
            }
            b'.' => {
                let (class_name, next) = parse_ident(part, i + 1).ok_or_else(|| unsupported(part))?;
                step.classes.push(class_name);
                i = next;
            }
            b'[' => {
                let (cond, next) = parse_attr_condition(part, i)?;
                step.attrs.push(cond);
                i = next;
            }
            b':' => {
                let (pseudo, next) = parse_pseudo(part, i)?;
                step.pseudo_classes.push(pseudo);
                i = next;
            }
            _ if i == 0 => {
                let (tag, next) = parse_ident(part, i).ok_or_else(|| unsupported(part))?;
                step.tag = Some(tag.to_ascii_lowercase());
                i = next;
            }
            _ => return Err(unsupported(part)),
        }
    }

    Ok(step)
}

fn parse_ident(src: &str, start: usize) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut end = start;
    let mut chars = src.get(start..)?.char_indices();

    while let Some((offset, ch)) = chars.next() {
        if ch == '\\' {
            let (_, escaped) = chars.next()?;
            out.push(escaped);
            end = start + offset + 1 + escaped.len_utf8();
        } else if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii() {
            out.push(ch);
            end = start + offset + ch.len_utf8();
        } else {
            break;
        }
    }

    (!out.is_empty()).then_some((out, end))
}

fn skip_ws(src: &str, mut i: usize) -> usize {
    let bytes = src.as_bytes();
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn parse_attr_condition(src: &str, start: usize) -> Result<(AttrCondition, usize), DomError> {
    let bytes = src.as_bytes();
    let (key, next) = parse_ident(src, skip_ws(src, start + 1)).ok_or_else(|| unsupported(src))?;
    let key = key.to_ascii_lowercase();
    let mut i = skip_ws(src, next);

    if bytes.get(i) == Some(&b']') {
        return Ok((AttrCondition::Exists { key }, i + 1));
    }

    let (op, op_len) = match (bytes.get(i), bytes.get(i + 1)) {
        (Some(b'='), _) => (b'=', 1),
        (Some(&c), Some(b'=')) if matches!(c, b'^' | b'$' | b'*' | b'~' | b'|') => (c, 2),
        _ => return Err(unsupported(src)),
    };
    let (value, next) = parse_attr_value(src, skip_ws(src, i + op_len))?;
    i = skip_ws(src, next);
    if bytes.get(i) != Some(&b']') {
        return Err(unsupported(src));
    }

    let cond = match op {
        b'=' => AttrCondition::Eq { key, value },
        b'^' => AttrCondition::StartsWith { key, value },
        b'$' => AttrCondition::EndsWith { key, value },
        b'*' => AttrCondition::Contains { key, value },
        b'~' => AttrCondition::Includes { key, value },
        _ => AttrCondition::DashMatch { key, value },
    };
    Ok((cond, i + 1))
}

fn parse_attr_value(src: &str, start: usize) -> Result<(String, usize), DomError> {
    let quote = match src.as_bytes().get(start) {
        Some(b'"') => '"',
        Some(b'\'') => '\'',
        _ => return parse_ident(src, start).ok_or_else(|| unsupported(src)),
    };

    let mut out = String::new();
    let mut chars = src[start + 1..].char_indices();
    while let Some((offset, ch)) = chars.next() {
        if ch == '\\' {
            let (_, escaped) = chars.next().ok_or_else(|| unsupported(src))?;
            out.push(escaped);
        } else if ch == quote {
            return Ok((out, start + 1 + offset + 1));
        } else {
            out.push(ch);
        }
    }
    Err(unsupported(src))
}

fn parse_pseudo(src: &str, start: usize) -> Result<(PseudoClass, usize), DomError> {
    let (name, mut i) = parse_ident(src, start + 1).ok_or_else(|| unsupported(src))?;
    let name = name.to_ascii_lowercase();

    let argument = if src.as_bytes().get(i) == Some(&b'(') {
        let close = matching_paren(src, i).ok_or_else(|| unsupported(src))?;
        let arg = src[i + 1..close].trim().to_string();
        i = close + 1;
        Some(arg)
    } else {
        None
    };

    let pseudo = match (name.as_str(), argument) {
        ("first-child", None) => PseudoClass::FirstChild,
        ("last-child", None) => PseudoClass::LastChild,
        ("first-of-type", None) => PseudoClass::FirstOfType,
        ("checked", None) => PseudoClass::Checked,
        ("nth-of-type", Some(arg)) => PseudoClass::NthOfType(parse_index(&arg, src)?),
        ("nth-child", Some(arg)) => match arg.split_once(" of ") {
            Some((index, of)) => PseudoClass::NthChild {
                index: parse_index(index, src)?,
                of: Some(SelectorList::parse(of)?),
            },
            None => PseudoClass::NthChild {
                index: parse_index(&arg, src)?,
                of: None,
            },
        },
        ("not", Some(arg)) => PseudoClass::Not(SelectorList::parse(&arg)?),
        _ => return Err(unsupported(src)),
    };
    Ok((pseudo, i))
}

fn parse_index(raw: &str, src: &str) -> Result<usize, DomError> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| unsupported(src))
}

fn matching_paren(src: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, ch) in src[open..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, ch) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    fn doc(html: &str) -> Document {
        parse_html("https://example.com/form", html).unwrap()
    }

    #[test]
    fn test_attribute_operators() {
        let d = doc(
            r#"<iframe id="f1" src="https://pay.example.com/checkout/card"></iframe>
               <iframe id="f2" src="https://ads.example.net/banner"></iframe>"#,
        );
        assert_eq!(d.count(r#"iframe[src*="pay.example.com"][src*="card"]"#), 1);
        assert_eq!(d.count(r#"iframe[src^="https://"]"#), 2);
        assert_eq!(d.count(r#"iframe[src$='banner']"#), 1);
        assert_eq!(d.count(r#"iframe[src*=""]"#), 0);
        assert_eq!(d.count("iframe[src]"), 2);
    }

    #[test]
    fn test_quoted_values_with_escapes() {
        let d = doc(r#"<input name='say "hi"'><input name="it's">"#);
        assert_eq!(d.count(r#"[name="say \"hi\""]"#), 1);
        assert_eq!(d.count(&format!("[name={}]", quote_attr_value("it's"))), 1);
        assert_eq!(d.count(r#"[name="a]b"]"#), 0);
    }

    #[test]
    fn test_combinators() {
        let d = doc(
            r#"<form id="f"><div class="row"><input id="a"></div><input id="b"><span></span><input id="c"></form>"#,
        );
        assert_eq!(d.count("#f > input"), 2);
        assert_eq!(d.count("#f input"), 3);
        assert_eq!(d.count("div.row + input"), 1);
        assert_eq!(d.count("div ~ input"), 2);
        assert_eq!(d.count("form>div>input"), 1);
    }

    #[test]
    fn test_nth_child_of_filters_siblings() {
        let d = doc(
            r#"<div><input type="text" id="t1"><input type="radio" id="r1"><input type="text" id="t2"></div>"#,
        );
        let t2 = d.query_selector("#t2").unwrap().unwrap();
        let matches = d
            .query_selector_all(r#"input:nth-child(2 of input[type="text"])"#)
            .unwrap();
        assert_eq!(matches, vec![t2]);
        assert_eq!(d.count("input:nth-child(3)"), 1);
        assert_eq!(d.count("input:nth-of-type(2)"), 1);
    }

    #[test]
    fn test_not_and_groups() {
        let d = doc(
            r#"<input type="hidden"><input type="text"><button>Go</button><div tabindex="-1"></div><div tabindex="0"></div>"#,
        );
        assert_eq!(d.count(r#"input:not([type="hidden"]), button"#), 2);
        assert_eq!(d.count(r#"[tabindex]:not([tabindex="-1"])"#), 1);
    }

    #[test]
    fn test_invalid_selectors_are_rejected() {
        for bad in ["", "div >", "[name=", "a,,b", ":nth-of-type(0)", "#", "div:hover"] {
            assert!(SelectorList::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_plain_ident() {
        assert!(is_plain_ident("email"));
        assert!(is_plain_ident("-x"));
        assert!(is_plain_ident("first_name-2"));
        assert!(!is_plain_ident("2fa"));
        assert!(!is_plain_ident("a.b"));
        assert!(!is_plain_ident(""));
    }
}
