use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

use super::window::EmbeddingSnapshot;
use crate::dom::selector::{is_plain_ident, quote_attr_value};
use crate::dom::{Document, NodeId};

/// Longest `src` prefix kept when the attribute is not a parseable URL.
const SRC_PREFIX_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SrcMatch {
    Contains,
    StartsWith,
    EndsWith,
    Equals,
}

impl SrcMatch {
    pub fn operator(&self) -> &'static str {
        match self {
            SrcMatch::Contains => "*=",
            SrcMatch::StartsWith => "^=",
            SrcMatch::EndsWith => "$=",
            SrcMatch::Equals => "=",
        }
    }

    fn from_operator_prefix(prefix: &str) -> Self {
        match prefix {
            "*" => SrcMatch::Contains,
            "^" => SrcMatch::StartsWith,
            "$" => SrcMatch::EndsWith,
            _ => SrcMatch::Equals,
        }
    }

    pub fn test(&self, haystack: &str, needle: &str) -> bool {
        match self {
            SrcMatch::Contains => !needle.is_empty() && haystack.contains(needle),
            SrcMatch::StartsWith => !needle.is_empty() && haystack.starts_with(needle),
            SrcMatch::EndsWith => !needle.is_empty() && haystack.ends_with(needle),
            SrcMatch::Equals => haystack == needle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcPattern {
    pub kind: SrcMatch,
    pub value: String,
}

impl SrcPattern {
    pub fn contains(value: impl Into<String>) -> Self {
        Self {
            kind: SrcMatch::Contains,
            value: value.into(),
        }
    }

    pub fn test(&self, haystack: &str) -> bool {
        self.kind.test(haystack, &self.value)
    }
}

/// Identifies one `<iframe>` from the perspective of its parent document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FrameLocator {
    Id(String),
    Name(String),
    Title(String),
    Class(String),
    /// All patterns must hold.
    Src(Vec<SrcPattern>),
    /// 1-based position among the iframes under the embedding element's parent.
    Index(usize),
    Generic,
    Css(String),
}

impl FrameLocator {
    /// Parses the CSS forms [`fmt::Display`] produces. Anything else is kept
    /// verbatim as [`FrameLocator::Css`].
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "iframe" {
            return Self::Generic;
        }

        if let Some(caps) = simple_form_re().captures(raw) {
            let kind = caps.get(1).map_or("", |m| m.as_str());
            let ident = caps.get(2).map_or("", |m| m.as_str());
            return match kind {
                "." => Self::Class(ident.to_string()),
                _ => Self::Id(ident.to_string()),
            };
        }

        if let Some(caps) = attr_form_re().captures(raw) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| unescape(m.as_str()))
                .unwrap_or_default();
            return match caps.get(1).map(|m| m.as_str()) {
                Some("name") => Self::Name(value),
                _ => Self::Title(value),
            };
        }

        if let Some(caps) = index_form_re().captures(raw) {
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse().ok()).filter(|n| *n > 0) {
                return Self::Index(n);
            }
        }

        if src_form_re().is_match(raw) {
            return Self::Src(captured_src_patterns(raw));
        }

        Self::Css(raw.to_string())
    }

    /// Frame identification, run inside the child frame.
    ///
    /// `embedding` is `None` when the embedding element cannot be read
    /// (cross-origin); the frame then falls back to its own hostname.
    pub fn identify(embedding: Option<&EmbeddingSnapshot>, own_url: &str) -> Self {
        let Some(frame) = embedding else {
            return Url::parse(own_url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .filter(|h| !h.is_empty())
                .map(|host| Self::Src(vec![SrcPattern::contains(host)]))
                .unwrap_or(Self::Generic);
        };

        if let Some(id) = non_blank(&frame.id) {
            return Self::Id(id.to_string());
        }
        if let Some(name) = non_blank(&frame.name) {
            return Self::Name(name.to_string());
        }
        if let Some(title) = non_blank(&frame.title) {
            return Self::Title(title.to_string());
        }
        if let Some(class_name) = frame.classes.first() {
            return Self::Class(class_name.clone());
        }
        if let Some(src) = non_blank(&frame.src) {
            return Self::Src(src_patterns(src, &frame.parent_url));
        }
        if let Some(index) = frame.index {
            return Self::Index(index);
        }
        Self::Generic
    }

    /// Finds the iframe this locator names inside `doc`.
    pub fn find_in(&self, doc: &Document) -> Option<NodeId> {
        match self {
            Self::Index(n) => doc
                .query_selector_all("iframe")
                .ok()?
                .into_iter()
                .find(|frame| iframe_index(doc, *frame) == Some(*n)),
            Self::Src(patterns) => doc.query_selector_all("iframe").ok()?.into_iter().find(|frame| {
                let Some(src) = doc.attr(*frame, "src") else {
                    return false;
                };
                let resolved = resolve_src(src, doc.url());
                patterns.iter().all(|p| p.test(src))
                    || resolved.is_some_and(|r| patterns.iter().all(|p| p.test(&r)))
            }),
            _ => doc.query_selector(&self.to_string()).ok().flatten(),
        }
    }

    /// Quoted values a frame can compare against its own URL when its
    /// embedding element is out of reach.
    pub(crate) fn url_patterns(&self) -> UrlPatterns {
        match self {
            Self::Src(patterns) => UrlPatterns::All(patterns.clone()),
            Self::Name(value) | Self::Title(value) => {
                UrlPatterns::Any(vec![SrcPattern::contains(value.clone())])
            }
            Self::Css(raw) => {
                let src = captured_src_patterns(raw);
                if !src.is_empty() {
                    return UrlPatterns::All(src);
                }
                let quoted: Vec<SrcPattern> = quoted_token_re()
                    .captures_iter(raw)
                    .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
                    .map(|m| SrcPattern::contains(unescape(m.as_str())))
                    .collect();
                if quoted.is_empty() {
                    UrlPatterns::None
                } else {
                    UrlPatterns::Any(quoted)
                }
            }
            Self::Id(_) | Self::Class(_) | Self::Index(_) | Self::Generic => UrlPatterns::None,
        }
    }
}

pub(crate) enum UrlPatterns {
    All(Vec<SrcPattern>),
    Any(Vec<SrcPattern>),
    None,
}

impl fmt::Display for FrameLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) if is_plain_ident(id) => write!(f, "iframe#{id}"),
            Self::Id(id) => write!(f, "iframe[id={}]", quote_attr_value(id)),
            Self::Name(name) => write!(f, "iframe[name={}]", quote_attr_value(name)),
            Self::Title(title) => write!(f, "iframe[title={}]", quote_attr_value(title)),
            Self::Class(class_name) if is_plain_ident(class_name) => write!(f, "iframe.{class_name}"),
            Self::Class(class_name) => write!(f, "iframe[class~={}]", quote_attr_value(class_name)),
            Self::Src(patterns) => {
                write!(f, "iframe")?;
                for p in patterns {
                    write!(f, "[src{}{}]", p.kind.operator(), quote_attr_value(&p.value))?;
                }
                Ok(())
            }
            Self::Index(n) => write!(f, "iframe:nth-of-type({n})"),
            Self::Generic => write!(f, "iframe"),
            Self::Css(raw) => f.write_str(raw),
        }
    }
}

/// 1-based position of `frame` among the iframes under its parent element.
pub(crate) fn iframe_index(doc: &Document, frame: NodeId) -> Option<usize> {
    let parent = doc.parent_element(frame)?;
    doc.query_selector_all_from(parent, "iframe")
        .ok()?
        .into_iter()
        .position(|f| f == frame)
        .map(|p| p + 1)
}

/// `src` resolved against the embedding document's URL.
pub(crate) fn resolve_src(src: &str, base: &str) -> Option<String> {
    Url::parse(base)
        .and_then(|b| b.join(src))
        .or_else(|_| Url::parse(src))
        .ok()
        .map(String::from)
}

/// Hostname plus last non-empty path segment, hostname alone for a bare
/// path, or a truncated `src` when it has no host.
fn src_patterns(src: &str, base: &str) -> Vec<SrcPattern> {
    let resolved = Url::parse(base)
        .and_then(|b| b.join(src))
        .or_else(|_| Url::parse(src));

    if let Ok(url) = resolved {
        if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
            let mut patterns = vec![SrcPattern::contains(host)];
            let last_segment = url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last());
            if let Some(segment) = last_segment {
                patterns.push(SrcPattern::contains(segment));
            }
            return patterns;
        }
    }

    vec![SrcPattern::contains(src.chars().take(SRC_PREFIX_LEN).collect::<String>())]
}

fn captured_src_patterns(raw: &str) -> Vec<SrcPattern> {
    src_pattern_re()
        .captures_iter(raw)
        .map(|caps| SrcPattern {
            kind: SrcMatch::from_operator_prefix(caps.get(1).map_or("", |m| m.as_str())),
            value: caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| unescape(m.as_str()))
                .unwrap_or_default(),
        })
        .collect()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

const QUOTED: &str = r#"(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')"#;

fn simple_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:iframe)?([#.])((?:[A-Za-z_]|-[A-Za-z_-])[A-Za-z0-9_-]*)$")
            .expect("static pattern")
    })
}

fn attr_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^iframe\[(name|title)\s*=\s*{QUOTED}\s*\]$")).expect("static pattern")
    })
}

fn index_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^iframe:nth-of-type\(\s*(\d+)\s*\)$").expect("static pattern"))
}

fn src_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let quoted_plain = r#"(?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#;
        Regex::new(&format!(r"^iframe(?:\[src\s*[*^$]?=\s*{quoted_plain}\s*\])+$"))
            .expect("static pattern")
    })
}

fn src_pattern_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"\[src\s*([*^$]?)=\s*{QUOTED}\s*\]")).expect("static pattern")
    })
}

fn quoted_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(QUOTED).expect("static pattern"))
}
