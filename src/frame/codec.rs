//! Canonical frame-context strings.
//!
//! Stored instructions name their frame with a "locate iframe, then descend"
//! expression: `document.querySelector('<raw>').contentWindow.document`, or the
//! bare `document` marker for the top frame. Single quotes and backslashes in
//! the raw locator are backslash-escaped.

use super::locator::FrameLocator;

pub const TOP_FRAME_MARKER: &str = "document";

/// Separates a frame locator from the selector scoped inside that frame.
pub const DESCENT_MARKER: &str = " >>> ";

const WRAP_PREFIX: &str = "document.querySelector('";
const WRAP_SUFFIX: &str = "').contentWindow.document";

/// Wraps a raw iframe locator into its canonical context string.
/// Surrounding whitespace is not part of a locator and is dropped.
pub fn encode(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw == TOP_FRAME_MARKER {
        return TOP_FRAME_MARKER.to_string();
    }

    let mut out = String::with_capacity(WRAP_PREFIX.len() + raw.len() + WRAP_SUFFIX.len());
    out.push_str(WRAP_PREFIX);
    for ch in raw.chars() {
        if ch == '\'' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push_str(WRAP_SUFFIX);
    out
}

/// Inverse of [`encode`]. `None` means the top frame.
///
/// Both sides trim, so `decode(&encode(" x"))` is `Some("x")`. A string that
/// is neither the top marker nor a well-formed wrapper comes back verbatim
/// (trimmed): the same string [`FrameContext::parse`] keeps as
/// [`FrameContext::Malformed`].
pub fn decode(canonical: &str) -> Option<String> {
    match classify(canonical) {
        Classified::Top => None,
        Classified::Wrapped(raw) => Some(raw),
        Classified::Other(raw) => Some(raw.to_string()),
    }
}

enum Classified<'a> {
    Top,
    Wrapped(String),
    Other(&'a str),
}

fn classify(canonical: &str) -> Classified<'_> {
    let trimmed = canonical.trim();
    if trimmed.is_empty() || trimmed == TOP_FRAME_MARKER {
        return Classified::Top;
    }
    match unwrap_canonical(trimmed) {
        Some(raw) => Classified::Wrapped(raw),
        None => Classified::Other(trimmed),
    }
}

fn unwrap_canonical(canonical: &str) -> Option<String> {
    let body = canonical.strip_prefix(WRAP_PREFIX)?.strip_suffix(WRAP_SUFFIX)?;

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push(chars.next()?),
            '\'' => return None,
            _ => out.push(ch),
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Frame target of an instruction, parsed from its context string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameContext {
    Top,
    Iframe(FrameLocator),
    /// Not the top marker and not a well-formed wrapper.
    Malformed(String),
}

impl FrameContext {
    pub fn parse(canonical: &str) -> Self {
        match classify(canonical) {
            Classified::Top => Self::Top,
            Classified::Wrapped(raw) => Self::Iframe(FrameLocator::parse(&raw)),
            Classified::Other(raw) => Self::Malformed(raw.to_string()),
        }
    }

    pub fn to_canonical(&self) -> String {
        match self {
            Self::Top => TOP_FRAME_MARKER.to_string(),
            Self::Iframe(locator) => encode(&locator.to_string()),
            Self::Malformed(raw) => raw.clone(),
        }
    }

    pub fn is_top(&self) -> bool {
        matches!(self, Self::Top)
    }
}

impl From<FrameLocator> for FrameContext {
    fn from(locator: FrameLocator) -> Self {
        Self::Iframe(locator)
    }
}

/// `"<locator> >>> <selector>"` for child frames, the bare selector at top.
pub fn join_scoped(locator: Option<&FrameLocator>, selector: &str) -> String {
    match locator {
        Some(locator) => format!("{locator}{DESCENT_MARKER}{selector}"),
        None => selector.to_string(),
    }
}

/// Splits a scoped selector back into its canonical context and selector.
pub fn split_scoped(scoped: &str) -> (String, String) {
    match scoped.split_once(DESCENT_MARKER.trim()) {
        Some((raw, selector)) if !raw.trim().is_empty() => {
            (encode(raw.trim()), selector.trim().to_string())
        }
        _ => (TOP_FRAME_MARKER.to_string(), scoped.trim().to_string()),
    }
}
