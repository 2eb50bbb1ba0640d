//! Minimal HTML reader for page fixtures.
//!
//! Forgiving about unmatched end tags, strict about unterminated markup.
//! Whitespace-only text runs are dropped.

use super::document::Document;
use super::DomError;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub(crate) fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub fn parse_html(url: &str, html: &str) -> Result<Document, DomError> {
    let mut doc = Document::new(url);
    let root = doc.root();
    let mut stack = vec![root];
    let mut rest = html;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("<!--") {
            let end = after
                .find("-->")
                .ok_or_else(|| DomError::HtmlParse("unterminated comment".into()))?;
            rest = &after[end + 3..];
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            let end = rest
                .find('>')
                .ok_or_else(|| DomError::HtmlParse("unterminated declaration".into()))?;
            rest = &rest[end + 1..];
            continue;
        }

        if let Some(after) = rest.strip_prefix("</") {
            let end = after
                .find('>')
                .ok_or_else(|| DomError::HtmlParse("unterminated end tag".into()))?;
            let name = after[..end].trim().to_ascii_lowercase();
            if let Some(pos) = stack
                .iter()
                .rposition(|n| *n != root && doc.tag_name(*n) == Some(name.as_str()))
            {
                stack.truncate(pos);
            }
            rest = &after[end + 1..];
            continue;
        }

        let opens_tag = rest.starts_with('<')
            && rest[1..].chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        if opens_tag {
            let tag = parse_start_tag(rest)?;
            rest = &rest[tag.consumed..];
            let parent = stack.last().copied().unwrap_or(root);
            let node = doc.create_element(parent, &tag.name, tag.attrs)?;

            if RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
                let close = format!("</{}", tag.name);
                let end = rest
                    .to_ascii_lowercase()
                    .find(&close)
                    .ok_or_else(|| DomError::HtmlParse(format!("unterminated <{}>", tag.name)))?;
                if !rest[..end].trim().is_empty() {
                    doc.append_text(node, &rest[..end])?;
                }
                let after_close = rest[end..]
                    .find('>')
                    .ok_or_else(|| DomError::HtmlParse("unterminated end tag".into()))?;
                rest = &rest[end + after_close + 1..];
            } else if !tag.self_closing && !is_void_element(&tag.name) {
                stack.push(node);
            }
            continue;
        }

        let end = rest
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '<')
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let text = &rest[..end];
        if !text.trim().is_empty() {
            let parent = stack.last().copied().unwrap_or(root);
            doc.append_text(parent, &decode_entities(text))?;
        }
        rest = &rest[end..];
    }

    doc.init_form_controls();
    Ok(doc)
}

struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    consumed: usize,
}

fn parse_start_tag(src: &str) -> Result<StartTag, DomError> {
    let bytes = src.as_bytes();
    let mut i = 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
        i += 1;
    }
    let name = src[1..i].to_ascii_lowercase();
    let mut attrs = Vec::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            None => return Err(unterminated(&name)),
            Some(b'>') => {
                return Ok(StartTag {
                    name,
                    attrs,
                    self_closing: false,
                    consumed: i + 1,
                })
            }
            Some(b'/') if bytes.get(i + 1) == Some(&b'>') => {
                return Ok(StartTag {
                    name,
                    attrs,
                    self_closing: true,
                    consumed: i + 2,
                })
            }
            Some(b'/') | Some(b'=') => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let attr_name = src[start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                Some(&q) if q == b'"' || q == b'\'' => {
                    let close = src[i + 1..].find(q as char).ok_or_else(|| unterminated(&name))?;
                    value = decode_entities(&src[i + 1..i + 1 + close]);
                    i += close + 2;
                }
                _ => {
                    let value_start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = decode_entities(&src[value_start..i]);
                }
            }
        }
        attrs.push((attr_name, value));
    }
}

fn unterminated(tag: &str) -> DomError {
    DomError::HtmlParse(format!("unterminated <{tag}> tag"))
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
