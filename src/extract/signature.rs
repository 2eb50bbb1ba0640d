//! Page identity: a coarse structural signature plus the ids and default
//! names used to key persisted extractions.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};

use crate::dom::Document;

const SIGNATURE_ANCHORS: &[&str] = &["form", r#"[role="main"]"#, "main", "#content", ".content"];
const PAGE_ID_MAX_LEN: usize = 50;

/// `tag#id.firstClass` of the first landmark found, else
/// `body_<element count>`.
pub fn dom_signature(doc: &Document) -> String {
    for anchor in SIGNATURE_ANCHORS {
        let Ok(Some(node)) = doc.query_selector(anchor) else {
            continue;
        };
        let tag = doc.tag_name(node).unwrap_or_default();
        let id = doc
            .non_empty_attr(node, "id")
            .map(|id| format!("#{id}"))
            .unwrap_or_default();
        let class = doc
            .classes(node)
            .into_iter()
            .next()
            .map(|c| format!(".{c}"))
            .unwrap_or_default();
        return format!("{tag}{id}{class}");
    }
    format!("body_{}", doc.all_elements().len())
}

pub fn page_id(doc: &Document, now: DateTime<Utc>) -> String {
    let title = doc.title();
    let timestamp = now.format("%Y-%m-%dT%H-%M-%S");
    let encoded = STANDARD.encode(format!("{}{}{}", doc.url(), title, dom_signature(doc)));
    let hash: String = encoded
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(10)
        .collect();

    sanitize(&format!("{title}_{timestamp}_{hash}"))
        .chars()
        .take(PAGE_ID_MAX_LEN)
        .collect()
}

/// First 30 chars of the title plus the last path segment (or `home`).
pub fn default_page_name(doc: &Document) -> String {
    let title: String = doc.title().chars().take(30).collect();
    let segment = url::Url::parse(doc.url())
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
        })
        .unwrap_or_else(|| "home".to_string());
    sanitize(&format!("{title}_{segment}"))
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use chrono::TimeZone;

    #[test]
    fn test_dom_signature_prefers_landmarks() {
        let doc = parse_html(
            "https://example.com/",
            r#"<main class="wide"></main><form id="login" class="card big"></form>"#,
        )
        .unwrap();
        assert_eq!(dom_signature(&doc), "form#login.card");

        let doc = parse_html("https://example.com/", "<div><p></p></div>").unwrap();
        assert_eq!(dom_signature(&doc), "body_2");
    }

    #[test]
    fn test_page_id_shape() {
        let doc = parse_html(
            "https://shop.example.com/checkout",
            "<title>Checkout: Step 1</title><form id=\"pay\"></form>",
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let id = page_id(&doc, now);

        assert!(id.starts_with("Checkout__Step_1_2024-03-09T14-05-07_"), "{id}");
        assert!(id.len() <= PAGE_ID_MAX_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        assert_eq!(id, page_id(&doc, now));
    }

    #[test]
    fn test_default_page_name() {
        let doc = parse_html("https://shop.example.com/account/edit/", "<title>My Account</title>").unwrap();
        assert_eq!(default_page_name(&doc), "My_Account_edit");

        let doc = parse_html("https://shop.example.com/", "<title>Shop</title>").unwrap();
        assert_eq!(default_page_name(&doc), "Shop_home");
    }
}
