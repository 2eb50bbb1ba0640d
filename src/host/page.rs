use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dom::{parse_html, DocumentHandle, DomError, FrameContent};
use crate::frame::{Embedding, FrameId, FrameWindow};

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Document error: {0}")]
    Dom(#[from] DomError),

    #[error("No iframe matches {0}")]
    IframeNotFound(String),

    #[error("{0} does not select an iframe")]
    NotAnIframe(String),
}

/// A page to open: the top document plus its nested frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpec {
    pub url: String,
    pub html: String,
    #[serde(default)]
    pub frames: Vec<FrameSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSpec {
    /// Selector of the embedding `<iframe>` in the parent document.
    pub iframe: String,
    pub url: String,
    pub html: String,
    /// Cross-origin frames cannot be read from their parent and cannot read
    /// their own embedding element.
    #[serde(default)]
    pub cross_origin: bool,
    #[serde(default)]
    pub frames: Vec<FrameSpec>,
}

/// Parses every document of `spec` and wires children to their iframes.
/// Frame ids follow document order, top frame first.
pub fn build_page(spec: &PageSpec) -> Result<Vec<FrameWindow>, HostError> {
    let top = DocumentHandle::new(parse_html(&spec.url, &spec.html)?);
    let mut windows = vec![FrameWindow::top(top.clone())];
    attach_frames(&top, &spec.frames, &mut windows)?;
    Ok(windows)
}

fn attach_frames(
    parent: &DocumentHandle,
    frames: &[FrameSpec],
    windows: &mut Vec<FrameWindow>,
) -> Result<(), HostError> {
    for spec in frames {
        let element = {
            let doc = parent.read();
            let element = doc
                .query_selector(&spec.iframe)?
                .ok_or_else(|| HostError::IframeNotFound(spec.iframe.clone()))?;
            if doc.tag_name(element) != Some("iframe") {
                return Err(HostError::NotAnIframe(spec.iframe.clone()));
            }
            element
        };

        let child = DocumentHandle::new(parse_html(&spec.url, &spec.html)?);
        let (content, embedding) = if spec.cross_origin {
            (FrameContent::CrossOrigin, Embedding::CrossOrigin)
        } else {
            (
                FrameContent::Accessible(child.clone()),
                Embedding::SameOrigin {
                    parent: parent.downgrade(),
                    element,
                },
            )
        };
        parent.write().set_frame_content(element, content)?;

        let frame_id = windows.len() as FrameId;
        windows.push(FrameWindow::child(frame_id, child.clone(), embedding));
        attach_frames(&child, &spec.frames, windows)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameLocator;

    fn checkout() -> PageSpec {
        serde_json::from_value(serde_json::json!({
            "url": "https://shop.example.com/checkout",
            "html": r#"<input id="email"><iframe name="billing" src="/billing"></iframe><iframe id="pay" src="https://pay.vendor.io/card"></iframe>"#,
            "frames": [
                {
                    "iframe": "iframe[name=\"billing\"]",
                    "url": "https://shop.example.com/billing",
                    "html": r#"<input name="card"><iframe class="inner"></iframe>"#,
                    "frames": [
                        { "iframe": "iframe.inner", "url": "https://shop.example.com/inner", "html": "<input id=\"otp\">" }
                    ]
                },
                {
                    "iframe": "#pay",
                    "url": "https://pay.vendor.io/card",
                    "html": "<input id=\"cc\">",
                    "crossOrigin": true
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_build_nested_page() {
        let windows = build_page(&checkout()).unwrap();
        assert_eq!(windows.len(), 4);
        assert!(windows[0].is_top());
        assert_eq!(
            windows.iter().map(|w| w.frame_id()).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );

        assert_eq!(windows[1].locator(), Some(FrameLocator::Name("billing".into())));
        assert_eq!(windows[2].locator(), Some(FrameLocator::Class("inner".into())));
        assert_eq!(windows[3].url(), "https://pay.vendor.io/card");
        assert!(windows[3].embedding_snapshot().is_none());

        let top = windows[0].document().read();
        let pay = top.query_selector("#pay").unwrap().unwrap();
        assert!(matches!(top.frame_content(pay), Some(FrameContent::CrossOrigin)));
    }

    #[test]
    fn test_bad_iframe_selectors() {
        let mut spec = checkout();
        spec.frames[0].iframe = "iframe#missing".into();
        assert!(matches!(build_page(&spec), Err(HostError::IframeNotFound(_))));

        spec.frames[0].iframe = "#email".into();
        assert!(matches!(build_page(&spec), Err(HostError::NotAnIframe(_))));
    }
}
