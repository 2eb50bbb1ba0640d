//! Builds entry instructions from saved extractions.

use url::Url;

use crate::store::{lookup_override, OverrideTable, PageRecord};

use super::action::{Action, ActionType, DataGroup};

/// One data group per extraction group of every page on `domain` (every
/// page when none is on it), in page then group order. Pending overrides
/// are folded into each descriptor first.
pub fn build_entry_plan(
    pages: &[PageRecord],
    overrides: &OverrideTable,
    domain: Option<&str>,
) -> Vec<DataGroup> {
    let on_domain: Vec<&PageRecord> = match domain {
        Some(domain) => pages
            .iter()
            .filter(|p| page_host(&p.url).as_deref() == Some(domain))
            .collect(),
        None => Vec::new(),
    };
    let selected: Vec<&PageRecord> = if on_domain.is_empty() {
        pages.iter().collect()
    } else {
        on_domain
    };

    selected
        .into_iter()
        .flat_map(|page| page.extractions.iter())
        .map(|group| DataGroup {
            group_name: format!("Extracted_Group_{}", group.group_id),
            actions: group
                .elements
                .iter()
                .map(|descriptor| {
                    let effective = match lookup_override(overrides, descriptor) {
                        Some((_, edit)) => edit.applied_to(descriptor),
                        None => descriptor.clone(),
                    };
                    Action {
                        action_type: ActionType::from_element_type(&effective.element_type),
                        input_value: effective.sample.filter(|s| !s.is_empty()),
                        target_element: effective.selector,
                        context_document: effective.context_document,
                    }
                })
                .collect(),
        })
        .collect()
}

pub fn page_host(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ElementDescriptor;
    use crate::store::{override_key, ElementOverride, ExtractionGroup};
    use chrono::Utc;

    fn descriptor(selector: &str, kind: &str, sample: Option<&str>) -> ElementDescriptor {
        serde_json::from_value(serde_json::json!({
            "label": selector,
            "selector": selector,
            "contextDocument": "document",
            "type": kind,
            "sample": sample
        }))
        .unwrap()
    }

    fn page(id: &str, url: &str, groups: Vec<(u32, Vec<ElementDescriptor>)>) -> PageRecord {
        PageRecord {
            page_id: id.into(),
            page_name: id.into(),
            url: url.into(),
            dom_signature: "body_1".into(),
            created: Utc::now(),
            last_updated: Utc::now(),
            extractions: groups
                .into_iter()
                .map(|(group_id, elements)| ExtractionGroup {
                    group_id,
                    timestamp: Utc::now(),
                    elements,
                })
                .collect(),
        }
    }

    #[test]
    fn test_plan_for_domain() {
        let pages = vec![
            page(
                "shop",
                "https://shop.example.com/checkout",
                vec![
                    (1, vec![descriptor("#email", "input[email]", Some("a@b.co"))]),
                    (
                        2,
                        vec![
                            descriptor("#ship", "input[radio]", Some("express")),
                            descriptor("#go", "button[submit]", None),
                        ],
                    ),
                ],
            ),
            page(
                "blog",
                "https://blog.example.com/",
                vec![(1, vec![descriptor("#q", "input[search]", Some("rust"))])],
            ),
        ];

        let plan = build_entry_plan(&pages, &OverrideTable::new(), Some("shop.example.com"));
        assert_eq!(
            plan.iter().map(|g| g.group_name.as_str()).collect::<Vec<_>>(),
            vec!["Extracted_Group_1", "Extracted_Group_2"]
        );
        assert_eq!(plan[1].actions[0].action_type, ActionType::RadioButton);
        assert_eq!(plan[1].actions[1].action_type, ActionType::Button);
        assert_eq!(plan[1].actions[1].input_value, None);

        let everything = build_entry_plan(&pages, &OverrideTable::new(), Some("nowhere.test"));
        assert_eq!(everything.len(), 3);
    }

    #[test]
    fn test_plan_applies_overrides() {
        let pages = vec![page(
            "shop",
            "https://shop.example.com/",
            vec![(1, vec![descriptor("#agree", "input[text]", None)])],
        )];
        let mut overrides = OverrideTable::new();
        overrides.insert(
            override_key("document", "#agree"),
            ElementOverride {
                new_selector: Some("#terms".into()),
                sample: Some("true".into()),
                element_type: Some("Checkbox".into()),
                ..Default::default()
            },
        );

        let plan = build_entry_plan(&pages, &overrides, None);
        let action = &plan[0].actions[0];
        assert_eq!(action.target_element, "#terms");
        assert_eq!(action.action_type, ActionType::Checkbox);
        assert_eq!(action.input_value.as_deref(), Some("true"));
        assert_eq!(action.context_document, "document");
    }
}
