use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::extract::ElementDescriptor;
use crate::frame::DESCENT_MARKER;

/// Pending edits keyed by [`override_key`].
pub type OverrideTable = BTreeMap<String, ElementOverride>;

/// `"<contextDocument> >>> <selector>"`.
pub fn override_key(context_document: &str, selector: &str) -> String {
    format!("{context_document}{DESCENT_MARKER}{selector}")
}

/// Operator edit for one descriptor. Unset fields leave the descriptor alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_document: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
}

impl ElementOverride {
    /// Field-by-field merge: every field set in `newer` wins.
    pub fn merge(&mut self, newer: ElementOverride) {
        fn take(slot: &mut Option<String>, newer: Option<String>) {
            if newer.is_some() {
                *slot = newer;
            }
        }
        take(&mut self.label, newer.label);
        take(&mut self.group, newer.group);
        take(&mut self.new_selector, newer.new_selector);
        take(&mut self.sample, newer.sample);
        take(&mut self.context_document, newer.context_document);
        take(&mut self.element_type, newer.element_type);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The subset applied while extracting: label, group and selector.
    pub fn apply_at_extraction(&self, descriptor: &mut ElementDescriptor) {
        if let Some(label) = &self.label {
            descriptor.label = label.clone();
        }
        if let Some(group) = &self.group {
            descriptor.group = Some(group.clone());
        }
        if let Some(selector) = &self.new_selector {
            descriptor.selector = selector.clone();
        }
    }

    /// New descriptor with every set field merged in.
    pub fn applied_to(&self, descriptor: &ElementDescriptor) -> ElementDescriptor {
        let mut out = descriptor.clone();
        self.apply_at_extraction(&mut out);
        if let Some(sample) = &self.sample {
            out.sample = Some(sample.clone());
        }
        if let Some(context) = &self.context_document {
            out.context_document = context.clone();
        }
        if let Some(kind) = &self.element_type {
            out.element_type = kind.clone();
        }
        out
    }
}

/// Override for a descriptor: by full key first, then by bare selector.
pub fn lookup<'a>(
    table: &'a OverrideTable,
    descriptor: &ElementDescriptor,
) -> Option<(&'a str, &'a ElementOverride)> {
    table
        .get_key_value(&descriptor.override_key())
        .or_else(|| table.get_key_value(&descriptor.selector))
        .map(|(key, edit)| (key.as_str(), edit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ElementDescriptor {
        serde_json::from_value(serde_json::json!({
            "label": "Email",
            "selector": "#email",
            "contextDocument": "document",
            "type": "input[email]",
            "group": "contact"
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_is_last_write_wins_per_field() {
        let mut edit = ElementOverride {
            label: Some("Work email".into()),
            group: Some("work".into()),
            ..Default::default()
        };
        edit.merge(ElementOverride {
            group: Some("office".into()),
            sample: Some("a@b.co".into()),
            ..Default::default()
        });
        assert_eq!(edit.label.as_deref(), Some("Work email"));
        assert_eq!(edit.group.as_deref(), Some("office"));
        assert_eq!(edit.sample.as_deref(), Some("a@b.co"));
        assert!(!edit.is_empty());
    }

    #[test]
    fn test_applied_to_keeps_unedited_fields() {
        let edit = ElementOverride {
            new_selector: Some("input[name=\"email\"]".into()),
            element_type: Some("RadioButton".into()),
            ..Default::default()
        };
        let updated = edit.applied_to(&descriptor());
        assert_eq!(updated.selector, "input[name=\"email\"]");
        assert_eq!(updated.element_type, "RadioButton");
        assert_eq!(updated.label, "Email");
        assert_eq!(updated.group.as_deref(), Some("contact"));
    }

    #[test]
    fn test_lookup_prefers_full_key() {
        let mut table = OverrideTable::new();
        table.insert(
            "#email".into(),
            ElementOverride {
                label: Some("bare".into()),
                ..Default::default()
            },
        );
        let (key, _) = lookup(&table, &descriptor()).unwrap();
        assert_eq!(key, "#email");

        table.insert(
            override_key("document", "#email"),
            ElementOverride {
                label: Some("keyed".into()),
                ..Default::default()
            },
        );
        let (key, edit) = lookup(&table, &descriptor()).unwrap();
        assert_eq!(key, "document >>> #email");
        assert_eq!(edit.label.as_deref(), Some("keyed"));
    }
}
