//! Persisted extraction sessions and the pending override table.

pub mod memory;
pub mod overrides;
pub mod sqlite;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::ElementDescriptor;

pub use memory::MemoryStore;
pub use overrides::{lookup as lookup_override, override_key, ElementOverride, OverrideTable};
pub use sqlite::SqliteStore;

/// One extraction group within a page record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionGroup {
    pub group_id: u32,
    pub timestamp: DateTime<Utc>,
    pub elements: Vec<ElementDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub page_id: String,
    pub page_name: String,
    pub url: String,
    pub dom_signature: String,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub extractions: Vec<ExtractionGroup>,
}

/// A merged extraction, as handed to the top frame for saving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub page_id: String,
    pub page_name: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub dom_signature: String,
    pub extraction_group: u32,
    pub elements: Vec<ElementDescriptor>,
}

impl PageRecord {
    /// Folds an extraction into an existing record (or starts a new one).
    /// A group with the same id is replaced in place.
    pub fn merge(existing: Option<PageRecord>, record: &ExtractionRecord) -> PageRecord {
        let group = ExtractionGroup {
            group_id: record.extraction_group,
            timestamp: record.timestamp,
            elements: record.elements.clone(),
        };

        match existing {
            Some(mut page) => {
                match page
                    .extractions
                    .iter_mut()
                    .find(|g| g.group_id == group.group_id)
                {
                    Some(slot) => *slot = group,
                    None => page.extractions.push(group),
                }
                page.last_updated = record.timestamp;
                page
            }
            None => PageRecord {
                page_id: record.page_id.clone(),
                page_name: record.page_name.clone(),
                url: record.url.clone(),
                dom_signature: record.dom_signature.clone(),
                created: record.timestamp,
                last_updated: record.timestamp,
                extractions: vec![group],
            },
        }
    }

    pub fn element_count(&self) -> usize {
        self.extractions.iter().map(|g| g.elements.len()).sum()
    }
}

/// Result of folding pending overrides into a page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub page: PageRecord,
    pub applied: usize,
}

pub trait SessionStore: Send + Sync {
    fn get_page(&self, page_id: &str) -> Result<Option<PageRecord>>;

    /// Most recently updated first.
    fn list_pages(&self) -> Result<Vec<PageRecord>>;

    /// Inserts or fully replaces a page record.
    fn put_page(&self, page: &PageRecord) -> Result<()>;

    fn delete_page(&self, page_id: &str) -> Result<bool>;

    fn overrides(&self) -> Result<OverrideTable>;

    /// Merges `edit` into the stored override for `key` in one atomic step.
    fn upsert_override(&self, key: &str, edit: ElementOverride) -> Result<ElementOverride>;

    /// Rewrites a page's descriptors with pending overrides and drops the
    /// overrides that were consumed, atomically. An override edited again
    /// after it was read stays pending.
    fn apply_changes(&self, page_id: &str) -> Result<Option<ApplyOutcome>>;

    fn clear_overrides(&self) -> Result<()>;

    fn save_extraction(&self, record: &ExtractionRecord) -> Result<PageRecord> {
        let page = PageRecord::merge(self.get_page(&record.page_id)?, record);
        self.put_page(&page)?;
        tracing::info!(
            page_id = %page.page_id,
            group = record.extraction_group,
            elements = record.elements.len(),
            "Saved extraction"
        );
        Ok(page)
    }
}

/// An override consumed by [`rewrite_page`], with the value that was applied.
pub(crate) type Consumed = Vec<(String, ElementOverride)>;

/// Applies `table` to every descriptor of `page`. Returns the number of
/// rewritten descriptors and the overrides used, once per key.
pub(crate) fn rewrite_page(page: &mut PageRecord, table: &OverrideTable) -> (usize, Consumed) {
    let mut consumed: Consumed = Vec::new();
    let mut applied = 0;

    for group in &mut page.extractions {
        for descriptor in &mut group.elements {
            if let Some((key, edit)) = lookup_override(table, descriptor) {
                *descriptor = edit.applied_to(descriptor);
                applied += 1;
                if !consumed.iter().any(|(k, _)| k == key) {
                    consumed.push((key.to_string(), edit.clone()));
                }
            }
        }
    }

    if applied > 0 {
        page.last_updated = Utc::now();
    }
    (applied, consumed)
}

/// Removes consumed overrides whose stored value is still the one applied.
pub(crate) fn release_consumed(table: &mut OverrideTable, consumed: &Consumed) {
    for (key, snapshot) in consumed {
        if table.get(key) == Some(snapshot) {
            table.remove(key);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_merge_replaces_group_in_place() {
        let page = PageRecord::merge(None, &record("p", 1, vec![descriptor("#a", "A")]));
        let page = PageRecord::merge(Some(page), &record("p", 2, vec![descriptor("#b", "B")]));
        let page = PageRecord::merge(Some(page), &record("p", 1, vec![]));
        assert_eq!(
            page.extractions.iter().map(|g| g.group_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(page.extractions[0].elements.is_empty());
        assert_eq!(page.element_count(), 1);
    }

    #[test]
    fn test_override_edited_after_apply_snapshot_stays_pending() {
        let mut page = PageRecord::merge(None, &record("p", 1, vec![descriptor("#email", "Email")]));
        let key = override_key("document", "#email");
        let mut table = OverrideTable::from([(
            key.clone(),
            ElementOverride {
                label: Some("Work email".into()),
                ..Default::default()
            },
        )]);

        let (applied, consumed) = rewrite_page(&mut page, &table);
        assert_eq!(applied, 1);
        assert_eq!(page.extractions[0].elements[0].label, "Work email");

        // A newer edit lands between the read and the release.
        let newer = ElementOverride {
            label: Some("Work email".into()),
            sample: Some("ops@example.com".into()),
            ..Default::default()
        };
        table.insert(key.clone(), newer.clone());
        table.insert("#other".into(), ElementOverride::default());
        release_consumed(&mut table, &consumed);
        assert_eq!(table.get(&key), Some(&newer));

        let (_, consumed) = rewrite_page(&mut page, &table);
        release_consumed(&mut table, &consumed);
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["#other"]);
    }
}
