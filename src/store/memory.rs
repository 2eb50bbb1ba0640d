use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    release_consumed, rewrite_page, ApplyOutcome, ElementOverride, OverrideTable, PageRecord,
    SessionStore,
};

#[derive(Default)]
struct Inner {
    pages: HashMap<String, PageRecord>,
    overrides: OverrideTable,
}

/// Process-local store, used in tests and when persistence is disabled.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> Result<T> {
        let mut inner = self.inner.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        Ok(f(&mut inner))
    }
}

impl SessionStore for MemoryStore {
    fn get_page(&self, page_id: &str) -> Result<Option<PageRecord>> {
        self.with(|inner| inner.pages.get(page_id).cloned())
    }

    fn list_pages(&self) -> Result<Vec<PageRecord>> {
        self.with(|inner| {
            let mut pages: Vec<PageRecord> = inner.pages.values().cloned().collect();
            pages.sort_by(|a, b| {
                b.last_updated
                    .cmp(&a.last_updated)
                    .then_with(|| b.page_id.cmp(&a.page_id))
            });
            pages
        })
    }

    fn put_page(&self, page: &PageRecord) -> Result<()> {
        self.with(|inner| {
            inner.pages.insert(page.page_id.clone(), page.clone());
        })
    }

    fn delete_page(&self, page_id: &str) -> Result<bool> {
        self.with(|inner| inner.pages.remove(page_id).is_some())
    }

    fn overrides(&self) -> Result<OverrideTable> {
        self.with(|inner| inner.overrides.clone())
    }

    fn upsert_override(&self, key: &str, edit: ElementOverride) -> Result<ElementOverride> {
        self.with(|inner| {
            let current = inner.overrides.entry(key.to_string()).or_default();
            current.merge(edit);
            current.clone()
        })
    }

    fn apply_changes(&self, page_id: &str) -> Result<Option<ApplyOutcome>> {
        let outcome = self.with(|inner| {
            let mut page = inner.pages.get(page_id).cloned()?;
            let (applied, consumed) = rewrite_page(&mut page, &inner.overrides);
            if applied > 0 {
                inner.pages.insert(page.page_id.clone(), page.clone());
                release_consumed(&mut inner.overrides, &consumed);
            }
            Some(ApplyOutcome { page, applied })
        })?;

        if let Some(outcome) = &outcome {
            tracing::info!(page_id, applied = outcome.applied, "Applied pending overrides");
        }
        Ok(outcome)
    }

    fn clear_overrides(&self) -> Result<()> {
        self.with(|inner| inner.overrides.clear())
    }
}
