//! Order-independent merges of per-frame partial results.

use std::collections::BTreeMap;

use crate::agent::SelectionSummary;
use crate::extract::{dedupe_descriptors, ElementDescriptor};
use crate::replay::ReplayResult;
use crate::store::{lookup_override, OverrideTable};

/// Sums counts, concatenates items and adds per-type counts.
pub fn merge_summaries(parts: impl IntoIterator<Item = SelectionSummary>) -> SelectionSummary {
    parts
        .into_iter()
        .fold(SelectionSummary::default(), |mut merged, part| {
            merged.selected_count += part.selected_count;
            for (kind, count) in part.by_type {
                *merged.by_type.entry(kind).or_insert(0) += count;
            }
            merged.items.extend(part.items);
            merged
        })
}

/// Concatenates frame extractions, keeps one descriptor per
/// `(context, selector, label, type)` and applies pending label, group and
/// selector edits.
pub fn merge_extractions(
    parts: impl IntoIterator<Item = Vec<ElementDescriptor>>,
    overrides: &OverrideTable,
) -> Vec<ElementDescriptor> {
    let mut merged = dedupe_descriptors(parts.into_iter().flatten().collect());
    for descriptor in &mut merged {
        if let Some((_, edit)) = lookup_override(overrides, descriptor) {
            edit.apply_at_extraction(descriptor);
        }
    }
    merged
}

/// Per-selector match totals. Every requested selector is present, even at 0.
pub fn merge_validation(
    selectors: &[String],
    parts: impl IntoIterator<Item = BTreeMap<String, usize>>,
) -> BTreeMap<String, usize> {
    let mut totals: BTreeMap<String, usize> = selectors.iter().map(|s| (s.clone(), 0)).collect();
    for part in parts {
        for (selector, count) in part {
            if let Some(total) = totals.get_mut(&selector) {
                *total += count;
            }
        }
    }
    totals
}

pub fn merge_replay(parts: impl IntoIterator<Item = ReplayResult>) -> ReplayResult {
    parts.into_iter().sum()
}
