//! Duplicate resolution for job items sharing a name.
//!
//! Within a group the item with the highest folder stamp is kept. Stamps are
//! compared as strings, which orders fixed-width timestamps correctly. The
//! sort is stable, so on equal stamps the item that appears first in the job
//! list wins.
use crate::joblist::{ItemId, JobItem};
use serde::Serialize;
use std::collections::HashMap;

/// Resolution of one name that occurs more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub name: String,
    pub keep: JobItem,
    /// Losing items, newest first.
    pub discard: Vec<JobItem>,
}

/// Every duplicate group of a job list, ordered by first appearance of the name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub groups: Vec<DuplicateGroup>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn discard_count(&self) -> usize {
        self.groups.iter().map(|group| group.discard.len()).sum()
    }

    /// All discarded items across groups.
    pub fn discarded(&self) -> impl Iterator<Item = &JobItem> {
        self.groups.iter().flat_map(|group| group.discard.iter())
    }

    pub fn discard_ids(&self) -> Vec<ItemId> {
        self.discarded().map(|item| item.id).collect()
    }
}

/// Group items by name and decide which instance of each duplicated name
/// survives.
pub fn find_duplicates(items: &[JobItem]) -> Resolution {
    let mut holders: HashMap<&str, usize> = HashMap::new();
    let mut candidates: Vec<Vec<&JobItem>> = Vec::new();

    for item in items {
        match holders.get(item.name.as_str()) {
            Some(&slot) => candidates[slot].push(item),
            None => {
                holders.insert(item.name.as_str(), candidates.len());
                candidates.push(vec![item]);
            }
        }
    }

    let groups = candidates
        .into_iter()
        .filter_map(|mut group| {
            group.sort_by(|a, b| b.folder_stamp.cmp(&a.folder_stamp));
            let mut ranked = group.into_iter().cloned();
            let keep = ranked.next()?;
            let discard: Vec<JobItem> = ranked.collect();
            (!discard.is_empty()).then(|| DuplicateGroup {
                name: keep.name.clone(),
                keep,
                discard,
            })
        })
        .collect();

    Resolution { groups }
}
