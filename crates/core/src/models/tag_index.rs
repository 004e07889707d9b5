use std::collections::BTreeMap;

use crate::errors::CoreError;

use super::entry::{Entry, Tags};

/// Reference-counted reverse index: tag name → (tag value → number of live
/// entries holding that pair).
///
/// A pair is present iff at least one live entry holds it, and a tag with no
/// remaining values is dropped entirely. The index is a cache over the entry
/// list and can always be rebuilt with [`TagIndex::from_entries`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIndex {
    counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from scratch.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Self {
        let mut index = Self::new();
        for entry in entries {
            index.add_entry(entry.tags());
        }
        index
    }

    /// Count every pair of an entry's tag set.
    pub fn add_entry(&mut self, tags: &Tags) {
        for (tag, value) in tags {
            *self
                .counts
                .entry(tag.clone())
                .or_default()
                .entry(value.clone())
                .or_insert(0) += 1;
        }
    }

    /// Release every pair of an entry's tag set.
    ///
    /// All pairs are checked before anything is decremented, so an
    /// `UntrackedTag` error leaves the index untouched.
    pub fn remove_entry(&mut self, tags: &Tags) -> Result<(), CoreError> {
        for (tag, value) in tags {
            if self.count(tag, value) == 0 {
                return Err(CoreError::UntrackedTag {
                    tag: tag.clone(),
                    value: value.clone(),
                });
            }
        }

        for (tag, value) in tags {
            let Some(values) = self.counts.get_mut(tag) else {
                continue;
            };
            if let Some(count) = values.get_mut(value) {
                *count -= 1;
                if *count == 0 {
                    values.remove(value);
                }
            }
            if values.is_empty() {
                self.counts.remove(tag);
            }
        }
        Ok(())
    }

    /// Values currently in use for `tag`, sorted.
    /// `None` means the tag is not in use at all.
    pub fn values_for_tag(&self, tag: &str) -> Option<Vec<&str>> {
        self.counts
            .get(tag)
            .map(|values| values.keys().map(String::as_str).collect())
    }

    /// All tag names currently in use, sorted.
    pub fn tags(&self) -> Vec<&str> {
        self.counts.keys().map(String::as_str).collect()
    }

    /// Number of live entries holding `tag`=`value`.
    pub fn count(&self, tag: &str, value: &str) -> usize {
        self.counts
            .get(tag)
            .and_then(|values| values.get(value))
            .copied()
            .unwrap_or(0)
    }

    /// Largest number of distinct values held by any single tag.
    pub fn max_values_per_tag(&self) -> usize {
        self.counts.values().map(|v| v.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
