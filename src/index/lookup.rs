use std::collections::{BTreeMap, HashMap};
use std::ops::{Bound, Range};

use super::{BarcodeData, BasicData, MappedData, RawIndex, ReferenceData};
use crate::filter::Compare;

/// Derived, query-oriented view of the mapped section.
///
/// Built by one pass over [`MappedData`]: per-row inserted/deleted base counts
/// are computed and rows are grouped by those counts, and rows are partitioned by
/// strand. Row lists are ascending.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappedLookup {
    pub insertions_by_count: BTreeMap<u32, Vec<usize>>,
    pub deletions_by_count: BTreeMap<u32, Vec<usize>>,
    pub forward_strand_rows: Vec<usize>,
    pub reverse_strand_rows: Vec<usize>,
}
impl MappedLookup {
    #[must_use]
    pub fn new(mapped: &MappedData) -> Self {
        let mut lookup = Self::default();
        for row in 0..mapped.len() {
            lookup
                .insertions_by_count
                .entry(mapped.num_inserted_bases(row))
                .or_default()
                .push(row);
            lookup
                .deletions_by_count
                .entry(mapped.num_deleted_bases(row))
                .or_default()
                .push(row);
            if mapped.is_reverse_strand(row) {
                lookup.reverse_strand_rows.push(row);
            } else {
                lookup.forward_strand_rows.push(row);
            }
        }
        lookup
    }

    /// Rows whose inserted-base count satisfies `count` under `cmp`
    #[must_use]
    pub fn rows_by_insertions(&self, count: u32, cmp: Compare) -> Vec<usize> {
        rows_in_buckets(&self.insertions_by_count, count, cmp)
    }

    /// Rows whose deleted-base count satisfies `count` under `cmp`
    #[must_use]
    pub fn rows_by_deletions(&self, count: u32, cmp: Compare) -> Vec<usize> {
        rows_in_buckets(&self.deletions_by_count, count, cmp)
    }
}

/// Collects the rows of every bucket whose key compares true against `key`
fn rows_in_buckets(buckets: &BTreeMap<u32, Vec<usize>>, key: u32, cmp: Compare) -> Vec<usize> {
    let bounds: (Bound<u32>, Bound<u32>) = match cmp {
        Compare::Equal | Compare::Contains => (Bound::Included(key), Bound::Included(key)),
        Compare::LessThan => (Bound::Unbounded, Bound::Excluded(key)),
        Compare::LessThanEqual => (Bound::Unbounded, Bound::Included(key)),
        Compare::GreaterThan => (Bound::Excluded(key), Bound::Unbounded),
        Compare::GreaterThanEqual => (Bound::Included(key), Bound::Unbounded),
        Compare::NotEqual | Compare::NotContains => {
            let mut rows: Vec<usize> = buckets
                .iter()
                .filter(|(k, _)| **k != key)
                .flat_map(|(_, rows)| rows.iter().copied())
                .collect();
            rows.sort_unstable();
            return rows;
        }
    };
    let mut rows: Vec<usize> = buckets
        .range(bounds)
        .flat_map(|(_, rows)| rows.iter().copied())
        .collect();
    rows.sort_unstable();
    rows
}

/// Reference id to row range, complete for every reference known to the index
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceLookup {
    references: HashMap<i32, Range<usize>>,
}
impl ReferenceLookup {
    #[must_use]
    pub fn new(reference: &ReferenceData) -> Self {
        let references = reference
            .entries
            .iter()
            .map(|entry| (entry.t_id, entry.rows()))
            .collect();
        Self { references }
    }

    /// Rows of reference `t_id`; empty if it has none or is unknown
    #[must_use]
    pub fn rows(&self, t_id: i32) -> Range<usize> {
        self.references.get(&t_id).cloned().unwrap_or(0..0)
    }

    #[must_use]
    pub fn contains(&self, t_id: i32) -> bool {
        self.references.contains_key(&t_id)
    }

    /// Known reference ids in ascending order, unmapped sentinel last
    #[must_use]
    pub fn reference_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.references.keys().copied().collect();
        ids.sort_by_key(|&id| id as u32);
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// A [`RawIndex`] with derived lookup structures built once at construction.
///
/// The raw index is owned and never mutated, so the derived structures cannot go
/// out of sync with it.
#[derive(Clone, Debug)]
pub struct LookupIndex {
    raw: RawIndex,
    mapped: Option<MappedLookup>,
    reference: ReferenceLookup,
}
impl LookupIndex {
    #[must_use]
    pub fn new(raw: RawIndex) -> Self {
        let mapped = raw.mapped_data().map(MappedLookup::new);
        let reference = raw
            .reference_data()
            .map(ReferenceLookup::new)
            .unwrap_or_default();
        Self {
            raw,
            mapped,
            reference,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &RawIndex {
        &self.raw
    }

    #[must_use]
    pub fn into_raw(self) -> RawIndex {
        self.raw
    }

    #[must_use]
    pub fn num_reads(&self) -> usize {
        self.raw.num_reads()
    }

    #[must_use]
    pub fn basic_data(&self) -> &BasicData {
        self.raw.basic_data()
    }

    #[must_use]
    pub fn mapped_data(&self) -> Option<&MappedData> {
        self.raw.mapped_data()
    }

    #[must_use]
    pub fn mapped_lookup(&self) -> Option<&MappedLookup> {
        self.mapped.as_ref()
    }

    #[must_use]
    pub fn reference_data(&self) -> &ReferenceLookup {
        &self.reference
    }

    #[must_use]
    pub fn barcode_data(&self) -> Option<&BarcodeData> {
        self.raw.barcode_data()
    }

    /// Virtual file offset of a row in the primary file
    #[must_use]
    pub fn file_offset(&self, row: usize) -> Option<u64> {
        self.raw.basic_data().file_offset.get(row).copied()
    }
}
impl From<RawIndex> for LookupIndex {
    fn from(raw: RawIndex) -> Self {
        Self::new(raw)
    }
}
