use std::collections::BTreeMap;

use crate::index::{ReferenceData, ReferenceEntry};

/// Tracks the row range of every reference while records stream in.
///
/// Only meaningful for coordinate-sorted input. As soon as a record shows that the
/// input is not sorted the tracker reports it and the builder drops it, so the
/// reference section is omitted from the index.
#[derive(Debug)]
pub(crate) struct ReferenceTracker {
    last_t_id: i32,
    last_pos: i32,
    /// Keyed by `t_id as u32` so the unmapped entry sorts last
    entries: BTreeMap<u32, ReferenceEntry>,
}
impl ReferenceTracker {
    /// Pre-populates references `0..num_references` and the unmapped entry
    pub fn new(num_references: usize) -> Self {
        let mut entries = BTreeMap::new();
        for t_id in 0..num_references {
            let t_id = t_id as i32;
            entries.insert(t_id as u32, ReferenceEntry::unset(t_id));
        }
        entries.insert(
            ReferenceEntry::UNMAPPED_ID as u32,
            ReferenceEntry::unset(ReferenceEntry::UNMAPPED_ID),
        );
        Self {
            last_t_id: ReferenceEntry::UNMAPPED_ID,
            last_pos: -1,
            entries,
        }
    }

    fn entry(&mut self, t_id: i32) -> &mut ReferenceEntry {
        self.entries
            .entry(t_id as u32)
            .or_insert_with(|| ReferenceEntry::unset(t_id))
    }

    /// Records `row` at (`t_id`, `pos`)
    ///
    /// Returns `false` if the input turned out not to be coordinate-sorted.
    pub fn add(&mut self, t_id: i32, pos: i32, row: u32) -> bool {
        if self.last_t_id != t_id {
            if t_id >= 0 {
                if !self.entry(ReferenceEntry::UNMAPPED_ID).is_unset() {
                    tracing::debug!(t_id, row, "mapped record after unmapped records");
                    return false;
                }
                if !self.entry(t_id).is_unset() {
                    tracing::debug!(t_id, row, "reference seen again after another reference");
                    return false;
                }
            }
            self.last_t_id = t_id;
        } else if t_id >= 0 && self.last_pos > pos {
            tracing::debug!(t_id, row, pos, last = self.last_pos, "positions out of order");
            return false;
        }

        let Some(end_row) = row
            .checked_add(1)
            .filter(|&end| end != ReferenceEntry::UNSET_ROW)
        else {
            tracing::debug!(t_id, row, "row number past the reference range limit");
            return false;
        };
        let entry = self.entry(t_id);
        if entry.begin_row == ReferenceEntry::UNSET_ROW {
            entry.begin_row = row;
        }
        entry.end_row = end_row;
        self.last_pos = pos;
        true
    }

    /// Entries in reference order, unmapped last
    pub fn into_data(self) -> ReferenceData {
        ReferenceData {
            entries: self.entries.into_values().collect(),
        }
    }
}
