//! Merge-join iterator over the sub-series of a varlen series.
//!
//! Each sub-series contributes a pending `(timestamp, index, chunk)` slot.
//! The root drives the join: its slot's timestamp names the next logical
//! record, every sub-series whose slot matches contributes a slice and
//! advances. Iteration ends when the root is exhausted.

use crate::error::Result;
use crate::series::cache::ChunkGuard;
use crate::series::iter::RangeIter;
use crate::varlen::entry::VarlenEntry;
use crate::varlen::series::VarlenSeries;

type Slot = Option<(u64, u32, ChunkGuard)>;

pub struct VarlenIter<'a> {
    series: &'a VarlenSeries,
    root: RangeIter,
    subs: Vec<RangeIter>,
    root_slot: Slot,
    sub_slots: Vec<Slot>,
    primed: bool,
}

impl<'a> VarlenIter<'a> {
    pub(crate) fn new(series: &'a VarlenSeries, root: RangeIter, subs: Vec<RangeIter>) -> Self {
        let sub_slots = subs.iter().map(|_| None).collect();
        Self {
            series,
            root,
            subs,
            root_slot: None,
            sub_slots,
            primed: false,
        }
    }

    fn prime(&mut self) -> Result<()> {
        self.root_slot = self.root.next_pos()?;
        for (iter, slot) in self.subs.iter_mut().zip(self.sub_slots.iter_mut()) {
            *slot = iter.next_pos()?;
        }
        self.primed = true;
        Ok(())
    }

    pub fn next_item(&mut self) -> Result<Option<VarlenEntry>> {
        if !self.primed {
            self.prime()?;
        }
        let Some((timestamp, root_index, root_chunk)) = self.root_slot.take() else {
            return Ok(None);
        };

        let mut slices = vec![(root_chunk, root_index)];
        for (iter, slot) in self.subs.iter_mut().zip(self.sub_slots.iter_mut()) {
            // Skip stale positions below the root timestamp.
            while matches!(slot, Some((sub_ts, _, _)) if *sub_ts < timestamp) {
                *slot = iter.next_pos()?;
            }
            if matches!(slot, Some((sub_ts, _, _)) if *sub_ts == timestamp) {
                if let Some((_, sub_index, sub_chunk)) = slot.take() {
                    slices.push((sub_chunk, sub_index));
                }
                *slot = iter.next_pos()?;
            }
        }

        self.root_slot = self.root.next_pos()?;
        Ok(Some(VarlenEntry::new(
            timestamp,
            self.series.size_field(),
            self.series.profile_vec(),
            slices,
        )))
    }

    /// Release all chunk references and the iterator's hold on the series.
    pub fn close(self) {}
}

impl Iterator for VarlenIter<'_> {
    type Item = Result<VarlenEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item().transpose()
    }
}

impl Drop for VarlenIter<'_> {
    fn drop(&mut self) {
        self.series.release_iterator();
    }
}
