//! Interval map from address ranges to memory fragments (spec §4.2),
//! ported from `TraceMemoryState::add`/`clear` in
//! `original_source/lib/Trace/TraceMemory.cpp`.
//!
//! `clear` walks in three phases, in the same order the original does, so
//! the emitted [`Overwrite`] sequence matches byte-for-byte:
//! 1. perfect-removal fast path (incoming range == an existing fragment),
//! 2. the one fragment, if any, that starts before `address` and overlaps
//!    it (split or right-trim),
//! 3. fragments starting within `[address, last_address]` (full replace,
//!    or a final left-trim of the one that extends past `last_address`).

use std::collections::BTreeMap;

use crate::dsa::interval::Interval;
use crate::memory::fragment::{MemoryFragment, Overwrite};

#[derive(Default)]
pub struct MemoryFragmentStore {
    fragments: BTreeMap<u64, MemoryFragment>,
}

impl MemoryFragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new fragment `[address, address+length)`, displacing
    /// anything it overlaps. Returns the displaced fragments, in the
    /// order they were encountered.
    pub fn add(
        &mut self,
        address: u64,
        length: u64,
        thread_id: u32,
        event_offset: u64,
        process_time: u64,
    ) -> Vec<Overwrite> {
        assert!(length > 0, "zero-length write is not permitted");
        let overwritten = self.clear(address, length);
        self.fragments.insert(
            address,
            MemoryFragment::new(address, length, thread_id, event_offset, process_time),
        );
        overwritten
    }

    /// Remove whatever fragments cover `[address, address+length)`,
    /// inserting nothing. Used to free memory on deallocation (spec §4.2).
    pub fn clear(&mut self, address: u64, length: u64) -> Vec<Overwrite> {
        assert!(length > 0, "zero-length clear is not permitted");
        let last_address = address + (length - 1);
        let mut overwritten = Vec::new();

        // Phase 1: perfect removal.
        if let Some((&key, &frag)) = self.fragments.range(address..).next() {
            if key == address && frag.area.last() == last_address {
                overwritten.push(Overwrite::Replace { old: frag });
                self.fragments.remove(&key);
                return overwritten;
            }
        }

        // Phase 2: the fragment starting before `address`, if it overlaps.
        if let Some((&prev_key, &prev_frag)) = self.fragments.range(..address).next_back() {
            if prev_frag.area.last() >= address {
                if prev_frag.area.last() > last_address {
                    let overwrite_area = Interval::with_start_length(address, length);
                    overwritten.push(Overwrite::SplitFragment {
                        old: prev_frag,
                        overwrite_area,
                    });

                    let left = MemoryFragment {
                        area: Interval::with_start_last(prev_frag.area.start(), address - 1),
                        ..prev_frag
                    };
                    let right = MemoryFragment {
                        area: Interval::with_start_last(last_address + 1, prev_frag.area.last()),
                        ..prev_frag
                    };

                    self.fragments.remove(&prev_key);
                    self.fragments.insert(prev_key, left);
                    self.fragments.insert(last_address + 1, right);
                } else {
                    overwritten.push(Overwrite::TrimRight {
                        old: prev_frag,
                        new_last: address - 1,
                    });

                    let trimmed = MemoryFragment {
                        area: Interval::with_start_last(prev_frag.area.start(), address - 1),
                        ..prev_frag
                    };
                    self.fragments.remove(&prev_key);
                    self.fragments.insert(prev_key, trimmed);
                }
            }
        }

        // Phase 3: fragments starting within [address, last_address].
        let keys: Vec<u64> = self
            .fragments
            .range(address..=last_address)
            .map(|(&k, _)| k)
            .collect();
        for key in keys {
            let frag = *self.fragments.get(&key).unwrap();
            if frag.area.last() <= last_address {
                overwritten.push(Overwrite::Replace { old: frag });
                self.fragments.remove(&key);
            } else {
                overwritten.push(Overwrite::TrimLeft {
                    old: frag,
                    new_start: last_address + 1,
                });
                self.fragments.remove(&key);
                let trimmed = MemoryFragment {
                    area: Interval::with_start_last(last_address + 1, frag.area.last()),
                    ..frag
                };
                self.fragments.insert(last_address + 1, trimmed);
                break;
            }
        }

        overwritten
    }

    /// True iff every byte in `[address, address+length)` is covered by a
    /// known fragment.
    pub fn contains_known(&self, address: u64, length: u64) -> bool {
        assert!(length > 0, "zero-length query is not permitted");
        let last_address = address + (length - 1);

        if let Some((&key, frag)) = self.fragments.range(address..).next() {
            if key == address && frag.area.last() >= last_address {
                return true;
            }
        }
        if let Some((_, frag)) = self.fragments.range(..address).next_back() {
            if frag.area.last() >= last_address {
                return true;
            }
        }
        false
    }

    pub fn containing(&self, address: u64) -> Option<&MemoryFragment> {
        self.fragments
            .range(..=address)
            .next_back()
            .filter(|(_, f)| f.area.contains(address))
            .map(|(_, f)| f)
    }

    pub fn read_bytes(&self, address: u64, length: u64) -> Option<&MemoryFragment> {
        self.containing(address)
            .filter(|f| f.area.contains(address + length.saturating_sub(1)))
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Undo a forward `add` at `address`: remove the fragment it inserted
    /// and restore whatever it displaced (spec §4.7: "`StateOverwrite*`
    /// records as the redo log for memory").
    pub fn undo_add(&mut self, address: u64, overwritten: &[Overwrite]) {
        self.fragments.remove(&address);
        self.restore(overwritten);
    }

    /// Undo a forward `clear`: restore whatever it displaced.
    pub fn undo_clear(&mut self, overwritten: &[Overwrite]) {
        self.restore(overwritten);
    }

    /// Remove the fragment keyed at `address`, with no restoration. Used
    /// on replay when undoing the "insert" half of a forward `add`, one
    /// `StateOverwrite*` record at a time having already restored the
    /// "displace" half via [`Self::restore_one`].
    pub fn remove_at(&mut self, address: u64) {
        self.fragments.remove(&address);
    }

    fn restore(&mut self, overwritten: &[Overwrite]) {
        for ow in overwritten.iter().rev() {
            self.restore_one(ow);
        }
    }

    /// Undo a single displacement, independent of any batch it was part
    /// of. Used directly by replay, which encounters `StateOverwrite*`
    /// records one at a time rather than as a collected `Vec`.
    pub fn restore_one(&mut self, ow: &Overwrite) {
        match ow {
            Overwrite::Replace { old } => {
                self.fragments.insert(old.area.start(), *old);
            }
            Overwrite::SplitFragment { old, overwrite_area } => {
                if old.area.start() < overwrite_area.start() {
                    self.fragments.remove(&old.area.start());
                }
                let right_start = overwrite_area.last() + 1;
                if right_start <= old.area.last() {
                    self.fragments.remove(&right_start);
                }
                self.fragments.insert(old.area.start(), *old);
            }
            Overwrite::TrimRight { old, .. } => {
                self.fragments.remove(&old.area.start());
                self.fragments.insert(old.area.start(), *old);
            }
            Overwrite::TrimLeft { old, new_start } => {
                self.fragments.remove(new_start);
                self.fragments.insert(old.area.start(), *old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_alloca_store_and_readback() {
        let mut store = MemoryFragmentStore::new();
        store.add(0x1000, 4, 1, 0, 1);
        let frag = store.containing(0x1002).unwrap();
        assert_eq!(frag.area.start(), 0x1000);
        assert_eq!(frag.area.last(), 0x1003);
        assert!(store.contains_known(0x1000, 4));
    }

    #[test]
    fn fragment_split_by_interior_write() {
        let mut store = MemoryFragmentStore::new();
        store.add(0x3000, 16, 1, 0, 1); // [0x3000, 0x300F]
        let overwritten = store.add(0x3004, 4, 1, 1, 2); // split at [0x3004,0x3007]

        assert_eq!(overwritten.len(), 1);
        match &overwritten[0] {
            Overwrite::SplitFragment { overwrite_area, .. } => {
                assert_eq!(overwrite_area.start(), 0x3004);
                assert_eq!(overwrite_area.last(), 0x3007);
            }
            other => panic!("expected SplitFragment, got {:?}", other),
        }

        assert_eq!(store.containing(0x3000).unwrap().area.last(), 0x3003);
        assert_eq!(store.containing(0x3008).unwrap().area.start(), 0x3008);
        assert_eq!(store.containing(0x3004).unwrap().area, Interval::with_start_length(0x3004, 4));
        assert_eq!(store.len(), 3);

        // Reverse yields exactly the original single fragment.
        store.undo_add(0x3004, &overwritten);
        assert_eq!(store.len(), 1);
        let restored = store.containing(0x3000).unwrap();
        assert_eq!(restored.area.start(), 0x3000);
        assert_eq!(restored.area.last(), 0x300F);
    }

    #[test]
    fn right_trim_on_overlap_from_the_left() {
        let mut store = MemoryFragmentStore::new();
        store.add(0x1000, 8, 1, 0, 1); // [0x1000, 0x1007]
        let overwritten = store.add(0x1004, 8, 1, 1, 2); // [0x1004, 0x100B]

        assert_eq!(overwritten.len(), 1);
        assert!(matches!(overwritten[0], Overwrite::TrimRight { new_last: 0x1003, .. }));
        assert_eq!(store.containing(0x1000).unwrap().area.last(), 0x1003);
    }

    #[test]
    fn left_trim_on_overlap_from_the_right() {
        let mut store = MemoryFragmentStore::new();
        store.add(0x2000, 8, 1, 0, 1); // [0x2000, 0x2007]
        let overwritten = store.add(0x1FFC, 8, 1, 1, 2); // [0x1FFC, 0x2003]

        assert_eq!(overwritten.len(), 1);
        assert!(matches!(overwritten[0], Overwrite::TrimLeft { new_start: 0x2004, .. }));
        assert_eq!(store.containing(0x2004).unwrap().area.start(), 0x2004);
    }

    #[test]
    fn malloc_free_round_trip_clears_exactly() {
        let mut store = MemoryFragmentStore::new();
        store.add(0x2000, 16, 1, 0, 1);
        let overwritten = store.clear(0x2000, 16);
        assert!(store.is_empty());
        store.undo_clear(&overwritten);
        assert_eq!(store.len(), 1);
        assert!(store.contains_known(0x2000, 16));
    }

    #[test]
    fn last_byte_of_fragment_is_contained() {
        let mut store = MemoryFragmentStore::new();
        store.add(0x4000, 4, 1, 0, 1);
        assert!(store.containing(0x4003).is_some());
        assert!(store.containing(0x4004).is_none());
    }
}
