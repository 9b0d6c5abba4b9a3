//! A single observed write to memory (spec §3 "Memory fragment", §4.2).

use crate::dsa::interval::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryFragment {
    pub area: Interval,
    pub thread_id: u32,
    pub event_offset: u64,
    pub process_time: u64,
}

impl MemoryFragment {
    pub fn new(start: u64, length: u64, thread_id: u32, event_offset: u64, process_time: u64) -> Self {
        MemoryFragment {
            area: Interval::with_start_length(start, length),
            thread_id,
            event_offset,
            process_time,
        }
    }
}

/// One of the four structured descriptions of how an incoming fragment
/// displaced an existing one (spec §4.2 "Overwrite reporting").
/// Sufficient, on its own, to undo the displacement during backward replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    /// The incoming range fully covered the old fragment.
    Replace { old: MemoryFragment },
    /// The incoming range lay strictly inside the old fragment; the old
    /// fragment becomes two pieces around `overwrite_area`.
    SplitFragment {
        old: MemoryFragment,
        overwrite_area: Interval,
    },
    /// The incoming range clipped the right edge; the old fragment shrinks
    /// to end at `new_last`.
    TrimRight { old: MemoryFragment, new_last: u64 },
    /// The incoming range clipped the left edge; the old fragment is
    /// repositioned to start at `new_start`.
    TrimLeft { old: MemoryFragment, new_start: u64 },
}

impl Overwrite {
    pub fn old_fragment(&self) -> &MemoryFragment {
        match self {
            Overwrite::Replace { old }
            | Overwrite::SplitFragment { old, .. }
            | Overwrite::TrimRight { old, .. }
            | Overwrite::TrimLeft { old, .. } => old,
        }
    }
}
