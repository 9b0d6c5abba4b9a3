//! Closed, inclusive address interval `[start, last]`.
//!
//! Mirrors `seec::Interval<uint64_t>` / `seec::MemoryArea` from the original
//! C++ sources: constructed either from a start/length pair or a start/end
//! pair, with `last()` always inclusive so a single-byte interval has
//! `start == last`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    start: u64,
    last: u64,
}

impl Interval {
    /// `length` must be nonzero; zero-length accesses are rejected by
    /// spec §8's boundary cases.
    pub fn with_start_length(start: u64, length: u64) -> Self {
        assert!(length > 0, "zero-length interval is not permitted");
        Interval {
            start,
            last: start + (length - 1),
        }
    }

    pub fn with_start_last(start: u64, last: u64) -> Self {
        assert!(last >= start, "interval end precedes start");
        Interval { start, last }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn length(&self) -> u64 {
        self.last - self.start + 1
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address <= self.last
    }

    pub fn contains_range(&self, other: &Interval) -> bool {
        self.start <= other.start && other.last <= self.last
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start <= other.last && other.start <= self.last
    }

    pub fn with_start(&self, new_start: u64) -> Self {
        Interval::with_start_last(new_start, self.last)
    }

    pub fn with_last(&self, new_last: u64) -> Self {
        Interval::with_start_last(self.start, new_last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_length_round_trips_into_last() {
        let i = Interval::with_start_length(0x1000, 4);
        assert_eq!(i.start(), 0x1000);
        assert_eq!(i.last(), 0x1003);
        assert_eq!(i.length(), 4);
    }

    #[test]
    fn contains_is_inclusive_on_last_byte() {
        let i = Interval::with_start_length(0x3000, 16);
        assert!(i.contains(0x3000));
        assert!(i.contains(0x300F));
        assert!(!i.contains(0x3010));
    }

    #[test]
    #[should_panic]
    fn zero_length_is_rejected() {
        Interval::with_start_length(0x1000, 0);
    }
}
