//! Address ranges the engine tracks but does not own the lifetime of
//! (spec §4.3) — e.g. `argv` storage, `getenv` buffers, `tmpnam`'s
//! internal buffer.

use crate::dsa::interval_map::IntervalMapVector;
use crate::trace::event::Permission;

#[derive(Default)]
pub struct KnownRegionMap {
    regions: IntervalMapVector<Permission>,
}

impl KnownRegionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, start: u64, length: u64, permission: Permission) {
        self.regions.insert(start, length, permission);
    }

    pub fn erase(&mut self, start: u64) -> bool {
        self.regions.erase(start)
    }

    pub fn find_containing(&self, address: u64) -> Option<(u64, u64, Permission)> {
        self.regions
            .find_containing(address)
            .map(|(area, perm)| (area.start(), area.length(), *perm))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_argv_style_regions() {
        let mut known = KnownRegionMap::new();
        known.insert(0x7000, 32, Permission::READ);
        let (start, len, perm) = known.find_containing(0x7010).unwrap();
        assert_eq!(start, 0x7000);
        assert_eq!(len, 32);
        assert_eq!(perm, Permission::READ);
        assert!(known.erase(0x7000));
        assert!(known.find_containing(0x7010).is_none());
    }
}
