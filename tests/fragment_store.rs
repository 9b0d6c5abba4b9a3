//! Scenario 5 from the spec's concrete end-to-end examples: a single
//! fragment split by an interior write, and its exact reversal.

use seec_engine::dsa::interval::Interval;
use seec_engine::memory::fragment::Overwrite;
use seec_engine::memory::fragment_store::MemoryFragmentStore;

#[test]
fn split_fragment_reverses_to_the_original_single_fragment() {
    let mut store = MemoryFragmentStore::new();
    store.add(0x3000, 16, 1, 0, 1);

    let overwritten = store.add(0x3004, 4, 1, 1, 2);
    assert_eq!(overwritten.len(), 1);
    match &overwritten[0] {
        Overwrite::SplitFragment { overwrite_area, .. } => {
            assert_eq!(*overwrite_area, Interval::with_start_length(0x3004, 4));
        }
        other => panic!("expected a split, got {other:?}"),
    }

    assert_eq!(store.len(), 3);
    assert!(store.contains_known(0x3000, 16));

    store.undo_add(0x3004, &overwritten);
    assert_eq!(store.len(), 1);
    let restored = store.containing(0x3000).unwrap();
    assert_eq!(restored.area, Interval::with_start_length(0x3000, 16));
}

#[test]
fn zero_length_write_is_rejected() {
    let mut store = MemoryFragmentStore::new();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        store.add(0x1000, 0, 1, 0, 1);
    }));
    assert!(result.is_err());
}
