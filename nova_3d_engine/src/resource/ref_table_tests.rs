use super::*;
use std::sync::Arc;

use crate::error::Error;

fn test_table(capacity: usize) -> RefTable<String> {
    RefTable::new("test", capacity)
}

fn resource(text: &str) -> Arc<String> {
    Arc::new(text.to_string())
}

// ============================================================================
// Insertion tests
// ============================================================================

#[test]
fn test_indices_are_dense_in_insertion_order() {
    let mut table = test_table(8);
    assert_eq!(table.add(10, &resource("a")).unwrap(), 0);
    assert_eq!(table.add(20, &resource("b")).unwrap(), 1);
    assert_eq!(table.add(30, &resource("c")).unwrap(), 2);
    assert_eq!(table.len(), 3);
}

#[test]
fn test_re_add_increments_refcount_not_size() {
    let mut table = test_table(8);
    table.add(10, &resource("a")).unwrap();
    let index = table.add(10, &resource("a")).unwrap();

    assert_eq!(index, 0);
    assert_eq!(table.len(), 1);
    assert_eq!(table.ref_count(10), 2);
}

#[test]
fn test_capacity_exceeded_is_fatal() {
    let mut table = test_table(2);
    table.add(1, &resource("a")).unwrap();
    table.add(2, &resource("b")).unwrap();

    match table.add(3, &resource("c")) {
        Err(Error::CapacityExceeded { table: name, capacity }) => {
            assert_eq!(name, "test");
            assert_eq!(capacity, 2);
        }
        other => panic!("expected CapacityExceeded, got {:?}", other),
    }

    // Re-adding an existing resource still works on a full table
    assert_eq!(table.add(1, &resource("a")).unwrap(), 0);
}

#[test]
fn test_failed_add_leaves_no_trace() {
    let mut table = test_table(1);
    table.add(1, &resource("a")).unwrap();
    assert!(table.add(2, &resource("b")).is_err());

    // The rejected id holds no refcount, so removing it is a no-op
    assert_eq!(table.ref_count(2), 0);
    assert!(!table.remove(2));
    assert_eq!(table.len(), 1);
    assert_eq!(table.index_of(1), Some(0));
}

// ============================================================================
// Removal tests
// ============================================================================

#[test]
fn test_remove_rebuilds_dense_indices() {
    let mut table = test_table(8);
    table.add(10, &resource("a")).unwrap();
    table.add(20, &resource("b")).unwrap();
    table.add(30, &resource("c")).unwrap();

    assert!(table.remove(20));

    // Remaining entries compact down, preserving relative order
    assert_eq!(table.len(), 2);
    assert_eq!(table.index_of(10), Some(0));
    assert_eq!(table.index_of(30), Some(1));
    assert_eq!(table.index_of(20), None);
    assert_eq!(table.get(1).unwrap().as_str(), "c");
}

#[test]
fn test_remove_only_frees_at_zero_refcount() {
    let mut table = test_table(8);
    table.add(10, &resource("a")).unwrap();
    table.add(10, &resource("a")).unwrap();

    assert!(!table.remove(10));
    assert!(table.contains(10));
    assert!(table.remove(10));
    assert!(!table.contains(10));
    assert!(table.is_empty());
}

#[test]
fn test_remove_unknown_id_is_ignored() {
    let mut table = test_table(8);
    table.add(10, &resource("a")).unwrap();
    assert!(!table.remove(99));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_freed_slot_is_reusable() {
    let mut table = test_table(2);
    table.add(1, &resource("a")).unwrap();
    table.add(2, &resource("b")).unwrap();
    table.remove(1);

    assert_eq!(table.add(3, &resource("c")).unwrap(), 1);
    assert_eq!(table.index_of(2), Some(0));
}

// ============================================================================
// Iteration tests
// ============================================================================

#[test]
fn test_iter_yields_index_order() {
    let mut table = test_table(8);
    table.add(10, &resource("a")).unwrap();
    table.add(20, &resource("b")).unwrap();

    let collected: Vec<(u32, String)> =
        table.iter().map(|(index, r)| (index, r.to_string())).collect();
    assert_eq!(collected, vec![(0, "a".to_string()), (1, "b".to_string())]);
}
