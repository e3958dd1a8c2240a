//! Tests for EvictionCache
//!
//! These tests verify:
//! - Size stays within capacity
//! - Newborns leave FIFO, before any re-accessed entry
//! - Adults leave by lowest access count, ties by insertion order

use chunkstore::EvictionCache;

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_put_and_get() {
    let mut cache = EvictionCache::new(4);

    assert!(cache.put("a", 1).is_none());
    assert!(cache.put("b", 2).is_none());

    assert_eq!(cache.get(&"a"), Some(&1));
    assert_eq!(cache.peek(&"b"), Some(&2));
    assert_eq!(cache.get(&"c"), None);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_zero_capacity_holds_one() {
    let mut cache = EvictionCache::new(0);

    cache.put(1, "one");
    let evicted = cache.put(2, "two");

    assert_eq!(cache.capacity(), 1);
    assert_eq!(evicted, Some((1, "one")));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_replace_existing_key_evicts_nothing() {
    let mut cache = EvictionCache::new(2);
    cache.put("a", 1);
    cache.put("b", 2);

    let evicted = cache.put("a", 10);

    assert!(evicted.is_none());
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.peek(&"a"), Some(&10));
}

#[test]
fn test_remove() {
    let mut cache = EvictionCache::new(2);
    cache.put("a", 1);

    assert_eq!(cache.remove(&"a"), Some(1));
    assert_eq!(cache.remove(&"a"), None);
    assert!(cache.is_empty());
}

#[test]
fn test_get_mut_updates_value() {
    let mut cache = EvictionCache::new(2);
    cache.put("a", 1);

    *cache.get_mut(&"a").unwrap() += 41;

    assert_eq!(cache.peek(&"a"), Some(&42));
}

#[test]
fn test_remove_where() {
    let mut cache = EvictionCache::new(10);
    for n in 0..10 {
        cache.put(n, n * 10);
    }

    let mut removed = cache.remove_where(|key, _| key % 2 == 0);
    removed.sort();

    assert_eq!(removed, vec![(0, 0), (2, 20), (4, 40), (6, 60), (8, 80)]);
    assert_eq!(cache.len(), 5);
    assert!(!cache.contains_key(&4));
    assert!(cache.contains_key(&5));
}

#[test]
fn test_clear() {
    let mut cache = EvictionCache::new(3);
    cache.put(1, 1);
    cache.put(2, 2);

    cache.clear();

    assert!(cache.is_empty());
    assert!(cache.put(3, 3).is_none());
}

// =============================================================================
// Eviction Order
// =============================================================================

#[test]
fn test_newborns_evicted_in_insertion_order() {
    let mut cache = EvictionCache::new(2);
    cache.put("A", 1);
    cache.put("B", 2);

    let evicted = cache.put("C", 3);

    assert_eq!(evicted, Some(("A", 1)));
    assert!(cache.contains_key(&"B"));
    assert!(cache.contains_key(&"C"));
}

#[test]
fn test_accessed_entry_outlives_newborn() {
    let mut cache = EvictionCache::new(2);
    cache.put("A", 1);
    cache.put("B", 2);
    cache.get(&"A");

    let evicted = cache.put("C", 3);

    assert_eq!(evicted, Some(("B", 2)));
    assert!(cache.contains_key(&"A"));
}

#[test]
fn test_peek_does_not_promote() {
    let mut cache = EvictionCache::new(2);
    cache.put("A", 1);
    cache.put("B", 2);
    cache.peek(&"A");

    let evicted = cache.put("C", 3);

    assert_eq!(evicted, Some(("A", 1)));
}

#[test]
fn test_adults_evicted_by_access_count() {
    let mut cache = EvictionCache::new(3);
    cache.put("A", 1);
    cache.put("B", 2);
    cache.put("C", 3);
    for _ in 0..3 {
        cache.get(&"A");
    }
    cache.get(&"B");
    cache.get(&"C");
    cache.get(&"C");

    // All adults: A=4, B=2, C=3 accesses
    assert_eq!(cache.put("D", 4), Some(("B", 2)));
    // D is a newborn, it goes before any adult
    assert_eq!(cache.put("E", 5), Some(("D", 4)));
}

#[test]
fn test_adult_ties_broken_by_insertion() {
    let mut cache = EvictionCache::new(2);
    cache.put("A", 1);
    cache.put("B", 2);
    cache.get(&"B");
    cache.get(&"A");

    assert_eq!(cache.put("C", 3), Some(("A", 1)));
}

#[test]
fn test_size_never_exceeds_capacity() {
    let mut cache = EvictionCache::new(16);

    for n in 0..1000u32 {
        cache.put(n, n);
        if n % 3 == 0 {
            cache.get(&(n / 2));
        }
        assert!(cache.len() <= 16);
    }
    assert_eq!(cache.len(), 16);
}

#[test]
fn test_hot_entry_survives_burst() {
    let mut cache = EvictionCache::new(4);
    cache.put("hot", 0);
    cache.get(&"hot");

    for n in 0..100 {
        cache.put(if n % 2 == 0 { "even" } else { "odd" }, n);
        cache.put(["a", "b", "c", "d"][n % 4], n);
    }

    assert!(cache.contains_key(&"hot"));
}
