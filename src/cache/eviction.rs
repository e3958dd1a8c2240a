//! Eviction cache
//!
//! Bounded key → value map. A `HashMap` holds the entries and a `BTreeMap`
//! keyed by eviction rank finds the victim in O(log n).

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Position of an entry in eviction order (ascending = evicted first)
///
/// Derived ordering compares fields top to bottom: newborns before adults,
/// then lower access counts, then earlier insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    adult: bool,
    access_count: u64,
    stamp: u64,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    access_count: u64,
    newborn: bool,
    stamp: u64,
}

impl<V> CacheEntry<V> {
    fn rank(&self) -> Rank {
        Rank {
            adult: !self.newborn,
            access_count: self.access_count,
            stamp: self.stamp,
        }
    }
}

/// Bounded cache evicting FIFO among never-reused entries and LFU among
/// reused ones
///
/// A newborn entry (not looked up since insertion) is always evicted before
/// any adult. Newborns leave in insertion order; adults by lowest access
/// count, ties broken by insertion order. A burst of one-shot insertions
/// therefore never displaces a hot entry.
///
/// ## Concurrency:
/// No internal locking; callers serialize access, typically under the lock
/// that already makes "probe, else load and insert" atomic.
#[derive(Debug)]
pub struct EvictionCache<K, V> {
    capacity: usize,
    entries: HashMap<K, CacheEntry<V>>,
    order: BTreeMap<Rank, K>,
    next_stamp: u64,
}

impl<K, V> EvictionCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            next_stamp: 0,
        }
    }

    /// Look up a value, counting the access
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.touch(key).map(|entry| &entry.value)
    }

    /// Look up a value for modification, counting the access
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.touch(key).map(|entry| &mut entry.value)
    }

    /// Look up a value without affecting eviction order
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Insert a newborn entry
    ///
    /// When the cache is full, the lowest-ranked entry is evicted first and
    /// returned so the caller can persist it. Replacing an existing key
    /// evicts nothing; the entry starts over as a newborn.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        let evicted = if let Some(old) = self.entries.remove(&key) {
            self.order.remove(&old.rank());
            None
        } else if self.entries.len() >= self.capacity {
            self.evict()
        } else {
            None
        };

        let entry = CacheEntry {
            value,
            access_count: 1,
            newborn: true,
            stamp: self.next_stamp,
        };
        self.next_stamp += 1;
        self.order.insert(entry.rank(), key.clone());
        self.entries.insert(key, entry);

        self.debug_check();
        evicted
    }

    /// Remove an entry
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.rank());
        self.debug_check();
        Some(entry.value)
    }

    /// Remove every entry matching `predicate`, returning them
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let doomed: Vec<K> = self
            .entries
            .iter()
            .filter(|(key, entry)| predicate(*key, &entry.value))
            .map(|(key, _)| (*key).clone())
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for key in doomed {
            if let Some(value) = self.remove(&key) {
                removed.push((key, value));
            }
        }
        removed
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Iterate mutably over all values, in no particular order
    ///
    /// Does not count as access.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> + '_ {
        self.entries
            .iter_mut()
            .map(|(key, entry)| (key, &mut entry.value))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Count an access and move the entry to its new rank
    fn touch(&mut self, key: &K) -> Option<&mut CacheEntry<V>> {
        let entry = self.entries.get_mut(key)?;
        let old_rank = entry.rank();
        entry.newborn = false;
        entry.access_count += 1;
        let new_rank = entry.rank();

        if let Some(owner) = self.order.remove(&old_rank) {
            self.order.insert(new_rank, owner);
        }
        debug_assert_eq!(self.entries.len(), self.order.len());
        self.entries.get_mut(key)
    }

    fn evict(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let entry = self.entries.remove(&key)?;
        Some((key, entry.value))
    }

    fn debug_check(&self) {
        debug_assert_eq!(
            self.entries.len(),
            self.order.len(),
            "forward and reverse cache indexes diverged"
        );
    }
}
