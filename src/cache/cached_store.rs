//! Cache-fronted object store
//!
//! Keeps decoded objects in an [`EvictionCache`] in front of a [`Storage`]
//! backend. Writes are write-back: objects reach the backend when evicted,
//! removed by predicate, or flushed.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::key::Key;
use crate::storage::Storage;

use super::EvictionCache;

/// A decoded object plus whether the backend has seen its latest version
#[derive(Debug)]
struct CachedValue<V> {
    value: Arc<V>,
    dirty: bool,
}

/// Write-back object cache over a store
///
/// ## Concurrency:
/// One mutex spans "probe cache, else read + decode + insert", so two
/// threads never decode the same missing object twice.
pub struct CachedStore<S, V> {
    storage: S,
    cache: Mutex<EvictionCache<Key, CachedValue<V>>>,
}

impl<S, V> CachedStore<S, V>
where
    S: Storage,
    V: Serialize + DeserializeOwned,
{
    /// Wrap an (open) store with a cache of `capacity` objects
    pub fn new(storage: S, capacity: usize) -> Self {
        Self {
            storage,
            cache: Mutex::new(EvictionCache::new(capacity)),
        }
    }

    /// Wrap a store with a cache sized by `config.cache_capacity`
    pub fn with_config(storage: S, config: &Config) -> Self {
        Self::new(storage, config.cache_capacity)
    }

    /// Get an object, loading and caching it on a miss
    pub fn get(&self, key: &Key) -> Result<Option<Arc<V>>> {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(key) {
            return Ok(Some(Arc::clone(&cached.value)));
        }

        let Some(bytes) = self.storage.read(key)? else {
            return Ok(None);
        };
        let value = Arc::new(bincode::deserialize::<V>(&bytes)?);
        self.insert(
            &mut cache,
            key.clone(),
            CachedValue {
                value: Arc::clone(&value),
                dirty: false,
            },
        )?;
        Ok(Some(value))
    }

    /// Cache an object; it is written to the store later
    pub fn put(&self, key: Key, value: V) -> Result<()> {
        let mut cache = self.cache.lock();
        self.insert(
            &mut cache,
            key,
            CachedValue {
                value: Arc::new(value),
                dirty: true,
            },
        )
    }

    /// Forget an object in the cache and the store
    pub fn remove(&self, key: &Key) -> Result<()> {
        let mut cache = self.cache.lock();
        cache.remove(key);
        self.storage.remove(key)
    }

    /// Evict every cached object matching `predicate`, persisting dirty ones
    ///
    /// Returns the number of evicted objects. Objects that fail to write
    /// stay cached and the first failure is returned.
    pub fn evict_where<F>(&self, mut predicate: F) -> Result<usize>
    where
        F: FnMut(&Key, &V) -> bool,
    {
        let mut cache = self.cache.lock();
        let matches = cache.remove_where(|key, cached| predicate(key, cached.value.as_ref()));
        let mut evicted = 0;
        let mut failure = None;
        for (key, cached) in matches {
            match self.write_back(&key, &cached) {
                Ok(()) => evicted += 1,
                Err(e) => {
                    tracing::warn!("Keeping {} cached, write-back failed: {}", key, e);
                    // Its own slot was just freed, nothing else is evicted
                    cache.put(key, cached);
                    failure.get_or_insert(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(evicted),
        }
    }

    /// Write every dirty object to the store
    ///
    /// Returns the number of objects written.
    pub fn flush(&self) -> Result<usize> {
        let mut cache = self.cache.lock();
        let mut written = 0;
        for (key, cached) in cache.iter_mut() {
            if cached.dirty {
                self.storage.write(key, &bincode::serialize(&*cached.value)?)?;
                cached.dirty = false;
                written += 1;
            }
        }
        tracing::debug!("Flushed {} cached objects", written);
        Ok(written)
    }

    /// Number of cached objects
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Insert an entry, writing back whatever it evicts
    ///
    /// When the victim cannot be written the insert is undone and the
    /// victim goes back into the cache.
    fn insert(
        &self,
        cache: &mut EvictionCache<Key, CachedValue<V>>,
        key: Key,
        cached: CachedValue<V>,
    ) -> Result<()> {
        let Some((evicted_key, evicted)) = cache.put(key.clone(), cached) else {
            return Ok(());
        };
        if let Err(e) = self.write_back(&evicted_key, &evicted) {
            tracing::warn!("Keeping {} cached, write-back failed: {}", evicted_key, e);
            cache.remove(&key);
            cache.put(evicted_key, evicted);
            return Err(e);
        }
        Ok(())
    }

    fn write_back(&self, key: &Key, cached: &CachedValue<V>) -> Result<()> {
        if cached.dirty {
            tracing::trace!("Writing back evicted object {}", key);
            self.storage.write(key, &bincode::serialize(&*cached.value)?)?;
        }
        Ok(())
    }
}
