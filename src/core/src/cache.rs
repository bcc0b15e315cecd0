//! Lookup cache keyed by lazy-id identity
//!
//! Deduplicates lookups across independently constructed `LazyId`s: the
//! first `look_up` for a `(key, lookup identity)` pair stores that lazy id,
//! and every later caller resolves through the stored instance's memo. One
//! cache holds any number of item types; entries are partitioned by
//! `(item type, key type)` internally.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::any::{type_name, Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::gets_id::{CanonicalKey, GetsId};
use crate::lazy_id::{LazyId, SourceId};
use crate::lookup::LookUp;
use crate::reference::{Payload, Ref, Resolve};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Initial capacity of each map
    pub initial_capacity: usize,

    /// Count hits, misses and seeded entries
    pub track_stats: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            track_stats: true,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub seeded: usize,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Hit/miss counters shared by the lookup cache and approvals
#[derive(Debug, Default)]
pub struct StatsCounter {
    enabled: bool,
    hits: AtomicUsize,
    misses: AtomicUsize,
    seeded: AtomicUsize,
}

impl StatsCounter {
    /// Counters that record only when `enabled`
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    pub fn hit(&self) {
        if self.enabled {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn miss(&self) {
        if self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn seed(&self) {
        if self.enabled {
            self.seeded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.seeded.store(0, Ordering::Relaxed);
    }

    /// Snapshot with the given entry count
    pub fn snapshot(&self, entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            seeded: self.seeded.load(Ordering::Relaxed),
            entries,
        }
    }
}

type Entries<T, K> = DashMap<(K, SourceId), Arc<LazyId<T, K>>>;

/// One type's slice of the cache, with its types erased
trait Partition: Send + Sync {
    fn len(&self) -> usize;
    fn clear(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Payload, K: CanonicalKey> Partition for Entries<T, K> {
    fn len(&self) -> usize {
        DashMap::len(self)
    }

    fn clear(&self) {
        DashMap::clear(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Concurrent cache from `(key, lookup identity)` to resolved references
pub struct LookupCache {
    partitions: DashMap<TypeId, Arc<dyn Partition>>,
    config: CacheConfig,
    stats: StatsCounter,
}

impl LookupCache {
    /// Create a cache with the default configuration
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache with a custom configuration
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            partitions: DashMap::new(),
            stats: StatsCounter::new(config.track_stats),
            config,
        }
    }

    /// The cached resolution for `lazy`'s identity, storing `lazy` on a miss
    ///
    /// Concurrent first lookups of the same identity resolve through a single
    /// stored instance, so the underlying lookup runs at most once.
    pub fn look_up<T, K>(&self, lazy: LazyId<T, K>) -> Ref<T>
    where
        T: Payload,
        K: CanonicalKey,
    {
        let Some(entries) = self.entries::<T, K>() else {
            return lazy.resolve();
        };

        let cache_key = (lazy.id().clone(), lazy.source_id());
        // The shard guard is released before resolving; lookups may re-enter
        let stored = match entries.entry(cache_key) {
            Entry::Occupied(occupied) => {
                trace!(key = ?lazy.id(), "Lookup cache hit");
                self.stats.hit();
                Arc::clone(occupied.get())
            }
            Entry::Vacant(vacant) => {
                debug!(key = ?lazy.id(), source = ?lazy.source_id(), "Lookup cache miss");
                self.stats.miss();
                Arc::clone(vacant.insert(Arc::new(lazy)).value())
            }
        };

        stored.resolve()
    }

    /// `look_up` for `key` bound to `look_up`
    pub fn look_up_key<T, K>(&self, key: K, look_up: &LookUp<T, K>) -> Ref<T>
    where
        T: Payload,
        K: CanonicalKey,
    {
        self.look_up(LazyId::of(key, look_up))
    }

    /// Seed the entry for `item` with the item itself
    ///
    /// The key comes from `gets`; any previous entry for it is replaced.
    pub fn remember<T, G>(&self, item: T, look_up: &LookUp<T, G::Key>, gets: &G) -> Ref<T>
    where
        T: Payload,
        G: GetsId<T>,
    {
        let Some(entries) = self.entries::<T, G::Key>() else {
            return Ref::Ready(item);
        };

        let key = gets.id_of(&item);
        debug!(?key, look_up = look_up.name(), "Seeding lookup cache");
        let lazy = LazyId::seeded(key.clone(), look_up, item.clone());
        entries.insert((key, lazy.source_id()), Arc::new(lazy));
        self.stats.seed();

        Ref::Ready(item)
    }

    /// Whether an entry exists for `lazy`'s identity
    pub fn contains<T, K>(&self, lazy: &LazyId<T, K>) -> bool
    where
        T: Payload,
        K: CanonicalKey,
    {
        self.entries::<T, K>()
            .map(|entries| entries.contains_key(&(lazy.id().clone(), lazy.source_id())))
            .unwrap_or(false)
    }

    /// Number of entries across all item types
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|partition| partition.len()).sum()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and reset statistics
    pub fn clear(&self) {
        for partition in self.partitions.iter() {
            partition.clear();
        }
        self.stats.reset();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }

    /// The partition for `(T, K)`, created on first use
    ///
    /// Partitions are keyed by the `TypeId` of their own entry map, so the
    /// downcast only misses if that map is ever keyed differently. Callers
    /// then bypass the cache rather than fail the lookup.
    fn entries<T, K>(&self) -> Option<Arc<Entries<T, K>>>
    where
        T: Payload,
        K: CanonicalKey,
    {
        let capacity = self.config.initial_capacity;
        let partition = self
            .partitions
            .entry(TypeId::of::<Entries<T, K>>())
            .or_insert_with(|| Arc::new(Entries::<T, K>::with_capacity(capacity)) as Arc<dyn Partition>)
            .clone();

        match partition.into_any().downcast::<Entries<T, K>>() {
            Ok(entries) => Some(entries),
            Err(_) => {
                warn!(item = type_name::<T>(), "Lookup cache partition has the wrong type, bypassing cache");
                None
            }
        }
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gets_id::id_by;
    use crate::reference::Settled;

    #[derive(Debug, Clone, PartialEq)]
    struct User {
        id: i64,
        name: String,
    }

    fn users() -> LookUp<User, i64> {
        LookUp::new("users", |id: i64| {
            Ref::ready(User {
                id,
                name: format!("user-{}", id),
            })
        })
    }

    #[test]
    fn test_cache_creation() {
        let cache = LookupCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_look_up_reuses_first_entry() {
        let cache = LookupCache::new();
        let look_up = users();

        let first = LazyId::of(1, &look_up);
        let _ = cache.look_up(first);

        let second = LazyId::of(1, &look_up);
        assert!(cache.contains(&second));
        assert!(matches!(cache.look_up(second), Ref::Ready(ref u) if u.id == 1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_distinct_lookups_get_distinct_entries() {
        let cache = LookupCache::new();
        let _ = cache.look_up_key(1, &users());
        let _ = cache.look_up_key(1, &users());

        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_partitions_by_item_type() {
        let cache = LookupCache::new();
        let names: LookUp<String, i64> = LookUp::new("names", |id: i64| Ref::ready(id.to_string()));

        let _ = cache.look_up_key(1, &users());
        let _ = cache.look_up_key(1, &names);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_partitions_by_key_type() {
        let cache = LookupCache::new();
        let by_handle: LookUp<User, String> = LookUp::new("users by handle", |handle: String| {
            Ref::ready(User { id: 0, name: handle })
        });

        let by_id = LazyId::of(1, &users());
        let by_name = LazyId::of("ada".to_string(), &by_handle);
        assert!(matches!(cache.look_up(by_id.copy()), Ref::Ready(ref u) if u.name == "user-1"));
        assert!(matches!(cache.look_up(by_name.copy()), Ref::Ready(ref u) if u.name == "ada"));

        assert!(cache.contains(&by_id));
        assert!(cache.contains(&by_name));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().misses, 2);

        let _ = cache.look_up(by_name);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_remember_short_circuits_lookup() {
        let cache = LookupCache::new();
        let look_up: LookUp<User, i64> = LookUp::new("unreachable", |_| panic!("must not run"));
        let gets = id_by(|u: &User| u.id);

        let algernon = User {
            id: 3,
            name: "Algernon".to_string(),
        };
        let _ = cache.remember(algernon.clone(), &look_up, &gets);

        let found = cache.look_up(LazyId::of(3, &look_up)).fetch();
        assert!(matches!(found, Settled::Ready(ref u) if u == &algernon));
        assert_eq!(cache.stats().seeded, 1);
    }

    #[test]
    fn test_remember_overwrites() {
        let cache = LookupCache::new();
        let look_up = users();
        let gets = id_by(|u: &User| u.id);

        let _ = cache.look_up_key(5, &look_up);
        let renamed = User {
            id: 5,
            name: "renamed".to_string(),
        };
        let _ = cache.remember(renamed, &look_up, &gets);

        assert!(matches!(
            cache.look_up_key(5, &look_up),
            Ref::Ready(ref u) if u.name == "renamed"
        ));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stats_can_be_disabled() {
        let cache = LookupCache::with_config(CacheConfig {
            track_stats: false,
            ..Default::default()
        });
        let _ = cache.look_up_key(1, &users());
        let _ = cache.look_up_key(1, &users());

        let stats = cache.stats();
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entries, 2);
    }
}
