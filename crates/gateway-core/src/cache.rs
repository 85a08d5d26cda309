//! Bounded least-recently-used object cache.
//!
//! Consumers keep recently fetched remote objects here so that repeated
//! interactions on the same object do not cost a REST round-trip.

use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError},
};

/// Composite cache key: the container an object lives in plus its own id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Container (channel) identifier.
    pub container_id: String,
    /// Object (message) identifier.
    pub object_id: String,
}

impl ObjectKey {
    /// Create a key from its two parts.
    #[must_use]
    pub fn new(container_id: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container_id, self.object_id)
    }
}

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-capacity map with strict LRU eviction.
///
/// Entries live in a slab indexed by the lookup map. The slab never grows
/// past `capacity`; an eviction reuses the evicted slot for the new entry.
/// `prev`/`next` links order the slab from least to most recently used.
pub struct LruCache<K, V> {
    capacity: NonZeroUsize,
    map: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    lru: Option<usize>,
    mru: Option<usize>,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity.get().min(1024)),
            nodes: Vec::new(),
            lru: None,
            mru: None,
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether `key` is present. Does not touch recency.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Look up `key`, promoting it to most recently used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.promote(idx);
        Some(&self.nodes[idx].value)
    }

    /// Insert or overwrite `key`.
    ///
    /// The touched entry always ends up most recently used. Returns the
    /// entry evicted to make room, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            self.nodes[idx].value = value;
            self.promote(idx);
            return None;
        }

        if self.nodes.len() < self.capacity.get() {
            let idx = self.nodes.len();
            self.nodes.push(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.map.insert(key, idx);
            self.attach_mru(idx);
            return None;
        }

        // At capacity: recycle the LRU slot.
        let idx = self.lru?;
        self.detach(idx);
        let old_key = std::mem::replace(&mut self.nodes[idx].key, key.clone());
        let old_value = std::mem::replace(&mut self.nodes[idx].value, value);
        self.map.remove(&old_key);
        self.map.insert(key, idx);
        self.attach_mru(idx);
        Some((old_key, old_value))
    }

    /// Key that the next eviction would remove.
    #[must_use]
    pub fn peek_lru(&self) -> Option<&K> {
        self.lru.map(|idx| &self.nodes[idx].key)
    }

    /// Keys ordered from least to most recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.lru;
        std::iter::from_fn(move || {
            let idx = cursor?;
            cursor = self.nodes[idx].next;
            Some(&self.nodes[idx].key)
        })
    }

    fn promote(&mut self, idx: usize) {
        if self.mru == Some(idx) {
            return;
        }
        self.detach(idx);
        self.attach_mru(idx);
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.lru = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.mru = prev,
        }
        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }

    fn attach_mru(&mut self, idx: usize) {
        self.nodes[idx].prev = self.mru;
        self.nodes[idx].next = None;
        match self.mru {
            Some(m) => self.nodes[m].next = Some(idx),
            None => self.lru = Some(idx),
        }
        self.mru = Some(idx);
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("len", &self.map.len())
            .finish_non_exhaustive()
    }
}

/// Thread-safe handle to an [`LruCache`].
///
/// Every operation takes the single lock, so a promotion or eviction is
/// never observed half-done. Clones share the same cache.
pub struct SharedCache<K, V> {
    inner: Arc<Mutex<LruCache<K, V>>>,
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a shared cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Look up `key`, returning a copy of the value and promoting it.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Insert or overwrite `key`.
    pub fn put(&self, key: K, value: V) {
        self.lock().put(key, value);
    }

    /// Number of entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<K, V>> {
        // A panic mid-operation cannot leave the links inconsistent: every
        // mutation completes before the guard is released.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> fmt::Debug for SharedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCache").finish_non_exhaustive()
    }
}
