//! Open-chunk cache with explicit reference counting.
//!
//! The cache is shared (`Arc`) between a series and every outstanding
//! [`ChunkGuard`]; chunks never point back at the series. A guard increments
//! its chunk's count on creation and clone and decrements on drop, so
//! releasing readers is deterministic. Eviction only happens when the
//! eviction entry points fire, never as a side effect of a count reaching
//! zero.

use crate::chunk::store::Chunk;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct CacheInner {
    open: BTreeMap<u64, Arc<Chunk>>,
    refs: HashMap<u64, u32>,
}

#[derive(Default)]
pub struct ChunkCache {
    inner: Mutex<CacheInner>,
}

impl ChunkCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a chunk handle. Every open chunk has a `refs` entry, even at
    /// count zero.
    pub fn insert(&self, chunk: Arc<Chunk>) {
        let mut inner = self.inner.lock();
        let name = chunk.name();
        inner.open.insert(name, chunk);
        inner.refs.entry(name).or_insert(0);
    }

    /// Take a counted reference on an already-open chunk.
    pub fn acquire(self: &Arc<Self>, name: u64) -> Option<ChunkGuard> {
        let mut inner = self.inner.lock();
        let chunk = inner.open.get(&name)?.clone();
        *inner.refs.entry(name).or_insert(0) += 1;
        Some(ChunkGuard {
            chunk,
            cache: Arc::clone(self),
        })
    }

    fn retain(&self, name: u64) {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.refs.get_mut(&name) {
            *count += 1;
        }
    }

    fn release(&self, name: u64) {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.refs.get_mut(&name) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn ref_count(&self, name: u64) -> u32 {
        self.inner.lock().refs.get(&name).copied().unwrap_or(0)
    }

    pub fn total_refs(&self) -> u32 {
        self.inner.lock().refs.values().sum()
    }

    /// Drop every unreferenced chunk except `keep` (the series' last chunk).
    /// Returns how many chunks were evicted.
    pub fn evict_unreferenced(&self, keep: Option<u64>) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let refs = &inner.refs;
        let victims: Vec<u64> = inner
            .open
            .keys()
            .copied()
            .filter(|name| Some(*name) != keep && refs.get(name).copied().unwrap_or(0) == 0)
            .collect();
        for name in &victims {
            inner.open.remove(name);
            inner.refs.remove(name);
        }
        if !victims.is_empty() {
            debug!(evicted = victims.len(), "dropped unreferenced chunks");
        }
        victims.len()
    }

    /// Remove a chunk outright (trim/delete paths). The caller has already
    /// checked its reference count.
    pub fn remove(&self, name: u64) -> Option<Arc<Chunk>> {
        let mut inner = self.inner.lock();
        inner.refs.remove(&name);
        inner.open.remove(&name)
    }

    /// Drain every open chunk (series close).
    pub fn drain(&self) -> Vec<Arc<Chunk>> {
        let mut inner = self.inner.lock();
        inner.refs.clear();
        std::mem::take(&mut inner.open).into_values().collect()
    }

    /// Total on-disk bytes of mmap-backed open chunks.
    pub fn mmap_size(&self) -> u64 {
        let inner = self.inner.lock();
        inner
            .open
            .values()
            .filter(|chunk| chunk.is_mmap_backed())
            .filter_map(|chunk| chunk.file_size().ok())
            .sum()
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().open.len()
    }
}

/// RAII reference to an open chunk. Holding one pins the chunk in the cache.
pub struct ChunkGuard {
    chunk: Arc<Chunk>,
    cache: Arc<ChunkCache>,
}

impl ChunkGuard {
    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }
}

impl Deref for ChunkGuard {
    type Target = Chunk;

    fn deref(&self) -> &Chunk {
        &self.chunk
    }
}

impl Clone for ChunkGuard {
    fn clone(&self) -> Self {
        self.cache.retain(self.chunk.name());
        Self {
            chunk: Arc::clone(&self.chunk),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl Drop for ChunkGuard {
    fn drop(&mut self) {
        self.cache.release(self.chunk.name());
    }
}
