//! Shared cache handle and the background compression walker.
//!
//! [`ClfusCache`] is a passive value; every mutation must run under one
//! "volume" mutex. [`RamCache`] bundles the core with that mutex
//! (`Arc<parking_lot::Mutex<..>>`) so request paths and the walker
//! serialize against each other, while clones of the handle can be handed
//! to worker threads.
//!
//! The walker compresses resident entries toward a configured fraction.
//! Codec work is unbounded and CPU-heavy, so the mutex is *released* while
//! a codec runs and reacquired to install the result; the entry is
//! revalidated by key and buffer identity before anything is written back.
//! That release window is the only point where the cache can change
//! between a capture and its installation.
//!
//! Scheduling is injected: the surrounding system drives
//! [`CompressionWalker::run_once`] at roughly 1 Hz through its own
//! [`Scheduler`]. The crate owns no threads and no timers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::buf::BlockRef;
use crate::cache::clfus::{ClfusCache, EntryInfo, PutOutcome};
use crate::codec::{CodecKind, FAST_MIN_LEN};
use crate::config::RamCacheConfig;
use crate::error::CodecError;
use crate::key::CacheKey;
use crate::metrics::MetricsSink;

/// Periodic-callback facility supplied by the surrounding system.
pub trait Scheduler {
    /// Invokes `task` roughly every `period` on a cooperative worker.
    fn schedule_every(&self, period: Duration, task: Box<dyn FnMut() + Send + 'static>);
}

/// Thread-safe handle to a [`ClfusCache`], owning the volume mutex.
///
/// Cloning is cheap and shares the same cache.
///
/// # Example
///
/// ```
/// use clfus::prelude::*;
///
/// let cache = RamCache::new(RamCacheConfig::new(64 * 1024));
/// let key = CacheKey::from_u128(42);
/// let payload = BlockBuf::from_vec(b"object bytes".to_vec());
/// assert!(cache.put(key, payload, 12, true, 0, 0).is_admitted());
/// assert!(cache.get(key, 0, 0).is_some());
/// ```
#[derive(Clone)]
pub struct RamCache {
    core: Arc<Mutex<ClfusCache>>,
}

impl RamCache {
    /// Creates a cache with a private metrics block.
    pub fn new(config: RamCacheConfig) -> Self {
        Self::from_core(ClfusCache::new(config))
    }

    /// Creates a cache mirroring counters into `metrics`.
    pub fn with_metrics(config: RamCacheConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self::from_core(ClfusCache::with_metrics(config, metrics))
    }

    /// Wraps an already-built core.
    pub fn from_core(core: ClfusCache) -> Self {
        Self {
            core: Arc::new(Mutex::new(core)),
        }
    }

    /// See [`ClfusCache::get`].
    pub fn get(&self, key: CacheKey, aux_key1: u32, aux_key2: u32) -> Option<(BlockRef, usize)> {
        self.core.lock().get(key, aux_key1, aux_key2)
    }

    /// See [`ClfusCache::put`].
    pub fn put(
        &self,
        key: CacheKey,
        data: BlockRef,
        len: usize,
        copy: bool,
        aux_key1: u32,
        aux_key2: u32,
    ) -> PutOutcome {
        self.core.lock().put(key, data, len, copy, aux_key1, aux_key2)
    }

    /// See [`ClfusCache::fixup`].
    pub fn fixup(
        &self,
        key: CacheKey,
        old_aux_key1: u32,
        old_aux_key2: u32,
        new_aux_key1: u32,
        new_aux_key2: u32,
    ) -> bool {
        self.core
            .lock()
            .fixup(key, old_aux_key1, old_aux_key2, new_aux_key1, new_aux_key2)
    }

    /// See [`ClfusCache::entry_info`].
    pub fn entry_info(&self, key: CacheKey, aux_key1: u32, aux_key2: u32) -> Option<EntryInfo> {
        self.core.lock().entry_info(key, aux_key1, aux_key2)
    }

    /// Reconfigures compression; the walker picks the change up on its
    /// next pass.
    pub fn set_compression(&self, codec: CodecKind, percent: u8) {
        self.core.lock().set_compression(codec, percent);
    }

    /// Current resident footprint including per-entry overhead.
    pub fn bytes(&self) -> usize {
        self.core.lock().bytes()
    }

    /// Number of resident entries.
    pub fn objects(&self) -> usize {
        self.core.lock().objects()
    }

    /// Number of history entries.
    pub fn history(&self) -> usize {
        self.core.lock().history()
    }

    /// Holds the volume mutex for a sequence of core operations.
    pub fn lock(&self) -> MutexGuard<'_, ClfusCache> {
        self.core.lock()
    }

    /// One compression pass over the resident queue, attempting at most
    /// `do_at_most` codec runs.
    ///
    /// The volume mutex is released across each codec run and the entry
    /// revalidated on reacquire; see the module docs.
    pub fn compress_entries(&self, do_at_most: usize) {
        let mut guard = self.core.lock();
        let (codec, percent) = guard.compression();
        if codec == CodecKind::None || percent == 0 {
            return;
        }
        let target = guard.walk_begin();
        let mut attempts = 0usize;
        while let Some(cap) = guard.walk_next_candidate(target) {
            attempts += 1;
            if attempts > do_at_most {
                break;
            }
            drop(guard);
            let result = if cap.codec == CodecKind::Fast && cap.len < FAST_MIN_LEN {
                Err(CodecError::new("payload below fast-codec minimum"))
            } else {
                cap.codec.compress(&cap.data.as_slice()[..cap.len])
            };
            guard = self.core.lock();
            if !guard.walk_apply(&cap, result) {
                break;
            }
        }
    }
}

impl std::fmt::Debug for RamCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.core.lock().fmt(f)
    }
}

/// Periodic task that keeps a fraction of resident entries compressed.
pub struct CompressionWalker {
    cache: RamCache,
    do_at_most: usize,
}

impl CompressionWalker {
    /// Walker with no per-pass attempt budget.
    pub fn new(cache: &RamCache) -> Self {
        Self::with_budget(cache, usize::MAX)
    }

    /// Walker attempting at most `do_at_most` codec runs per pass.
    pub fn with_budget(cache: &RamCache, do_at_most: usize) -> Self {
        Self {
            cache: cache.clone(),
            do_at_most,
        }
    }

    /// Runs one pass; intended to be driven at ~1 Hz.
    pub fn run_once(&self) {
        self.cache.compress_entries(self.do_at_most);
    }
}

/// Builds a cache and schedules its compression walker at 1 Hz on the
/// supplied scheduler.
pub fn new_ram_cache(max_bytes: usize, scheduler: &dyn Scheduler) -> RamCache {
    let cache = RamCache::new(RamCacheConfig::new(max_bytes));
    let walker = CompressionWalker::new(&cache);
    scheduler.schedule_every(
        Duration::from_secs(1),
        Box::new(move || walker.run_once()),
    );
    cache
}
