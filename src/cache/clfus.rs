//! CLFUS (Clocked LFU by Size) replacement engine.
//!
//! The engine keeps variable-sized objects under a hard byte budget using
//! two queues over one arena of entries:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ClfusCache Layout                              │
//! │                                                                         │
//! │   ┌───────────────────────────┐    ┌─────────────────────────────────┐  │
//! │   │ index: BucketTable        │    │ arena: SlotArena<Entry>         │  │
//! │   │  prime-sized chains       │───►│  entries carry LRU + hash links │  │
//! │   │  + 16-bit seen filter     │    └─────────────────────────────────┘  │
//! │   └───────────────────────────┘                                         │
//! │                                                                         │
//! │   resident (L0):  head ──► [victim candidates ... hot] ◄── tail         │
//! │                              ▲                                          │
//! │                              │ cursor (compression walker)              │
//! │                                                                         │
//! │   history (L1):   head ──► [CLOCK hand ... recently demoted] ◄── tail   │
//! │                                                                         │
//! │   bytes  = Σ resident (size + ENTRY_OVERHEAD)                           │
//! │   objects = |resident|      history = |L1|                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Admission is earned, not granted: a brand-new object must either fit the
//! free budget or displace victims from the resident head; an object
//! re-requested from history additionally competes on value density
//! (`(hits + 1) / (size + overhead)`) against each victim it would displace.
//! Victims that survive the comparison are demoted to history with their
//! buffer released; the history queue decays under a CLOCK hand that
//! right-shifts hit counts and retires zeroed entries, keeping history
//! bounded near the resident count.
//!
//! A one-hit "seen" filter rejects keys observed for the first time while
//! history is already saturated, so linear scans cannot pollute even the
//! history side of the cache.
//!
//! All operations run under an external volume mutex (see
//! [`RamCache`](crate::cache::walker::RamCache)); this type itself is a
//! passive, single-threaded value.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::buf::{BlockBuf, BlockRef};
use crate::cache::entry::{requeue_hits, Entry, ENTRY_OVERHEAD};
use crate::cache::index::BucketTable;
use crate::cache::queue::LruQueue;
use crate::codec::CodecKind;
use crate::config::RamCacheConfig;
use crate::ds::{SlotArena, SlotId};
use crate::error::{CodecError, InvariantError};
use crate::key::CacheKey;
use crate::metrics::{AtomicMetrics, MetricsSink};

/// Extra history entries tolerated beyond the resident count before the
/// CLOCK tick retires an additional entry per step.
pub const HISTORY_HYSTERESIS: usize = 10;

/// Compression must reach this fraction of the raw payload length or the
/// entry is declared incompressible.
const REQUIRED_COMPRESSION: f64 = 0.9;

/// Compression must reach this fraction of the charged footprint or the
/// buffer is merely right-sized instead of re-encoded.
const REQUIRED_SHRINK: f64 = 0.8;

/// Outcome of [`ClfusCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum PutOutcome {
    /// The object is now resident.
    Admitted,
    /// The object was not admitted; at most a history record remains.
    Refused,
}

impl PutOutcome {
    /// Returns `true` for [`PutOutcome::Admitted`].
    #[inline]
    pub fn is_admitted(self) -> bool {
        matches!(self, PutOutcome::Admitted)
    }
}

/// Point-in-time view of one entry, for introspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    /// `true` if the entry holds a buffer (L0), `false` for history (L1).
    pub resident: bool,
    /// Current hit count.
    pub hits: u64,
    /// Footprint charged against the byte budget (excluding overhead).
    pub size: usize,
    /// Logical payload length.
    pub len: usize,
    /// Codec the buffer is currently encoded with.
    pub compressed: CodecKind,
    /// Entry was found not worth compressing.
    pub incompressible: bool,
}

/// Work captured under the lock for one compression attempt.
///
/// The codec runs without the volume mutex; `data` pins the buffer so the
/// apply step can revalidate that the entry still holds the same bytes.
pub(crate) struct CompressCapture {
    pub id: SlotId,
    pub key: CacheKey,
    pub data: BlockRef,
    pub len: usize,
    pub codec: CodecKind,
}

/// The CLFUS cache core. Passive and single-threaded; see
/// [`RamCache`](crate::cache::walker::RamCache) for the mutex-wrapped
/// handle with the background compression walker.
pub struct ClfusCache {
    config: RamCacheConfig,
    metrics: Arc<dyn MetricsSink>,
    arena: SlotArena<Entry>,
    index: BucketTable,
    resident: LruQueue,
    ghost: LruQueue,
    /// Σ resident `(size + ENTRY_OVERHEAD)`.
    bytes: usize,
    /// Resident entry count.
    objects: usize,
    /// History entry count.
    history: usize,
    /// Compression walker position in the resident queue.
    cursor: Option<SlotId>,
    /// Entries behind the cursor; may drift negative under churn and is
    /// re-zeroed whenever a walk restarts from the head.
    ncompressed: i64,
}

impl ClfusCache {
    /// Creates a cache with a private metrics block.
    pub fn new(config: RamCacheConfig) -> Self {
        Self::with_metrics(config, Arc::new(AtomicMetrics::new()))
    }

    /// Creates a cache mirroring counters into `metrics`.
    pub fn with_metrics(config: RamCacheConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        debug!(max_bytes = config.max_bytes, "initializing ram cache");
        let index = if config.max_bytes == 0 {
            BucketTable::disabled()
        } else {
            BucketTable::new()
        };
        Self {
            config,
            metrics,
            arena: SlotArena::new(),
            index,
            resident: LruQueue::new(),
            ghost: LruQueue::new(),
            bytes: 0,
            objects: 0,
            history: 0,
            cursor: None,
            ncompressed: 0,
        }
    }

    /// Hard cap on resident footprint; zero means the cache is disabled.
    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes
    }

    /// Current resident footprint including per-entry overhead.
    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Number of resident entries.
    #[inline]
    pub fn objects(&self) -> usize {
        self.objects
    }

    /// Number of history entries.
    #[inline]
    pub fn history(&self) -> usize {
        self.history
    }

    /// Current compression codec and target percentage.
    #[inline]
    pub fn compression(&self) -> (CodecKind, u8) {
        (self.config.compress, self.config.compress_percent)
    }

    /// Reconfigures compression; consulted by the walker on its next pass.
    /// `percent` is clamped to 100.
    pub fn set_compression(&mut self, codec: CodecKind, percent: u8) {
        self.config.compress = codec;
        self.config.compress_percent = percent.min(100);
    }

    /// Looks up an object by its full key triple.
    ///
    /// A resident hit refreshes the entry's LRU position and hit count and
    /// returns `(buffer, len)`; compressed entries are decompressed on
    /// demand. A history hit refreshes the history position but reports a
    /// miss. A failed decompression destroys the entry and reports a miss.
    pub fn get(
        &mut self,
        key: CacheKey,
        aux_key1: u32,
        aux_key2: u32,
    ) -> Option<(BlockRef, usize)> {
        if self.config.max_bytes == 0 {
            return None;
        }
        let mut found = None;
        let mut cur = self.index.head(self.index.bucket_of(&key));
        while let Some(id) = cur {
            let e = &self.arena[id];
            if e.key == key && e.aux_key1 == aux_key1 && e.aux_key2 == aux_key2 {
                found = Some(id);
                break;
            }
            cur = e.hash_next;
        }
        let Some(id) = found else {
            self.metrics.record_miss();
            trace!(key = key.word(3), aux_key1, aux_key2, "get MISS");
            return None;
        };

        self.move_cursor_off(id);
        if self.arena[id].in_history {
            self.ghost.touch(&mut self.arena, id);
            self.metrics.record_miss();
            trace!(key = key.word(3), aux_key1, aux_key2, "get HISTORY");
            return None;
        }
        self.resident.touch(&mut self.arena, id);
        self.arena[id].hits += 1;

        let codec = self.arena[id].compressed;
        if codec == CodecKind::None {
            let (buf, len) = {
                let e = &self.arena[id];
                let data = e.data.clone()?;
                let buf = if e.copy_semantics {
                    BlockBuf::copy_of(&data.as_slice()[..e.len])
                } else {
                    data
                };
                (buf, e.len)
            };
            self.metrics.record_hit();
            trace!(key = key.word(3), aux_key1, aux_key2, len, "get HIT");
            return Some((buf, len));
        }

        let (src, clen, len) = {
            let e = &self.arena[id];
            (e.data.clone()?, e.compressed_len, e.len)
        };
        match codec.decompress(&src.as_slice()[..clen], len) {
            Err(err) => {
                debug!(key = key.word(3), %err, "get decompress failed, entry destroyed");
                self.destroy(id);
                self.metrics.record_miss();
                None
            }
            Ok(raw) => {
                let buf = BlockBuf::exact(raw);
                if !self.arena[id].copy_semantics {
                    // install the decompressed buffer in place
                    let delta = clen as i64 - self.arena[id].size as i64;
                    self.bytes = (self.bytes as i64 + delta) as usize;
                    self.metrics.add_bytes(delta);
                    let e = &mut self.arena[id];
                    e.size = clen;
                    e.compressed = CodecKind::None;
                    e.data = Some(Arc::clone(&buf));
                    self.check_accounting();
                }
                self.metrics.record_hit();
                trace!(key = key.word(3), aux_key1, aux_key2, len, "get HIT decompressed");
                Some((buf, len))
            }
        }
    }

    /// Offers an object for admission.
    ///
    /// `copy` selects copy-in/copy-out semantics: the cache stores a
    /// private `len`-byte copy and charges `len`; otherwise it shares
    /// `data` by reference and charges its full block size.
    ///
    /// An object already resident is updated in place. An object known in
    /// history competes against resident victims on value density. A
    /// brand-new object harvests victims until it fits, unless the seen
    /// filter rejects it outright.
    pub fn put(
        &mut self,
        key: CacheKey,
        data: BlockRef,
        len: usize,
        copy: bool,
        aux_key1: u32,
        aux_key2: u32,
    ) -> PutOutcome {
        if self.config.max_bytes == 0 {
            return PutOutcome::Refused;
        }
        debug_assert!(len <= data.len());
        let size = if copy { len } else { data.block_size() };

        // probe the bucket chain; a matching key with mismatched aux keys
        // is a stale version and is destroyed on the spot
        let mut found: Option<SlotId> = None;
        let mut cur = self.index.head(self.index.bucket_of(&key));
        while let Some(id) = cur {
            let (key_match, aux_match, next) = {
                let e = &self.arena[id];
                (
                    e.key == key,
                    e.aux_key1 == aux_key1 && e.aux_key2 == aux_key2,
                    e.hash_next,
                )
            };
            if !key_match {
                cur = next;
            } else if aux_match {
                found = Some(id);
                break;
            } else {
                cur = self.destroy(id);
            }
        }

        if let Some(id) = found {
            self.arena[id].hits += 1;
            if !self.arena[id].in_history {
                return self.update_resident(id, key, &data, len, size, copy);
            }
            // history hit: detach and let it compete for promotion
            self.ghost.remove(&mut self.arena, id);
        }
        let candidate = found;
        let mut victims: VecDeque<SlotId> = VecDeque::new();

        // initial fill: nothing demoted yet and the object fits outright
        let mut fits = self.ghost.is_empty() && self.bytes + size <= self.config.max_bytes;

        if !fits {
            if candidate.is_none() {
                let seen_match = self.index.seen_probe(&key);
                if self.history >= self.objects && !seen_match {
                    trace!(key = key.word(3), aux_key1, aux_key2, size, "put UNSEEN");
                    return PutOutcome::Refused;
                }
            }
            loop {
                let Some(victim) = self.resident.dequeue(&mut self.arena) else {
                    // resident side exhausted
                    if self.bytes + size <= self.config.max_bytes {
                        fits = true;
                        break;
                    }
                    return match candidate {
                        Some(id) => {
                            self.ghost.enqueue(&mut self.arena, id);
                            self.requeue_victims(&mut victims);
                            trace!(key = key.word(3), aux_key1, aux_key2, "put NO VICTIM");
                            PutOutcome::Refused
                        }
                        None => {
                            self.requeue_victims(&mut victims);
                            self.insert_history_only(key, &data, aux_key1, aux_key2)
                        }
                    };
                };
                let vsize = self.arena[victim].size;
                self.bytes -= vsize + ENTRY_OVERHEAD;
                self.metrics.add_bytes(-(vsize as i64));
                victims.push_back(victim);
                if self.cursor == Some(victim) {
                    self.cursor = None;
                } else {
                    self.ncompressed -= 1;
                }
                // one extra clock pass of grace before history decay
                self.arena[victim].hits <<= 1;
                self.tick();
                if let Some(cid) = candidate {
                    // a history candidate may not displace a denser victim
                    if self.bytes + vsize + size > self.config.max_bytes
                        && self.arena[victim].value() > self.arena[cid].value()
                    {
                        self.requeue_victims(&mut victims);
                        self.ghost.enqueue(&mut self.arena, cid);
                        trace!(
                            key = key.word(3),
                            aux_key1,
                            aux_key2,
                            size,
                            "put refused, kept denser victim"
                        );
                        return PutOutcome::Refused;
                    }
                }
                if self.bytes + size <= self.config.max_bytes {
                    fits = true;
                    break;
                }
            }
        }
        debug_assert!(fits);

        // stashed victims that still fit go back resident; the rest are
        // demoted to history
        while let Some(v) = victims.pop_front() {
            let vsize = self.arena[v].size;
            if self.bytes + size + vsize <= self.config.max_bytes {
                self.bytes += vsize + ENTRY_OVERHEAD;
                self.metrics.add_bytes(vsize as i64);
                let hits = self.arena[v].hits;
                self.arena[v].hits = requeue_hits(hits);
                self.resident.enqueue(&mut self.arena, v);
            } else {
                self.victimize(v);
            }
        }

        let id = match candidate {
            Some(id) => {
                self.history -= 1;
                id
            }
            None => {
                let id = self.arena.insert(Entry::new(key, aux_key1, aux_key2));
                self.index.push(&mut self.arena, id);
                if self.objects > self.index.nbuckets() {
                    self.index.grow(&mut self.arena);
                }
                id
            }
        };
        self.check_accounting();
        let payload = if copy {
            BlockBuf::copy_of(&data.as_slice()[..len])
        } else {
            Arc::clone(&data)
        };
        {
            let e = &mut self.arena[id];
            e.reset_flags();
            e.data = Some(payload);
            e.copy_semantics = copy;
            e.size = size;
            e.len = len;
        }
        self.bytes += size + ENTRY_OVERHEAD;
        self.metrics.add_bytes(size as i64);
        self.objects += 1;
        self.resident.enqueue(&mut self.arena, id);
        self.check_accounting();
        trace!(key = key.word(3), aux_key1, aux_key2, size, "put INSERTED");
        PutOutcome::Admitted
    }

    /// Rewrites the aux keys of the entry matching `(key, old_aux1, old_aux2)`,
    /// resident or history. Returns `false` if no such entry exists.
    pub fn fixup(
        &mut self,
        key: CacheKey,
        old_aux_key1: u32,
        old_aux_key2: u32,
        new_aux_key1: u32,
        new_aux_key2: u32,
    ) -> bool {
        if self.config.max_bytes == 0 {
            return false;
        }
        let mut cur = self.index.head(self.index.bucket_of(&key));
        while let Some(id) = cur {
            let e = &mut self.arena[id];
            if e.key == key && e.aux_key1 == old_aux_key1 && e.aux_key2 == old_aux_key2 {
                e.aux_key1 = new_aux_key1;
                e.aux_key2 = new_aux_key2;
                return true;
            }
            cur = e.hash_next;
        }
        false
    }

    /// Peeks at an entry without touching its LRU position.
    pub fn entry_info(&self, key: CacheKey, aux_key1: u32, aux_key2: u32) -> Option<EntryInfo> {
        if self.config.max_bytes == 0 {
            return None;
        }
        let mut cur = self.index.head(self.index.bucket_of(&key));
        while let Some(id) = cur {
            let e = &self.arena[id];
            if e.key == key && e.aux_key1 == aux_key1 && e.aux_key2 == aux_key2 {
                return Some(EntryInfo {
                    resident: !e.in_history,
                    hits: e.hits,
                    size: e.size,
                    len: e.len,
                    compressed: e.compressed,
                    incompressible: e.incompressible,
                });
            }
            cur = e.hash_next;
        }
        None
    }

    // -- internal transitions ---------------------------------------------

    /// In-place update of a resident entry on a repeated `put`.
    fn update_resident(
        &mut self,
        id: SlotId,
        key: CacheKey,
        data: &BlockRef,
        len: usize,
        size: usize,
        copy: bool,
    ) -> PutOutcome {
        self.move_cursor_off(id);
        self.resident.touch(&mut self.arena, id);
        let delta = size as i64 - self.arena[id].size as i64;
        self.bytes = (self.bytes as i64 + delta) as usize;
        self.metrics.add_bytes(delta);
        let payload = if copy {
            BlockBuf::copy_of(&data.as_slice()[..len])
        } else {
            Arc::clone(data)
        };
        {
            let e = &mut self.arena[id];
            e.data = Some(payload);
            e.size = size;
            e.len = len;
            e.copy_semantics = copy;
            e.compressed = CodecKind::None;
        }
        self.check_accounting();
        trace!(key = key.word(3), size, "put HIT updated");
        PutOutcome::Admitted
    }

    /// Records a key in history without retaining a buffer, when the
    /// object cannot fit even after draining the resident queue.
    fn insert_history_only(
        &mut self,
        key: CacheKey,
        data: &BlockRef,
        aux_key1: u32,
        aux_key2: u32,
    ) -> PutOutcome {
        self.check_accounting();
        let mut e = Entry::new(key, aux_key1, aux_key2);
        // footprint recorded for later value-density comparisons even
        // though no buffer is retained
        e.size = data.block_size();
        e.in_history = true;
        let id = self.arena.insert(e);
        self.index.push(&mut self.arena, id);
        self.ghost.enqueue(&mut self.arena, id);
        self.history += 1;
        trace!(key = key.word(3), aux_key1, aux_key2, "put HISTORY");
        PutOutcome::Refused
    }

    /// One step of the CLOCK hand over history: decay the head entry's
    /// hits by one bit, retire it if zeroed, and retire one more entry if
    /// history has outgrown the resident count plus hysteresis.
    fn tick(&mut self) {
        let Some(id) = self.ghost.dequeue(&mut self.arena) else {
            return;
        };
        let survived = {
            let e = &mut self.arena[id];
            e.hits >>= 1;
            e.hits != 0
        };
        let free_id = if survived {
            let hits = self.arena[id].hits;
            self.arena[id].hits = requeue_hits(hits);
            self.ghost.enqueue(&mut self.arena, id);
            if self.history <= self.objects + HISTORY_HYSTERESIS {
                return;
            }
            match self.ghost.dequeue(&mut self.arena) {
                Some(extra) => extra,
                None => return,
            }
        } else {
            id
        };
        self.history -= 1;
        self.index.remove(&mut self.arena, free_id);
        trace!(key = self.arena[free_id].key.word(3), "history entry FREED");
        self.arena.remove(free_id);
    }

    /// Demotes a harvested victim to history, releasing its buffer. The
    /// victim's bytes were already uncharged during harvesting.
    fn victimize(&mut self, id: SlotId) {
        self.objects -= 1;
        {
            let e = &mut self.arena[id];
            trace!(key = e.key.word(3), size = e.size, "VICTIMIZED");
            e.data = None;
            e.in_history = true;
        }
        self.ghost.enqueue(&mut self.arena, id);
        self.history += 1;
    }

    /// Puts stashed victims back at the resident tail, re-charging their
    /// bytes and collapsing their hits to a recency bit.
    fn requeue_victims(&mut self, victims: &mut VecDeque<SlotId>) {
        while let Some(v) = victims.pop_front() {
            let vsize = self.arena[v].size;
            self.bytes += vsize + ENTRY_OVERHEAD;
            self.metrics.add_bytes(vsize as i64);
            let hits = self.arena[v].hits;
            self.arena[v].hits = requeue_hits(hits);
            self.resident.enqueue(&mut self.arena, v);
        }
    }

    /// Removes an entry entirely: queue, accounting, index, arena.
    /// Returns the next entry in its hash chain.
    fn destroy(&mut self, id: SlotId) -> Option<SlotId> {
        let next = self.arena[id].hash_next;
        self.move_cursor_off(id);
        if self.arena[id].in_history {
            self.ghost.remove(&mut self.arena, id);
            self.history -= 1;
        } else {
            self.resident.remove(&mut self.arena, id);
            self.objects -= 1;
            let size = self.arena[id].size;
            self.bytes -= size + ENTRY_OVERHEAD;
            self.metrics.add_bytes(-(size as i64));
        }
        self.index.remove(&mut self.arena, id);
        trace!(key = self.arena[id].key.word(3), "entry DESTROYED");
        self.arena.remove(id);
        next
    }

    /// Keeps the compression cursor on a live resident entry when the
    /// entry under it is touched or removed.
    fn move_cursor_off(&mut self, id: SlotId) {
        if self.cursor == Some(id) {
            let e = &self.arena[id];
            if e.lru_next.is_some() {
                self.cursor = e.lru_next;
            } else {
                self.ncompressed -= 1;
                self.cursor = e.lru_prev;
            }
        }
    }

    // -- compression walker support ---------------------------------------

    /// Starts or resumes a compression pass; returns the target number of
    /// compressed entries for this pass.
    pub(crate) fn walk_begin(&mut self) -> f64 {
        if self.cursor.is_none() {
            self.cursor = self.resident.head();
            self.ncompressed = 0;
        }
        (self.config.compress_percent as f64 / 100.0) * self.objects as f64
    }

    /// Advances the cursor past `id`; returns `false` at the tail (cursor
    /// parks on the tail entry until it moves).
    fn walk_advance(&mut self, id: SlotId) -> bool {
        match self.arena[id].lru_next {
            Some(next) => {
                self.cursor = Some(next);
                self.ncompressed += 1;
                true
            }
            None => false,
        }
    }

    /// Skips already-handled entries and captures the next compression
    /// candidate, or `None` when the pass is complete for now.
    pub(crate) fn walk_next_candidate(&mut self, target: f64) -> Option<CompressCapture> {
        loop {
            let id = self.cursor?;
            if self.ncompressed as f64 >= target {
                return None;
            }
            let skip = {
                let e = &self.arena[id];
                e.incompressible || e.compressed != CodecKind::None
            };
            if skip {
                if !self.walk_advance(id) {
                    return None;
                }
                continue;
            }
            let e = &mut self.arena[id];
            e.compressed_len = e.size;
            let data = e.data.clone()?;
            return Some(CompressCapture {
                id,
                key: e.key,
                data,
                len: e.len,
                codec: self.config.compress,
            });
        }
    }

    /// Applies a codec result produced while the lock was released.
    ///
    /// The entry is revalidated by key and buffer identity; if it was
    /// mutated or destroyed in the window, the work is discarded. Returns
    /// `false` when the pass should stop.
    pub(crate) fn walk_apply(
        &mut self,
        cap: &CompressCapture,
        result: Result<Vec<u8>, CodecError>,
    ) -> bool {
        let mut revalidated = false;
        let mut cur = self.index.head(self.index.bucket_of(&cap.key));
        while let Some(id) = cur {
            let e = &self.arena[id];
            if e.key == cap.key && e.data.as_ref().is_some_and(|d| Arc::ptr_eq(d, &cap.data)) {
                revalidated = id == cap.id;
                break;
            }
            cur = e.hash_next;
        }
        if !revalidated {
            debug!(key = cap.key.word(3), "compression discarded, entry changed");
            let Some(cursor) = self.cursor else {
                return false;
            };
            return self.walk_advance(cursor);
        }

        let id = cap.id;
        match result {
            Err(err) => {
                debug!(key = cap.key.word(3), %err, "compress failed, marked incompressible");
                self.arena[id].incompressible = true;
            }
            Ok(out) => {
                let l = out.len();
                let (len, size) = {
                    let e = &self.arena[id];
                    (e.len, e.size)
                };
                if l as f64 > REQUIRED_COMPRESSION * len as f64 {
                    // not enough gain over the raw payload
                    self.arena[id].incompressible = true;
                    debug!(key = cap.key.word(3), l, len, "incompressible");
                } else if l as f64 > REQUIRED_SHRINK * size as f64 {
                    // not worth re-encoding; just release the padding
                    let raw = BlockBuf::copy_of(&cap.data.as_slice()[..len]);
                    let delta = len as i64 - size as i64;
                    self.bytes = (self.bytes as i64 + delta) as usize;
                    self.metrics.add_bytes(delta);
                    let e = &mut self.arena[id];
                    e.size = len;
                    e.compressed = CodecKind::None;
                    e.data = Some(raw);
                    self.check_accounting();
                    debug!(key = cap.key.word(3), len, "tightened uncompressed");
                } else {
                    let buf = BlockBuf::exact(out);
                    let delta = l as i64 - size as i64;
                    self.bytes = (self.bytes as i64 + delta) as usize;
                    self.metrics.add_bytes(delta);
                    let e = &mut self.arena[id];
                    e.compressed = cap.codec;
                    e.compressed_len = l;
                    e.size = l;
                    e.data = Some(buf);
                    self.check_accounting();
                    debug!(key = cap.key.word(3), l, "compressed");
                }
            }
        }
        self.walk_advance(id)
    }

    // -- invariants --------------------------------------------------------

    /// Verifies the structural invariants: queue membership matches flags,
    /// resident accounting sums match, every entry is chained exactly once
    /// in its bucket, and compression state is self-consistent.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        use std::collections::HashSet;

        let mut resident_ids = HashSet::new();
        let mut sum = 0usize;
        let mut prev: Option<SlotId> = None;
        let mut cur = self.resident.head();
        while let Some(id) = cur {
            let e = self
                .arena
                .get(id)
                .ok_or_else(|| InvariantError::new("resident queue references a dead slot"))?;
            if e.in_history {
                return Err(InvariantError::new("resident entry flagged as history"));
            }
            if e.data.is_none() {
                return Err(InvariantError::new("resident entry has no buffer"));
            }
            if e.compressed != CodecKind::None {
                if e.compressed_len > e.size {
                    return Err(InvariantError::new("compressed_len exceeds size"));
                }
                if e.incompressible {
                    return Err(InvariantError::new(
                        "entry both compressed and incompressible",
                    ));
                }
            }
            if e.lru_prev != prev {
                return Err(InvariantError::new("broken back-link in resident queue"));
            }
            if !resident_ids.insert(id) {
                return Err(InvariantError::new("cycle in resident queue"));
            }
            sum += e.footprint();
            prev = cur;
            cur = e.lru_next;
        }
        if resident_ids.len() != self.objects {
            return Err(InvariantError::new(format!(
                "resident count {} != objects {}",
                resident_ids.len(),
                self.objects
            )));
        }
        if sum != self.bytes {
            return Err(InvariantError::new(format!(
                "resident byte sum {sum} != bytes {}",
                self.bytes
            )));
        }

        let mut history_ids = HashSet::new();
        prev = None;
        cur = self.ghost.head();
        while let Some(id) = cur {
            let e = self
                .arena
                .get(id)
                .ok_or_else(|| InvariantError::new("history queue references a dead slot"))?;
            if !e.in_history {
                return Err(InvariantError::new("history entry flagged as resident"));
            }
            if e.data.is_some() {
                return Err(InvariantError::new("history entry still holds a buffer"));
            }
            if e.lru_prev != prev {
                return Err(InvariantError::new("broken back-link in history queue"));
            }
            if !history_ids.insert(id) {
                return Err(InvariantError::new("cycle in history queue"));
            }
            prev = cur;
            cur = e.lru_next;
        }
        if history_ids.len() != self.history {
            return Err(InvariantError::new(format!(
                "history count {} != history {}",
                history_ids.len(),
                self.history
            )));
        }

        let mut chained = HashSet::new();
        for b in 0..self.index.nbuckets() {
            let mut cur = self.index.head(b);
            while let Some(id) = cur {
                let e = self
                    .arena
                    .get(id)
                    .ok_or_else(|| InvariantError::new("bucket chain references a dead slot"))?;
                if self.index.bucket_of(&e.key) != b {
                    return Err(InvariantError::new("entry chained in wrong bucket"));
                }
                if !chained.insert(id) {
                    return Err(InvariantError::new("entry chained twice"));
                }
                cur = e.hash_next;
            }
        }
        if chained.len() != self.objects + self.history {
            return Err(InvariantError::new(format!(
                "index holds {} entries, expected {}",
                chained.len(),
                self.objects + self.history
            )));
        }
        for id in resident_ids.iter().chain(history_ids.iter()) {
            if !chained.contains(id) {
                return Err(InvariantError::new("queued entry missing from the index"));
            }
        }
        if let Some(cursor) = self.cursor {
            if !resident_ids.contains(&cursor) {
                return Err(InvariantError::new("compression cursor off the resident queue"));
            }
        }
        Ok(())
    }

    /// Count-only accounting walk after each state transition; compiled
    /// out of release builds.
    #[cfg(debug_assertions)]
    fn check_accounting(&self) {
        let mut n = 0usize;
        let mut sz = 0usize;
        for id in self.resident.iter(&self.arena) {
            n += 1;
            sz += self.arena[id].footprint();
        }
        debug_assert_eq!(n, self.objects, "resident count drifted");
        debug_assert_eq!(sz, self.bytes, "resident byte sum drifted");
        debug_assert_eq!(
            self.ghost.iter(&self.arena).count(),
            self.history,
            "history count drifted"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn check_accounting(&self) {}
}

impl std::fmt::Debug for ClfusCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClfusCache")
            .field("max_bytes", &self.config.max_bytes)
            .field("bytes", &self.bytes)
            .field("objects", &self.objects)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}
