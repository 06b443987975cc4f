//! Per-object cache entry.

use crate::buf::BlockRef;
use crate::codec::CodecKind;
use crate::ds::SlotId;
use crate::key::CacheKey;

/// Fixed per-entry overhead charged against the byte budget, covering the
/// entry record, index linkage, and allocator bookkeeping.
pub const ENTRY_OVERHEAD: usize = 256;

/// Normalizes a hit count when an entry is requeued: surviving entries
/// converge toward a one-bit recency marker.
#[inline]
pub(crate) fn requeue_hits(hits: u64) -> u64 {
    if hits != 0 {
        1
    } else {
        0
    }
}

/// One cached object: identity, accounting, compression state, payload
/// reference, and intrusive linkage.
///
/// An entry lives in exactly one of the two LRU queues; `in_history`
/// mirrors that membership. Resident entries hold a payload buffer,
/// history entries hold none.
#[derive(Debug)]
pub(crate) struct Entry {
    pub key: CacheKey,
    pub aux_key1: u32,
    pub aux_key2: u32,
    pub hits: u64,
    /// Footprint charged against the byte budget (excluding [`ENTRY_OVERHEAD`]).
    pub size: usize,
    /// Logical payload length.
    pub len: usize,
    pub compressed_len: usize,
    /// Codec the buffer is currently encoded with; `None` means raw bytes.
    pub compressed: CodecKind,
    pub incompressible: bool,
    pub in_history: bool,
    /// Copy-in/copy-out: readers get a fresh copy, the entry is never
    /// mutated by `get`.
    pub copy_semantics: bool,
    /// Payload; `None` exactly when the entry is in history.
    pub data: Option<BlockRef>,
    pub lru_prev: Option<SlotId>,
    pub lru_next: Option<SlotId>,
    pub hash_next: Option<SlotId>,
}

impl Entry {
    pub fn new(key: CacheKey, aux_key1: u32, aux_key2: u32) -> Self {
        Self {
            key,
            aux_key1,
            aux_key2,
            hits: 1,
            size: 0,
            len: 0,
            compressed_len: 0,
            compressed: CodecKind::None,
            incompressible: false,
            in_history: false,
            copy_semantics: false,
            data: None,
            lru_prev: None,
            lru_next: None,
            hash_next: None,
        }
    }

    /// Value density: frequency per byte of footprint. Higher is better;
    /// decides whether a history candidate may displace a resident victim.
    #[inline]
    pub fn value(&self) -> f64 {
        (self.hits + 1) as f64 / (self.size + ENTRY_OVERHEAD) as f64
    }

    /// Footprint including the fixed per-entry overhead.
    #[inline]
    pub fn footprint(&self) -> usize {
        self.size + ENTRY_OVERHEAD
    }

    /// Resets all flag bits, as done when (re)installing a payload.
    pub fn reset_flags(&mut self) {
        self.compressed = CodecKind::None;
        self.incompressible = false;
        self.in_history = false;
        self.copy_semantics = false;
    }
}
