//! Prime-bucketed hash index with a one-hit seen filter.
//!
//! Entries are chained per bucket through their `hash_next` link. The
//! bucket count is drawn from a fixed ascending prime table; when the
//! resident object count exceeds the bucket count the table advances one
//! step and rehashes. The table never shrinks.
//!
//! Bucket selection uses the fourth 32-bit word of the key modulo the
//! bucket count. A parallel array of 16-bit cells (the "seen" filter)
//! remembers the upper half of that word per bucket slot; admission uses
//! it to reject keys observed for the first time while history is already
//! saturated. Growing the table reallocates and zeroes the filter, so
//! one-hit information is intentionally discarded.

use tracing::debug;

use crate::cache::entry::Entry;
use crate::ds::{SlotArena, SlotId};
use crate::key::CacheKey;

/// Bucket-count schedule. Each step roughly doubles, staying prime.
const BUCKET_PRIMES: [usize; 25] = [
    127,
    251,
    509,
    1021,
    2039,
    4093,
    8191,
    16381,
    32749,
    65521,
    131071,
    262139,
    524287,
    1048573,
    2097143,
    4194301,
    8388593,
    16777213,
    33554393,
    67108859,
    134217689,
    268435399,
    536870909,
    1073741789,
    2147483647,
];

#[derive(Debug)]
pub(crate) struct BucketTable {
    buckets: Vec<Option<SlotId>>,
    seen: Vec<u16>,
    prime_idx: usize,
}

impl BucketTable {
    /// Table sized to the first prime step.
    pub fn new() -> Self {
        let n = BUCKET_PRIMES[0];
        Self {
            buckets: vec![None; n],
            seen: vec![0; n],
            prime_idx: 0,
        }
    }

    /// Zero-bucket table for a disabled cache; must not be probed.
    pub fn disabled() -> Self {
        Self {
            buckets: Vec::new(),
            seen: Vec::new(),
            prime_idx: 0,
        }
    }

    #[inline]
    pub fn nbuckets(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn bucket_of(&self, key: &CacheKey) -> usize {
        key.bucket_word() as usize % self.buckets.len()
    }

    #[inline]
    pub fn head(&self, bucket: usize) -> Option<SlotId> {
        self.buckets[bucket]
    }

    /// Pushes `id` at the head of its bucket chain.
    pub fn push(&mut self, arena: &mut SlotArena<Entry>, id: SlotId) {
        let b = self.bucket_of(&arena[id].key);
        arena[id].hash_next = self.buckets[b];
        self.buckets[b] = Some(id);
    }

    /// Unlinks `id` from its bucket chain.
    pub fn remove(&mut self, arena: &mut SlotArena<Entry>, id: SlotId) {
        let b = self.bucket_of(&arena[id].key);
        let mut cur = self.buckets[b];
        let mut prev: Option<SlotId> = None;
        while let Some(c) = cur {
            if c == id {
                let next = arena[id].hash_next;
                match prev {
                    Some(p) => arena[p].hash_next = next,
                    None => self.buckets[b] = next,
                }
                arena[id].hash_next = None;
                return;
            }
            prev = cur;
            cur = arena[c].hash_next;
        }
        debug_assert!(false, "entry missing from its bucket chain");
    }

    /// Probes the seen filter for `key`, stores the new tag, and returns
    /// whether the stored tag matched.
    pub fn seen_probe(&mut self, key: &CacheKey) -> bool {
        let slot = self.bucket_of(key);
        let tag = key.seen_tag();
        let matched = self.seen[slot] == tag;
        self.seen[slot] = tag;
        matched
    }

    /// Advances one step in the prime schedule and rehashes every chained
    /// entry. The seen filter is reallocated and zeroed.
    pub fn grow(&mut self, arena: &mut SlotArena<Entry>) {
        if self.prime_idx + 1 >= BUCKET_PRIMES.len() {
            return;
        }
        self.prime_idx += 1;
        let n = BUCKET_PRIMES[self.prime_idx];
        debug!(nbuckets = n, "resize hashtable");

        let mut ids = Vec::with_capacity(arena.len());
        for head in &self.buckets {
            let mut cur = *head;
            while let Some(id) = cur {
                cur = arena[id].hash_next;
                ids.push(id);
            }
        }

        self.buckets = vec![None; n];
        self.seen = vec![0; n];
        for id in ids {
            self.push(arena, id);
        }
    }

    /// Total number of chained entries, for invariant checking.
    #[cfg(test)]
    pub fn chained_len(&self, arena: &SlotArena<Entry>) -> usize {
        let mut count = 0;
        for head in &self.buckets {
            let mut cur = *head;
            while let Some(id) = cur {
                cur = arena[id].hash_next;
                count += 1;
            }
        }
        count
    }
}
