//! Intrusive LRU queue over arena-backed entries.
//!
//! The cache keeps two of these: the resident queue and the history queue.
//! Links live inside [`Entry`] (`lru_prev`/`lru_next`); the queue itself
//! only holds head and tail, so moving an entry between positions or
//! queues is O(1) and allocation-free.
//!
//! Head is the eviction end (least recently touched / CLOCK hand), tail is
//! where touched and newly admitted entries are enqueued.

use crate::cache::entry::Entry;
use crate::ds::{SlotArena, SlotId};

#[derive(Debug, Default)]
pub(crate) struct LruQueue {
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

impl LruQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn head(&self) -> Option<SlotId> {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Appends `id` at the tail. The entry must not currently be linked.
    pub fn enqueue(&mut self, arena: &mut SlotArena<Entry>, id: SlotId) {
        debug_assert!(arena[id].lru_prev.is_none() && arena[id].lru_next.is_none());
        let old_tail = self.tail;
        {
            let e = &mut arena[id];
            e.lru_prev = old_tail;
            e.lru_next = None;
        }
        match old_tail {
            Some(tail) => arena[tail].lru_next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    /// Removes and returns the head entry.
    pub fn dequeue(&mut self, arena: &mut SlotArena<Entry>) -> Option<SlotId> {
        let id = self.head?;
        self.remove(arena, id);
        Some(id)
    }

    /// Unlinks `id` from wherever it sits in this queue.
    pub fn remove(&mut self, arena: &mut SlotArena<Entry>, id: SlotId) {
        let (prev, next) = {
            let e = &mut arena[id];
            let links = (e.lru_prev, e.lru_next);
            e.lru_prev = None;
            e.lru_next = None;
            links
        };
        match prev {
            Some(p) => arena[p].lru_next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => arena[n].lru_prev = prev,
            None => self.tail = prev,
        }
    }

    /// Moves `id` to the tail (most recently touched position).
    pub fn touch(&mut self, arena: &mut SlotArena<Entry>, id: SlotId) {
        if self.tail == Some(id) {
            return;
        }
        self.remove(arena, id);
        self.enqueue(arena, id);
    }

    /// Iterates ids head to tail. The arena must not be mutated while the
    /// returned iterator is live.
    #[cfg(any(test, debug_assertions))]
    pub fn iter<'a>(&self, arena: &'a SlotArena<Entry>) -> QueueIter<'a> {
        QueueIter {
            arena,
            current: self.head,
        }
    }
}

#[cfg(any(test, debug_assertions))]
pub(crate) struct QueueIter<'a> {
    arena: &'a SlotArena<Entry>,
    current: Option<SlotId>,
}

#[cfg(any(test, debug_assertions))]
impl Iterator for QueueIter<'_> {
    type Item = SlotId;

    fn next(&mut self) -> Option<SlotId> {
        let id = self.current?;
        self.current = self.arena[id].lru_next;
        Some(id)
    }
}
