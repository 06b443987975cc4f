//! The CLFUS cache engine and its supporting structures.

pub mod clfus;
mod entry;
mod index;
mod queue;
pub mod walker;

pub use clfus::{ClfusCache, EntryInfo, PutOutcome, HISTORY_HYSTERESIS};
pub use entry::ENTRY_OVERHEAD;
pub use walker::{new_ram_cache, CompressionWalker, RamCache, Scheduler};
