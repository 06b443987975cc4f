pub use crate::buf::{BlockBuf, BlockRef};
pub use crate::builder::RamCacheBuilder;
pub use crate::cache::{
    new_ram_cache, ClfusCache, CompressionWalker, EntryInfo, PutOutcome, RamCache, Scheduler,
    ENTRY_OVERHEAD, HISTORY_HYSTERESIS,
};
pub use crate::codec::CodecKind;
pub use crate::config::RamCacheConfig;
pub use crate::key::CacheKey;
pub use crate::metrics::{AtomicMetrics, MetricsSink, MetricsSnapshot};
