//! Validated cache construction.
//!
//! ## Example
//!
//! ```
//! use clfus::builder::RamCacheBuilder;
//! use clfus::codec::CodecKind;
//!
//! let cache = RamCacheBuilder::new(8 * 1024 * 1024)
//!     .compression(CodecKind::Fast, 75)
//!     .try_build()
//!     .unwrap();
//! assert_eq!(cache.objects(), 0);
//! ```

use std::sync::Arc;

use crate::cache::clfus::ClfusCache;
use crate::cache::walker::RamCache;
use crate::codec::CodecKind;
use crate::config::RamCacheConfig;
use crate::error::ConfigError;
use crate::metrics::MetricsSink;

/// Builder for [`RamCache`] / [`ClfusCache`] with parameter validation.
pub struct RamCacheBuilder {
    config: RamCacheConfig,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl RamCacheBuilder {
    /// Starts a builder with the given byte budget and no compression.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            config: RamCacheConfig::new(max_bytes),
            metrics: None,
        }
    }

    /// Selects the walker codec and target percentage (0..=100).
    pub fn compression(mut self, codec: CodecKind, percent: u8) -> Self {
        self.config.compress = codec;
        self.config.compress_percent = percent;
        self
    }

    /// Mirrors counters into `sink` instead of a private metrics block.
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Builds the mutex-wrapped handle.
    pub fn try_build(self) -> Result<RamCache, ConfigError> {
        Ok(RamCache::from_core(self.try_build_core()?))
    }

    /// Builds the bare core for callers supplying their own volume mutex.
    pub fn try_build_core(self) -> Result<ClfusCache, ConfigError> {
        if self.config.compress_percent > 100 {
            return Err(ConfigError::new(format!(
                "compress percent must be <= 100, got {}",
                self.config.compress_percent
            )));
        }
        Ok(match self.metrics {
            Some(sink) => ClfusCache::with_metrics(self.config, sink),
            None => ClfusCache::new(self.config),
        })
    }
}
