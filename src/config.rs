//! Runtime configuration.
//!
//! | Field              | Default | Meaning                                      |
//! |--------------------|---------|----------------------------------------------|
//! | `max_bytes`        | 0       | Hard cap on resident footprint; 0 disables   |
//! | `compress`         | `None`  | Codec used by the compression walker         |
//! | `compress_percent` | 90      | Target fraction of resident objects, 0..=100 |
//!
//! `max_bytes` is fixed at construction; the compression fields may be
//! changed at runtime and are re-read by the walker on every pass.

use crate::codec::CodecKind;

/// Configuration for a CLFUS cache.
///
/// # Example
///
/// ```
/// use clfus::codec::CodecKind;
/// use clfus::config::RamCacheConfig;
///
/// let mut config = RamCacheConfig::new(32 * 1024 * 1024);
/// config.compress = CodecKind::Fast;
/// assert_eq!(config.compress_percent, 90);
/// ```
#[derive(Debug, Clone)]
pub struct RamCacheConfig {
    /// Hard cap on resident footprint in bytes. Zero disables the cache:
    /// every operation becomes a no-op returning its negative outcome.
    pub max_bytes: usize,
    /// Codec applied by the background walker; `None` disables it.
    pub compress: CodecKind,
    /// Fraction of resident objects the walker keeps compressed.
    pub compress_percent: u8,
}

impl RamCacheConfig {
    /// Configuration with the given budget and default compression.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }
}

impl Default for RamCacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 0,
            compress: CodecKind::None,
            compress_percent: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disabled_with_no_codec() {
        let config = RamCacheConfig::default();
        assert_eq!(config.max_bytes, 0);
        assert_eq!(config.compress, CodecKind::None);
        assert_eq!(config.compress_percent, 90);
    }

    #[test]
    fn new_sets_budget_only() {
        let config = RamCacheConfig::new(4096);
        assert_eq!(config.max_bytes, 4096);
        assert_eq!(config.compress, CodecKind::None);
    }
}
