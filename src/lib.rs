//! clfus: Clocked Least Frequently Used by Size RAM cache.
//!
//! The hot tier of a disk-backed content cache: a byte-budgeted in-memory
//! object cache keyed by 128-bit fingerprints plus two auxiliary
//! discriminators, with optional background compression of resident
//! entries.
//!
//! Replacement combines three mechanisms:
//!
//! - **Value density** — `(hits + 1) / (size + overhead)` decides whether
//!   a re-requested object may displace current residents, so small hot
//!   objects outrank large cold ones.
//! - **Ghost history** — evicted objects leave a buffer-less record; a
//!   re-request is detected and competes for promotion. A CLOCK hand
//!   decays history hit counts and bounds the history size near the
//!   resident count.
//! - **Seen filter** — keys observed for the first time while history is
//!   saturated are rejected outright, so linear scans pass through
//!   without polluting the cache.
//!
//! ```
//! use clfus::prelude::*;
//!
//! let mut cache = ClfusCache::new(RamCacheConfig::new(64 * 1024));
//! let key = CacheKey::from_u128(0xfeed_beef);
//! let payload = BlockBuf::from_vec(b"hello world".to_vec());
//!
//! assert!(cache.put(key, payload, 11, true, 0, 0).is_admitted());
//! let (buf, len) = cache.get(key, 0, 0).unwrap();
//! assert_eq!(&buf.as_slice()[..len], b"hello world");
//! ```
//!
//! [`ClfusCache`](cache::ClfusCache) is a passive, externally synchronized
//! value; [`RamCache`](cache::RamCache) wraps it in the volume mutex and
//! hosts the background compression walker.

pub mod buf;
pub mod builder;
pub mod cache;
pub mod codec;
pub mod config;
pub mod ds;
pub mod error;
pub mod key;
pub mod metrics;
pub mod prelude;
