// End-to-end behavior of the CLFUS cache through its public surface:
// admission, eviction order, history promotion, the scan filter, and the
// compression walker. Structural invariants are re-checked after each
// scenario via `check_invariants`.

use clfus::prelude::*;

fn key(i: u64) -> CacheKey {
    // nonzero upper half of word 3 so the seen filter has real tags
    CacheKey::new([i as u32, 0, 0, (i as u32) << 16 | i as u32])
}

fn payload(tag: u64, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_add(tag as u8)).collect()
}

mod admission {
    use super::*;

    #[test]
    fn basic_admit_and_hit() {
        let mut cache = ClfusCache::new(RamCacheConfig::new(4096));
        let bytes = payload(1, 1000);
        let buf = BlockBuf::from_vec(bytes.clone());
        assert!(cache.put(key(1), buf, 1000, true, 0, 0).is_admitted());
        assert_eq!(cache.bytes(), 1000 + ENTRY_OVERHEAD);

        let (got, len) = cache.get(key(1), 0, 0).expect("resident hit");
        assert_eq!(len, 1000);
        assert_eq!(got.as_slice(), &bytes[..]);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn round_trip_holds_for_varied_sizes() {
        let mut cache = ClfusCache::new(RamCacheConfig::new(1 << 20));
        for (i, len) in [1usize, 15, 16, 127, 1000, 4096, 65_536].iter().enumerate() {
            let k = key(i as u64 + 1);
            let bytes = payload(i as u64, *len);
            let buf = BlockBuf::from_vec(bytes.clone());
            assert!(cache.put(k, buf, *len, true, 0, 0).is_admitted());
            let (got, glen) = cache.get(k, 0, 0).expect("immediate hit");
            assert_eq!(glen, *len);
            assert_eq!(got.as_slice(), &bytes[..]);
        }
        cache.check_invariants().unwrap();
    }

    #[test]
    fn disabled_cache_refuses_everything() {
        let mut cache = ClfusCache::new(RamCacheConfig::new(0));
        let buf = BlockBuf::from_vec(vec![1u8; 10]);
        assert_eq!(cache.put(key(1), buf, 10, true, 0, 0), PutOutcome::Refused);
        assert!(cache.get(key(1), 0, 0).is_none());
        assert!(!cache.fixup(key(1), 0, 0, 1, 1));
    }
}

mod eviction {
    use super::*;

    /// Budget for three 800-byte objects; the fourth displaces the oldest.
    #[test]
    fn oldest_entry_is_demoted_then_promotable() {
        let mut cache = ClfusCache::new(RamCacheConfig::new(3000));
        for k in 1..=4u64 {
            let buf = BlockBuf::from_vec(payload(k, 800));
            assert!(cache.put(key(k), buf, 800, true, 0, 0).is_admitted());
        }
        // k1 got demoted: a miss, but still indexed as history
        assert!(cache.get(key(1), 0, 0).is_none());
        let info = cache.entry_info(key(1), 0, 0).expect("history record");
        assert!(!info.resident);
        cache.check_invariants().unwrap();

        // re-request: k1 competes on value density and wins promotion
        let buf = BlockBuf::from_vec(payload(1, 800));
        assert!(cache.put(key(1), buf, 800, true, 0, 0).is_admitted());
        assert!(cache.get(key(1), 0, 0).is_some());
        cache.check_invariants().unwrap();
    }

    #[test]
    fn low_density_history_entry_cannot_displace_hot_victim() {
        let mut cache = ClfusCache::new(RamCacheConfig::new(2000));
        let buf = BlockBuf::from_vec(payload(1, 100));
        assert!(cache.put(key(1), buf, 100, true, 0, 0).is_admitted());
        for _ in 0..5 {
            assert!(cache.get(key(1), 0, 0).is_some());
        }
        let buf = BlockBuf::from_vec(payload(2, 1200));
        assert!(cache.put(key(2), buf, 1200, true, 0, 0).is_admitted());
        let buf = BlockBuf::from_vec(payload(3, 1500));
        assert!(cache.put(key(3), buf, 1500, true, 0, 0).is_admitted());
        assert!(!cache.entry_info(key(2), 0, 0).unwrap().resident);

        // k2's density is far below the hot k1's; promotion is refused and
        // the cache state restored
        let buf = BlockBuf::from_vec(payload(2, 1200));
        assert_eq!(cache.put(key(2), buf, 1200, true, 0, 0), PutOutcome::Refused);
        assert!(cache.entry_info(key(1), 0, 0).unwrap().resident);
        assert!(!cache.entry_info(key(2), 0, 0).unwrap().resident);
        cache.check_invariants().unwrap();
    }
}

mod scan_resistance {
    use super::*;

    /// A single pass of unique keys must not take over the resident set,
    /// and history must stay bounded.
    #[test]
    fn unique_key_scan_does_not_pollute() {
        let mut cache = ClfusCache::new(RamCacheConfig::new(8000));
        for k in 0..200u64 {
            let buf = BlockBuf::from_vec(payload(k, 600));
            let _ = cache.put(key(k), buf, 600, true, 0, 0);
        }
        // the scan's tail was filtered out entirely
        assert!(cache.entry_info(key(199), 0, 0).is_none());
        assert!(cache.get(key(199), 0, 0).is_none());
        assert!(cache.history() <= cache.objects() + HISTORY_HYSTERESIS);
        assert!(cache.bytes() <= 8000 + ENTRY_OVERHEAD);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn active_working_set_survives_a_scan() {
        let mut cache = ClfusCache::new(RamCacheConfig::new(8000));
        for k in 0..4u64 {
            let buf = BlockBuf::from_vec(payload(k, 600));
            assert!(cache.put(key(k), buf, 600, true, 0, 0).is_admitted());
        }
        // a long scan of unique cold keys, with the working set still
        // being requested in between
        for k in 1000..1200u64 {
            let buf = BlockBuf::from_vec(payload(k, 600));
            let _ = cache.put(key(k), buf, 600, true, 0, 0);
            for hot in 0..4u64 {
                let _ = cache.get(key(hot), 0, 0);
            }
        }
        // the scan churned among its own keys; the hot set stayed resident
        for k in 0..4u64 {
            assert!(
                cache.get(key(k), 0, 0).is_some(),
                "hot key {k} lost to the scan"
            );
        }
        cache.check_invariants().unwrap();
    }
}

mod fixup {
    use super::*;

    #[test]
    fn updates_and_is_idempotent() {
        let mut cache = ClfusCache::new(RamCacheConfig::new(4096));
        let buf = BlockBuf::from_vec(payload(1, 200));
        assert!(cache.put(key(1), buf, 200, true, 10, 20).is_admitted());

        assert!(cache.fixup(key(1), 10, 20, 11, 21));
        assert!(cache.get(key(1), 10, 20).is_none());
        assert!(cache.get(key(1), 11, 21).is_some());

        // new == old is a no-op that still reports updated
        assert!(cache.fixup(key(1), 11, 21, 11, 21));
        assert!(cache.get(key(1), 11, 21).is_some());

        assert!(!cache.fixup(key(2), 0, 0, 1, 1));
        cache.check_invariants().unwrap();
    }
}

mod compression {
    use super::*;

    #[test]
    fn walker_compresses_and_get_round_trips() {
        let cache = RamCacheBuilder::new(1_000_000)
            .compression(CodecKind::Fast, 100)
            .try_build()
            .unwrap();
        let bytes = vec![42u8; 10_000];
        let buf = BlockBuf::from_vec(bytes.clone());
        assert!(cache.put(key(1), buf, 10_000, false, 0, 0).is_admitted());

        let walker = CompressionWalker::new(&cache);
        walker.run_once();

        let info = cache.entry_info(key(1), 0, 0).unwrap();
        assert_eq!(info.compressed, CodecKind::Fast);
        assert!(info.size < 10_000);

        // exact original bytes back; the shared entry is replaced by the
        // decompressed representation
        let (got, len) = cache.get(key(1), 0, 0).expect("hit");
        assert_eq!(len, 10_000);
        assert_eq!(got.as_slice(), &bytes[..]);
        assert_eq!(
            cache.entry_info(key(1), 0, 0).unwrap().compressed,
            CodecKind::None
        );
        cache.lock().check_invariants().unwrap();
    }

    #[test]
    fn all_codecs_round_trip_through_the_walker() {
        for codec in [CodecKind::Fast, CodecKind::Deflate, CodecKind::Lzma] {
            let cache = RamCacheBuilder::new(1_000_000)
                .compression(codec, 100)
                .try_build()
                .unwrap();
            let bytes = payload(7, 20_000);
            let buf = BlockBuf::from_vec(bytes.clone());
            assert!(cache.put(key(1), buf, 20_000, false, 0, 0).is_admitted());

            cache.compress_entries(usize::MAX);
            let info = cache.entry_info(key(1), 0, 0).unwrap();
            assert_eq!(info.compressed, codec, "codec {codec} did not engage");

            let (got, len) = cache.get(key(1), 0, 0).expect("hit");
            assert_eq!(len, 20_000);
            assert_eq!(got.as_slice(), &bytes[..], "codec {codec} corrupted data");
            cache.lock().check_invariants().unwrap();
        }
    }

    #[test]
    fn random_bytes_become_incompressible_and_stay_raw() {
        use rand::{rngs::StdRng, RngCore, SeedableRng};

        let cache = RamCacheBuilder::new(1_000_000)
            .compression(CodecKind::Fast, 100)
            .try_build()
            .unwrap();
        let mut bytes = vec![0u8; 10_000];
        StdRng::seed_from_u64(7).fill_bytes(&mut bytes);
        let buf = BlockBuf::from_vec(bytes.clone());
        assert!(cache.put(key(1), buf, 10_000, false, 0, 0).is_admitted());

        cache.compress_entries(usize::MAX);
        let info = cache.entry_info(key(1), 0, 0).unwrap();
        assert!(info.incompressible);
        assert_eq!(info.compressed, CodecKind::None);

        // the payload is untouched
        let (got, len) = cache.get(key(1), 0, 0).expect("hit");
        assert_eq!(len, 10_000);
        assert_eq!(got.as_slice(), &bytes[..]);
        cache.lock().check_invariants().unwrap();
    }

    #[test]
    fn compression_respects_copy_semantics_on_get() {
        let cache = RamCacheBuilder::new(1_000_000)
            .compression(CodecKind::Deflate, 100)
            .try_build()
            .unwrap();
        let bytes = vec![9u8; 10_000];
        let buf = BlockBuf::from_vec(bytes.clone());
        // copy-in/copy-out entry
        assert!(cache.put(key(1), buf, 10_000, true, 0, 0).is_admitted());
        cache.compress_entries(usize::MAX);
        assert_eq!(
            cache.entry_info(key(1), 0, 0).unwrap().compressed,
            CodecKind::Deflate
        );

        let (got, len) = cache.get(key(1), 0, 0).expect("hit");
        assert_eq!((got.as_slice(), len), (&bytes[..], 10_000));
        // the entry keeps its compressed representation
        assert_eq!(
            cache.entry_info(key(1), 0, 0).unwrap().compressed,
            CodecKind::Deflate
        );
        cache.lock().check_invariants().unwrap();
    }
}

mod metrics {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_mirror_hits_misses_and_bytes() {
        let sink = Arc::new(AtomicMetrics::new());
        let cache = RamCacheBuilder::new(4096)
            .metrics(Arc::clone(&sink) as Arc<dyn MetricsSink>)
            .try_build()
            .unwrap();

        let buf = BlockBuf::from_vec(payload(1, 1000));
        assert!(cache.put(key(1), buf, 1000, true, 0, 0).is_admitted());
        assert!(cache.get(key(1), 0, 0).is_some());
        assert!(cache.get(key(2), 0, 0).is_none());
        assert!(cache.get(key(3), 0, 0).is_none());

        let snap = sink.snapshot();
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 2);
        assert_eq!(snap.bytes, 1000);
    }

    #[test]
    fn history_hits_count_as_misses() {
        let sink = Arc::new(AtomicMetrics::new());
        let cache = RamCacheBuilder::new(3000)
            .metrics(Arc::clone(&sink) as Arc<dyn MetricsSink>)
            .try_build()
            .unwrap();
        for k in 1..=4u64 {
            let buf = BlockBuf::from_vec(payload(k, 800));
            assert!(cache.put(key(k), buf, 800, true, 0, 0).is_admitted());
        }
        let misses_before = sink.snapshot().misses;
        assert!(cache.get(key(1), 0, 0).is_none()); // history hit
        assert_eq!(sink.snapshot().misses, misses_before + 1);
    }
}

mod concurrency {
    use super::*;

    /// Readers, writers, and the walker share the volume mutex; nothing
    /// here should deadlock or corrupt accounting.
    #[test]
    fn shared_handle_survives_contention() {
        let cache = RamCacheBuilder::new(256 * 1024)
            .compression(CodecKind::Fast, 50)
            .try_build()
            .unwrap();

        let mut handles = Vec::new();
        for t in 0..4u64 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..200u64 {
                    let k = key(t * 1000 + (i % 32));
                    let len = 64 + ((i * 37) % 2048) as usize;
                    let buf = BlockBuf::from_vec(payload(t, len));
                    let _ = cache.put(k, buf, len, i % 2 == 0, 0, 0);
                    if let Some((got, len)) = cache.get(k, 0, 0) {
                        assert_eq!(got.as_slice().len(), len);
                    }
                }
            }));
        }
        let walker_cache = cache.clone();
        let walker_handle = std::thread::spawn(move || {
            let walker = CompressionWalker::with_budget(&walker_cache, 8);
            for _ in 0..50 {
                walker.run_once();
            }
        });
        for h in handles {
            h.join().unwrap();
        }
        walker_handle.join().unwrap();
        cache.lock().check_invariants().unwrap();
    }
}
