//! End-to-end scan tests driving `scanmerge-core::Scan` over the in-memory
//! reference collaborators. Covers the six literal scenarios from spec.md §8
//! verbatim, plus the quantified properties P1/P4/P6.

use std::sync::Arc;

use scanmerge_core::{
    ByteLexicographicCodec, IndexRange, IndexScanSpec, KeyCodec, LockDeniedPolicy, RecordId, ScanConfig, ScanFlags,
    ScanOutcome, Scan, Txn,
};
use scanmerge_memtable::{MemIndex, MemRowStore};

fn codec() -> Arc<dyn KeyCodec> {
    Arc::new(ByteLexicographicCodec)
}

fn drain(scan: &mut Scan) -> Vec<u64> {
    let mut out = Vec::new();
    loop {
        match scan.next(false).unwrap() {
            ScanOutcome::Record(r) => out.push(r.id().0),
            ScanOutcome::LockDenied(_) => continue,
            ScanOutcome::Exhausted => break,
        }
    }
    out
}

fn spec(name: &str, index: MemIndex) -> IndexScanSpec {
    IndexScanSpec { name: name.to_string(), range: IndexRange::default(), source: Box::new(index) }
}

// ---------------------------------------------------------------------------
// spec.md §8 literal scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_1_single_cursor_passthrough() {
    let store = Arc::new(MemRowStore::new());
    store.put(RecordId(1), Txn(0), b"a".to_vec(), b"va".to_vec());
    store.put(RecordId(2), Txn(0), b"b".to_vec(), b"vb".to_vec());
    store.put(RecordId(3), Txn(0), b"c".to_vec(), b"vc".to_vec());

    let index = MemIndex::single_page(vec![("a", 1), ("b", 2), ("c", 3)]);
    let mut scan = Scan::open(vec![spec("idx", index)], Txn(10), ScanFlags::default(), store, codec(), ScanConfig::default()).unwrap();
    assert_eq!(drain(&mut scan), vec![1, 2, 3]);
}

#[test]
fn scenario_2_two_way_merge() {
    let store = Arc::new(MemRowStore::new());
    for (id, key) in [(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e"), (6, "f")] {
        store.put(RecordId(id), Txn(0), key.as_bytes().to_vec(), b"v".to_vec());
    }

    let a = MemIndex::single_page(vec![("a", 1), ("c", 3), ("e", 5)]);
    let b = MemIndex::single_page(vec![("b", 2), ("d", 4), ("f", 6)]);
    let specs = vec![spec("idx_a", a), spec("idx_b", b)];
    let mut scan = Scan::open(specs, Txn(10), ScanFlags::default(), store, codec(), ScanConfig::default()).unwrap();
    assert_eq!(drain(&mut scan), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn scenario_3_version_mismatch_skip() {
    let store = Arc::new(MemRowStore::new());
    store.put(RecordId(7), Txn(0), b"x".to_vec(), b"orig".to_vec());
    // Row 7 gets reindexed: its current visible version now carries key "z",
    // but the index entry still says "x".
    store.put(RecordId(7), Txn(1), b"z".to_vec(), b"moved".to_vec());
    store.put(RecordId(8), Txn(0), b"y".to_vec(), b"vy".to_vec());

    let index = MemIndex::single_page(vec![("x", 7), ("y", 8)]);
    let mut scan = Scan::open(vec![spec("idx", index)], Txn(10), ScanFlags::default(), store, codec(), ScanConfig::default()).unwrap();
    assert_eq!(drain(&mut scan), vec![8]);
}

#[test]
fn scenario_4_duplicate_tiebreak_across_two_indexes() {
    let store = Arc::new(MemRowStore::new());
    store.put(RecordId(42), Txn(0), b"k".to_vec(), b"v".to_vec());

    let a = MemIndex::single_page(vec![("k", 42)]);
    let b = MemIndex::single_page(vec![("k", 42)]);
    let specs = vec![spec("idx_a", a), spec("idx_b", b)];
    let mut scan = Scan::open(specs, Txn(10), ScanFlags::default(), store, codec(), ScanConfig::default()).unwrap();
    assert_eq!(drain(&mut scan), vec![42]);
}

#[test]
fn scenario_5_record_id_tiebreak_on_identical_key() {
    let store = Arc::new(MemRowStore::new());
    for id in [9u64, 3, 5] {
        store.put(RecordId(id), Txn(0), b"m".to_vec(), b"v".to_vec());
    }
    let index = MemIndex::single_page(vec![("m", 9), ("m", 3), ("m", 5)]);
    let mut scan = Scan::open(vec![spec("idx", index)], Txn(10), ScanFlags::default(), store, codec(), ScanConfig::default()).unwrap();
    assert_eq!(drain(&mut scan), vec![3, 5, 9]);
}

#[test]
fn scenario_6_empty_range_is_immediately_exhausted() {
    let store = Arc::new(MemRowStore::new());
    let index = MemIndex::single_page(vec![]);
    let mut scan = Scan::open(vec![spec("idx", index)], Txn(10), ScanFlags::default(), store, codec(), ScanConfig::default()).unwrap();
    assert!(matches!(scan.next(false).unwrap(), ScanOutcome::Exhausted));
    scan.close();
    scan.close();
    assert!(matches!(scan.next(false).unwrap(), ScanOutcome::Exhausted));
}

// ---------------------------------------------------------------------------
// Quantified properties, spec.md §8
// ---------------------------------------------------------------------------

/// Deterministic xorshift so the randomized merge below doesn't need a `rand`
/// dependency just for test fixtures, mirroring `node.rs`'s own
/// fixed-permutation approach to randomized coverage.
fn xorshift(seed: &mut u64) -> u64 {
    *seed ^= *seed << 13;
    *seed ^= *seed >> 7;
    *seed ^= *seed << 17;
    *seed
}

fn build_randomized_merge(num_indexes: usize, entries_per_index: usize, seed: u64) -> (Arc<MemRowStore>, Vec<IndexScanSpec>, Vec<u64>) {
    let store = Arc::new(MemRowStore::new());
    let mut all_ids = Vec::new();
    let mut rng = seed;
    let mut specs = Vec::new();
    let mut next_id = 1u64;

    for i in 0..num_indexes {
        let mut entries = Vec::new();
        for _ in 0..entries_per_index {
            let id = next_id;
            next_id += 1;
            let key_num = xorshift(&mut rng) % 10_000;
            let key = format!("k{:05}", key_num);
            store.put(RecordId(id), Txn(0), key.clone().into_bytes(), b"v".to_vec());
            entries.push((key, id));
            all_ids.push(id);
        }
        let index = MemIndex::new(
            entries.into_iter().map(|(k, id)| (k.into_bytes(), RecordId(id))).collect(),
            3,
        );
        specs.push(spec(&format!("idx_{i}"), index));
    }
    (store, specs, all_ids)
}

#[test]
fn property_p1_monotonicity_under_randomized_multi_index_merge() {
    let (store, specs, all_ids) = build_randomized_merge(5, 20, 0x9e3779b97f4a7c15);
    let mut scan = Scan::open(specs, Txn(10), ScanFlags::default(), store, codec(), ScanConfig::default()).unwrap();

    let codec = ByteLexicographicCodec;
    let mut prev: Option<Vec<u8>> = None;
    let mut seen = Vec::new();
    loop {
        match scan.next(false).unwrap() {
            ScanOutcome::Record(r) => {
                if let Some(p) = &prev {
                    assert_ne!(codec.compare(p, r.key()), std::cmp::Ordering::Greater, "monotonicity violated");
                }
                prev = Some(r.key().to_vec());
                seen.push(r.id().0);
            }
            ScanOutcome::LockDenied(_) => continue,
            ScanOutcome::Exhausted => break,
        }
    }
    seen.sort_unstable();
    let mut expected = all_ids.clone();
    expected.sort_unstable();
    assert_eq!(seen, expected, "every visible row must appear exactly once");
}

#[test]
fn property_p4_no_leaked_refcounts_after_close() {
    let store = Arc::new(MemRowStore::new());
    for (id, key) in [(1, "a"), (2, "b"), (3, "c")] {
        store.put(RecordId(id), Txn(0), key.as_bytes().to_vec(), b"v".to_vec());
    }
    let index = MemIndex::single_page(vec![("a", 1), ("b", 2), ("c", 3)]);
    let mut scan = Scan::open(vec![spec("idx", index)], Txn(10), ScanFlags::default(), Arc::clone(&store), codec(), ScanConfig::default()).unwrap();

    // Drain only the first record, then close early — the rest of the tree's
    // retained records must still be released by `close`, not just the one
    // already consumed.
    let first = scan.next(false).unwrap();
    assert!(matches!(first, ScanOutcome::Record(_)));
    let record = match first {
        ScanOutcome::Record(r) => r,
        _ => unreachable!(),
    };
    assert_eq!(record.strong_count(), 1, "caller-owned handle from next() is the only outstanding reference");
    drop(record);
    scan.close();
}

#[test]
fn property_p6_determinism_identical_snapshot_same_sequence() {
    let store = Arc::new(MemRowStore::new());
    for (id, key) in [(1, "a"), (2, "c"), (3, "e"), (4, "b"), (5, "d"), (6, "f")] {
        store.put(RecordId(id), Txn(0), key.as_bytes().to_vec(), b"v".to_vec());
    }

    let run = |store: Arc<MemRowStore>| {
        let a = MemIndex::single_page(vec![("a", 1), ("c", 2), ("e", 3)]);
        let b = MemIndex::single_page(vec![("b", 4), ("d", 5), ("f", 6)]);
        let specs = vec![spec("idx_a", a), spec("idx_b", b)];
        let mut scan = Scan::open(specs, Txn(10), ScanFlags::default(), store, codec(), ScanConfig::default()).unwrap();
        drain(&mut scan)
    };

    let first = run(Arc::clone(&store));
    let second = run(store);
    assert_eq!(first, second);
}

#[test]
fn lock_denied_policy_surface_reports_instead_of_skipping() {
    let store = Arc::new(MemRowStore::new());
    store.put(RecordId(1), Txn(0), b"a".to_vec(), b"v".to_vec());
    // A different transaction already holds the row's lock.
    let _ = store.lock_for_update(RecordId(1), Txn(999), true);

    let index = MemIndex::single_page(vec![("a", 1)]);
    let mut cfg = ScanConfig::strict();
    cfg.lock_denied_policy = LockDeniedPolicy::Surface;
    let mut scan = Scan::open(vec![spec("idx", index)], Txn(10), ScanFlags::default(), store, codec(), cfg).unwrap();
    match scan.next(true).unwrap() {
        ScanOutcome::LockDenied(id) => assert_eq!(id, RecordId(1)),
        other => panic!("expected LockDenied, got {other:?}"),
    }
}

#[test]
fn lock_denied_policy_surface_does_not_drop_the_record_already_extracted() {
    // Row "a" is freely visible and sorts before the locked row "b" in the
    // same cursor. The minimum (a) must still come back from the call whose
    // internal re-advance (looking for what comes after a) runs into b's
    // denied lock — the denial belongs to b, not to a.
    let store = Arc::new(MemRowStore::new());
    store.put(RecordId(1), Txn(0), b"a".to_vec(), b"v".to_vec());
    store.put(RecordId(2), Txn(0), b"b".to_vec(), b"v".to_vec());
    let _ = store.lock_for_update(RecordId(2), Txn(999), true);

    let index = MemIndex::single_page(vec![("a", 1), ("b", 2)]);
    let mut cfg = ScanConfig::strict();
    cfg.lock_denied_policy = LockDeniedPolicy::Surface;
    let mut scan = Scan::open(vec![spec("idx", index)], Txn(10), ScanFlags::default(), store, codec(), cfg).unwrap();

    match scan.next(true).unwrap() {
        ScanOutcome::Record(r) => assert_eq!(r.id(), RecordId(1)),
        other => panic!("expected the already-valid record a, got {other:?}"),
    }
    match scan.next(true).unwrap() {
        ScanOutcome::LockDenied(id) => assert_eq!(id, RecordId(2)),
        other => panic!("expected the deferred denial for b, got {other:?}"),
    }
    assert!(matches!(scan.next(true).unwrap(), ScanOutcome::Exhausted));
}
