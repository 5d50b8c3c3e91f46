//! `MemRowStore`: an in-memory, versioned record store plus a minimal lock
//! table, backing `scanmerge_core::RecordResolver` for tests. Not a
//! storage engine — no WAL, no compaction, no persistence. Just enough MVCC
//! to exercise the merge engine's visibility and locking paths end to end.
//!
//! Each row is an append-only chain of versions in commit order, the same
//! shape a real storage engine's in-memory row table would use, simplified
//! down to exactly what `RecordResolver` needs: snapshot visibility by
//! `version.txn <= snapshot`, not full compaction or tombstone GC.

use hashbrown::HashMap;
use parking_lot::Mutex;

use scanmerge_core::{Record, RecordId, Txn};

/// One committed version of a row. Visibility is snapshot-style: a version
/// is visible to `txn` if `version.txn.0 <= txn.0` and no newer version with
/// `txn.0 <= txn.0` exists for the same row (last-writer-wins within a
/// snapshot, same as `clawstore-core`'s own version chains).
#[derive(Debug, Clone)]
struct RowVersion {
    txn: Txn,
    key: Vec<u8>,
    value: Vec<u8>,
    deleted: bool,
}

/// In-memory row store keyed by `RecordId`, each holding an append-only
/// chain of versions in commit order.
#[derive(Default)]
pub struct MemRowStore {
    rows: Mutex<HashMap<RecordId, Vec<RowVersion>>>,
    /// Row-level lock table for `fetch_for_update`: at most one transaction
    /// may hold a row's lock at a time. This is a test fixture, not a real
    /// lock manager — there is no deadlock detection or queueing, just a
    /// held/free bit per row.
    locks: Mutex<HashMap<RecordId, Txn>>,
}

impl MemRowStore {
    pub fn new() -> Self {
        MemRowStore { rows: Mutex::new(HashMap::new()), locks: Mutex::new(HashMap::new()) }
    }

    /// Commit a new visible version of `id` as of `txn`.
    pub fn put(&self, id: RecordId, txn: Txn, key: Vec<u8>, value: Vec<u8>) {
        self.rows.lock().entry(id).or_default().push(RowVersion { txn, key, value, deleted: false });
    }

    /// Commit a tombstone version: the row still occupies the `id` slot
    /// (some index may still reference it) but is deleted as of `txn`.
    pub fn delete(&self, id: RecordId, txn: Txn, key: Vec<u8>) {
        self.rows.lock().entry(id).or_default().push(RowVersion { txn, key, value: Vec::new(), deleted: true });
    }

    fn to_record(id: RecordId, v: &RowVersion) -> Record {
        if v.deleted {
            Record::new_tombstone(id, v.key.clone())
        } else {
            Record::new(id, v.key.clone(), v.value.clone())
        }
    }

    /// The row's current (latest committed) version, independent of any
    /// transaction's snapshot. `RecordResolver::fetch`.
    pub fn latest(&self, id: RecordId) -> Option<Record> {
        let rows = self.rows.lock();
        let versions = rows.get(&id)?;
        versions.last().map(|v| Self::to_record(id, v))
    }

    /// The version visible to `txn`'s snapshot: the newest version whose
    /// `txn` is not after the requesting transaction. `RecordResolver::fetch_version`.
    pub fn visible_at(&self, id: RecordId, txn: Txn) -> Option<Record> {
        let rows = self.rows.lock();
        let versions = rows.get(&id)?;
        versions.iter().rev().find(|v| v.txn.0 <= txn.0).map(|v| Self::to_record(id, v))
    }

    /// Acquire `id`'s row lock for `txn` and return the visible version, or
    /// `None` if the lock is held by a different transaction. `wait` is
    /// accepted for interface parity with the real contract but this
    /// fixture never blocks — a denied lock here always means "held by
    /// someone else right now", modeling the non-deadlock failure path
    /// spec.md §7 calls `LockDenied`.
    pub fn lock_for_update(&self, id: RecordId, txn: Txn, _wait: bool) -> Option<Record> {
        {
            let mut locks = self.locks.lock();
            match locks.get(&id) {
                Some(holder) if *holder != txn => return None,
                _ => {
                    locks.insert(id, txn);
                }
            }
        }
        self.visible_at(id, txn)
    }

    /// Release `id`'s lock if held by `txn`. Not part of `RecordResolver` —
    /// exposed so tests can simulate a second transaction's lock attempt
    /// after the first releases.
    pub fn unlock(&self, id: RecordId, txn: Txn) {
        let mut locks = self.locks.lock();
        if locks.get(&id) == Some(&txn) {
            locks.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_at_picks_newest_version_not_after_snapshot() {
        let store = MemRowStore::new();
        store.put(RecordId(1), Txn(1), b"a".to_vec(), b"v1".to_vec());
        store.put(RecordId(1), Txn(5), b"a".to_vec(), b"v5".to_vec());
        store.put(RecordId(1), Txn(10), b"a".to_vec(), b"v10".to_vec());

        assert_eq!(store.visible_at(RecordId(1), Txn(3)).unwrap().value(), b"v1");
        assert_eq!(store.visible_at(RecordId(1), Txn(5)).unwrap().value(), b"v5");
        assert_eq!(store.visible_at(RecordId(1), Txn(7)).unwrap().value(), b"v5");
        assert_eq!(store.visible_at(RecordId(1), Txn(100)).unwrap().value(), b"v10");
        assert!(store.visible_at(RecordId(1), Txn(0)).is_none());
    }

    #[test]
    fn test_lock_for_update_denied_to_second_txn() {
        let store = MemRowStore::new();
        store.put(RecordId(1), Txn(1), b"a".to_vec(), b"v1".to_vec());
        assert!(store.lock_for_update(RecordId(1), Txn(2), true).is_some());
        assert!(store.lock_for_update(RecordId(1), Txn(3), true).is_none());
        store.unlock(RecordId(1), Txn(2));
        assert!(store.lock_for_update(RecordId(1), Txn(3), true).is_some());
    }

    #[test]
    fn test_delete_produces_tombstone() {
        let store = MemRowStore::new();
        store.put(RecordId(1), Txn(1), b"a".to_vec(), b"v1".to_vec());
        store.delete(RecordId(1), Txn(2), b"a".to_vec());
        let record = store.visible_at(RecordId(1), Txn(5)).unwrap();
        assert!(record.is_deleted());
    }
}
