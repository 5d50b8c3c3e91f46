//! `RecordResolver`: the external contract to the record/version store and
//! lock manager, per spec.md §4.2. Both are out of scope for this crate —
//! it only ever calls through this trait.

use crate::error::ScanResult;
use crate::record::{Record, RecordId, Txn};

pub trait RecordResolver: Send + Sync {
    /// Fetch the latest on-disk version of a row, independent of any
    /// transaction's view. Returns `None` if the row no longer exists.
    fn fetch(&self, record_id: RecordId) -> ScanResult<Option<Record>>;

    /// Resolve `record` down to the version visible to `txn`'s snapshot.
    /// May return the same version or a different (older) one; returns
    /// `None` if no version is visible (the row was created after the
    /// snapshot, or every version is deleted).
    fn fetch_version(&self, record: &Record, txn: &Txn) -> ScanResult<Option<Record>>;

    /// Like `fetch_version`, but additionally takes the row's lock for
    /// update. `wait` controls whether the caller is willing to block for
    /// the lock; when it isn't, a denied lock is reported exactly like a
    /// missing version (`Ok(None)`) and `ScanConfig::lock_denied_policy`
    /// decides whether `IndexCursor` surfaces or skips it.
    fn fetch_for_update(&self, record: &Record, txn: &Txn, wait: bool) -> ScanResult<Option<Record>>;

    /// Re-derive the encoded index key for `record` as this resolver's
    /// schema would encode it today. Used to detect a row that has been
    /// reindexed since the index page was written (spec.md §4.3 step 6).
    fn make_key(&self, record: &Record, out: &mut Vec<u8>);
}
