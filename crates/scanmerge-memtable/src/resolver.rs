//! `RecordResolver` over `MemRowStore`.

use scanmerge_core::{Record, RecordId, RecordResolver, ScanResult, Txn};

use crate::store::MemRowStore;

impl RecordResolver for MemRowStore {
    fn fetch(&self, record_id: RecordId) -> ScanResult<Option<Record>> {
        Ok(self.latest(record_id))
    }

    fn fetch_version(&self, record: &Record, txn: &Txn) -> ScanResult<Option<Record>> {
        Ok(self.visible_at(record.id(), *txn))
    }

    fn fetch_for_update(&self, record: &Record, txn: &Txn, wait: bool) -> ScanResult<Option<Record>> {
        Ok(self.lock_for_update(record.id(), *txn, wait))
    }

    fn make_key(&self, record: &Record, out: &mut Vec<u8>) {
        out.extend_from_slice(record.key());
    }
}
