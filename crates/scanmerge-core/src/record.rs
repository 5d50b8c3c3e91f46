//! Record handle and identity types.
//!
//! `Record` is the Rust-idiomatic answer to spec.md §9's Design Notes on
//! refcounting: the original's `addRef`/`release` pair becomes ordinary
//! `Clone`/`Drop` on an `Arc`-backed handle. There is no manual refcount to
//! get wrong here, which is exactly the point of the translation.

use std::sync::Arc;

/// Row identifier. Named `RecordId` rather than the original's
/// `recordNumber` to read naturally next to `RecordResolver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u64);

/// Opaque transaction handle. The transaction manager itself is out of
/// scope per spec.md §1 — this crate only ever threads a `Txn` through to
/// `RecordResolver`, never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Txn(pub u64);

#[derive(Debug)]
struct RecordInner {
    id: RecordId,
    /// The version's own encoded key, captured at fetch time so
    /// `IndexCursor::advance` can detect a reindexed row without a second
    /// round trip through `RecordResolver::make_key`.
    key: Vec<u8>,
    value: Vec<u8>,
    deleted: bool,
}

/// A reference-counted handle to one version of one row.
///
/// Cloning and dropping a `Record` is the entire refcount protocol — there
/// is no `addRef`/`release` to call by hand.
#[derive(Debug, Clone)]
pub struct Record(Arc<RecordInner>);

impl Record {
    pub fn new(id: RecordId, key: Vec<u8>, value: Vec<u8>) -> Self {
        Record(Arc::new(RecordInner { id, key, value, deleted: false }))
    }

    /// A tombstone version: still occupies an index slot (so the cursor can
    /// see it went away) but carries no value. `ScanFlags::skip_deleted`
    /// decides whether `IndexCursor::advance` hands it to the caller.
    pub fn new_tombstone(id: RecordId, key: Vec<u8>) -> Self {
        Record(Arc::new(RecordInner { id, key, value: Vec::new(), deleted: true }))
    }

    pub fn id(&self) -> RecordId {
        self.0.id
    }

    pub fn key(&self) -> &[u8] {
        &self.0.key
    }

    pub fn value(&self) -> &[u8] {
        &self.0.value
    }

    pub fn is_deleted(&self) -> bool {
        self.0.deleted
    }

    /// Number of outstanding handles to this exact version. Exposed purely
    /// so test harnesses can assert property P4 (no leaks) by comparing
    /// strong counts before and after a scan closes.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_identity_not_value_equality() {
        let a = Record::new(RecordId(1), b"k".to_vec(), b"v".to_vec());
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.strong_count(), 2);
        drop(b);
        assert_eq!(a.strong_count(), 1);
    }

    #[test]
    fn test_distinct_records_not_equal_even_with_same_fields() {
        let a = Record::new(RecordId(1), b"k".to_vec(), b"v".to_vec());
        let b = Record::new(RecordId(1), b"k".to_vec(), b"v".to_vec());
        assert_ne!(a, b);
    }

    #[test]
    fn test_tombstone_is_deleted_with_empty_value() {
        let t = Record::new_tombstone(RecordId(7), b"k".to_vec());
        assert!(t.is_deleted());
        assert!(t.value().is_empty());
    }
}
