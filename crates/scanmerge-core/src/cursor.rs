//! `IndexCursor`: a single-index range walker, per spec.md §3 and §4.3.
//!
//! The original splits a base class (`IndexWalker`, which owns the
//! merge-tree fields and the validated-record fetch path) from a subclass
//! (`WalkIndex`, which owns `lowerBound`/`upperBound`, the page buffer, and
//! `nextPage`). This crate keeps that separation as two Rust types instead
//! of base/derived: `node::Slot` holds the tree links (MergeNode fields),
//! `IndexCursor` holds everything `WalkIndex` held — the range bounds, page
//! buffer, and `next_page` cursor.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::{LockDeniedPolicy, ScanConfig};
use crate::error::ScanResult;
use crate::key::KeyCodec;
use crate::record::{Record, RecordId, Txn};
use crate::resolver::RecordResolver;

/// Opaque page identifier handed back by `IndexPageSource::load_page` to
/// chain to the following page, per spec.md §6's "Index page iterator"
/// consumed contract (`nextPageId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageId(pub u64);

/// One leaf page's worth of decoded `(key_bytes, record_id)` pairs, in
/// on-disk key order, plus the page that follows it (`None` at the end of
/// the index).
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub entries: Vec<(Vec<u8>, RecordId)>,
    pub next_page: Option<PageId>,
}

/// External collaborator (spec.md §6 "Index page iterator"): yields pages of
/// `(encodedKeyBytes, recordId, nextPageId)` entries in on-disk key order.
/// Out of scope for this crate per spec.md §1 — the physical B-tree page
/// layout belongs to the storage engine, not the merge.
pub trait IndexPageSource: Send {
    /// Load the first page at or after `lower_bound`. `None` means the
    /// range starts past the end of the index (spec.md §8 scenario 6,
    /// empty range).
    fn seek(&mut self, lower_bound: &[u8]) -> ScanResult<Option<Page>>;

    /// Load the page `page_id` points to, continuing a scan whose buffer
    /// just drained.
    fn load_page(&mut self, page_id: PageId) -> ScanResult<Option<Page>>;
}

/// Ascending half-open/closed range bounds for one cursor, per spec.md §6's
/// `includeLowerBound`/`includeUpperBound` flags. Shared by every cursor in
/// a merge (spec.md §4.3: `searchFlags` is immutable for the cursor's life).
#[derive(Debug, Clone, Copy)]
pub struct ScanFlags {
    pub include_lower_bound: bool,
    pub include_upper_bound: bool,
    /// Whether a tombstone version is silently skipped rather than yielded.
    /// Defaults to `true` (spec.md §6).
    pub skip_deleted: bool,
}

impl Default for ScanFlags {
    fn default() -> Self {
        ScanFlags { include_lower_bound: true, include_upper_bound: true, skip_deleted: true }
    }
}

/// One index's key range for a single cursor.
#[derive(Debug, Clone, Default)]
pub struct IndexRange {
    pub lower_bound: Option<Vec<u8>>,
    pub upper_bound: Option<Vec<u8>>,
}

/// One child cursor's immutable identity, surfaced in error messages.
#[derive(Debug, Clone)]
pub struct IndexIdentity {
    pub name: String,
}

/// Single-index range walker. Advances through encoded `(key, recordId)`
/// pairs within `[lower_bound, upper_bound]`, filtering each candidate
/// through the `RecordResolver`, and exposing the current key bytes and
/// `Record` once a candidate survives validation (spec.md §4.3).
pub struct IndexCursor {
    identity: IndexIdentity,
    txn: Txn,
    flags: ScanFlags,
    range: IndexRange,
    source: Box<dyn IndexPageSource>,
    resolver: Arc<dyn RecordResolver>,
    codec: Arc<dyn KeyCodec>,
    config: ScanConfig,

    buffer: Vec<(Vec<u8>, RecordId)>,
    buffer_pos: usize,
    /// Entries left over from the last page loaded, when it held more than
    /// `config.max_page_buffer_entries` — served before the source is asked
    /// for the following page, so `buffer` never exceeds the configured cap
    /// regardless of how large a single `Page` the source hands back.
    overflow: Vec<(Vec<u8>, RecordId)>,
    next_page: Option<PageId>,
    seeked: bool,
    exhausted: bool,

    current_key: Vec<u8>,
    current_record_id: Option<RecordId>,
    current_record: Option<Record>,
}

/// Outcome of one `advance()` call, distinguishing an ordinary record from a
/// lock denial the caller asked to see (spec.md §9 Open Question c,
/// `ScanConfig::lock_denied_policy == Surface`).
#[derive(Debug, Clone)]
pub enum CursorOutcome {
    Record(Record),
    LockDenied(RecordId),
    Exhausted,
}

impl IndexCursor {
    pub fn new(
        identity: IndexIdentity,
        txn: Txn,
        flags: ScanFlags,
        range: IndexRange,
        source: Box<dyn IndexPageSource>,
        resolver: Arc<dyn RecordResolver>,
        codec: Arc<dyn KeyCodec>,
        config: ScanConfig,
    ) -> Self {
        IndexCursor {
            identity,
            txn,
            flags,
            range,
            source,
            resolver,
            codec,
            config,
            buffer: Vec::new(),
            buffer_pos: 0,
            overflow: Vec::new(),
            next_page: None,
            seeked: false,
            exhausted: false,
            current_key: Vec::new(),
            current_record_id: None,
            current_record: None,
        }
    }

    pub fn identity(&self) -> &IndexIdentity {
        &self.identity
    }

    pub fn current_key_bytes(&self) -> &[u8] {
        &self.current_key
    }

    pub fn current_record_id(&self) -> Option<RecordId> {
        self.current_record_id
    }

    pub fn current_record(&self) -> Option<&Record> {
        self.current_record.as_ref()
    }

    /// Take ownership of the retained current record, leaving the cursor's
    /// own slot empty. Used by `MergeWalker::next` (spec.md §4.5 step 3:
    /// "take ownership of `m.currentRecord`") and by `close`/`Drop` to
    /// guarantee the release spec.md §9 Design Notes calls out as missing
    /// in the original.
    pub(crate) fn take_current_record(&mut self) -> Option<Record> {
        self.current_record.take()
    }

    fn refill(&mut self) -> ScanResult<bool> {
        if self.buffer_pos < self.buffer.len() {
            return Ok(true);
        }
        loop {
            if !self.overflow.is_empty() {
                self.fill_buffer_from_overflow();
                return Ok(true);
            }

            let page = if !self.seeked {
                self.seeked = true;
                let lower = self.range.lower_bound.clone().unwrap_or_default();
                self.source.seek(&lower)?
            } else if let Some(pid) = self.next_page {
                self.source.load_page(pid)?
            } else {
                None
            };

            let Some(page) = page else {
                self.exhausted = true;
                return Ok(false);
            };

            self.next_page = page.next_page;
            self.load_entries_capped(page.entries);
            self.buffer_pos = 0;

            if self.buffer.is_empty() {
                if self.next_page.is_none() {
                    self.exhausted = true;
                    return Ok(false);
                }
                continue;
            }
            return Ok(true);
        }
    }

    /// Cap `buffer` at `config.max_page_buffer_entries`, stashing any excess
    /// in `overflow` rather than dropping it — a page larger than the
    /// configured cap is served across several buffer fills instead of one.
    fn load_entries_capped(&mut self, mut entries: Vec<(Vec<u8>, RecordId)>) {
        let cap = self.config.max_page_buffer_entries;
        if entries.len() > cap {
            self.overflow = entries.split_off(cap);
        }
        self.buffer = entries;
    }

    fn fill_buffer_from_overflow(&mut self) {
        let cap = self.config.max_page_buffer_entries;
        if self.overflow.len() > cap {
            let rest = self.overflow.split_off(cap);
            self.buffer = std::mem::replace(&mut self.overflow, rest);
        } else {
            self.buffer = std::mem::take(&mut self.overflow);
        }
        self.buffer_pos = 0;
    }

    fn within_upper_bound(&self, key: &[u8]) -> bool {
        match &self.range.upper_bound {
            None => true,
            Some(upper) => match self.codec.compare(key, upper) {
                Ordering::Less => true,
                Ordering::Equal => self.flags.include_upper_bound,
                Ordering::Greater => false,
            },
        }
    }

    fn within_lower_bound(&self, key: &[u8]) -> bool {
        match &self.range.lower_bound {
            None => true,
            Some(lower) => match self.codec.compare(key, lower) {
                Ordering::Greater => true,
                Ordering::Equal => self.flags.include_lower_bound,
                Ordering::Less => false,
            },
        }
    }

    /// Decode the next `(key_bytes, record_id)` pair in range, or signal
    /// exhaustion. Step 1-2 of spec.md §4.3's advance algorithm.
    fn next_candidate(&mut self) -> ScanResult<Option<(Vec<u8>, RecordId)>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }
            if !self.refill()? {
                return Ok(None);
            }
            let (key, id) = self.buffer[self.buffer_pos].clone();
            self.buffer_pos += 1;

            if !self.within_upper_bound(&key) {
                self.exhausted = true;
                return Ok(None);
            }
            if !self.within_lower_bound(&key) {
                continue;
            }
            return Ok(Some((key, id)));
        }
    }

    /// Steps 3-7 of spec.md §4.3: fetch, resolve against the transaction
    /// (or lock for update), and re-validate the resolved version's own key
    /// against the on-index key before accepting it.
    ///
    /// Reproduces the original `getValidatedRecord`'s handle lifecycle
    /// exactly (spec.md SPEC_FULL §13): the candidate handle fetched by
    /// `fetch` is released as soon as it is no longer needed, which can
    /// happen at two different points in one call (once if `fetch_version`/
    /// `fetch_for_update` hands back a different version, and again if the
    /// key re-check at step 6 fails) rather than only once at the end.
    fn validate(&mut self, key: Vec<u8>, record_id: RecordId, lock_for_update: bool) -> ScanResult<Option<CursorOutcome>> {
        let Some(candidate) = self.resolver.fetch(record_id)? else {
            tracing::trace!(index = %self.identity.name, record_id = record_id.0, "fetch found no row, skipping");
            return Ok(None);
        };

        let resolved = if lock_for_update {
            self.resolver.fetch_for_update(&candidate, &self.txn, true)?
        } else {
            self.resolver.fetch_version(&candidate, &self.txn)?
        };

        // `candidate` (an Arc clone) drops here when no longer referenced;
        // that is this crate's Clone/Drop equivalent of `release()`.
        let Some(record) = resolved else {
            if lock_for_update {
                match self.config.lock_denied_policy {
                    LockDeniedPolicy::Skip => {
                        tracing::trace!(index = %self.identity.name, record_id = record_id.0, "lock denied, skipping");
                        return Ok(None);
                    }
                    LockDeniedPolicy::Surface => return Ok(Some(CursorOutcome::LockDenied(record_id))),
                }
            }
            return Ok(None);
        };

        if self.flags.skip_deleted && record.is_deleted() {
            return Ok(None);
        }

        let mut recomputed_key = Vec::with_capacity(key.len());
        self.resolver.make_key(&record, &mut recomputed_key);
        if recomputed_key != key {
            tracing::debug!(
                index = %self.identity.name,
                record_id = record_id.0,
                "version no longer matches its on-index key, skipping"
            );
            return Ok(None);
        }

        self.current_key = key;
        self.current_record_id = Some(record_id);
        self.current_record = Some(record.clone());
        Ok(Some(CursorOutcome::Record(record)))
    }

    /// Build a cursor whose `current_key`/`current_record_id` are set
    /// directly, with no page source or resolver behind it. Used only by
    /// `node`/`walker` structural property tests (spec.md §8 P3) that drive
    /// the arena directly and never call `advance`.
    #[cfg(test)]
    pub(crate) fn for_arena_test(key: Vec<u8>, record_id: RecordId) -> Self {
        struct EmptySource;
        impl IndexPageSource for EmptySource {
            fn seek(&mut self, _lower_bound: &[u8]) -> ScanResult<Option<Page>> {
                Ok(None)
            }
            fn load_page(&mut self, _page_id: PageId) -> ScanResult<Option<Page>> {
                Ok(None)
            }
        }
        struct EmptyResolver;
        impl RecordResolver for EmptyResolver {
            fn fetch(&self, _record_id: RecordId) -> ScanResult<Option<Record>> {
                Ok(None)
            }
            fn fetch_version(&self, _record: &Record, _txn: &Txn) -> ScanResult<Option<Record>> {
                Ok(None)
            }
            fn fetch_for_update(&self, _record: &Record, _txn: &Txn, _wait: bool) -> ScanResult<Option<Record>> {
                Ok(None)
            }
            fn make_key(&self, _record: &Record, _out: &mut Vec<u8>) {}
        }

        let mut cursor = IndexCursor::new(
            IndexIdentity { name: "arena-test".into() },
            Txn(0),
            ScanFlags::default(),
            IndexRange::default(),
            Box::new(EmptySource),
            Arc::new(EmptyResolver),
            Arc::new(crate::key::ByteLexicographicCodec),
            ScanConfig::default(),
        );
        cursor.current_key = key.clone();
        cursor.current_record_id = Some(record_id);
        cursor.current_record = Some(Record::new(record_id, key, Vec::new()));
        cursor
    }

    /// The full 7-step advance algorithm from spec.md §4.3: moves to the
    /// next `(key, recordId)` pair in range, resolves and validates it, and
    /// silently skips to the next pair on any failure. Returns `None` once
    /// the range is exhausted.
    pub fn advance(&mut self, lock_for_update: bool) -> ScanResult<Option<Record>> {
        match self.advance_outcome(lock_for_update)? {
            CursorOutcome::Record(r) => Ok(Some(r)),
            CursorOutcome::LockDenied(_) => {
                // Surfaced lock denials never silently skip further; the
                // caller sees them via `advance_outcome` through
                // `MergeWalker`/`Scan`. Plain `advance` treats it the same
                // as an absent row for callers that don't care.
                Ok(None)
            }
            CursorOutcome::Exhausted => Ok(None),
        }
    }

    /// Like `advance`, but surfaces a denied lock as a distinguishable
    /// outcome instead of folding it into "no visible record", per
    /// spec.md §9 Open Question c / `LockDeniedPolicy::Surface`.
    pub fn advance_outcome(&mut self, lock_for_update: bool) -> ScanResult<CursorOutcome> {
        loop {
            let Some((key, id)) = self.next_candidate()? else {
                return Ok(CursorOutcome::Exhausted);
            };
            if let Some(outcome) = self.validate(key, id, lock_for_update)? {
                return Ok(outcome);
            }
        }
    }
}
