//! `ScanDriver`, per spec.md §4.7: the thin external façade that constructs
//! child cursors for each chosen index, drives `MergeWalker::next()` until
//! exhaustion, and passes records to the caller.

use std::sync::Arc;

use crate::config::ScanConfig;
use crate::cursor::{IndexCursor, IndexIdentity, IndexPageSource, IndexRange, ScanFlags};
use crate::error::ScanResult;
use crate::key::KeyCodec;
use crate::record::{Record, RecordId, Txn};
use crate::resolver::RecordResolver;
use crate::walker::{MergeOutcome, MergeWalker};

/// One `(index, range)` pair to merge, as the caller (SQL executor or
/// backup/replication reader, per spec.md §6) names it.
pub struct IndexScanSpec {
    pub name: String,
    pub range: IndexRange,
    pub source: Box<dyn IndexPageSource>,
}

/// Outcome of one `Scan::next` call, folding in the lock-denial distinction
/// from spec.md §9 Open Question c.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Record(Record),
    LockDenied(RecordId),
    Exhausted,
}

/// A single open scan: one `MergeWalker` over one `IndexCursor` per
/// `(index, range)` pair passed to `open`. Corresponds to spec.md §6's
/// `ScanHandle`.
pub struct Scan {
    walker: MergeWalker,
}

impl Scan {
    /// `open(indexes, ranges, txn, flags)` from spec.md §4.7: build one
    /// `IndexCursor` per `(index, range)` pair (covering both the
    /// single-index case, fan-in of one, and true multi-index merges) and
    /// construct the walker's setup list.
    pub fn open(
        specs: Vec<IndexScanSpec>,
        txn: Txn,
        flags: ScanFlags,
        resolver: Arc<dyn RecordResolver>,
        codec: Arc<dyn KeyCodec>,
        config: ScanConfig,
    ) -> ScanResult<Self> {
        if specs.len() > config.max_merge_fanin {
            return Err(crate::error::ScanError::InvariantViolation {
                invariant: "max_merge_fanin",
                detail: format!("{} indexes exceeds configured max_merge_fanin {}", specs.len(), config.max_merge_fanin),
            });
        }

        let cursors: Vec<IndexCursor> = specs
            .into_iter()
            .map(|spec| {
                IndexCursor::new(
                    IndexIdentity { name: spec.name },
                    txn,
                    flags,
                    spec.range,
                    spec.source,
                    Arc::clone(&resolver),
                    Arc::clone(&codec),
                    config,
                )
            })
            .collect();

        Ok(Scan { walker: MergeWalker::new(cursors, codec) })
    }

    /// `next(scan, lockForUpdate)` from spec.md §4.7.
    pub fn next(&mut self, lock_for_update: bool) -> ScanResult<ScanOutcome> {
        match self.walker.next(lock_for_update)? {
            MergeOutcome::Record(r) => Ok(ScanOutcome::Record(r)),
            MergeOutcome::LockDenied(id) => Ok(ScanOutcome::LockDenied(id)),
            MergeOutcome::Exhausted => Ok(ScanOutcome::Exhausted),
        }
    }

    /// `close(scan)` from spec.md §4.7: release any retained record and
    /// drain the owning list. Safe to call more than once (spec.md §8 P5) —
    /// it is also what `Drop` calls, so callers that want to force release
    /// before the handle goes out of scope can call it directly, same as
    /// the original engine's `close` being independent of its destructor.
    pub fn close(&mut self) {
        self.walker.close();
    }
}
