//! `MemIndex`: an in-memory, paginated sorted index implementing
//! `IndexPageSource`. Stands in for a real B-tree leaf chain — entries are
//! pre-sorted once at construction and handed out `page_size` at a time,
//! with `PageId` as the offset of the next unserved entry.

use scanmerge_core::{IndexPageSource, Page, PageId, RecordId, ScanResult};

/// A single index's full `(key_bytes, record_id)` population, sorted once up
/// front the way a real B-tree's leaf pages already are on disk.
pub struct MemIndex {
    entries: Vec<(Vec<u8>, RecordId)>,
    page_size: usize,
}

impl MemIndex {
    /// `page_size` of 0 is rejected in favor of a sane default, the same
    /// instinct as `ScanConfig::validate` — a zero-sized page would never
    /// make progress.
    pub fn new(mut entries: Vec<(Vec<u8>, RecordId)>, page_size: usize) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        MemIndex { entries, page_size: page_size.max(1) }
    }

    /// Convenience constructor for tests that don't care about pagination
    /// boundaries: one page holds everything.
    pub fn single_page(entries: Vec<(&str, u64)>) -> Self {
        let entries = entries.into_iter().map(|(k, id)| (k.as_bytes().to_vec(), RecordId(id))).collect();
        MemIndex::new(entries, usize::MAX)
    }

    fn page_at(&self, start: usize) -> Option<Page> {
        if start >= self.entries.len() {
            return None;
        }
        let end = (start + self.page_size).min(self.entries.len());
        let next_page = if end < self.entries.len() { Some(PageId(end as u64)) } else { None };
        Some(Page { entries: self.entries[start..end].to_vec(), next_page })
    }
}

impl IndexPageSource for MemIndex {
    fn seek(&mut self, lower_bound: &[u8]) -> ScanResult<Option<Page>> {
        let start = self.entries.partition_point(|(k, _)| k.as_slice() < lower_bound);
        Ok(self.page_at(start))
    }

    fn load_page(&mut self, page_id: PageId) -> ScanResult<Option<Page>> {
        Ok(self.page_at(page_id.0 as usize))
    }
}
