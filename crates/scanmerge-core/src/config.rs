//! Scan-time configuration. Mirrors the tiered-preset shape used elsewhere in
//! this codebase's ambient stack: named presets plus a `validate()` pass,
//! rather than a config struct whose fields are trusted blindly.

/// What `IndexCursor::advance` should do when `fetchForUpdate` reports that a
/// row's lock is held elsewhere and the wait does not resolve.
///
/// spec.md's Design Notes flag this as something that must be a
/// configuration option rather than the hard-coded default the original
/// engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDeniedPolicy {
    /// Treat a denied lock exactly like "no visible record" and move on to
    /// the next candidate. This is the original engine's only behavior.
    Skip,
    /// Surface the denied lock to the caller as a distinguishable
    /// `ScanOutcome::LockDenied` instead of silently skipping the row.
    Surface,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub lock_denied_policy: LockDeniedPolicy,
    /// Upper bound on how many `(key, record_id)` entries an `IndexCursor`
    /// will hold in its page buffer at once.
    pub max_page_buffer_entries: usize,
    /// Upper bound on how many child cursors a single `MergeWalker` will
    /// merge. Exists so a misconfigured caller gets a clear validation
    /// error instead of an arena that grows without bound.
    pub max_merge_fanin: usize,
}

impl ScanConfig {
    /// Default for callers that want the original engine's exact behavior:
    /// a denied lock is silently treated as an absent row.
    pub fn permissive() -> Self {
        Self {
            lock_denied_policy: LockDeniedPolicy::Skip,
            max_page_buffer_entries: 256,
            max_merge_fanin: 64,
        }
    }

    /// For callers that need to distinguish "row doesn't exist" from "row
    /// exists but is locked" — e.g. to retry the whole scan instead of
    /// silently returning a partial result.
    pub fn strict() -> Self {
        Self {
            lock_denied_policy: LockDeniedPolicy::Surface,
            max_page_buffer_entries: 256,
            max_merge_fanin: 64,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_page_buffer_entries == 0 {
            return Err("max_page_buffer_entries must be > 0".to_string());
        }
        if self.max_merge_fanin == 0 {
            return Err("max_merge_fanin must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::permissive()
    }
}
