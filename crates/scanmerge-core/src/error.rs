use std::fmt;

use crate::record::RecordId;

/// Failures that can escape a scan.
///
/// `NotFound`, `VersionMismatch`, and a denied lock under the default policy
/// never become a `ScanError` — they are handled inside `IndexCursor::advance`
/// and simply cause that candidate row to be skipped. Only conditions that
/// leave the scan's own state untrustworthy are represented here.
#[derive(Debug)]
pub enum ScanError {
    /// The resolver reported a lock wait that could not make progress.
    Deadlock { scan_id: u64, waiting_on: RecordId },
    /// An external collaborator (index page source, resolver) returned an
    /// I/O-shaped failure.
    Storage { index_name: String, message: String },
    /// Decoded data did not match the shape the cursor expected.
    Corruption { index_name: String, detail: String },
    /// An internal invariant was violated. This indicates a bug in
    /// scanmerge-core itself, not a caller error.
    InvariantViolation { invariant: &'static str, detail: String },
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Deadlock { scan_id, waiting_on } => {
                write!(f, "scan {scan_id} deadlocked waiting on record {waiting_on:?}")
            }
            ScanError::Storage { index_name, message } => {
                write!(f, "storage error from index '{index_name}': {message}")
            }
            ScanError::Corruption { index_name, detail } => {
                write!(f, "corrupt data from index '{index_name}': {detail}")
            }
            ScanError::InvariantViolation { invariant, detail } => {
                write!(f, "invariant '{invariant}' violated: {detail}")
            }
        }
    }
}

impl std::error::Error for ScanError {}

pub type ScanResult<T> = Result<T, ScanError>;

/// Log and panic on a broken internal invariant, per spec.md §4.8: an AVL
/// invariant violation is a programming bug, not a recoverable error.
pub(crate) fn abort_invariant(invariant: &'static str, detail: impl Into<String>) -> ! {
    let detail = detail.into();
    tracing::error!(invariant, %detail, "merge tree invariant violated");
    panic!("scanmerge-core invariant '{invariant}' violated: {detail}");
}
