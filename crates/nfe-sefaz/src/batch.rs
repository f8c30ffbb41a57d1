//! # Submission Batches
//!
//! A batch (lot) groups one or more signed documents for a single
//! submission attempt. Batches are ephemeral: they exist for the call and
//! are not persisted beyond it.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A 15-digit numeric lot identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LotId(u64);

impl LotId {
    /// Wrap a numeric lot id.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The zero-padded 15-digit form the layout requires.
    pub fn as_digits(&self) -> String {
        format!("{:015}", self.0)
    }
}

impl std::fmt::Display for LotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_digits())
    }
}

/// Monotonic in-process lot id allocator.
///
/// Lot ids only need to be unique per issuer within the authority's
/// retention window; a process-lifetime counter seeded by the caller
/// (typically from persistent storage) is sufficient.
#[derive(Debug)]
pub struct LotSequence {
    next: AtomicU64,
}

impl LotSequence {
    /// Start a sequence at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next lot id.
    pub fn next(&self) -> LotId {
        LotId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// A batch of signed documents for one submission attempt.
#[derive(Debug, Clone)]
pub struct SubmissionBatch {
    /// Lot identifier.
    pub id: LotId,
    /// Signed document XML, one entry per document.
    pub documents: Vec<String>,
    /// Whether synchronous processing is requested (`indSinc`).
    pub synchronous: bool,
}

impl SubmissionBatch {
    /// A single-document batch, the emission engine's common case.
    pub fn single(id: LotId, document: String, synchronous: bool) -> Self {
        Self {
            id,
            documents: vec![document],
            synchronous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lot_id_renders_fifteen_digits() {
        assert_eq!(LotId::new(1).as_digits(), "000000000000001");
        assert_eq!(LotId::new(999_999_999_999_999).as_digits(), "999999999999999");
    }

    #[test]
    fn sequence_is_monotonic() {
        let seq = LotSequence::starting_at(10);
        assert_eq!(seq.next(), LotId::new(10));
        assert_eq!(seq.next(), LotId::new(11));
        assert_eq!(seq.next(), LotId::new(12));
    }

    #[test]
    fn single_batch_holds_one_document() {
        let batch = SubmissionBatch::single(LotId::new(7), "<NFe/>".into(), true);
        assert_eq!(batch.documents.len(), 1);
        assert!(batch.synchronous);
    }
}
