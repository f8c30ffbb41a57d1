//! # Response Interpreter
//!
//! Classifies authority status codes into the outcome categories that
//! drive retry and escalation policy. The mapping is table-driven and
//! total: every numeric code lands in exactly one category, and a code
//! the table does not know is a fatal rejection with the raw code
//! preserved for audit, never a silent drop.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::response::AuthorityResponse;

/// Outcome category of an authority response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Document authorized (or service/event operation succeeded).
    Success,
    /// Batch received, awaiting asynchronous authorization; poll the
    /// receipt.
    Pending,
    /// Business rule failure that a corrected resubmission could fix.
    /// Never retried automatically.
    RejectedRecoverable,
    /// Malformed or duplicate submission. Never retried.
    RejectedFatal,
    /// The authority reports itself down; route to contingency.
    ServiceUnavailable,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "SUCCESS",
            Self::Pending => "PENDING",
            Self::RejectedRecoverable => "REJECTED_RECOVERABLE",
            Self::RejectedFatal => "REJECTED_FATAL",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        };
        f.write_str(s)
    }
}

/// The status-code classification table.
///
/// Built-in rows cover the codes the protocol itself defines; deployments
/// extend the recoverable set for codes their correction workflow can
/// handle (wrong totals, stale registration data, and the like).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTable {
    /// Codes classified as [`Outcome::RejectedRecoverable`] on top of
    /// the built-in rows.
    recoverable: BTreeSet<u16>,
}

impl StatusTable {
    /// A table with only the built-in rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the recoverable set.
    pub fn with_recoverable(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            recoverable: codes.into_iter().collect(),
        }
    }

    /// Add one code to the recoverable set.
    pub fn add_recoverable(&mut self, code: u16) {
        self.recoverable.insert(code);
    }

    /// Classify a status code. Total: every `u16` maps to a category.
    pub fn classify(&self, status: u16) -> Outcome {
        match status {
            // 100: document authorized; 150: authorized past deadline.
            100 | 150 => Outcome::Success,
            // 103: batch received; 104: batch processed (container);
            // 105: batch still in processing.
            103 | 104 | 105 => Outcome::Pending,
            // 107: service operational (heartbeat).
            107 => Outcome::Success,
            // 135/136: event registered.
            135 | 136 => Outcome::Success,
            // 108/109: service paralyzed (momentarily / indefinitely).
            108 | 109 => Outcome::ServiceUnavailable,
            code if self.recoverable.contains(&code) => Outcome::RejectedRecoverable,
            _ => Outcome::RejectedFatal,
        }
    }

    /// Classify a full response.
    pub fn classify_response(&self, response: &AuthorityResponse) -> Outcome {
        self.classify(response.status)
    }
}
