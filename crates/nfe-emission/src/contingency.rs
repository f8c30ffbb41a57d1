//! # Contingency Records
//!
//! When normal submission is judged unavailable, the signed envelope is
//! parked in a contingency record until reconciliation drives the
//! document to a terminal state. A record is created at most once per
//! document and deleted only when the document reaches `AUTHORIZED` or
//! `REJECTED`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nfe_core::AccessKey;
use nfe_sign::SignedEnvelope;

/// How the business keeps operating while the authority is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContingencyMode {
    /// Event-based: a lightweight pre-authorization event is registered
    /// immediately, so the document is legally valid while the full
    /// submission waits.
    Epec,
    /// Local storage: the signed document is held locally and resent
    /// whole once the authority is reachable.
    LocalPending,
}

impl std::fmt::Display for ContingencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Epec => f.write_str("EPEC"),
            Self::LocalPending => f.write_str("LOCAL_PENDING"),
        }
    }
}

/// Where a record's envelope is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageLocation {
    /// Process memory only; lost on restart.
    Memory,
    /// A file under the store's directory.
    File(std::path::PathBuf),
}

/// One parked document awaiting reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContingencyRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Access key of the parked document.
    pub access_key: AccessKey,
    /// The signed envelope to resubmit.
    pub envelope: SignedEnvelope,
    /// Contingency mode this record was created under.
    pub mode: ContingencyMode,
    /// Whether the pre-authorization event was registered (EPEC mode).
    pub epec_registered: bool,
    /// Receipt of a batch the authority received but whose result was
    /// lost; reconciliation polls instead of resubmitting.
    pub receipt: Option<String>,
    /// Reconciliation attempts so far.
    pub retry_count: u32,
    /// When the last attempt ran.
    pub last_attempt: Option<DateTime<Utc>>,
    /// The last transport error observed, for diagnostics.
    pub last_error: Option<String>,
    /// Where the record is persisted.
    pub location: StorageLocation,
}

impl ContingencyRecord {
    /// Create a fresh record for a signed envelope.
    pub fn new(access_key: AccessKey, envelope: SignedEnvelope, mode: ContingencyMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            access_key,
            envelope,
            mode,
            epec_registered: false,
            receipt: None,
            retry_count: 0,
            last_attempt: None,
            last_error: None,
            location: StorageLocation::Memory,
        }
    }

    /// Record a failed attempt.
    pub fn note_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_attempt = Some(Utc::now());
        self.last_error = Some(error.into());
    }
}
