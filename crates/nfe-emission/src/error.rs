//! Orchestrator error types.
//!
//! The four failure classes of an emission keep their distinct types so
//! callers branch on category, never on message strings: validation
//! ([`nfe_core::ValidationError`], pre-network, never retried), signature
//! ([`nfe_sign::SignError`], fatal, nothing is submitted), transport
//! ([`nfe_sefaz::TransportError`], transient, contingency-eligible), and
//! lifecycle violations ([`nfe_core::StateError`]).

use thiserror::Error;

/// Errors surfaced by the emission orchestrator.
#[derive(Error, Debug)]
pub enum EmissionError {
    /// Field-level validation failure; returned to the caller before any
    /// signature or network work.
    #[error(transparent)]
    Validation(#[from] nfe_core::ValidationError),

    /// Illegal document lifecycle transition.
    #[error(transparent)]
    State(#[from] nfe_core::StateError),

    /// Signature production failed; no submission is attempted.
    #[error(transparent)]
    Signature(#[from] nfe_sign::SignError),

    /// Transport failure surfaced to the caller (deadline aborts). The
    /// document stays `SIGNED` and is safe to retry or route to
    /// contingency.
    #[error(transparent)]
    Transport(#[from] nfe_sefaz::TransportError),

    /// Repository failure.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    /// The contingency retry ceiling was exceeded; a human must step in.
    /// The document is not auto-cancelled.
    #[error("escalation required for {access_key}: {attempts} reconciliation attempts exhausted")]
    EscalationRequired {
        /// Access key of the stuck document.
        access_key: String,
        /// Attempts made so far.
        attempts: u32,
    },
}
