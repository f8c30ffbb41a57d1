//! # Document Lifecycle State Machine
//!
//! Models the emission lifecycle of a fiscal document.
//!
//! ## States
//!
//! ```text
//! DRAFT → SIGNED → SUBMITTED → AUTHORIZED | REJECTED
//!            └───→ CONTINGENCY → SUBMITTED → …
//! ```
//!
//! A document never regresses to an earlier state. Invalid transition
//! attempts fail with [`StateError::InvalidTransition`] instead of
//! silently succeeding.

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// The lifecycle state of a fiscal document within the emission engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentState {
    /// Document built and tax-calculated, untouched by this engine.
    Draft,
    /// The signature engine has produced a signed envelope.
    Signed,
    /// Normal submission was judged unavailable; the signed envelope is
    /// queued for reconciliation.
    Contingency,
    /// The authority has received the document (final result may still
    /// be pending an asynchronous poll).
    Submitted,
    /// The authority authorized the document. Terminal state.
    Authorized,
    /// The authority rejected the document. Terminal state; a human must
    /// correct and re-emit.
    Rejected,
}

impl DocumentState {
    /// Whether this is a terminal state (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authorized | Self::Rejected)
    }

    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Signed => "SIGNED",
            Self::Contingency => "CONTINGENCY",
            Self::Submitted => "SUBMITTED",
            Self::Authorized => "AUTHORIZED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Whether `to` is a legal successor of this state.
    ///
    /// No wildcard arm: adding a new variant forces a compiler error here
    /// rather than silently falling through.
    pub fn can_transition_to(&self, to: DocumentState) -> bool {
        match self {
            Self::Draft => matches!(to, Self::Signed),
            Self::Signed => matches!(to, Self::Submitted | Self::Contingency),
            Self::Contingency => matches!(to, Self::Submitted),
            Self::Submitted => matches!(to, Self::Authorized | Self::Rejected),
            Self::Authorized | Self::Rejected => false,
        }
    }

    /// Validate a transition, returning the new state or a structured
    /// rejection.
    pub fn transition_to(&self, to: DocumentState) -> Result<DocumentState, StateError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(StateError::InvalidTransition {
                from: *self,
                to,
                reason: if self.is_terminal() {
                    "state is terminal".into()
                } else {
                    "not a legal successor".into()
                },
            })
        }
    }
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
