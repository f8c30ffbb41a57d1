//! # Error Types — Structured Error Hierarchy
//!
//! Shared error types for the emission engine core. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Validation errors name the offending field and fail before any
//!   network interaction.
//! - State machine errors include the current state, the attempted
//!   transition, and the rejection reason.
//! - Callers branch on the error variant, never on message strings.

use thiserror::Error;

use crate::lifecycle::DocumentState;

/// A field-level validation failure.
///
/// Raised by identifier constructors and by the document assembler before
/// any signature or network work happens. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A field value does not match its fixed width or format.
    #[error("invalid value for field {field}: {reason}")]
    InvalidField {
        /// Canonical name of the offending field (e.g. `cNF`, `serie`).
        field: &'static str,
        /// Description of the violation.
        reason: String,
    },

    /// A required field is absent from the document model.
    #[error("missing required field {field} in {element}")]
    MissingRequiredField {
        /// The XML element the field belongs to.
        element: &'static str,
        /// Canonical name of the missing field.
        field: &'static str,
    },
}

impl ValidationError {
    /// Shorthand for an [`ValidationError::InvalidField`] with a formatted reason.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors in document lifecycle transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Attempted an invalid lifecycle transition.
    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        /// Current document state.
        from: DocumentState,
        /// Attempted target state.
        to: DocumentState,
        /// Reason the transition was rejected.
        reason: String,
    },

    /// The document is already in a terminal state.
    #[error("document {access_key} is in terminal state {state}")]
    AlreadyTerminal {
        /// Access key of the document.
        access_key: String,
        /// The terminal state.
        state: DocumentState,
    },
}
