//! Transport error types.
//!
//! Everything here is the transient, network-level failure class:
//! eligible for contingency routing and retry. Business rejections are
//! not errors; they arrive as well-formed [`AuthorityResponse`]s with a
//! non-success status and are classified by the interpreter.
//!
//! [`AuthorityResponse`]: crate::response::AuthorityResponse

use thiserror::Error;

/// A transport-level failure talking to the authority.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed, was refused, or broke mid-call.
    #[error("authority unreachable at {endpoint}: {reason}")]
    Unavailable {
        /// The endpoint URL that was called.
        endpoint: String,
        /// Description of the network failure.
        reason: String,
    },

    /// The call exceeded its bounded timeout or the caller's deadline.
    #[error("call to {endpoint} timed out after {elapsed_ms}ms")]
    Timeout {
        /// The endpoint URL that was called.
        endpoint: String,
        /// Elapsed time before the timeout fired.
        elapsed_ms: u64,
    },

    /// The authority answered with bytes that do not parse as a response
    /// envelope.
    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse {
        /// The endpoint URL that was called.
        endpoint: String,
        /// What failed to parse.
        reason: String,
    },
}
