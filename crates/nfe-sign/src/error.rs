//! Signature engine error types.

use thiserror::Error;

/// Errors from signature production and verification.
///
/// Signature errors are fatal for an emission: no submission is attempted
/// after one. Digest or signature-value mismatches during verification are
/// not errors; they surface as a `false` verification result.
#[derive(Error, Debug)]
pub enum SignError {
    /// No element in the document carries the requested `Id`.
    #[error("no element with Id {id:?} in document")]
    ElementNotFound {
        /// The `Id` that was searched for.
        id: String,
    },

    /// The designated element has no `Id` attribute to reference.
    #[error("element {element} has no Id attribute")]
    MissingIdAttribute {
        /// Local name of the element.
        element: String,
    },

    /// The certificate has no usable private key: expired, outside its
    /// validity window, wrong usage, or a hardware token not present.
    #[error("signing key unavailable: {reason}")]
    SigningKeyUnavailable {
        /// Why the key cannot be used.
        reason: String,
    },

    /// The signature block or its cryptographic material is malformed
    /// (missing reference, undecodable base64, unparseable certificate).
    #[error("signature verification failed: {reason}")]
    VerificationFailed {
        /// What was malformed.
        reason: String,
    },

    /// The input is not well-formed XML.
    #[error("xml error: {0}")]
    Xml(#[from] nfe_xml::XmlError),
}
