//! # nfe-sign — Enveloped Signatures for the NF-e Emission Engine
//!
//! This crate turns canonical XML into legally-signed envelopes:
//!
//! - [`capability`]: the [`SigningCapability`] trait with file-based and
//!   hardware-token providers; token signing is serialized per physical
//!   key, file keys sign concurrently.
//! - [`certificate`]: the certificate metadata and public material that
//!   cross the signing boundary (subject, serial, validity window, key).
//! - [`engine`]: enveloped XML-DSig production and verification with a
//!   fixed algorithm suite: exclusive C14N, SHA-256, RSA-SHA256.
//!
//! Certificate provisioning and rotation live outside this crate; only
//! `sign(digest) -> bytes` plus metadata come in.

pub mod capability;
pub mod certificate;
pub mod engine;
pub mod error;

// Re-export primary types.
pub use capability::{FileKeyProvider, SigningCapability, TokenKeyProvider, TokenSigner};
pub use certificate::CertificateInfo;
pub use engine::{sign, verify, SignedEnvelope};
pub use error::SignError;
