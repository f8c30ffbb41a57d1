//! # nfe-xml — Deterministic XML for the NF-e Emission Engine
//!
//! Everything the engine signs is produced here, under one rule: the
//! rendered byte sequence is a pure function of the input model.
//!
//! - [`writer`]: the byte-stable writer and the [`CanonicalXml`] newtype,
//!   the only construction paths for signable bytes.
//! - [`assembler`]: the fiscal document and contingency-event assemblers,
//!   fixed element order and numeric formatting per the layout.
//! - [`tree`]: an owned element tree for the verification and response
//!   parsing paths.
//! - [`c14n`]: exclusive canonicalization of a subtree, including the
//!   enveloped-signature transform.

pub mod assembler;
pub mod c14n;
pub mod error;
pub mod tree;
pub mod writer;

// Re-export primary types.
pub use assembler::{
    assemble, assemble_epec_event, EpecEvent, EPEC_EVENT_TYPE, LAYOUT_VERSION, NFE_NAMESPACE,
};
pub use c14n::{canonicalize, C14nOptions, XMLDSIG_NS};
pub use error::XmlError;
pub use tree::{Element, Node};
pub use writer::{CanonicalXml, XmlBuilder};
