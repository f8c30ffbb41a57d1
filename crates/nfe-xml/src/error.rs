//! XML layer error types.

use thiserror::Error;

/// Errors from parsing or producing XML.
#[derive(Error, Debug)]
pub enum XmlError {
    /// The input is not well-formed XML.
    #[error("malformed XML: {0}")]
    Malformed(String),

    /// The writer was finished with unclosed elements.
    #[error("unbalanced writer: {open} element(s) still open")]
    Unbalanced {
        /// Number of elements left open.
        open: usize,
    },

    /// The document contains no root element.
    #[error("document has no root element")]
    NoRoot,
}

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
