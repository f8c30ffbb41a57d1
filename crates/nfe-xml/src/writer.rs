//! # Byte-Stable XML Writer
//!
//! The sole construction path for the XML fragments this engine signs.
//!
//! ## Security Invariant
//!
//! [`CanonicalXml`] has a private inner field. The only ways to produce
//! one are [`XmlBuilder::finish`] and the canonicalizer, both of which
//! emit the canonical serialization rules below. Any function that needs
//! signable bytes must accept `&CanonicalXml`, so a non-canonical string
//! can never reach the digest.
//!
//! ## Serialization rules
//!
//! Matched to exclusive-C14N output so that writing and canonicalizing
//! agree byte for byte:
//!
//! - no XML declaration, no insignificant whitespace, UTF-8;
//! - empty elements as `<a></a>`, never `<a/>`;
//! - text escapes `&`, `<`, `>` and carriage return;
//! - attribute values escape `&`, `<`, `"`, tab, newline, carriage return;
//! - attributes render in the order given (the assembler emits namespace
//!   declarations first, then attributes in layout order).

use crate::error::XmlError;

/// Bytes produced exclusively by the canonical writer or canonicalizer.
///
/// Two productions of an unchanged document are byte-identical, which is
/// what makes the digest over this form reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalXml(String);

impl CanonicalXml {
    pub(crate) fn from_canonical_string(s: String) -> Self {
        Self(s)
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Consume into the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CanonicalXml {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape character data per canonical-XML text rules.
pub(crate) fn escape_text(raw: &str, out: &mut String) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

/// Escape an attribute value per canonical-XML attribute rules.
pub(crate) fn escape_attr(raw: &str, out: &mut String) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

/// A push-style writer for canonical fragments.
#[derive(Debug, Default)]
pub struct XmlBuilder {
    buf: String,
    stack: Vec<&'static str>,
}

impl XmlBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an element with no attributes.
    pub fn open(&mut self, name: &'static str) -> &mut Self {
        self.open_with_attrs(name, &[])
    }

    /// Open an element with attributes in the given order.
    pub fn open_with_attrs(&mut self, name: &'static str, attrs: &[(&str, &str)]) -> &mut Self {
        self.buf.push('<');
        self.buf.push_str(name);
        for (k, v) in attrs {
            self.buf.push(' ');
            self.buf.push_str(k);
            self.buf.push_str("=\"");
            escape_attr(v, &mut self.buf);
            self.buf.push('"');
        }
        self.buf.push('>');
        self.stack.push(name);
        self
    }

    /// Close the most recently opened element.
    pub fn close(&mut self) -> &mut Self {
        if let Some(name) = self.stack.pop() {
            self.buf.push_str("</");
            self.buf.push_str(name);
            self.buf.push('>');
        }
        self
    }

    /// Write `<name>text</name>`.
    pub fn leaf(&mut self, name: &'static str, text: &str) -> &mut Self {
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push('>');
        escape_text(text, &mut self.buf);
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push('>');
        self
    }

    /// Write `<name>text</name>` only when `text` is present.
    pub fn leaf_opt(&mut self, name: &'static str, text: Option<&str>) -> &mut Self {
        if let Some(t) = text {
            self.leaf(name, t);
        }
        self
    }

    /// Splice an already-canonical fragment into the stream.
    pub fn fragment(&mut self, fragment: &CanonicalXml) -> &mut Self {
        self.buf.push_str(fragment.as_str());
        self
    }

    /// Splice a stored fragment whose canonical provenance is tracked by
    /// the caller (a persisted signed document re-entering a batch).
    /// The bytes are emitted verbatim; re-escaping them would break the
    /// signature they carry.
    pub fn raw(&mut self, stored: &str) -> &mut Self {
        self.buf.push_str(stored);
        self
    }

    /// Finish the fragment. Fails if elements are left open.
    pub fn finish(self) -> Result<CanonicalXml, XmlError> {
        if !self.stack.is_empty() {
            return Err(XmlError::Unbalanced {
                open: self.stack.len(),
            });
        }
        Ok(CanonicalXml(self.buf))
    }
}
