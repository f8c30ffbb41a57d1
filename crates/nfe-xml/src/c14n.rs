//! # Exclusive Canonicalization
//!
//! Serializes an element subtree in exclusive-C14N form for digest
//! computation. The rules implemented cover the document class this
//! engine produces and verifies: default namespaces (the fiscal layout
//! and XML-DSig both bind the default namespace, never prefixes),
//! unprefixed attributes, character data, no comments.
//!
//! - Elements render as `<name>…</name>`, never self-closed.
//! - A default-namespace declaration is emitted on the subtree root when
//!   the namespace in scope differs from what the output has rendered,
//!   and on any descendant that changes it.
//! - Namespace declarations render before other attributes; remaining
//!   attributes sort by name.
//! - Text and attribute escaping follow the canonical-XML rules shared
//!   with the writer.
//!
//! The enveloped-signature transform is supported by skipping `Signature`
//! elements bound to the XML-DSig namespace while serializing.

use crate::tree::{Element, Node};
use crate::writer::{escape_attr, escape_text, CanonicalXml};

/// The XML-DSig namespace.
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Options for a canonicalization pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct C14nOptions {
    /// Apply the enveloped-signature transform: skip `Signature`
    /// elements in the XML-DSig namespace.
    pub strip_signatures: bool,
}

/// Canonicalize `elem` with `inscope_default_ns` as the default namespace
/// in scope at the subtree root (as returned by
/// [`Element::find_by_id_scoped`]).
pub fn canonicalize(
    elem: &Element,
    inscope_default_ns: &str,
    options: C14nOptions,
) -> CanonicalXml {
    let mut out = String::new();
    serialize(elem, inscope_default_ns, "", options, &mut out);
    CanonicalXml::from_canonical_string(out)
}

fn serialize(
    elem: &Element,
    inscope_default: &str,
    rendered_default: &str,
    options: C14nOptions,
    out: &mut String,
) {
    let effective = elem.attr("xmlns").unwrap_or(inscope_default);

    if options.strip_signatures && elem.local_name() == "Signature" && effective == XMLDSIG_NS {
        return;
    }

    out.push('<');
    out.push_str(&elem.name);

    // Namespace declaration first, then remaining attributes by name.
    if effective != rendered_default {
        out.push_str(" xmlns=\"");
        escape_attr(effective, out);
        out.push('"');
    }
    let mut attrs: Vec<&(String, String)> = elem
        .attrs
        .iter()
        .filter(|(k, _)| k != "xmlns" && !k.starts_with("xmlns:"))
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(&b.0));
    for (k, v) in attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        escape_attr(v, out);
        out.push('"');
    }
    out.push('>');

    for child in &elem.children {
        match child {
            Node::Element(e) => serialize(e, effective, effective, options, out),
            Node::Text(t) => escape_text(t, out),
        }
    }

    out.push_str("</");
    out.push_str(&elem.name);
    out.push('>');
}
