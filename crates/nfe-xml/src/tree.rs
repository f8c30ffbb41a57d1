//! # Element Tree
//!
//! A lightweight owned XML tree used on the verification and response
//! paths, parsed with `quick-xml`. Comments, processing instructions and
//! the XML declaration are dropped during parsing, matching
//! canonical-form-without-comments semantics: bytes outside elements do
//! not take part in digests.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::XmlError;

/// A node in the tree: an element or character data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A child element.
    Element(Element),
    /// Character data (entity references already resolved).
    Text(String),
}

/// An owned XML element.
///
/// Attribute order is preserved as parsed; namespace declarations appear
/// as ordinary `xmlns`/`xmlns:*` attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written (`ns:local` or `local`).
    pub name: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

impl Element {
    /// Create an element with no attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<Element, XmlError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let elem = element_from_start(&start)?;
                    stack.push(elem);
                }
                Event::Empty(start) => {
                    let elem = element_from_start(&start)?;
                    attach(&mut stack, &mut root, elem)?;
                }
                Event::End(_) => {
                    let elem = stack.pop().ok_or_else(|| {
                        XmlError::Malformed("close tag without matching open".into())
                    })?;
                    attach(&mut stack, &mut root, elem)?;
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?
                        .into_owned();
                    if let Some(parent) = stack.last_mut() {
                        // Whitespace-only runs between elements are layout
                        // artifacts, not data.
                        if !text.chars().all(char::is_whitespace) {
                            parent.children.push(Node::Text(text));
                        }
                    }
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(c.as_ref()).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(text));
                    }
                }
                // Comments, PIs, doctype and the declaration carry no
                // canonical content.
                Event::Comment(_) | Event::PI(_) | Event::DocType(_) | Event::Decl(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Malformed("unclosed element at end of input".into()));
        }
        root.ok_or(XmlError::NoRoot)
    }

    /// The local part of the element name (after any prefix).
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// Look up an attribute value by exact name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated character data of this element's direct children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let Node::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Depth-first search for the first descendant (or self) with the
    /// given local name.
    pub fn find_first(&self, local_name: &str) -> Option<&Element> {
        if self.local_name() == local_name {
            return Some(self);
        }
        for child in self.child_elements() {
            if let Some(found) = child.find_first(local_name) {
                return Some(found);
            }
        }
        None
    }

    /// Depth-first search for the element carrying `Id="id"`, tracking
    /// the default namespace in scope at the match.
    ///
    /// Returns the element and the effective default namespace (the
    /// nearest `xmlns` declaration on the path from the root).
    pub fn find_by_id_scoped<'a>(&'a self, id: &str) -> Option<(&'a Element, String)> {
        self.find_by_id_inner(id, "")
    }

    fn find_by_id_inner<'a>(&'a self, id: &str, inherited_ns: &str) -> Option<(&'a Element, String)> {
        let effective = self.attr("xmlns").unwrap_or(inherited_ns);
        if self.attr("Id") == Some(id) {
            return Some((self, effective.to_string()));
        }
        for child in self.child_elements() {
            if let Some(found) = child.find_by_id_inner(id, effective) {
                return Some(found);
            }
        }
        None
    }
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Element, XmlError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| XmlError::Malformed(e.to_string()))?
        .to_string();
    let mut elem = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| XmlError::Malformed(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Malformed(e.to_string()))?
            .into_owned();
        elem.attrs.push((key, value));
    }
    Ok(elem)
}

fn attach(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    elem: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(elem));
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(XmlError::Malformed("multiple root elements".into()));
            }
            *root = Some(elem);
            Ok(())
        }
    }
}
