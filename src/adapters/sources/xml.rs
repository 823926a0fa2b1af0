//! Small namespace-aware element tree over `quick_xml::NsReader`
//!
//! Upstream responses are a few hundred kilobytes at most, so building a tree
//! keeps the parsers declarative (find child, find descendant, read
//! attribute) without a full DOM dependency. Element names are matched by
//! resolved namespace URI plus local name, never by prefix.

use crate::domain::{IngestError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

/// Namespace of elements outside any namespace
pub const NO_NS: &str = "";

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Element(Element),
}

/// One XML element with its attributes and mixed content
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    namespace: String,
    name: String,
    attributes: Vec<(String, String)>,
    nodes: Vec<Node>,
}

impl Element {
    fn open(namespace: String, start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| IngestError::Parse(format!("Bad attribute: {e}")))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            namespace,
            name,
            attributes,
            nodes: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }

    /// Attribute value by local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Direct children with the given name
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children().filter(move |c| c.is(namespace, name))
    }

    /// First direct child with the given name
    pub fn child(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.children().find(|c| c.is(namespace, name))
    }

    /// First descendant (depth-first, document order) with the given name
    pub fn find(&self, namespace: &str, name: &str) -> Option<&Element> {
        for child in self.children() {
            if child.is(namespace, name) {
                return Some(child);
            }
            if let Some(found) = child.find(namespace, name) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants with the given name, in document order
    pub fn find_all(&self, namespace: &str, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_named(namespace, name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, namespace: &str, name: &str, out: &mut Vec<&'a Element>) {
        for child in self.children() {
            if child.is(namespace, name) {
                out.push(child);
            }
            child.collect_named(namespace, name, out);
        }
    }

    /// Trimmed text directly inside this element, `None` when blank
    pub fn text(&self) -> Option<String> {
        let mut text = String::new();
        for node in &self.nodes {
            if let Node::Text(t) = node {
                text.push_str(t);
            }
        }
        non_blank(text)
    }

    /// Trimmed text of this element and all descendants, `None` when blank
    ///
    /// Keeps text that follows inline markup such as `<i>` or `<sup>`.
    pub fn full_text(&self) -> Option<String> {
        let mut text = String::new();
        self.push_text(&mut text);
        non_blank(text)
    }

    fn push_text(&self, out: &mut String) {
        for node in &self.nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.push_text(out),
            }
        }
    }

    /// Text of the first direct child with the given name
    pub fn child_text(&self, namespace: &str, name: &str) -> Option<String> {
        self.child(namespace, name).and_then(Element::full_text)
    }
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn namespace_of(resolved: &ResolveResult<'_>) -> String {
    match resolved {
        ResolveResult::Bound(ns) => String::from_utf8_lossy(ns.as_ref()).into_owned(),
        _ => NO_NS.to_string(),
    }
}

/// Appends a closed element to its parent, or returns it when it is the root
fn attach(stack: &mut [Element], element: Element) -> Option<Element> {
    match stack.last_mut() {
        Some(parent) => {
            parent.nodes.push(Node::Element(element));
            None
        }
        None => Some(element),
    }
}

/// Parses a document and returns its root element
///
/// # Errors
///
/// [`IngestError::Parse`] for malformed XML or a document without a root.
pub fn parse(xml: &str) -> Result<Element> {
    let mut reader = NsReader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();

    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(start) => {
                let element = Element::open(namespace_of(&resolved), &start)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = Element::open(namespace_of(&resolved), &start)?;
                if let Some(root) = attach(&mut stack, element) {
                    return Ok(root);
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| IngestError::Parse("Unbalanced closing tag".to_string()))?;
                if let Some(root) = attach(&mut stack, element) {
                    return Ok(root);
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.nodes.push(Node::Text(text.unescape()?.into_owned()));
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    current.nodes.push(Node::Text(text));
                }
            }
            Event::Eof => {
                return Err(IngestError::Parse(if stack.is_empty() {
                    "Document has no root element".to_string()
                } else {
                    "Document ended before the root element closed".to_string()
                }));
            }
            _ => {}
        }
    }
}
