//! Minimal mutable XML tree for domain and network definitions.
//!
//! Parsing goes through `quick-xml`; the tree keeps mixed content (text,
//! comments, CDATA) so a base template survives a patch untouched apart from
//! the elements that were rewritten. Serialization writes childless elements
//! self-closing as `<tag attr="value" />`.

use crate::error::{DomainError, Result};
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt;

/// A node inside an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    CData(String),
}

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style child appender.
    pub fn with_child(mut self, child: Element) -> Self {
        self.append(child);
        self
    }

    /// Builder-style text setter.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// Parse a document and return its root element.
    ///
    /// # Errors
    /// Returns [`DomainError::Definition`] if the text is not well-formed or
    /// does not contain exactly one root element.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event().map_err(malformed)? {
                Event::Start(start) => stack.push(Element::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| DomainError::Definition("unexpected closing tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => match stack.last_mut() {
                    Some(parent) => {
                        let text = text.unescape().map_err(malformed)?;
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                    None if text.iter().all(u8::is_ascii_whitespace) => {}
                    None => {
                        return Err(DomainError::Definition(
                            "text outside of the root element".into(),
                        ))
                    }
                },
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.children.push(Node::CData(data));
                    }
                }
                Event::Comment(comment) => {
                    if let Some(parent) = stack.last_mut() {
                        let comment = String::from_utf8_lossy(&comment).into_owned();
                        parent.children.push(Node::Comment(comment));
                    }
                }
                Event::Eof => break,
                // Declarations, processing instructions and doctypes are dropped.
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(DomainError::Definition(format!(
                "unclosed element <{}>",
                open.name
            )));
        }
        root.ok_or_else(|| DomainError::Definition("document has no root element".into()))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(malformed)?
            .to_string();
        let mut element = Element::new(name);
        for attr in start.attributes() {
            let attr = attr.map_err(malformed)?;
            let key = std::str::from_utf8(attr.key.as_ref()).map_err(malformed)?;
            let value = attr.unescape_value().map_err(malformed)?;
            element.set_attr(key, value.into_owned());
        }
        Ok(element)
    }

    /// Tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value, if present.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, overwriting in place if it already exists.
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// Concatenated text content of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace the direct text content, keeping element children in place.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children
            .retain(|node| !matches!(node, Node::Text(_) | Node::CData(_)));
        self.children.insert(0, Node::Text(text.into()));
    }

    /// All child nodes, in document order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Mutable child elements, in document order.
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First direct child with the given tag.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.elements().find(|element| element.name == name)
    }

    /// First direct child with the given tag, mutably.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|element| element.name == name)
    }

    /// First direct child with the given tag, appending an empty one if absent.
    pub fn find_or_append(&mut self, name: &str) -> &mut Element {
        let index = self
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(e) if e.name == name));
        let index = match index {
            Some(index) => index,
            None => {
                self.children.push(Node::Element(Element::new(name)));
                self.children.len() - 1
            }
        };
        match &mut self.children[index] {
            Node::Element(element) => element,
            _ => unreachable!("index points at an element node"),
        }
    }

    /// Append a child element.
    pub fn append(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Serialize the element and its subtree.
    pub fn to_xml(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (key, value) in &self.attributes {
            write!(f, " {}=\"{}\"", key, escape(value.as_str()))?;
        }
        if self.children.is_empty() {
            return write!(f, " />");
        }
        write!(f, ">")?;
        for child in &self.children {
            match child {
                Node::Element(element) => write!(f, "{element}")?,
                Node::Text(text) => write!(f, "{}", partial_escape(text.as_str()))?,
                Node::Comment(comment) => write!(f, "<!--{comment}-->")?,
                Node::CData(data) => write!(f, "<![CDATA[{data}]]>")?,
            }
        }
        write!(f, "</{}>", self.name)
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.append(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(DomainError::Definition(
            "document has more than one root element".into(),
        )),
    }
}

fn malformed(error: impl fmt::Display) -> DomainError {
    DomainError::Definition(format!("malformed document: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_serialize_preserves_content() {
        let text = "<network>\n  <forward mode=\"nat\"/>\n  <!-- keep -->\n</network>";
        let root = Element::parse(text).unwrap();
        assert_eq!(root.name(), "network");
        assert_eq!(
            root.to_xml(),
            "<network>\n  <forward mode=\"nat\" />\n  <!-- keep -->\n</network>"
        );
    }

    #[test]
    fn test_childless_element_is_self_closing() {
        let root = Element::parse("<domain></domain>").unwrap();
        assert_eq!(root.to_xml(), "<domain />");
    }

    #[test]
    fn test_find_or_append_reuses_existing() {
        let mut root = Element::parse("<domain><devices><disk /></devices></domain>").unwrap();
        root.find_or_append("devices").append(Element::new("console"));
        assert_eq!(root.elements().count(), 1);
        assert_eq!(
            root.to_xml(),
            "<domain><devices><disk /><console /></devices></domain>"
        );
    }

    #[test]
    fn test_set_text_and_attr_overwrite() {
        let mut root = Element::parse("<domain type=\"lxc\"><name>old</name></domain>").unwrap();
        root.set_attr("type", "kvm");
        root.find_mut("name").unwrap().set_text("new");
        assert_eq!(root.attr("type"), Some("kvm"));
        assert_eq!(root.find("name").unwrap().text(), "new");
        assert_eq!(root.to_xml(), "<domain type=\"kvm\"><name>new</name></domain>");
    }

    #[test]
    fn test_escaping() {
        let root = Element::new("source")
            .with_attr("dir", "/a \"b\" & c")
            .with_text("1 < 2");
        assert_eq!(
            root.to_xml(),
            "<source dir=\"/a &quot;b&quot; &amp; c\">1 &lt; 2</source>"
        );
        let parsed = Element::parse(&root.to_xml()).unwrap();
        assert_eq!(parsed.attr("dir"), Some("/a \"b\" & c"));
        assert_eq!(parsed.text(), "1 < 2");
    }

    #[test]
    fn test_declaration_is_dropped() {
        let root = Element::parse("<?xml version=\"1.0\"?>\n<domain/>").unwrap();
        assert_eq!(root.to_xml(), "<domain />");
    }

    #[test]
    fn test_malformed_documents() {
        for text in [
            "",
            "   ",
            "<domain>",
            "<domain></network>",
            "<a/><b/>",
            "junk<domain/>",
        ] {
            let err = Element::parse(text).unwrap_err();
            assert!(
                matches!(err, DomainError::Definition(_)),
                "expected definition error for {text:?}, got {err:?}"
            );
        }
    }
}
