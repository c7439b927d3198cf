//! Owned XML element tree for XML message bodies and attachments.

use std::fmt;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An XML element with its attributes, character data and child elements.
///
/// Character data is concatenated in document order; mixed content keeps
/// its text but not the interleaving with children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlElement {
    /// Qualified element name.
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    /// Unescaped character data.
    pub text: String,
}

impl XmlElement {
    /// Creates an empty element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Adds a child element.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Sets the character data.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Returns the value of an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the first child with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Parses a document with exactly one root element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] for malformed XML, a missing root or more
    /// than one root.
    pub fn parse(input: &str) -> Result<Self> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut open: Vec<Self> = Vec::new();
        let mut root: Option<Self> = None;

        loop {
            match reader.read_event().map_err(invalid)? {
                Event::Start(start) => open.push(element(&start)?),
                Event::Empty(start) => attach(&mut open, &mut root, element(&start)?)?,
                Event::End(_) => {
                    let done = open
                        .pop()
                        .ok_or_else(|| Error::Codec("invalid XML: unbalanced end tag".into()))?;
                    attach(&mut open, &mut root, done)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(invalid)?;
                    match open.last_mut() {
                        Some(current) => current.text.push_str(&text),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(Error::Codec(
                                "invalid XML: text outside the root element".into(),
                            ));
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = open.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(Error::Codec("invalid XML: unclosed element".into()));
        }
        root.ok_or_else(|| Error::Codec("invalid XML: no root element".into()))
    }
}

fn invalid(err: impl fmt::Display) -> Error {
    Error::Codec(format!("invalid XML: {err}"))
}

fn element(start: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attribute in start.attributes() {
        let attribute = attribute.map_err(invalid)?;
        let value = attribute.unescape_value().map_err(invalid)?;
        element.attributes.push((
            String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(element)
}

fn attach(open: &mut [XmlElement], root: &mut Option<XmlElement>, done: XmlElement) -> Result<()> {
    if let Some(parent) = open.last_mut() {
        parent.children.push(done);
    } else if root.is_some() {
        return Err(Error::Codec("invalid XML: more than one root element".into()));
    } else {
        *root = Some(done);
    }
    Ok(())
}

impl fmt::Display for XmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (key, value) in &self.attributes {
            write!(f, " {key}=\"{}\"", escape(value.as_str()))?;
        }
        if self.text.is_empty() && self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        f.write_str(&escape(self.text.as_str()))?;
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "</{}>", self.name)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_document() {
        let doc = r#"<?xml version="1.0"?>
            <order id="7">
                <item sku="a&amp;b">Tea</item>
                <item sku="c"/>
                <note><![CDATA[<fragile>]]></note>
            </order>"#;
        let order = XmlElement::parse(doc).unwrap();

        assert_eq!(order.name, "order");
        assert_eq!(order.attribute("id"), Some("7"));
        assert_eq!(order.children.len(), 3);
        assert_eq!(order.children[0].attribute("sku"), Some("a&b"));
        assert_eq!(order.children[0].text, "Tea");
        assert!(order.children[1].children.is_empty());
        assert_eq!(order.child("note").unwrap().text, "<fragile>");
    }

    #[test]
    fn display_escapes_and_reparses() {
        let element = XmlElement::new("greeting")
            .with_attribute("lang", "en \"gb\"")
            .with_text("fish & chips")
            .with_child(XmlElement::new("empty"));
        let text = element.to_string();

        assert!(text.contains("fish &amp; chips"));
        assert!(text.contains("<empty/>"));
        assert_eq!(XmlElement::parse(&text).unwrap(), element);
    }

    #[test]
    fn rejects_malformed_documents() {
        for doc in ["", "<a>", "<a></b>", "<a/><b/>", "plain text"] {
            let err = XmlElement::parse(doc).unwrap_err();
            assert_eq!(err.kind(), "CodecError", "{doc:?}");
        }
    }
}
