//! Minimal XML element tree for catalog documents and install scripts.
//!
//! Documents are small, so they are read fully into an [`Element`] tree,
//! queried and edited in memory, and written back in one go.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

/// Errors raised while reading or writing XML documents.
#[derive(thiserror::Error, Debug)]
pub enum XmlError {
    /// The input is not well-formed.
    #[error("XML parse error: {0}")]
    Parse(String),

    /// The input holds no element at all.
    #[error("XML parse error: no root element found")]
    NoRoot,

    /// The root element does not carry the expected tag.
    #[error("unexpected root element <{found}>, expected <{expected}>")]
    UnexpectedRoot {
        /// Tag the document should start with.
        expected: String,
        /// Tag actually found.
        found: String,
    },

    /// Serialization failed.
    #[error("XML write error: {0}")]
    Write(String),
}

/// One element of a parsed document: tag, attributes in document order,
/// trimmed text content and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Element name.
    pub tag: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Concatenated, trimmed text content.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<Element>,
}

impl Element {
    /// Create an empty element.
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style text setter.
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Set an attribute, replacing any previous value.
    pub fn set_attr(&mut self, key: &str, value: &str) {
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value.to_string();
        } else {
            self.attributes.push((key.to_string(), value.to_string()));
        }
    }

    /// Value of the named attribute.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Mutable access to the first child with the given tag.
    pub fn child_mut(&mut self, tag: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.tag == tag)
    }

    /// All children with the given tag.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Text of the first child with the given tag.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.child(tag).map(|c| c.text.as_str())
    }

    /// Append a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Remove every child with the given tag, returning how many went away.
    pub fn remove_children(&mut self, tag: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|c| c.tag != tag);
        before - self.children.len()
    }

    /// Parse a document and return its root element.
    ///
    /// # Errors
    ///
    /// Fails on malformed XML or a document without element.
    pub fn parse(input: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        // Open elements, innermost last
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                XmlError::Parse(format!("{e} (at byte {})", reader.buffer_position()))
            })?;
            match event {
                Event::Start(e) => stack.push(Self::from_start(&e)?),
                Event::Empty(e) => {
                    let elt = Self::from_start(&e)?;
                    attach(&mut stack, &mut root, elt)?;
                }
                Event::End(_) => {
                    if let Some(elt) = stack.pop() {
                        attach(&mut stack, &mut root, elt)?;
                    }
                }
                Event::Text(e) => {
                    let text = e
                        .unescape()
                        .map_err(|err| XmlError::Parse(err.to_string()))?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(text.trim());
                    }
                }
                Event::CData(e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::Eof => break,
                // Declarations, comments and processing instructions carry no data
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Parse(format!("unclosed element <{}>", open.tag)));
        }
        root.ok_or(XmlError::NoRoot)
    }

    /// Parse a document whose root must carry `expected` as tag.
    ///
    /// # Errors
    ///
    /// As [`Element::parse`], plus [`XmlError::UnexpectedRoot`].
    pub fn parse_root(input: &str, expected: &str) -> Result<Self, XmlError> {
        let root = Self::parse(input)?;
        if root.tag == expected {
            Ok(root)
        } else {
            Err(XmlError::UnexpectedRoot {
                expected: expected.to_string(),
                found: root.tag,
            })
        }
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let mut elt = Self::new(&String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::Parse(e.to_string()))?
                .into_owned();
            elt.attributes.push((key, value));
        }
        Ok(elt)
    }

    /// Serialize as a standalone UTF-8 document with an XML declaration.
    ///
    /// # Errors
    ///
    /// [`XmlError::Write`] when serialization fails.
    pub fn to_document(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_error)?;
        self.write_to(&mut writer)?;
        let mut out = String::from_utf8(writer.into_inner()).map_err(write_error)?;
        out.push('\n');
        Ok(out)
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.tag.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(write_error);
        }

        writer.write_event(Event::Start(start)).map_err(write_error)?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(write_error)?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.tag.as_str())))
            .map_err(write_error)
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    elt: Element,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(elt);
        Ok(())
    } else if root.is_some() {
        Err(XmlError::Parse(format!(
            "unexpected second root element <{}>",
            elt.tag
        )))
    } else {
        *root = Some(elt);
        Ok(())
    }
}

fn write_error(e: impl std::fmt::Display) -> XmlError {
    XmlError::Write(e.to_string())
}
