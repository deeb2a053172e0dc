//! Cursor-based XML document builder.
//!
//! [`XmlBuilder`] is a small state machine: while it is open it holds a stack
//! of elements under construction (the bottom entry is the document root, the
//! top entry is the cursor), and once [`XmlBuilder::dispose`] has been called
//! every further mutation fails with [`BuilderError::Disposed`].
//!
//! Text and attribute values are stored verbatim and only escaped when the
//! document is serialized, so nothing is ever escaped twice.
//!
//! ```
//! use nextdav_xml::XmlBuilder;
//!
//! let mut builder = XmlBuilder::create_document("d:prop", &[("d", "DAV:")]);
//! builder.add_element("d:displayname", Some("Work & Home"))?;
//! let xml = builder.finish(false)?;
//! assert_eq!(
//!     xml,
//!     r#"<d:prop xmlns:d="DAV:"><d:displayname>Work &amp; Home</d:displayname></d:prop>"#
//! );
//! # Ok::<(), nextdav_xml::BuilderError>(())
//! ```

use std::borrow::Cow;
use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use thiserror::Error;

/// Misuse of an [`XmlBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    /// The builder was used after [`XmlBuilder::dispose`].
    #[error("XML builder used after dispose")]
    Disposed,

    /// `end_element` was called with the root element as cursor.
    #[error("cannot end the root element <{root}>")]
    AtRoot { root: String },

    /// The operation would mix text and child elements in one node.
    #[error("element <{tag}> cannot hold both text and child elements")]
    MixedContent { tag: String },

    /// Serialization was requested while elements were still open.
    #[error("unclosed elements: {}", open.join(", "))]
    UnclosedElements { open: Vec<String> },

    /// The underlying writer failed.
    #[error("failed to write XML: {0}")]
    Serialize(String),
}

/// Escapes the five predefined XML entities.
pub fn escape_xml(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 16);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// What an element holds. A node is either empty, a leaf with one text or
/// CDATA payload, or a container of child elements; never a mix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeBody {
    /// No content; serialized as `<tag/>`.
    Empty,
    /// Character data; serialized escaped, `<tag></tag>` when empty.
    Text(String),
    /// A CDATA section.
    CData(String),
    /// Child elements only.
    Children(Vec<XmlNode>),
}

/// An element under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    tag: String,
    attributes: Vec<(String, String)>,
    body: NodeBody,
}

impl XmlNode {
    fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            body: NodeBody::Empty,
        }
    }

    /// The qualified tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attributes in insertion order, unescaped.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Looks up an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The node's content.
    pub fn body(&self) -> &NodeBody {
        &self.body
    }

    fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self
                .attributes
                .push((name.to_string(), value.to_string())),
        }
    }

    fn push_child(&mut self, child: XmlNode) -> Result<(), BuilderError> {
        match &mut self.body {
            NodeBody::Children(children) => children.push(child),
            NodeBody::Empty => self.body = NodeBody::Children(vec![child]),
            NodeBody::Text(_) | NodeBody::CData(_) => {
                return Err(BuilderError::MixedContent {
                    tag: self.tag.clone(),
                });
            }
        }
        Ok(())
    }

    fn set_body(&mut self, body: NodeBody) -> Result<(), BuilderError> {
        if matches!(self.body, NodeBody::Children(_)) {
            return Err(BuilderError::MixedContent {
                tag: self.tag.clone(),
            });
        }
        self.body = body;
        Ok(())
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), BuilderError> {
        let mut start = BytesStart::new(self.tag.as_str());
        for (name, value) in &self.attributes {
            start.push_attribute(Attribute {
                key: QName(name.as_bytes()),
                value: match escape_xml(value) {
                    Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
                    Cow::Owned(s) => Cow::Owned(s.into_bytes()),
                },
            });
        }

        match &self.body {
            NodeBody::Empty => write_event(writer, Event::Empty(start))?,
            NodeBody::Text(text) => {
                write_event(writer, Event::Start(start))?;
                if !text.is_empty() {
                    write_event(writer, Event::Text(BytesText::from_escaped(escape_xml(text))))?;
                }
                write_event(writer, Event::End(BytesEnd::new(self.tag.as_str())))?;
            }
            NodeBody::CData(data) => {
                write_event(writer, Event::Start(start))?;
                for section in cdata_sections(data) {
                    write_event(writer, Event::CData(BytesCData::new(section)))?;
                }
                write_event(writer, Event::End(BytesEnd::new(self.tag.as_str())))?;
            }
            NodeBody::Children(children) => {
                write_event(writer, Event::Start(start))?;
                for child in children {
                    child.write(writer)?;
                }
                write_event(writer, Event::End(BytesEnd::new(self.tag.as_str())))?;
            }
        }
        Ok(())
    }
}

/// Splits a CDATA payload so that no section contains `]]>`: each
/// terminator is broken between `]]` and `>` across adjacent sections.
fn cdata_sections(data: &str) -> Vec<String> {
    let parts: Vec<&str> = data.split("]]>").collect();
    let last = parts.len().saturating_sub(1);
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let mut section = String::with_capacity(part.len() + 3);
            if i > 0 {
                section.push('>');
            }
            section.push_str(part);
            if i < last {
                section.push_str("]]");
            }
            section
        })
        .collect()
}

fn write_event<W: std::io::Write>(
    writer: &mut Writer<W>,
    event: Event<'_>,
) -> Result<(), BuilderError> {
    writer
        .write_event(event)
        .map_err(|e| BuilderError::Serialize(e.to_string()))
}

#[derive(Debug)]
enum BuilderState {
    /// `stack[0]` is the root; the last entry is the cursor. Never empty.
    Open { stack: Vec<XmlNode> },
    Disposed,
}

/// A single-use, single-owner XML document builder.
///
/// Every `start_element` must be matched by an `end_element` before the
/// document is serialized; [`XmlBuilder::serialize`] refuses to close
/// elements implicitly.
#[derive(Debug)]
pub struct XmlBuilder {
    state: BuilderState,
}

impl XmlBuilder {
    /// Creates a document with `root_tag` as root element and the given
    /// `(prefix, uri)` namespace declarations on it. An empty prefix
    /// declares the default namespace.
    pub fn create_document(root_tag: &str, namespaces: &[(&str, &str)]) -> Self {
        let mut root = XmlNode::new(root_tag);
        for (prefix, uri) in namespaces {
            let name = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{prefix}")
            };
            root.set_attribute(&name, uri);
        }
        Self {
            state: BuilderState::Open { stack: vec![root] },
        }
    }

    fn stack(&mut self) -> Result<&mut Vec<XmlNode>, BuilderError> {
        match &mut self.state {
            BuilderState::Open { stack } => Ok(stack),
            BuilderState::Disposed => Err(BuilderError::Disposed),
        }
    }

    fn cursor(&mut self) -> Result<&mut XmlNode, BuilderError> {
        self.stack()?.last_mut().ok_or(BuilderError::Disposed)
    }

    /// Opens a child of the cursor element and moves the cursor to it.
    pub fn start_element(&mut self, tag: &str) -> Result<&mut Self, BuilderError> {
        let cursor = self.cursor()?;
        if matches!(cursor.body, NodeBody::Text(_) | NodeBody::CData(_)) {
            return Err(BuilderError::MixedContent {
                tag: cursor.tag.clone(),
            });
        }
        self.stack()?.push(XmlNode::new(tag));
        Ok(self)
    }

    /// Closes the cursor element and moves the cursor back to its parent.
    pub fn end_element(&mut self) -> Result<&mut Self, BuilderError> {
        let stack = self.stack()?;
        if stack.len() < 2 {
            return Err(BuilderError::AtRoot {
                root: stack.first().map(|n| n.tag.clone()).unwrap_or_default(),
            });
        }
        let node = stack.pop().ok_or(BuilderError::Disposed)?;
        let parent = stack.last_mut().ok_or(BuilderError::Disposed)?;
        parent.push_child(node)?;
        Ok(self)
    }

    /// Appends `<tag>content</tag>`. With `None` the element is still
    /// written as an open/close pair (`<tag></tag>`), unlike
    /// [`XmlBuilder::add_empty_element`].
    pub fn add_element(&mut self, tag: &str, content: Option<&str>) -> Result<&mut Self, BuilderError> {
        self.start_element(tag)?
            .set_content(content.unwrap_or_default())?
            .end_element()
    }

    /// Appends a self-closing `<tag/>` child without moving the cursor.
    pub fn add_empty_element(&mut self, tag: &str) -> Result<&mut Self, BuilderError> {
        self.cursor()?.push_child(XmlNode::new(tag))?;
        Ok(self)
    }

    /// Sets an attribute on the cursor element, replacing any previous value.
    pub fn add_attribute(&mut self, name: &str, value: &str) -> Result<&mut Self, BuilderError> {
        self.cursor()?.set_attribute(name, value);
        Ok(self)
    }

    /// Sets or replaces the cursor element's text content.
    pub fn set_content(&mut self, text: &str) -> Result<&mut Self, BuilderError> {
        self.cursor()?.set_body(NodeBody::Text(text.to_string()))?;
        Ok(self)
    }

    /// Sets or replaces the cursor element's content with a CDATA section.
    pub fn set_cdata(&mut self, data: &str) -> Result<&mut Self, BuilderError> {
        self.cursor()?.set_body(NodeBody::CData(data.to_string()))?;
        Ok(self)
    }

    /// Number of currently open elements, root included. Zero once disposed.
    pub fn open_depth(&self) -> usize {
        match &self.state {
            BuilderState::Open { stack } => stack.len(),
            BuilderState::Disposed => 0,
        }
    }

    /// Returns true once [`XmlBuilder::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        matches!(self.state, BuilderState::Disposed)
    }

    /// The root element, if the builder is open and fully closed down to it.
    pub fn root(&self) -> Option<&XmlNode> {
        match &self.state {
            BuilderState::Open { stack } if stack.len() == 1 => stack.first(),
            _ => None,
        }
    }

    /// Serializes the whole document.
    ///
    /// # Errors
    ///
    /// Fails if the builder was disposed or if any element other than the
    /// root is still open.
    pub fn serialize(&self, include_declaration: bool) -> Result<String, BuilderError> {
        let stack = match &self.state {
            BuilderState::Open { stack } => stack,
            BuilderState::Disposed => return Err(BuilderError::Disposed),
        };
        if stack.len() > 1 {
            return Err(BuilderError::UnclosedElements {
                open: stack[1..].iter().map(|n| n.tag.clone()).collect(),
            });
        }
        let root = stack.first().ok_or(BuilderError::Disposed)?;

        let mut writer = Writer::new(Cursor::new(Vec::new()));
        if include_declaration {
            write_event(
                &mut writer,
                Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
            )?;
        }
        root.write(&mut writer)?;

        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| BuilderError::Serialize(e.to_string()))
    }

    /// Releases the document. Calling it again is a no-op.
    pub fn dispose(&mut self) {
        self.state = BuilderState::Disposed;
    }

    /// Serializes the document and disposes the builder in one step, on
    /// success and failure alike.
    pub fn finish(mut self, include_declaration: bool) -> Result<String, BuilderError> {
        let result = self.serialize(include_declaration);
        self.dispose();
        result
    }
}
