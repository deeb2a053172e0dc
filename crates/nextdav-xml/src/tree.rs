//! Generic parsed XML tree.
//!
//! The parser keeps the server's literal shape: element names are stored
//! exactly as written (prefix included), and a child element that occurs
//! once is a single value while one that repeats becomes a
//! [`XmlValue::List`]. Callers that expect repetition use
//! [`XmlObject::get_all`], which wraps a lone value in a one-element slice.

use crate::document::{BuilderError, XmlBuilder};

/// A parsed element value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlValue {
    /// A self-closing element without attributes (`<d:collection/>`).
    Empty,
    /// An element without attributes holding only text (possibly empty).
    Text(String),
    /// An element with attributes and/or child elements.
    Node(XmlObject),
    /// The same child name occurring more than once, in document order.
    List(Vec<XmlValue>),
}

impl XmlValue {
    /// Text content of a leaf, or of a node that also carries attributes.
    /// Empty elements read as `""`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Empty => Some(""),
            Self::Text(text) => Some(text),
            Self::Node(node) => node.text(),
            Self::List(_) => None,
        }
    }

    /// The element as an object, if it has attributes or children.
    pub fn as_object(&self) -> Option<&XmlObject> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Views the value as a sequence: lists yield their items, anything
    /// else yields itself.
    pub fn as_slice(&self) -> &[XmlValue] {
        match self {
            Self::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    /// The first occurrence, unwrapping lists.
    pub fn first(&self) -> Option<&XmlValue> {
        self.as_slice().first()
    }

    /// Returns true for `Empty` and `Text("")`.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            _ => false,
        }
    }
}

/// An element with attributes, child elements or both.
///
/// Leaf elements whose text was trimmed or came from a CDATA section are
/// kept as objects too, so that [`XmlTree::to_builder`] can write them back
/// as they were read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlObject {
    attributes: Vec<(String, String)>,
    children: Vec<(String, XmlValue)>,
    /// Index into `children` for every child element, in document order.
    order: Vec<usize>,
    text: Option<String>,
    /// Untrimmed text, set only when trimming changed it.
    raw_text: Option<String>,
    cdata: bool,
    self_closing: bool,
}

impl XmlObject {
    /// Attributes in document order, unescaped.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Looks up an attribute by its literal name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Child entries keyed by literal element name, in first-occurrence order.
    pub fn children(&self) -> &[(String, XmlValue)] {
        &self.children
    }

    /// Child elements one by one, in document order.
    pub fn children_in_order(&self) -> impl Iterator<Item = (&str, &XmlValue)> {
        let mut seen = vec![0usize; self.children.len()];
        self.order.iter().filter_map(move |&group| {
            let (name, value) = self.children.get(group)?;
            let position = seen.get_mut(group)?;
            let item = value.as_slice().get(*position)?;
            *position += 1;
            Some((name.as_str(), item))
        })
    }

    /// Child element names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(key, _)| key.as_str())
    }

    /// Looks up a child by its literal name.
    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        self.children
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// All occurrences of a child, whether it appeared once or many times.
    pub fn get_all(&self, key: &str) -> &[XmlValue] {
        self.get(key).map(XmlValue::as_slice).unwrap_or_default()
    }

    /// Text directly inside this element, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Returns true if the text was read from a CDATA section.
    pub fn is_cdata(&self) -> bool {
        self.cdata
    }

    pub(crate) fn push_attribute(&mut self, name: String, value: String) {
        self.attributes.push((name, value));
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    pub(crate) fn mark_cdata(&mut self) {
        self.cdata = true;
    }

    /// Inserts a child, turning a repeated name into a list.
    pub(crate) fn insert_child(&mut self, key: String, value: XmlValue, always_array: bool) {
        let group = match self.children.iter().position(|(name, _)| *name == key) {
            Some(group) => {
                let existing = &mut self.children[group].1;
                match existing {
                    XmlValue::List(items) => items.push(value),
                    single => {
                        let first = std::mem::replace(single, XmlValue::Empty);
                        *single = XmlValue::List(vec![first, value]);
                    }
                }
                group
            }
            None => {
                let value = if always_array {
                    XmlValue::List(vec![value])
                } else {
                    value
                };
                self.children.push((key, value));
                self.children.len() - 1
            }
        };
        self.order.push(group);
    }

    /// Collapses a finished element into the most compact value.
    ///
    /// Whitespace-only text next to child elements is formatting and is
    /// dropped. Other text is trimmed when `trim` is set, keeping the
    /// original alongside.
    pub(crate) fn into_value(mut self, self_closing: bool, trim: bool) -> XmlValue {
        self.self_closing = self_closing;
        if let Some(raw) = self.text.take() {
            let formatting = !self.children.is_empty() && raw.trim().is_empty();
            if !formatting {
                let trimmed = raw.trim();
                if trim && trimmed.len() != raw.len() {
                    self.text = Some(trimmed.to_string());
                    self.raw_text = Some(raw);
                } else {
                    self.text = Some(raw);
                }
            }
        }

        let plain_leaf = self.attributes.is_empty()
            && self.children.is_empty()
            && self.raw_text.is_none()
            && !self.cdata;
        if plain_leaf {
            return match self.text {
                Some(text) => XmlValue::Text(text),
                None if self_closing => XmlValue::Empty,
                None => XmlValue::Text(String::new()),
            };
        }
        XmlValue::Node(self)
    }

    fn replay(&self, builder: &mut XmlBuilder) -> Result<(), BuilderError> {
        for (name, value) in &self.attributes {
            builder.add_attribute(name, value)?;
        }
        if self.children.is_empty() {
            match self.raw_text.as_deref().or(self.text.as_deref()) {
                Some(text) if self.cdata => {
                    builder.set_cdata(text)?;
                }
                Some(text) => {
                    builder.set_content(text)?;
                }
                None if !self.self_closing => {
                    builder.set_content("")?;
                }
                None => {}
            }
        }
        for (name, value) in self.children_in_order() {
            replay_value(builder, name, value)?;
        }
        Ok(())
    }
}

fn replay_value(builder: &mut XmlBuilder, name: &str, value: &XmlValue) -> Result<(), BuilderError> {
    match value {
        XmlValue::Empty => {
            builder.add_empty_element(name)?;
        }
        XmlValue::Text(text) => {
            builder.add_element(name, Some(text.as_str()))?;
        }
        XmlValue::Node(node) => {
            builder.start_element(name)?;
            node.replay(builder)?;
            builder.end_element()?;
        }
        XmlValue::List(items) => {
            for item in items {
                replay_value(builder, name, item)?;
            }
        }
    }
    Ok(())
}

/// A parsed document. The document object has no attributes; its children
/// are the top-level elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlTree {
    document: XmlObject,
}

impl XmlTree {
    pub(crate) fn new(document: XmlObject) -> Self {
        Self { document }
    }

    /// The synthetic document object.
    pub fn document(&self) -> &XmlObject {
        &self.document
    }

    /// The first top-level element and its name.
    pub fn root(&self) -> Option<(&str, &XmlValue)> {
        self.document
            .children
            .first()
            .and_then(|(name, value)| value.first().map(|v| (name.as_str(), v)))
    }

    /// Replays the tree through an [`XmlBuilder`].
    ///
    /// Namespace declarations come back as ordinary `xmlns:*` attributes, so
    /// serializing the returned builder reproduces a document that was built
    /// with the builder in the first place. Mixed text and element content is
    /// not representable by the builder; such text is dropped.
    pub fn to_builder(&self) -> Result<Option<XmlBuilder>, BuilderError> {
        let Some((name, value)) = self.root() else {
            return Ok(None);
        };
        let mut builder = XmlBuilder::create_document(name, &[]);
        match value {
            XmlValue::Empty => {}
            XmlValue::Text(text) => {
                builder.set_content(text)?;
            }
            XmlValue::Node(node) => node.replay(&mut builder)?,
            XmlValue::List(_) => {}
        }
        Ok(Some(builder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_children_become_lists() {
        let mut obj = XmlObject::default();
        obj.insert_child("a".into(), XmlValue::Text("1".into()), false);
        assert_eq!(obj.get("a"), Some(&XmlValue::Text("1".into())));
        assert_eq!(obj.get_all("a").len(), 1);

        obj.insert_child("a".into(), XmlValue::Text("2".into()), false);
        obj.insert_child("a".into(), XmlValue::Text("3".into()), false);
        let all: Vec<_> = obj.get_all("a").iter().filter_map(XmlValue::as_text).collect();
        assert_eq!(all, ["1", "2", "3"]);
        assert!(obj.get_all("missing").is_empty());
    }

    #[test]
    fn always_array_wraps_single_children() {
        let mut obj = XmlObject::default();
        obj.insert_child("a".into(), XmlValue::Empty, true);
        assert_eq!(obj.get("a"), Some(&XmlValue::List(vec![XmlValue::Empty])));
        obj.insert_child("a".into(), XmlValue::Empty, true);
        assert_eq!(obj.get_all("a").len(), 2);
    }

    #[test]
    fn leaf_collapse() {
        assert_eq!(XmlObject::default().into_value(true, true), XmlValue::Empty);
        assert_eq!(
            XmlObject::default().into_value(false, true),
            XmlValue::Text(String::new())
        );

        let mut obj = XmlObject::default();
        obj.push_attribute("name".into(), "VEVENT".into());
        let value = obj.into_value(true, true);
        assert_eq!(
            value.as_object().and_then(|o| o.attribute("name")),
            Some("VEVENT")
        );
        assert_eq!(value.as_text(), None);
    }

    #[test]
    fn blank_values() {
        assert!(XmlValue::Empty.is_blank());
        assert!(XmlValue::Text(String::new()).is_blank());
        assert!(!XmlValue::Text("x".into()).is_blank());
        assert_eq!(XmlValue::Empty.as_text(), Some(""));
    }
}
