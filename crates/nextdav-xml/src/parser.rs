//! XML parser and normalizer.
//!
//! [`parse_xml`] turns a response body into an [`XmlTree`]. The security
//! guard always runs first unless the caller opts out; a rejected document
//! can optionally be sanitized and checked once more, and is otherwise
//! reported as an [`XmlParseError`] instead of being parsed.
//!
//! Options are passed explicitly on every call. When strict parsing fails
//! and fallback is allowed, the document is parsed once more with
//! [`ParseOptions::permissive`] before the error is returned.

use std::fmt;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::security::{self, SecurityIssue, SecurityPolicy};
use crate::tree::{XmlObject, XmlTree, XmlValue};

/// Parser configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Policy the document is validated against.
    pub policy: SecurityPolicy,
    /// Run the security guard before parsing.
    pub validate: bool,
    /// Sanitize and re-validate once when validation fails.
    pub allow_sanitize: bool,
    /// Retry with [`ParseOptions::permissive`] when parsing fails.
    pub allow_fallback: bool,
    /// Trim whitespace around text. The untrimmed text is kept for
    /// [`XmlTree::to_builder`](crate::XmlTree::to_builder).
    pub trim_text: bool,
    /// Store every child element as a list, even when it occurs once.
    pub always_array: bool,
    /// Require end tags to match their start tags, reject malformed
    /// attributes and unknown entity references, and fail on unclosed
    /// elements. Lenient mode keeps such content raw and closes open
    /// elements at end of input.
    pub strict: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            policy: SecurityPolicy::default(),
            validate: true,
            allow_sanitize: false,
            allow_fallback: true,
            trim_text: true,
            always_array: false,
            strict: true,
        }
    }
}

impl ParseOptions {
    /// The configuration used for the fallback attempt: lists everywhere and
    /// lenient tokenizing. Validation settings are carried over.
    #[must_use]
    pub fn permissive(&self) -> Self {
        Self {
            always_array: true,
            strict: false,
            allow_fallback: false,
            ..self.clone()
        }
    }

    /// Sets the security policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SecurityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Skips the security guard. Only for input that is already trusted.
    #[must_use]
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Allows sanitizing a rejected document once before giving up.
    #[must_use]
    pub fn with_sanitize(mut self, allow: bool) -> Self {
        self.allow_sanitize = allow;
        self
    }

    /// Enables or disables the permissive retry.
    #[must_use]
    pub fn with_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = allow;
        self
    }

    /// Enables or disables list-for-every-child mode.
    #[must_use]
    pub fn with_always_array(mut self, always: bool) -> Self {
        self.always_array = always;
        self
    }
}

/// Why a document could not be turned into a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// The security guard rejected the document.
    Rejected { issues: Vec<SecurityIssue> },
    /// The tokenizer failed.
    Syntax { message: String, position: u64 },
    /// The input holds no element at all.
    Empty,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { issues } => {
                write!(f, "rejected by security policy: ")?;
                for (i, issue) in issues.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{issue}")?;
                }
                Ok(())
            }
            Self::Syntax { message, position } => {
                write!(f, "syntax error at byte {position}: {message}")
            }
            Self::Empty => write!(f, "document contains no element"),
        }
    }
}

/// A document that could not be parsed, with everything needed to diagnose it.
#[derive(Debug, Clone, Error)]
#[error("failed to parse XML: {cause}")]
pub struct XmlParseError {
    xml: String,
    options: ParseOptions,
    cause: ParseFailure,
}

impl XmlParseError {
    fn new(xml: &str, options: &ParseOptions, cause: ParseFailure) -> Self {
        Self {
            xml: xml.to_string(),
            options: options.clone(),
            cause,
        }
    }

    /// The offending document.
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// The options in effect when parsing failed.
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// The underlying failure.
    pub fn cause(&self) -> &ParseFailure {
        &self.cause
    }

    /// Returns true if the security guard rejected the document.
    pub fn is_security_rejection(&self) -> bool {
        matches!(self.cause, ParseFailure::Rejected { .. })
    }
}

/// Validates and parses `xml`.
///
/// # Errors
///
/// Returns [`XmlParseError`] when the document fails the security policy
/// (after the optional sanitize pass), or when it cannot be tokenized with
/// the given options nor, if fallback is allowed, with the permissive ones.
pub fn parse_xml(xml: &str, options: &ParseOptions) -> Result<XmlTree, XmlParseError> {
    let sanitized;
    let mut input = xml;

    if options.validate {
        let report = security::validate(input, &options.policy);
        if !report.is_valid() {
            warn!(size = xml.len(), issues = ?report.messages(), "XML rejected by security policy");
            if !options.allow_sanitize {
                return Err(XmlParseError::new(
                    xml,
                    options,
                    ParseFailure::Rejected {
                        issues: report.into_issues(),
                    },
                ));
            }
            sanitized = security::sanitize(input);
            let second = security::validate(&sanitized, &options.policy);
            if !second.is_valid() {
                warn!(issues = ?second.messages(), "sanitized XML still rejected");
                return Err(XmlParseError::new(
                    xml,
                    options,
                    ParseFailure::Rejected {
                        issues: second.into_issues(),
                    },
                ));
            }
            debug!("XML accepted after sanitizing");
            input = &sanitized;
        }
    }

    match build_tree(input, options) {
        Ok(tree) => Ok(tree),
        Err(cause) if options.allow_fallback => {
            debug!(error = %cause, "strict XML parse failed, retrying permissively");
            build_tree(input, &options.permissive()).map_err(|_| XmlParseError::new(xml, options, cause))
        }
        Err(cause) => Err(XmlParseError::new(xml, options, cause)),
    }
}

fn syntax_error(reader: &Reader<&[u8]>, message: impl fmt::Display) -> ParseFailure {
    ParseFailure::Syntax {
        message: message.to_string(),
        position: reader.buffer_position() as u64,
    }
}

fn start_object(
    reader: &Reader<&[u8]>,
    start: &BytesStart<'_>,
    options: &ParseOptions,
) -> Result<(String, XmlObject), ParseFailure> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut object = XmlObject::default();
    for attribute in start.attributes().with_checks(options.strict) {
        let attribute = attribute.map_err(|e| syntax_error(reader, e))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = match attribute.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) if !options.strict => {
                String::from_utf8_lossy(&attribute.value).into_owned()
            }
            Err(e) => return Err(syntax_error(reader, e)),
        };
        object.push_attribute(key, value);
    }
    Ok((name, object))
}

/// An element whose end tag has not been read yet.
#[derive(Default)]
struct OpenElement {
    name: String,
    object: XmlObject,
    plain_text: bool,
    cdata: bool,
}

impl OpenElement {
    fn new(name: String, object: XmlObject) -> Self {
        Self {
            name,
            object,
            ..Self::default()
        }
    }

    fn close(mut self, self_closing: bool, options: &ParseOptions) -> (String, XmlValue) {
        if self.cdata && !self.plain_text {
            self.object.mark_cdata();
        }
        (self.name, self.object.into_value(self_closing, options.trim_text))
    }
}

fn close_into_parent(
    stack: &mut Vec<OpenElement>,
    element: OpenElement,
    self_closing: bool,
    options: &ParseOptions,
) {
    let (name, value) = element.close(self_closing, options);
    if let Some(parent) = stack.last_mut() {
        parent.object.insert_child(name, value, options.always_array);
    }
}

/// Tokenizes `xml` into a tree. Stack entries are open elements; the bottom
/// entry is the synthetic document object.
///
/// The reader never trims: whitespace handling happens when an element is
/// closed, so trimmed text can still be written back verbatim.
fn build_tree(xml: &str, options: &ParseOptions) -> Result<XmlTree, ParseFailure> {
    let mut reader = Reader::from_str(xml);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = options.strict;
    config.expand_empty_elements = false;

    let mut stack = vec![OpenElement::default()];
    let mut elements = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| syntax_error(&reader, e))?;
        match event {
            Event::Start(start) => {
                let (name, object) = start_object(&reader, &start, options)?;
                stack.push(OpenElement::new(name, object));
                elements += 1;
            }
            Event::Empty(start) => {
                let (name, object) = start_object(&reader, &start, options)?;
                elements += 1;
                close_into_parent(&mut stack, OpenElement::new(name, object), true, options);
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    if options.strict {
                        return Err(syntax_error(&reader, "unexpected closing tag"));
                    }
                    continue;
                }
                if let Some(element) = stack.pop() {
                    close_into_parent(&mut stack, element, false, options);
                }
            }
            Event::Text(text) => {
                if stack.len() < 2 {
                    continue;
                }
                let value = match text.unescape() {
                    Ok(value) => value.into_owned(),
                    Err(_) if !options.strict => {
                        String::from_utf8_lossy(&text).into_owned()
                    }
                    Err(e) => return Err(syntax_error(&reader, e)),
                };
                if let Some(element) = stack.last_mut() {
                    element.plain_text |= !value.trim().is_empty();
                    element.object.push_text(&value);
                }
            }
            Event::CData(data) => {
                if stack.len() < 2 {
                    continue;
                }
                if let Some(element) = stack.last_mut() {
                    element.cdata = true;
                    element.object.push_text(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() > 1 {
        if options.strict {
            let open = stack.last().map(|e| e.name.clone()).unwrap_or_default();
            return Err(syntax_error(&reader, format!("unclosed element <{open}>")));
        }
        while stack.len() > 1 {
            if let Some(element) = stack.pop() {
                close_into_parent(&mut stack, element, false, options);
            }
        }
    }

    if elements == 0 {
        return Err(ParseFailure::Empty);
    }

    trace!(elements, "parsed XML document");
    let document = stack.pop().map(|e| e.object).unwrap_or_default();
    Ok(XmlTree::new(document))
}
