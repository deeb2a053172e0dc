//! Multistatus response extraction.
//!
//! [`parse_multistatus`] walks a parsed body with the prefix-tolerant
//! lookups from `nextdav_xml` and produces one [`CalDavResponse`] per
//! `<response>`. Nothing here fails on a parseable document: missing pieces
//! become empty strings, `None` or empty maps.

use std::collections::BTreeMap;

use nextdav_xml::{
    ParseOptions, XmlObject, XmlTree, XmlValue, find_child, find_children, find_text,
    get_multistatus, get_responses, local_name, parse_xml,
};
use serde::Serialize;
use tracing::debug;

use crate::error::CalDavResult;
use crate::properties::{CALENDAR_DATA, GETETAG, PropertyName};

const HREF: &[&str] = &["d:href", "href"];
const STATUS: &[&str] = &["d:status", "status"];
const PROPSTAT: &[&str] = &["d:propstat", "propstat"];
const PROP: &[&str] = &["d:prop", "prop"];

/// One `<response>` of a multistatus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalDavResponse {
    /// The resource the response describes.
    pub href: String,
    /// HTTP status line, e.g. `HTTP/1.1 200 OK`.
    pub status: String,
    /// Properties of the successful propstat, keyed as the server spelled them.
    pub properties: BTreeMap<String, XmlValue>,
}

impl CalDavResponse {
    /// Returns true if the status line carries a 2xx code.
    pub fn is_success(&self) -> bool {
        self.status
            .split_whitespace()
            .nth(1)
            .is_some_and(|code| code.starts_with('2'))
    }

    /// Looks up a property by its standard qualified name, then its bare
    /// name, then any key with the same local name.
    pub fn property(&self, name: &PropertyName) -> Option<&XmlValue> {
        self.properties
            .get(name.qualified)
            .or_else(|| self.properties.get(name.local))
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|(key, _)| local_name(key).eq_ignore_ascii_case(name.local))
                    .map(|(_, value)| value)
            })
    }

    /// Text of a property, `None` when absent or blank.
    pub fn property_text(&self, name: &PropertyName) -> Option<&str> {
        self.property(name)
            .and_then(XmlValue::first)
            .and_then(XmlValue::as_text)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Extracts every response of a multistatus document.
///
/// Returns an empty list when the tree holds no multistatus element.
pub fn parse_multistatus(tree: &XmlTree) -> Vec<CalDavResponse> {
    let Some(multistatus) = get_multistatus(tree) else {
        debug!("no multistatus element in response");
        return Vec::new();
    };
    let responses: Vec<_> = get_responses(multistatus)
        .into_iter()
        .map(response_from_object)
        .collect();
    debug!(responses = responses.len(), "parsed multistatus");
    responses
}

/// Parses `xml` and extracts its responses in one step.
///
/// # Errors
///
/// Fails only when the document is rejected or cannot be parsed.
pub fn parse_multistatus_str(xml: &str, options: &ParseOptions) -> CalDavResult<Vec<CalDavResponse>> {
    let tree = parse_xml(xml, options)?;
    Ok(parse_multistatus(&tree))
}

fn status_of(object: &XmlObject) -> Option<&str> {
    find_text(object, STATUS, "status")
}

/// Picks the first propstat whose status contains `200`. A lone propstat
/// without any status element is taken as is.
fn select_propstat(propstats: &[&XmlObject]) -> Option<usize> {
    propstats
        .iter()
        .position(|p| status_of(p).is_some_and(|s| s.contains("200")))
        .or_else(|| match propstats {
            [only] if status_of(only).is_none() => Some(0),
            _ => None,
        })
}

fn response_from_object(object: &XmlObject) -> CalDavResponse {
    let href = find_text(object, HREF, "href").unwrap_or_default().trim().to_string();

    let propstats: Vec<&XmlObject> = find_children(object, PROPSTAT, "propstat")
        .iter()
        .filter_map(XmlValue::as_object)
        .collect();
    let selected = select_propstat(&propstats).map(|i| propstats[i]);

    let status = status_of(object)
        .or_else(|| selected.and_then(status_of))
        .or_else(|| propstats.first().copied().and_then(status_of))
        .unwrap_or_default()
        .trim()
        .to_string();

    let properties = selected
        .and_then(|propstat| find_child(propstat, PROP, "prop"))
        .and_then(XmlValue::first)
        .and_then(XmlValue::as_object)
        .map(|prop| {
            prop.children()
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    CalDavResponse {
        href,
        status,
        properties,
    }
}

/// An event resource returned by a calendar-query or calendar-multiget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventResource {
    /// The event's href.
    pub href: String,
    /// Entity tag, without surrounding quotes.
    pub etag: Option<String>,
    /// Raw iCalendar text.
    pub calendar_data: Option<String>,
}

impl EventResource {
    /// Projects a response onto the event fields.
    pub fn from_response(response: &CalDavResponse) -> Self {
        Self {
            href: response.href.clone(),
            etag: response
                .property_text(&GETETAG)
                .map(|etag| etag.trim_matches('"').to_string()),
            calendar_data: response.property_text(&CALENDAR_DATA).map(str::to_string),
        }
    }

    /// Collects the responses that actually carry calendar data.
    pub fn collect(responses: &[CalDavResponse]) -> Vec<Self> {
        responses
            .iter()
            .map(Self::from_response)
            .filter(|event| event.calendar_data.is_some())
            .collect()
    }
}
