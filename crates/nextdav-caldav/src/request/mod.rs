//! CalDAV request bodies.
//!
//! Each function assembles one WebDAV/CalDAV body through an
//! [`XmlBuilder`] declaring the standard namespaces, and returns it with an
//! XML declaration. The builder is disposed on every path, including
//! failures part-way through construction.

mod filter;

#[cfg(test)]
mod golden_tests;

use chrono::{DateTime, Utc};
use nextdav_core::TimeRange;
use nextdav_xml::{BuilderError, XmlBuilder};
use tracing::trace;

use crate::error::CalDavResult;
use crate::namespace::STANDARD_NAMESPACES;
use crate::properties::{
    CALENDAR_CATEGORY, CALENDAR_COLOR, CALENDAR_FOCUS_PRIORITY, CalendarPropertyUpdate,
    DISPLAY_NAME,
};

pub use filter::{ComponentFilter, FilterOptions, FilterTest, PropertyFilter};

/// Properties requested by [`build_propfind_request`] when the caller names none.
pub const DEFAULT_PROPFIND_PROPERTIES: [&str; 11] = [
    "d:resourcetype",
    "d:displayname",
    "c:supported-calendar-component-set",
    "cs:getctag",
    "oc:calendar-enabled",
    "d:sync-token",
    "oc:owner-principal",
    "d:current-user-privilege-set",
    "oc:invite",
    "x1:calendar-order",
    "x1:calendar-color",
];

/// Collation used for case-insensitive text matches.
pub const CASEMAP_COLLATION: &str = "i;unicode-casemap";

/// Options for the `calendar-data` element of a calendar query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarDataOptions {
    /// Ask the server to expand recurrences inside this window.
    pub expand: Option<TimeRange>,
}

impl CalendarDataOptions {
    /// Expands recurring events inside `range`.
    pub fn expand(range: TimeRange) -> Self {
        Self {
            expand: Some(range),
        }
    }
}

/// Runs `fill` against a fresh builder rooted at `root`, serializes the
/// result and disposes the builder whatever happened.
fn build_document<F>(root: &str, fill: F) -> CalDavResult<String>
where
    F: FnOnce(&mut XmlBuilder) -> Result<(), BuilderError>,
{
    let mut builder = XmlBuilder::create_document(root, &STANDARD_NAMESPACES);
    let body = fill(&mut builder).and_then(|()| builder.serialize(true));
    builder.dispose();
    let body = body?;
    trace!(root, bytes = body.len(), "built request body");
    Ok(body)
}

fn write_time_range(builder: &mut XmlBuilder, tag: &str, range: &TimeRange) -> Result<(), BuilderError> {
    builder
        .start_element(tag)?
        .add_attribute("start", &range.start_str())?
        .add_attribute("end", &range.end_str())?
        .end_element()?;
    Ok(())
}

/// Writes `<c:calendar-data/>`, or `<c:calendar-data>` wrapping a
/// `<c:expand>` when an expansion window is set.
fn write_calendar_data(builder: &mut XmlBuilder, options: &CalendarDataOptions) -> Result<(), BuilderError> {
    match &options.expand {
        Some(range) => {
            builder.start_element("c:calendar-data")?;
            write_time_range(builder, "c:expand", range)?;
            builder.end_element()?;
        }
        None => {
            builder.add_empty_element("c:calendar-data")?;
        }
    }
    Ok(())
}

/// Body of a PROPFIND for calendar discovery.
///
/// `properties` are qualified names using the standard prefixes
/// (`d:displayname`, `x1:calendar-color`, ...). When given they replace
/// [`DEFAULT_PROPFIND_PROPERTIES`] entirely.
pub fn build_propfind_request(properties: Option<&[&str]>) -> CalDavResult<String> {
    let properties = properties.unwrap_or(&DEFAULT_PROPFIND_PROPERTIES);
    build_document("d:propfind", |b| {
        b.start_element("d:prop")?;
        for property in properties {
            b.add_empty_element(property)?;
        }
        b.end_element()?;
        Ok(())
    })
}

/// Body of a MKCALENDAR creating an event calendar.
pub fn build_mkcalendar_request(display_name: &str, color: Option<&str>) -> CalDavResult<String> {
    build_document("c:mkcalendar", |b| {
        b.start_element("d:set")?.start_element("d:prop")?;
        b.add_element(DISPLAY_NAME.qualified, Some(display_name))?;
        if let Some(color) = color {
            b.add_element(CALENDAR_COLOR.qualified, Some(color))?;
        }
        b.start_element("c:supported-calendar-component-set")?
            .start_element("c:comp")?
            .add_attribute("name", "VEVENT")?
            .end_element()?
            .end_element()?;
        b.end_element()?.end_element()?;
        Ok(())
    })
}

/// Body of a PROPPATCH setting only the fields present in `update`.
pub fn build_proppatch_request(update: &CalendarPropertyUpdate) -> CalDavResult<String> {
    build_document("d:propertyupdate", |b| {
        b.start_element("d:set")?.start_element("d:prop")?;
        if let Some(name) = &update.display_name {
            b.add_element(DISPLAY_NAME.qualified, Some(name.as_str()))?;
        }
        if let Some(color) = &update.color {
            b.add_element(CALENDAR_COLOR.qualified, Some(color.as_str()))?;
        }
        if let Some(category) = &update.category {
            b.add_element(CALENDAR_CATEGORY.qualified, Some(category.as_str()))?;
        }
        if let Some(priority) = update.focus_priority {
            b.add_element(CALENDAR_FOCUS_PRIORITY.qualified, Some(priority.to_string().as_str()))?;
        }
        b.end_element()?.end_element()?;
        Ok(())
    })
}

/// Body of a `calendar-query` REPORT for events in a time range.
///
/// Without a range the query covers six months either side of now.
pub fn build_calendar_query_report(
    time_range: Option<TimeRange>,
    data_options: Option<&CalendarDataOptions>,
) -> CalDavResult<String> {
    let range = time_range.unwrap_or_else(TimeRange::around_now);
    let data_options = data_options.copied().unwrap_or_default();
    build_document("c:calendar-query", |b| {
        b.start_element("d:prop")?.add_empty_element("d:getetag")?;
        write_calendar_data(b, &data_options)?;
        b.end_element()?;

        b.start_element("c:filter")?
            .start_element("c:comp-filter")?
            .add_attribute("name", "VCALENDAR")?
            .start_element("c:comp-filter")?
            .add_attribute("name", "VEVENT")?;
        write_time_range(b, "c:time-range", &range)?;
        b.end_element()?.end_element()?.end_element()?;
        Ok(())
    })
}

/// Body of a `calendar-query` REPORT locating an event by UID.
pub fn build_event_by_uid_request(uid: &str) -> CalDavResult<String> {
    build_document("c:calendar-query", |b| {
        b.start_element("d:prop")?
            .add_empty_element("d:getetag")?
            .add_empty_element("c:calendar-data")?
            .end_element()?;

        b.start_element("c:filter")?
            .start_element("c:comp-filter")?
            .add_attribute("name", "VCALENDAR")?
            .start_element("c:comp-filter")?
            .add_attribute("name", "VEVENT")?
            .start_element("c:prop-filter")?
            .add_attribute("name", "UID")?
            .start_element("c:text-match")?
            .add_attribute("collation", CASEMAP_COLLATION)?
            .set_content(uid)?
            .end_element()?
            .end_element()?
            .end_element()?
            .end_element()?
            .end_element()?;
        Ok(())
    })
}

/// Body of a `calendar-multiget` REPORT expanding the given events'
/// recurrences between `start` and `end`.
pub fn build_expand_recurring_events_request(
    event_urls: &[&str],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> CalDavResult<String> {
    let range = TimeRange::new(start, end);
    build_document("c:calendar-multiget", |b| {
        b.start_element("d:prop")?.add_empty_element("d:getetag")?;
        write_calendar_data(b, &CalendarDataOptions::expand(range))?;
        b.end_element()?;
        for url in event_urls {
            b.add_element("d:href", Some(*url))?;
        }
        Ok(())
    })
}

/// Body of a `calendar-query` REPORT with an arbitrary filter tree.
///
/// The tree is rendered as given; there is no depth limit here, so callers
/// should keep it to the iCalendar component nesting.
pub fn build_advanced_filter_request(options: &FilterOptions) -> CalDavResult<String> {
    trace!(depth = options.filter.depth(), "rendering filter tree");
    build_document("c:calendar-query", |b| {
        b.start_element("d:prop")?.add_empty_element("d:getetag")?;
        if options.include_calendar_data {
            b.add_empty_element("c:calendar-data")?;
        }
        b.end_element()?;
        b.start_element("c:filter")?;
        options.filter.render(b)?;
        b.end_element()?;
        Ok(())
    })
}
