//! Outbound request envelopes.
//!
//! The HTTP collaborator needs more than a body: the WebDAV verb, the
//! `Depth` header and the content type. [`DavRequest`] bundles the three so
//! the caller only forwards it.

use std::fmt;

use nextdav_core::TimeRange;

use crate::error::CalDavResult;
use crate::properties::CalendarPropertyUpdate;
use crate::request::{self, CalendarDataOptions, FilterOptions};

/// Content type of every XML body.
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// WebDAV/CalDAV methods issued against calendar collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DavMethod {
    Propfind,
    Mkcalendar,
    Proppatch,
    Report,
    Delete,
    Put,
    Get,
    Head,
}

impl DavMethod {
    /// The method token as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propfind => "PROPFIND",
            Self::Mkcalendar => "MKCALENDAR",
            Self::Proppatch => "PROPPATCH",
            Self::Report => "REPORT",
            Self::Delete => "DELETE",
            Self::Put => "PUT",
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for DavMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of the `Depth` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    /// The header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Infinity => "infinity",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request ready for the HTTP collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavRequest {
    pub method: DavMethod,
    pub depth: Option<Depth>,
    pub body: String,
}

impl DavRequest {
    /// Wraps a body with its method and depth.
    pub fn new(method: DavMethod, depth: Option<Depth>, body: String) -> Self {
        Self {
            method,
            depth,
            body,
        }
    }

    /// PROPFIND listing a calendar home's collections (`Depth: 1`).
    pub fn propfind(properties: Option<&[&str]>) -> CalDavResult<Self> {
        Ok(Self::new(
            DavMethod::Propfind,
            Some(Depth::One),
            request::build_propfind_request(properties)?,
        ))
    }

    /// PROPFIND on a single calendar (`Depth: 0`).
    pub fn propfind_calendar(properties: Option<&[&str]>) -> CalDavResult<Self> {
        Ok(Self {
            depth: Some(Depth::Zero),
            ..Self::propfind(properties)?
        })
    }

    /// MKCALENDAR creating an event calendar.
    pub fn mkcalendar(display_name: &str, color: Option<&str>) -> CalDavResult<Self> {
        Ok(Self::new(
            DavMethod::Mkcalendar,
            None,
            request::build_mkcalendar_request(display_name, color)?,
        ))
    }

    /// PROPPATCH applying a partial update.
    pub fn proppatch(update: &CalendarPropertyUpdate) -> CalDavResult<Self> {
        Ok(Self::new(
            DavMethod::Proppatch,
            None,
            request::build_proppatch_request(update)?,
        ))
    }

    /// REPORT `calendar-query` over a time range.
    pub fn calendar_query(
        time_range: Option<TimeRange>,
        data_options: Option<&CalendarDataOptions>,
    ) -> CalDavResult<Self> {
        Ok(Self::new(
            DavMethod::Report,
            Some(Depth::One),
            request::build_calendar_query_report(time_range, data_options)?,
        ))
    }

    /// REPORT locating an event by UID.
    pub fn event_by_uid(uid: &str) -> CalDavResult<Self> {
        Ok(Self::new(
            DavMethod::Report,
            Some(Depth::One),
            request::build_event_by_uid_request(uid)?,
        ))
    }

    /// REPORT `calendar-multiget` expanding recurrences.
    pub fn expand_recurring_events(event_urls: &[&str], range: TimeRange) -> CalDavResult<Self> {
        Ok(Self::new(
            DavMethod::Report,
            Some(Depth::One),
            request::build_expand_recurring_events_request(event_urls, range.start, range.end)?,
        ))
    }

    /// REPORT with an arbitrary filter tree.
    pub fn advanced_filter(options: &FilterOptions) -> CalDavResult<Self> {
        Ok(Self::new(
            DavMethod::Report,
            Some(Depth::One),
            request::build_advanced_filter_request(options)?,
        ))
    }

    /// Headers the collaborator must set.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Content-Type", XML_CONTENT_TYPE.to_string())];
        if let Some(depth) = self.depth {
            headers.push(("Depth", depth.to_string()));
        }
        headers
    }
}
