//! CalDAV request bodies and multistatus extraction.
//!
//! This crate speaks the CalDAV dialect on top of `nextdav-xml`:
//!
//! - [`request`] - PROPFIND, MKCALENDAR, PROPPATCH and REPORT bodies
//! - [`DavRequest`] - a body paired with its method and `Depth` header
//! - [`response`] - [`parse_multistatus`] and per-response accessors
//! - [`properties`] - calendar metadata views over parsed responses
//! - [`CalendarPaths`] - collection and event URLs
//!
//! Transport is out of scope: callers send [`DavRequest::body`] with the
//! headers from [`DavRequest::headers`] and hand the response body back to
//! [`parse_multistatus_str`].
//!
//! # Example
//!
//! ```
//! use nextdav_caldav::{CalendarSummary, DavRequest, parse_multistatus_str};
//! use nextdav_xml::ParseOptions;
//!
//! let request = DavRequest::propfind(None)?;
//! assert!(request.body.contains("<d:propfind"));
//!
//! let reply = r#"<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav"><d:response>
//!     <d:href>/remote.php/dav/calendars/alice/personal/</d:href>
//!     <d:propstat><d:prop>
//!       <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
//!       <d:displayname>Personal</d:displayname>
//!     </d:prop>
//!     <d:status>HTTP/1.1 200 OK</d:status></d:propstat>
//! </d:response></d:multistatus>"#;
//! let responses = parse_multistatus_str(reply, &ParseOptions::default())?;
//! let calendars = CalendarSummary::collect(&responses);
//! assert_eq!(calendars[0].properties.display_name.as_deref(), Some("Personal"));
//! # Ok::<(), nextdav_caldav::CalDavError>(())
//! ```

pub mod error;
pub mod method;
pub mod namespace;
pub mod paths;
pub mod properties;
pub mod request;
pub mod response;

pub use error::{CalDavError, CalDavResult};
pub use method::{DavMethod, DavRequest, Depth};
pub use paths::CalendarPaths;
pub use properties::{
    CalendarProperties, CalendarPropertyUpdate, CalendarSummary, PropertyName,
    extract_calendar_properties,
};
pub use request::{
    CalendarDataOptions, ComponentFilter, FilterOptions, FilterTest, PropertyFilter,
    build_advanced_filter_request, build_calendar_query_report, build_event_by_uid_request,
    build_expand_recurring_events_request, build_mkcalendar_request, build_propfind_request,
    build_proppatch_request,
};
pub use response::{CalDavResponse, EventResource, parse_multistatus, parse_multistatus_str};
