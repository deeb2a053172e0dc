//! Standard namespace bindings used in every request body.

/// DAV namespace
pub const DAV_NS: &str = "DAV:";
/// CalDAV namespace
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";
/// CalendarServer namespace (Apple, Nextcloud)
pub const CS_NS: &str = "http://calendarserver.org/ns/";
/// ownCloud/Nextcloud namespace
pub const OC_NS: &str = "http://owncloud.org/ns";
/// Apple iCal namespace (calendar color and order)
pub const APPLE_ICAL_NS: &str = "http://apple.com/ns/ical/";

/// `(prefix, uri)` pairs declared on the root of every request body.
pub const STANDARD_NAMESPACES: [(&str, &str); 5] = [
    ("d", DAV_NS),
    ("c", CALDAV_NS),
    ("cs", CS_NS),
    ("oc", OC_NS),
    ("x1", APPLE_ICAL_NS),
];

/// Returns the URI bound to a standard prefix.
pub fn uri_for_prefix(prefix: &str) -> Option<&'static str> {
    STANDARD_NAMESPACES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, uri)| *uri)
}
