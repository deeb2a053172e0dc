//! Golden outputs for every request body.
//!
//! The XML declaration and the five namespace declarations are identical
//! on every body; [`compact`] checks and strips them so the snapshots only
//! show what differs.

use chrono::{TimeZone, Utc};
use nextdav_core::TimeRange;
use nextdav_xml::{BuilderError, ParseOptions, XmlValue, parse_xml};

use super::*;
use crate::error::CalDavError;

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const NAMESPACES: &str = r#" xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav" xmlns:cs="http://calendarserver.org/ns/" xmlns:oc="http://owncloud.org/ns" xmlns:x1="http://apple.com/ns/ical/""#;

fn compact(xml: &str) -> String {
    let body = xml
        .strip_prefix(DECLARATION)
        .expect("body starts with the XML declaration");
    assert_eq!(body.matches(NAMESPACES).count(), 1, "namespaces on root: {body}");
    body.replacen(NAMESPACES, "", 1)
}

fn january() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
    )
}

#[test]
fn propfind_default_properties() {
    let xml = build_propfind_request(None).unwrap();
    assert_eq!(xml.matches("/>").count(), DEFAULT_PROPFIND_PROPERTIES.len());
    insta::assert_snapshot!(
        compact(&xml),
        @"<d:propfind><d:prop><d:resourcetype/><d:displayname/><c:supported-calendar-component-set/><cs:getctag/><oc:calendar-enabled/><d:sync-token/><oc:owner-principal/><d:current-user-privilege-set/><oc:invite/><x1:calendar-order/><x1:calendar-color/></d:prop></d:propfind>"
    );
}

#[test]
fn propfind_custom_properties_replace_defaults() {
    let xml = build_propfind_request(Some(&["d:displayname", "cs:getctag"])).unwrap();
    insta::assert_snapshot!(
        compact(&xml),
        @"<d:propfind><d:prop><d:displayname/><cs:getctag/></d:prop></d:propfind>"
    );
}

#[test]
fn mkcalendar_with_color() {
    let xml = build_mkcalendar_request("Work & Play", Some("#FF0000")).unwrap();
    insta::assert_snapshot!(
        compact(&xml),
        @r#"<c:mkcalendar><d:set><d:prop><d:displayname>Work &amp; Play</d:displayname><x1:calendar-color>#FF0000</x1:calendar-color><c:supported-calendar-component-set><c:comp name="VEVENT"/></c:supported-calendar-component-set></d:prop></d:set></c:mkcalendar>"#
    );
}

#[test]
fn mkcalendar_without_color() {
    let xml = build_mkcalendar_request("Personal", None).unwrap();
    assert!(!xml.contains("calendar-color"));
    assert!(xml.contains("<d:displayname>Personal</d:displayname>"));
}

#[test]
fn proppatch_sets_only_given_fields() {
    let update = CalendarPropertyUpdate::new()
        .with_display_name("Renamed")
        .with_category("work")
        .with_focus_priority(5);
    let xml = build_proppatch_request(&update).unwrap();
    insta::assert_snapshot!(
        compact(&xml),
        @"<d:propertyupdate><d:set><d:prop><d:displayname>Renamed</d:displayname><oc:calendar-category>work</oc:calendar-category><oc:calendar-focus-priority>5</oc:calendar-focus-priority></d:prop></d:set></d:propertyupdate>"
    );
}

#[test]
fn proppatch_empty_update() {
    let xml = build_proppatch_request(&CalendarPropertyUpdate::new()).unwrap();
    insta::assert_snapshot!(
        compact(&xml),
        @"<d:propertyupdate><d:set><d:prop/></d:set></d:propertyupdate>"
    );
}

#[test]
fn calendar_query_with_range() {
    let xml = build_calendar_query_report(Some(january()), None).unwrap();
    insta::assert_snapshot!(
        compact(&xml),
        @r#"<c:calendar-query><d:prop><d:getetag/><c:calendar-data/></d:prop><c:filter><c:comp-filter name="VCALENDAR"><c:comp-filter name="VEVENT"><c:time-range start="20240101T000000Z" end="20240201T000000Z"/></c:comp-filter></c:comp-filter></c:filter></c:calendar-query>"#
    );
}

#[test]
fn calendar_query_with_expansion() {
    let options = CalendarDataOptions::expand(january());
    let xml = build_calendar_query_report(Some(january()), Some(&options)).unwrap();
    insta::assert_snapshot!(
        compact(&xml),
        @r#"<c:calendar-query><d:prop><d:getetag/><c:calendar-data><c:expand start="20240101T000000Z" end="20240201T000000Z"/></c:calendar-data></d:prop><c:filter><c:comp-filter name="VCALENDAR"><c:comp-filter name="VEVENT"><c:time-range start="20240101T000000Z" end="20240201T000000Z"/></c:comp-filter></c:comp-filter></c:filter></c:calendar-query>"#
    );
}

#[test]
fn calendar_query_defaults_to_window_around_now() {
    let xml = build_calendar_query_report(None, None).unwrap();
    let tree = parse_xml(&xml, &ParseOptions::default()).unwrap();
    let (_, root) = tree.root().unwrap();
    let range = root
        .as_object()
        .and_then(|q| q.get("c:filter"))
        .and_then(XmlValue::as_object)
        .and_then(|f| f.get("c:comp-filter"))
        .and_then(XmlValue::as_object)
        .and_then(|cal| cal.get("c:comp-filter"))
        .and_then(XmlValue::as_object)
        .and_then(|ev| ev.get("c:time-range"))
        .and_then(XmlValue::as_object)
        .unwrap();

    let start = nextdav_core::parse_caldav_datetime(range.attribute("start").unwrap()).unwrap();
    let end = nextdav_core::parse_caldav_datetime(range.attribute("end").unwrap()).unwrap();
    let now = Utc::now();
    assert!(start < now && now < end);
}

#[test]
fn event_by_uid_escapes_text() {
    let xml = build_event_by_uid_request("ev-1<&>").unwrap();
    insta::assert_snapshot!(
        compact(&xml),
        @r#"<c:calendar-query><d:prop><d:getetag/><c:calendar-data/></d:prop><c:filter><c:comp-filter name="VCALENDAR"><c:comp-filter name="VEVENT"><c:prop-filter name="UID"><c:text-match collation="i;unicode-casemap">ev-1&lt;&amp;&gt;</c:text-match></c:prop-filter></c:comp-filter></c:comp-filter></c:filter></c:calendar-query>"#
    );
}

#[test]
fn multiget_expands_each_href() {
    let range = january();
    let xml =
        build_expand_recurring_events_request(&["/cal/a.ics", "/cal/b&c.ics"], range.start, range.end)
            .unwrap();
    insta::assert_snapshot!(
        compact(&xml),
        @r#"<c:calendar-multiget><d:prop><d:getetag/><c:calendar-data><c:expand start="20240101T000000Z" end="20240201T000000Z"/></c:calendar-data></d:prop><d:href>/cal/a.ics</d:href><d:href>/cal/b&amp;c.ics</d:href></c:calendar-multiget>"#
    );
}

#[test]
fn multiget_without_urls() {
    let range = january();
    let xml = build_expand_recurring_events_request(&[], range.start, range.end).unwrap();
    assert!(!xml.contains("d:href"));
}

fn standup_filter() -> FilterOptions {
    FilterOptions::new(ComponentFilter::vcalendar_with(
        ComponentFilter::new("VEVENT")
            .with_test(FilterTest::AnyOf)
            .with_time_range(january())
            .with_prop_filter(PropertyFilter::new("SUMMARY").with_text_match("standup")),
    ))
    .etags_only()
}

#[test]
fn advanced_filter_output() {
    let xml = build_advanced_filter_request(&standup_filter()).unwrap();
    insta::assert_snapshot!(
        compact(&xml),
        @r#"<c:calendar-query><d:prop><d:getetag/></d:prop><c:filter><c:comp-filter name="VCALENDAR"><c:comp-filter name="VEVENT" test="anyof"><c:time-range start="20240101T000000Z" end="20240201T000000Z"/><c:prop-filter name="SUMMARY"><c:text-match>standup</c:text-match></c:prop-filter></c:comp-filter></c:comp-filter></c:filter></c:calendar-query>"#
    );
}

#[test]
fn advanced_filter_parses_back() {
    let xml = build_advanced_filter_request(&standup_filter()).unwrap();
    let tree = parse_xml(&xml, &ParseOptions::default()).unwrap();
    let (name, root) = tree.root().unwrap();
    assert_eq!(name, "c:calendar-query");

    let event = root
        .as_object()
        .and_then(|q| q.get("c:filter"))
        .and_then(XmlValue::as_object)
        .and_then(|f| f.get("c:comp-filter"))
        .and_then(XmlValue::as_object)
        .and_then(|cal| cal.get("c:comp-filter"))
        .and_then(XmlValue::as_object)
        .unwrap();
    assert_eq!(event.attribute("name"), Some("VEVENT"));
    assert_eq!(event.attribute("test"), Some("anyof"));

    let range = event.get("c:time-range").and_then(XmlValue::as_object).unwrap();
    assert_eq!(range.attribute("start"), Some("20240101T000000Z"));
    assert_eq!(range.attribute("end"), Some("20240201T000000Z"));

    let summary = event.get("c:prop-filter").and_then(XmlValue::as_object).unwrap();
    assert_eq!(summary.attribute("name"), Some("SUMMARY"));
    assert_eq!(
        summary.get("c:text-match").and_then(XmlValue::as_text),
        Some("standup")
    );
}

#[test]
fn nested_filters_render_in_order() {
    let filter = ComponentFilter::new("VCALENDAR").with_comp_filter(
        ComponentFilter::new("VEVENT")
            .with_comp_filter(ComponentFilter::new("VALARM").with_test(FilterTest::AllOf))
            .with_prop_filter(PropertyFilter::new("LOCATION")),
    );
    let xml = build_advanced_filter_request(&FilterOptions::new(filter)).unwrap();
    let body = compact(&xml);
    let location = body.find(r#"<c:prop-filter name="LOCATION"/>"#).unwrap();
    let alarm = body.find(r#"<c:comp-filter name="VALARM" test="allof"/>"#).unwrap();
    assert!(location < alarm);
    assert!(body.contains("<d:prop><d:getetag/><c:calendar-data/></d:prop>"));
}

#[test]
fn failed_fill_surfaces_builder_error() {
    let err = build_document("d:propfind", |b| {
        b.start_element("d:prop")?;
        Ok(())
    })
    .unwrap_err();
    assert!(matches!(
        err,
        CalDavError::Builder(BuilderError::UnclosedElements { ref open }) if open == &["d:prop"]
    ));

    let err = build_document("d:propfind", |b| {
        b.set_content("text")?.start_element("d:prop")?;
        Ok(())
    })
    .unwrap_err();
    assert!(matches!(
        err,
        CalDavError::Builder(BuilderError::MixedContent { .. })
    ));
}
