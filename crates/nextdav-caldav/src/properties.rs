//! Calendar property names and their namespace-normalized projections.

use nextdav_xml::{XmlValue, find_children};
use serde::{Deserialize, Serialize};

use crate::response::CalDavResponse;

/// A WebDAV property: its spelling with the standard prefixes and its
/// local name, tried in that order when reading responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyName {
    /// Qualified name with a standard prefix (`x1:calendar-color`).
    pub qualified: &'static str,
    /// Local name (`calendar-color`).
    pub local: &'static str,
}

impl PropertyName {
    const fn new(qualified: &'static str, local: &'static str) -> Self {
        Self { qualified, local }
    }
}

pub const DISPLAY_NAME: PropertyName = PropertyName::new("d:displayname", "displayname");
pub const RESOURCE_TYPE: PropertyName = PropertyName::new("d:resourcetype", "resourcetype");
pub const SYNC_TOKEN: PropertyName = PropertyName::new("d:sync-token", "sync-token");
pub const GETETAG: PropertyName = PropertyName::new("d:getetag", "getetag");
pub const GETCTAG: PropertyName = PropertyName::new("cs:getctag", "getctag");
pub const CALENDAR_DATA: PropertyName = PropertyName::new("c:calendar-data", "calendar-data");
pub const SUPPORTED_COMPONENTS: PropertyName = PropertyName::new(
    "c:supported-calendar-component-set",
    "supported-calendar-component-set",
);
pub const CALENDAR_COLOR: PropertyName = PropertyName::new("x1:calendar-color", "calendar-color");
pub const CALENDAR_ORDER: PropertyName = PropertyName::new("x1:calendar-order", "calendar-order");
pub const CALENDAR_ENABLED: PropertyName =
    PropertyName::new("oc:calendar-enabled", "calendar-enabled");
pub const CALENDAR_CATEGORY: PropertyName =
    PropertyName::new("oc:calendar-category", "calendar-category");
pub const CALENDAR_FOCUS_PRIORITY: PropertyName =
    PropertyName::new("oc:calendar-focus-priority", "calendar-focus-priority");

/// User-facing calendar metadata read from a PROPFIND response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Omitted when absent or not an integer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_priority: Option<i64>,
}

/// Reads [`CalendarProperties`] from a response, accepting both prefixed
/// and bare property keys.
pub fn extract_calendar_properties(response: &CalDavResponse) -> CalendarProperties {
    let text = |name: &PropertyName| response.property_text(name).map(str::to_string);
    CalendarProperties {
        display_name: text(&DISPLAY_NAME),
        color: text(&CALENDAR_COLOR),
        category: text(&CALENDAR_CATEGORY),
        focus_priority: response
            .property_text(&CALENDAR_FOCUS_PRIORITY)
            .and_then(|value| value.parse().ok()),
    }
}

/// Fields to change with a PROPPATCH. `None` fields are left untouched on
/// the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarPropertyUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_priority: Option<i64>,
}

impl CalendarPropertyUpdate {
    /// An update that changes nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_focus_priority(mut self, priority: i64) -> Self {
        self.focus_priority = Some(priority);
        self
    }

    /// Returns true when no field is set.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.color.is_none()
            && self.category.is_none()
            && self.focus_priority.is_none()
    }
}

/// A calendar collection found by PROPFIND.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSummary {
    /// The collection's href.
    pub href: String,
    /// True when `resourcetype` contains a `calendar` element.
    pub is_calendar: bool,
    /// Collection tag, for change detection.
    pub ctag: Option<String>,
    /// WebDAV sync token.
    pub sync_token: Option<String>,
    /// Nextcloud's per-calendar enabled flag.
    pub enabled: Option<bool>,
    /// Sort position from `calendar-order`.
    pub order: Option<i64>,
    /// Component names from `supported-calendar-component-set`.
    pub components: Vec<String>,
    #[serde(flatten)]
    pub properties: CalendarProperties,
}

impl CalendarSummary {
    /// Projects a PROPFIND response onto the calendar fields.
    pub fn from_response(response: &CalDavResponse) -> Self {
        let is_calendar = response
            .property(&RESOURCE_TYPE)
            .and_then(XmlValue::first)
            .and_then(XmlValue::as_object)
            .is_some_and(|resourcetype| {
                resourcetype
                    .keys()
                    .any(|key| nextdav_xml::local_name(key).eq_ignore_ascii_case("calendar"))
            });

        let components = response
            .property(&SUPPORTED_COMPONENTS)
            .and_then(XmlValue::first)
            .and_then(XmlValue::as_object)
            .map(|set| {
                find_children(set, &["c:comp", "comp"], "comp")
                    .iter()
                    .filter_map(XmlValue::as_object)
                    .filter_map(|comp| comp.attribute("name"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            href: response.href.clone(),
            is_calendar,
            ctag: response.property_text(&GETCTAG).map(str::to_string),
            sync_token: response.property_text(&SYNC_TOKEN).map(str::to_string),
            enabled: response
                .property_text(&CALENDAR_ENABLED)
                .and_then(parse_flag),
            order: response
                .property_text(&CALENDAR_ORDER)
                .and_then(|value| value.parse().ok()),
            components,
            properties: extract_calendar_properties(response),
        }
    }

    /// Keeps only the calendar collections of a PROPFIND result.
    pub fn collect(responses: &[CalDavResponse]) -> Vec<Self> {
        responses
            .iter()
            .map(Self::from_response)
            .filter(|summary| summary.is_calendar)
            .collect()
    }

    /// Returns true when the collection can hold events.
    pub fn supports_events(&self) -> bool {
        self.components.is_empty() || self.components.iter().any(|c| c == "VEVENT")
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn response(props: &[(&str, &str)]) -> CalDavResponse {
        CalDavResponse {
            href: "/calendars/u/c/".to_string(),
            status: "HTTP/1.1 200 OK".to_string(),
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), XmlValue::Text(v.to_string())))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn namespaced_keys() {
        let props = extract_calendar_properties(&response(&[
            ("d:displayname", "Work"),
            ("x1:calendar-color", "#ff0000"),
            ("oc:calendar-category", "job"),
            ("oc:calendar-focus-priority", "3"),
        ]));
        assert_eq!(
            props,
            CalendarProperties {
                display_name: Some("Work".into()),
                color: Some("#ff0000".into()),
                category: Some("job".into()),
                focus_priority: Some(3),
            }
        );
    }

    #[test]
    fn bare_keys_match_namespaced_keys() {
        let namespaced = extract_calendar_properties(&response(&[
            ("x1:calendar-color", "#00ff00"),
            ("oc:calendar-focus-priority", "7"),
        ]));
        let bare = extract_calendar_properties(&response(&[
            ("calendar-color", "#00ff00"),
            ("calendar-focus-priority", "7"),
        ]));
        assert_eq!(bare, namespaced);
        assert_eq!(bare.color.as_deref(), Some("#00ff00"));
        assert_eq!(bare.focus_priority, Some(7));
    }

    #[test]
    fn foreign_prefixes_are_tolerated() {
        let props = extract_calendar_properties(&response(&[
            ("ICAL:calendar-color", "#123456"),
            ("D:displayname", "Personal"),
        ]));
        assert_eq!(props.color.as_deref(), Some("#123456"));
        assert_eq!(props.display_name.as_deref(), Some("Personal"));
    }

    #[test]
    fn unparsable_priority_is_omitted() {
        let props = extract_calendar_properties(&response(&[("calendar-focus-priority", "high")]));
        assert_eq!(props.focus_priority, None);
        assert_eq!(
            serde_json::to_value(&props).unwrap(),
            serde_json::json!({})
        );
    }

    #[test]
    fn update_builder() {
        let update = CalendarPropertyUpdate::new()
            .with_display_name("Team")
            .with_focus_priority(2);
        assert!(!update.is_empty());
        assert!(update.color.is_none());
        assert!(CalendarPropertyUpdate::new().is_empty());
    }

    #[test]
    fn summary_from_propfind() {
        let xml = r#"<d:multistatus xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav" xmlns:cs="http://calendarserver.org/ns/" xmlns:oc="http://owncloud.org/ns" xmlns:x1="http://apple.com/ns/ical/">
  <d:response>
    <d:href>/remote.php/dav/calendars/alice/personal/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection/><cal:calendar/></d:resourcetype>
        <d:displayname>Personal</d:displayname>
        <cs:getctag>http://sabre.io/ns/sync/42</cs:getctag>
        <d:sync-token>http://sabre.io/ns/sync/42</d:sync-token>
        <oc:calendar-enabled>1</oc:calendar-enabled>
        <x1:calendar-order>2</x1:calendar-order>
        <x1:calendar-color>#0082C9</x1:calendar-color>
        <cal:supported-calendar-component-set><cal:comp name="VEVENT"/><cal:comp name="VTODO"/></cal:supported-calendar-component-set>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/calendars/alice/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;
        let responses =
            crate::parse_multistatus_str(xml, &nextdav_xml::ParseOptions::default()).unwrap();
        let calendars = CalendarSummary::collect(&responses);
        assert_eq!(calendars.len(), 1);

        let personal = &calendars[0];
        assert_eq!(personal.href, "/remote.php/dav/calendars/alice/personal/");
        assert_eq!(personal.ctag.as_deref(), Some("http://sabre.io/ns/sync/42"));
        assert_eq!(personal.enabled, Some(true));
        assert_eq!(personal.order, Some(2));
        assert_eq!(personal.components, ["VEVENT", "VTODO"]);
        assert!(personal.supports_events());
        assert_eq!(personal.properties.display_name.as_deref(), Some("Personal"));
        assert_eq!(personal.properties.color.as_deref(), Some("#0082C9"));

        insta::assert_json_snapshot!(personal, @r###"
        {
          "href": "/remote.php/dav/calendars/alice/personal/",
          "isCalendar": true,
          "ctag": "http://sabre.io/ns/sync/42",
          "syncToken": "http://sabre.io/ns/sync/42",
          "enabled": true,
          "order": 2,
          "components": [
            "VEVENT",
            "VTODO"
          ],
          "displayName": "Personal",
          "color": "#0082C9"
        }
        "###);
    }
}
