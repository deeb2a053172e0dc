//! Calendar-query filter trees.
//!
//! A [`ComponentFilter`] mirrors `<c:comp-filter>`: it names an iCalendar
//! component, optionally restricts it to a time range, and holds property
//! filters and nested component filters. Ownership keeps the tree acyclic.

use nextdav_core::TimeRange;
use nextdav_xml::{BuilderError, XmlBuilder};
use serde::{Deserialize, Serialize};

/// How the children of a filter combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterTest {
    /// Any child must match.
    AnyOf,
    /// All children must match.
    AllOf,
}

impl FilterTest {
    /// The attribute value written on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnyOf => "anyof",
            Self::AllOf => "allof",
        }
    }
}

/// A `<c:prop-filter>` on an iCalendar property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyFilter {
    /// Property name, e.g. `SUMMARY`.
    pub name: String,
    /// Combination rule for the filter's children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<FilterTest>,
    /// Substring the property value must contain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_match: Option<String>,
}

impl PropertyFilter {
    /// Creates a property filter with no conditions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            test: None,
            text_match: None,
        }
    }

    /// Sets the combination rule.
    #[must_use]
    pub fn with_test(mut self, test: FilterTest) -> Self {
        self.test = Some(test);
        self
    }

    /// Requires the property to contain `text`.
    #[must_use]
    pub fn with_text_match(mut self, text: impl Into<String>) -> Self {
        self.text_match = Some(text.into());
        self
    }

    fn render(&self, builder: &mut XmlBuilder) -> Result<(), BuilderError> {
        builder
            .start_element("c:prop-filter")?
            .add_attribute("name", &self.name)?;
        if let Some(test) = self.test {
            builder.add_attribute("test", test.as_str())?;
        }
        if let Some(text) = &self.text_match {
            builder.add_element("c:text-match", Some(text.as_str()))?;
        }
        builder.end_element()?;
        Ok(())
    }
}

/// A `<c:comp-filter>` on an iCalendar component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentFilter {
    /// Component name, e.g. `VCALENDAR` or `VEVENT`.
    pub name: String,
    /// Combination rule for the filter's children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<FilterTest>,
    /// Restricts matches to components overlapping this window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    /// Property filters, rendered before nested component filters.
    #[serde(default)]
    pub prop_filters: Vec<PropertyFilter>,
    /// Nested component filters.
    #[serde(default)]
    pub comp_filters: Vec<ComponentFilter>,
}

impl ComponentFilter {
    /// Creates a component filter with no conditions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            test: None,
            time_range: None,
            prop_filters: Vec::new(),
            comp_filters: Vec::new(),
        }
    }

    /// The usual `VCALENDAR > VEVENT` nesting around an event filter.
    pub fn vcalendar_with(event: ComponentFilter) -> Self {
        Self::new("VCALENDAR").with_comp_filter(event)
    }

    /// Sets the combination rule.
    #[must_use]
    pub fn with_test(mut self, test: FilterTest) -> Self {
        self.test = Some(test);
        self
    }

    /// Restricts the component to a time range.
    #[must_use]
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Adds a property filter.
    #[must_use]
    pub fn with_prop_filter(mut self, filter: PropertyFilter) -> Self {
        self.prop_filters.push(filter);
        self
    }

    /// Adds a nested component filter.
    #[must_use]
    pub fn with_comp_filter(mut self, filter: ComponentFilter) -> Self {
        self.comp_filters.push(filter);
        self
    }

    /// Depth of the filter tree, counting this node.
    pub fn depth(&self) -> usize {
        1 + self
            .comp_filters
            .iter()
            .map(ComponentFilter::depth)
            .max()
            .unwrap_or(0)
    }

    /// Writes the filter at the builder's cursor: name, test, time range,
    /// property filters, then nested component filters.
    pub(crate) fn render(&self, builder: &mut XmlBuilder) -> Result<(), BuilderError> {
        builder
            .start_element("c:comp-filter")?
            .add_attribute("name", &self.name)?;
        if let Some(test) = self.test {
            builder.add_attribute("test", test.as_str())?;
        }
        if let Some(range) = &self.time_range {
            builder
                .start_element("c:time-range")?
                .add_attribute("start", &range.start_str())?
                .add_attribute("end", &range.end_str())?
                .end_element()?;
        }
        for prop in &self.prop_filters {
            prop.render(builder)?;
        }
        for comp in &self.comp_filters {
            comp.render(builder)?;
        }
        builder.end_element()?;
        Ok(())
    }
}

/// Input to [`build_advanced_filter_request`](super::build_advanced_filter_request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    /// Root of the filter tree, normally `VCALENDAR`.
    pub filter: ComponentFilter,
    /// Request `calendar-data` alongside `getetag`.
    #[serde(default = "default_include_data")]
    pub include_calendar_data: bool,
}

fn default_include_data() -> bool {
    true
}

impl FilterOptions {
    /// Wraps a filter tree, requesting calendar data.
    pub fn new(filter: ComponentFilter) -> Self {
        Self {
            filter,
            include_calendar_data: true,
        }
    }

    /// Only request etags.
    #[must_use]
    pub fn etags_only(mut self) -> Self {
        self.include_calendar_data = false;
        self
    }
}
