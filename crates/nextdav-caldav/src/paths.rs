//! Calendar collection and event URLs on a Nextcloud-style DAV server.

use url::Url;

use crate::error::{CalDavError, CalDavResult};

/// Path from the server root to the per-user calendar homes.
pub const CALENDAR_HOME_ROOT: &str = "remote.php/dav/calendars";

/// Extension of event resources.
pub const EVENT_EXTENSION: &str = ".ics";

/// Builds URLs under `{base}/remote.php/dav/calendars/{username}/`.
///
/// Every caller-supplied segment is percent-encoded, so ids containing
/// `/`, spaces or `?` stay inside their own segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarPaths {
    base: Url,
    username: String,
}

impl CalendarPaths {
    /// Creates the path builder for `username` on the server at `base_url`.
    ///
    /// Query and fragment of the base are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or cannot carry a path.
    pub fn new(base_url: impl AsRef<str>, username: impl Into<String>) -> CalDavResult<Self> {
        let mut base = Url::parse(base_url.as_ref())?;
        if base.cannot_be_a_base() {
            return Err(CalDavError::CannotBeBase(base.into()));
        }
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self {
            base,
            username: username.into(),
        })
    }

    /// The user's calendar home, with a trailing slash.
    pub fn home(&self) -> String {
        self.join(&[], true)
    }

    /// A calendar collection, with a trailing slash.
    pub fn calendar(&self, calendar_id: &str) -> String {
        self.join(&[calendar_id], true)
    }

    /// An event resource. `.ics` is appended unless the id already ends with it.
    pub fn event(&self, calendar_id: &str, event_id: &str) -> String {
        if event_id.ends_with(EVENT_EXTENSION) {
            self.join(&[calendar_id, event_id], false)
        } else {
            let file = format!("{event_id}{EVENT_EXTENSION}");
            self.join(&[calendar_id, &file], false)
        }
    }

    /// The user this builder targets.
    pub fn username(&self) -> &str {
        &self.username
    }

    fn join(&self, segments: &[&str], trailing_slash: bool) -> String {
        let mut url = self.base.as_str().trim_end_matches('/').to_string();
        url.push('/');
        url.push_str(CALENDAR_HOME_ROOT);
        url.push('/');
        url.push_str(&urlencoding::encode(&self.username));
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        if trailing_slash {
            url.push('/');
        }
        url
    }
}

/// Last non-empty segment of an href, percent-decoded.
///
/// Used to recover calendar and event ids from multistatus hrefs such as
/// `/remote.php/dav/calendars/alice/work%20stuff/`.
pub fn last_segment(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    let segment = path.split('/').rev().find(|s| !s.is_empty())?;
    urlencoding::decode(segment).ok().map(|s| s.into_owned())
}

/// Event id from an event href: the last segment without `.ics`.
pub fn event_id_from_href(href: &str) -> Option<String> {
    let name = last_segment(href)?;
    Some(match name.strip_suffix(EVENT_EXTENSION) {
        Some(id) => id.to_string(),
        None => name,
    })
}
