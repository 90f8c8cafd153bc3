//! Meeting list filters backed by the URL query string.
//!
//! The query string is the single source of truth for the meetings list
//! filters. `FilterState` is its canonical decoded form:
//!
//! - `parse` is total: unknown keys are ignored and malformed values fall back
//!   to their defaults, so a hand-edited URL can never fail a page.
//! - `serialize` omits every field equal to its default, keeping URLs minimal.
//! - `parse(serialize(f)) == f` for every `FilterState`.
//!
//! Components never keep their own copy of the filters; they go through a
//! [`FilterStore`] (`read` / `write`), and `update` / `clear` are expressed
//! on top of it.

use serde::Serialize;
use url::form_urlencoded;

use crate::models::MeetingStatus;

/// First page of any paginated listing.
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MIN_PAGE_SIZE: u32 = 1;
pub const MAX_PAGE_SIZE: u32 = 100;

const KEY_STATUS: &str = "status";
const KEY_SEARCH: &str = "search";
const KEY_AGENT_ID: &str = "agentId";
const KEY_PAGE: &str = "page";

/// Canonical filter set for the meetings list.
///
/// `page` is private so the `page >= 1` invariant cannot be broken from
/// outside; use [`FilterState::with_page`] or a [`FilterPatch`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub status: Option<MeetingStatus>,
    pub search: String,
    pub agent_id: String,
    page: u32,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            status: None,
            search: String::new(),
            agent_id: String::new(),
            page: DEFAULT_PAGE,
        }
    }
}

impl FilterState {
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Returns a copy with the given page; `0` is coerced to [`DEFAULT_PAGE`].
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = sanitize_page(page);
        self
    }

    pub fn with_status(mut self, status: Option<MeetingStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// True when any constraining filter (status, search, agent) is set.
    /// Pagination alone does not count as a modification.
    pub fn is_modified(&self) -> bool {
        self.status.is_some() || !self.search.is_empty() || !self.agent_id.is_empty()
    }

    /// Decode a query string. Accepts an optional leading `?`. Never fails.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);

        let mut status = None;
        let mut search = None;
        let mut agent_id = None;
        let mut page = None;

        // First occurrence of a key wins, like URLSearchParams.get.
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                KEY_STATUS if status.is_none() => status = Some(value.parse::<MeetingStatus>().ok()),
                KEY_SEARCH if search.is_none() => search = Some(value.into_owned()),
                KEY_AGENT_ID if agent_id.is_none() => agent_id = Some(value.into_owned()),
                KEY_PAGE if page.is_none() => page = Some(parse_page(&value)),
                _ => {}
            }
        }

        Self {
            status: status.flatten(),
            search: search.unwrap_or_default(),
            agent_id: agent_id.unwrap_or_default(),
            page: page.unwrap_or(DEFAULT_PAGE),
        }
    }

    /// Encode into a query string without the leading `?`.
    /// Defaults are omitted; an all-default state encodes to `""`.
    pub fn serialize(&self) -> String {
        let mut out = form_urlencoded::Serializer::new(String::new());
        if let Some(status) = self.status {
            out.append_pair(KEY_STATUS, status.as_str());
        }
        if !self.search.is_empty() {
            out.append_pair(KEY_SEARCH, &self.search);
        }
        if !self.agent_id.is_empty() {
            out.append_pair(KEY_AGENT_ID, &self.agent_id);
        }
        if self.page != DEFAULT_PAGE {
            out.append_pair(KEY_PAGE, &self.page.to_string());
        }
        out.finish()
    }

    /// Merge a patch into this state, producing a new canonical state.
    pub fn apply(&self, patch: FilterPatch) -> Self {
        Self {
            status: patch.status.unwrap_or(self.status),
            search: patch.search.unwrap_or_else(|| self.search.clone()),
            agent_id: patch.agent_id.unwrap_or_else(|| self.agent_id.clone()),
            page: patch.page.map(sanitize_page).unwrap_or(self.page),
        }
    }
}

fn parse_page(raw: &str) -> u32 {
    raw.trim().parse::<u32>().map(sanitize_page).unwrap_or(DEFAULT_PAGE)
}

fn sanitize_page(page: u32) -> u32 {
    page.max(DEFAULT_PAGE)
}

/// Partial update of a [`FilterState`]. `None` leaves a field untouched.
///
/// `status` is doubly optional: `Some(None)` explicitly removes the status
/// constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub status: Option<Option<MeetingStatus>>,
    pub search: Option<String>,
    pub agent_id: Option<String>,
    pub page: Option<u32>,
}

impl FilterPatch {
    /// Patch resetting every field to its default.
    pub fn reset() -> Self {
        Self {
            status: Some(None),
            search: Some(String::new()),
            agent_id: Some(String::new()),
            page: Some(DEFAULT_PAGE),
        }
    }

    pub fn status(status: Option<MeetingStatus>) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn search(search: impl Into<String>) -> Self {
        Self {
            search: Some(search.into()),
            ..Self::default()
        }
    }

    pub fn agent_id(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Self::default()
        }
    }

    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            ..Self::default()
        }
    }
}

/// External key-value store holding the filters.
pub trait FilterStore {
    fn read(&self) -> FilterState;

    /// Merge `patch` into the stored state and persist the canonical result.
    fn write(&mut self, patch: FilterPatch) -> FilterState;

    /// Apply a partial update. The returned state is what a dependent
    /// listing should refetch with.
    fn update(&mut self, patch: FilterPatch) -> FilterState {
        let next = self.write(patch);
        tracing::debug!(query = %next.serialize(), "Meeting filters updated");
        next
    }

    /// Reset all filters to their defaults. Idempotent.
    fn clear(&mut self) -> FilterState {
        self.update(FilterPatch::reset())
    }
}

/// [`FilterStore`] over a browser-style location (`path?query`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlFilterStore {
    path: String,
    query: String,
}

impl UrlFilterStore {
    pub fn new(path: impl Into<String>, query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            path: path.into(),
            query: query.strip_prefix('?').map(str::to_string).unwrap_or(query),
        }
    }

    /// Split a location such as `/meetings?status=active` into path and query.
    /// A trailing `#fragment` is dropped.
    pub fn from_location(location: &str) -> Self {
        let location = location
            .split_once('#')
            .map_or(location, |(before, _)| before);
        match location.split_once('?') {
            Some((path, query)) => Self::new(path, query),
            None => Self::new(location, ""),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Current location with the canonical query attached, if any.
    pub fn location(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

impl FilterStore for UrlFilterStore {
    fn read(&self) -> FilterState {
        FilterState::parse(&self.query)
    }

    fn write(&mut self, patch: FilterPatch) -> FilterState {
        let next = self.read().apply(patch);
        self.query = next.serialize();
        next
    }
}
