//! Mapping between the active filter set and a shareable query string.
//!
//! The filter set is the source of truth; the query string is rewritten
//! (with replace semantics) whenever it changes. On first load a query
//! string that carries any recognized key is adopted as-is, otherwise the
//! configured defaults are fetched once and written back to the location.

use tracing::{debug, warn};
use url::form_urlencoded;

use crate::error::Result;
use crate::filter::FilterOptions;
use crate::github::types::StateFilter;

const RECOGNIZED_KEYS: [&str; 7] = [
  "state",
  "states",
  "labels",
  "authors",
  "branches",
  "search",
  "repositories",
];

/// The part of the dashboard view that survives in the query string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
  pub state: StateFilter,
  pub filters: FilterOptions,
}

fn pairs(query: &str) -> impl Iterator<Item = (String, String)> + '_ {
  form_urlencoded::parse(query.trim_start_matches('?').as_bytes()).into_owned()
}

fn split_list(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}

/// Whether `query` carries at least one key the view understands.
pub fn has_recognized_keys(query: &str) -> bool {
  pairs(query).any(|(key, _)| RECOGNIZED_KEYS.contains(&key.as_str()))
}

/// State named by a query string: `state`, else the first of `states`.
///
/// Returns `None` when neither key names a valid state.
pub fn parse_state(query: &str) -> Option<StateFilter> {
  let mut state = None;
  let mut states = None;
  for (key, value) in pairs(query) {
    match key.as_str() {
      "state" if state.is_none() => state = Some(value),
      "states" if states.is_none() => states = split_list(&value).into_iter().next(),
      _ => {}
    }
  }

  let raw = state.filter(|s| !s.trim().is_empty()).or(states)?;
  match raw.parse() {
    Ok(state) => Some(state),
    Err(e) => {
      debug!(error = %e, "ignoring unknown state in query string");
      None
    }
  }
}

/// Default state for a dashboard whose filter is `filter`; `open` when the
/// filter names none.
pub fn dashboard_default_state(filter: &str) -> StateFilter {
  parse_state(filter).unwrap_or_default()
}

/// Parse a query string. Keys that are absent leave the corresponding
/// field empty; the state falls back to `default_state`.
pub fn parse_view_state(query: &str, default_state: StateFilter) -> ViewState {
  let mut filters = FilterOptions::default();
  for (key, value) in pairs(query) {
    match key.as_str() {
      "labels" => filters.labels = split_list(&value),
      "authors" => filters.authors = split_list(&value),
      "branches" => filters.branches = split_list(&value),
      "repositories" => filters.repositories = split_list(&value),
      "search" if !value.trim().is_empty() => filters.search_query = Some(value),
      _ => {}
    }
  }

  ViewState {
    state: parse_state(query).unwrap_or(default_state),
    filters,
  }
}

/// Serialize to a query string without the leading `?`. Empty lists and an
/// empty search are left out; the state is always written.
pub fn to_query_string(view: &ViewState) -> String {
  let mut serializer = form_urlencoded::Serializer::new(String::new());
  serializer.append_pair("state", view.state.as_str());

  let lists = [
    ("labels", &view.filters.labels),
    ("authors", &view.filters.authors),
    ("branches", &view.filters.branches),
    ("repositories", &view.filters.repositories),
  ];
  for (key, values) in lists {
    if !values.is_empty() {
      serializer.append_pair(key, &values.join(","));
    }
  }

  if let Some(search) = view
    .filters
    .search_query
    .as_deref()
    .filter(|s| !s.trim().is_empty())
  {
    serializer.append_pair("search", search);
  }

  serializer.finish()
}

/// Fill empty fields of `view` from `defaults`.
fn merge(defaults: ViewState, view: ViewState) -> ViewState {
  fn pick(value: Vec<String>, fallback: Vec<String>) -> Vec<String> {
    if value.is_empty() {
      fallback
    } else {
      value
    }
  }

  let ViewState { state, filters } = view;
  let base = defaults.filters;
  ViewState {
    state,
    filters: FilterOptions {
      labels: pick(filters.labels, base.labels),
      authors: pick(filters.authors, base.authors),
      branches: pick(filters.branches, base.branches),
      repositories: pick(filters.repositories, base.repositories),
      search_query: filters.search_query.or(base.search_query),
      ..base
    },
  }
}

/// Where the query string is visible, e.g. a browser location bar.
pub trait Location {
  /// Current query string, with or without the leading `?`.
  fn search(&self) -> String;

  /// Overwrite the query string without adding a history entry.
  fn replace(&mut self, query: &str);
}

/// In-process [`Location`].
#[derive(Debug, Clone, Default)]
pub struct MemoryLocation {
  query: String,
  replaces: usize,
}

impl MemoryLocation {
  pub fn new(query: impl Into<String>) -> Self {
    Self {
      query: query.into(),
      replaces: 0,
    }
  }

  /// How many times the query string has been replaced.
  pub fn replace_count(&self) -> usize {
    self.replaces
  }
}

impl Location for MemoryLocation {
  fn search(&self) -> String {
    self.query.clone()
  }

  fn replace(&mut self, query: &str) {
    self.query = query.to_string();
    self.replaces += 1;
  }
}

/// Keeps a [`ViewState`] and a [`Location`] in step.
pub struct ViewStateSync<L: Location> {
  location: L,
  view: ViewState,
}

impl<L: Location> ViewStateSync<L> {
  /// Initialize from the location.
  ///
  /// `base` holds the dashboard's own defaults. When the location has no
  /// recognized key, `server_defaults` is called exactly once for the
  /// configured default query string; its fields override `base`, and the
  /// result is written back to the location. A failing lookup keeps `base`.
  pub fn load<F>(mut location: L, base: ViewState, server_defaults: F) -> Self
  where
    F: FnOnce() -> Result<String>,
  {
    let search = location.search();
    if has_recognized_keys(&search) {
      debug!(query = %search, "adopting view state from location");
      let view = parse_view_state(&search, base.state);
      return Self { location, view };
    }

    let view = match server_defaults() {
      Ok(query) => {
        let state = base.state;
        merge(base, parse_view_state(&query, state))
      }
      Err(e) => {
        warn!(error = %e, "failed to load default filters");
        base
      }
    };
    location.replace(&to_query_string(&view));
    Self { location, view }
  }

  pub fn view(&self) -> &ViewState {
    &self.view
  }

  pub fn location(&self) -> &L {
    &self.location
  }

  /// Replace the filters and rewrite the location.
  pub fn set_filters(&mut self, filters: FilterOptions) {
    self.view.filters = filters;
    self.sync();
  }

  /// Change the state and rewrite the location.
  pub fn set_state(&mut self, state: StateFilter) {
    self.view.state = state;
    self.sync();
  }

  fn sync(&mut self) {
    let query = to_query_string(&self.view);
    self.location.replace(&query);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::DashError;
  use std::cell::Cell;
  use std::collections::BTreeSet;

  fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
  }

  fn as_set(values: &[String]) -> BTreeSet<&str> {
    values.iter().map(String::as_str).collect()
  }

  #[test]
  fn test_round_trip_preserves_filters() {
    let view = ViewState {
      state: StateFilter::Merged,
      filters: FilterOptions {
        labels: strings(&["type:bug", "needs review"]),
        authors: strings(&["alice"]),
        branches: strings(&["main", "release/1.0"]),
        repositories: strings(&["a/y", "a/x"]),
        search_query: Some("fix & polish".to_string()),
        ..Default::default()
      },
    };

    let parsed = parse_view_state(&to_query_string(&view), StateFilter::Open);
    assert_eq!(parsed.state, StateFilter::Merged);
    assert_eq!(as_set(&parsed.filters.labels), as_set(&view.filters.labels));
    assert_eq!(as_set(&parsed.filters.authors), as_set(&view.filters.authors));
    assert_eq!(as_set(&parsed.filters.branches), as_set(&view.filters.branches));
    assert_eq!(
      as_set(&parsed.filters.repositories),
      as_set(&view.filters.repositories)
    );
    assert_eq!(parsed.filters.search_query, view.filters.search_query);
  }

  #[test]
  fn test_parse_trims_and_drops_empty_items() {
    let view = parse_view_state("?labels=a,%20b,,&search=", StateFilter::Closed);
    assert_eq!(view.filters.labels, strings(&["a", "b"]));
    assert_eq!(view.filters.search_query, None);
    assert_eq!(view.state, StateFilter::Closed);
  }

  #[test]
  fn test_state_and_states() {
    assert_eq!(parse_state("state=closed"), Some(StateFilter::Closed));
    assert_eq!(parse_state("states=merged,open"), Some(StateFilter::Merged));
    assert_eq!(parse_state("labels=x"), None);
    assert_eq!(parse_state("state=bogus"), None);

    assert_eq!(dashboard_default_state("states=closed"), StateFilter::Closed);
    assert_eq!(dashboard_default_state(""), StateFilter::Open);
  }

  #[test]
  fn test_load_adopts_location_without_defaults() {
    let called = Cell::new(false);
    let sync = ViewStateSync::load(
      MemoryLocation::new("?authors=bob"),
      ViewState::default(),
      || {
        called.set(true);
        Ok("labels=ignored".to_string())
      },
    );

    assert!(!called.get());
    assert_eq!(sync.view().filters.authors, strings(&["bob"]));
    assert!(sync.view().filters.labels.is_empty());
    assert_eq!(sync.location().replace_count(), 0);
  }

  #[test]
  fn test_load_merges_defaults_and_replaces_location() {
    let base = ViewState {
      state: StateFilter::Closed,
      filters: FilterOptions {
        labels: strings(&["dashboard-label"]),
        branches: strings(&["main"]),
        ..Default::default()
      },
    };

    let sync = ViewStateSync::load(MemoryLocation::new(""), base, || {
      Ok("labels=server-label".to_string())
    });

    let view = sync.view();
    assert_eq!(view.state, StateFilter::Closed);
    assert_eq!(view.filters.labels, strings(&["server-label"]));
    assert_eq!(view.filters.branches, strings(&["main"]));

    let location = sync.location();
    assert_eq!(location.replace_count(), 1);
    assert_eq!(
      parse_view_state(&location.search(), StateFilter::Open),
      view.clone()
    );
  }

  #[test]
  fn test_load_keeps_base_when_defaults_fail() {
    let base = ViewState {
      state: StateFilter::Open,
      filters: FilterOptions {
        authors: strings(&["alice"]),
        ..Default::default()
      },
    };
    let sync = ViewStateSync::load(MemoryLocation::default(), base.clone(), || {
      Err(DashError::Transport("unreachable".to_string()))
    });
    assert_eq!(sync.view(), &base);
    assert_eq!(sync.location().replace_count(), 1);
  }

  #[test]
  fn test_changes_use_replace() {
    let mut sync = ViewStateSync::load(
      MemoryLocation::new("state=open"),
      ViewState::default(),
      || Ok(String::new()),
    );

    sync.set_filters(FilterOptions {
      labels: strings(&["docs"]),
      ..Default::default()
    });
    sync.set_state(StateFilter::Closed);

    assert_eq!(sync.location().replace_count(), 2);
    let search = sync.location().search();
    assert!(search.contains("labels=docs"));
    assert!(search.contains("state=closed"));
  }
}
