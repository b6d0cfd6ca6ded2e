//! One dashboard session: configuration, preferences, view state, fetching,
//! filtering and grouping wired together.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::normalize_repositories;
use crate::config::{Dashboard, DashboardSource};
use crate::error::{DashError, Result};
use crate::executor::QueryExecutor;
use crate::filter::{
  apply_filters, available_authors, available_branches, selected_repositories,
  toggle_repository, AuthorOption, FilterOptions,
};
use crate::github::types::{Label, PullRequest, StateFilter};
use crate::grouping::{group_records, GroupBucket};
use crate::pagination::{Paginator, SessionStatus, SessionUpdate};
use crate::prefs::{Preferences, PreferencesStore};
use crate::view_state::{
  dashboard_default_state, parse_view_state, Location, ViewState, ViewStateSync,
};

/// Fetch sizing for a dashboard session
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
  pub page_size: u32,
  pub max_pages: u32,
}

/// Main dashboard state
pub struct DashboardApp<L: Location> {
  dashboard: Dashboard,
  /// Every repository the dashboard covers, in configured order
  repositories: Vec<String>,
  executor: Arc<QueryExecutor>,
  paginator: Paginator,
  view: ViewStateSync<L>,
  store: Arc<PreferencesStore>,
  prefs: Preferences,
  labels: Vec<Label>,
  /// Dismissible error from a side request (labels, preferences)
  notice: Option<DashError>,
}

impl<L: Location> DashboardApp<L> {
  /// Open the dashboard `dashboard_id` and start fetching.
  ///
  /// An unknown dashboard or one without repositories is a configuration
  /// error. The view state comes from `location` when it carries filters,
  /// otherwise from the dashboard's filter merged with the server defaults.
  pub fn open(
    dashboard_id: &str,
    source: &dyn DashboardSource,
    executor: Arc<QueryExecutor>,
    store: Arc<PreferencesStore>,
    location: L,
    limits: FetchLimits,
  ) -> Result<Self> {
    let dashboard = source.find_dashboard(dashboard_id)?.ok_or_else(|| {
      DashError::Configuration(format!("Dashboard not found: {}", dashboard_id))
    })?;

    let repositories = dashboard.repositories();
    if repositories.is_empty() {
      return Err(DashError::Configuration(format!(
        "Dashboard '{}' has no repositories configured",
        dashboard.id
      )));
    }

    let default_state = dashboard_default_state(&dashboard.filter);
    let base = ViewState {
      state: default_state,
      filters: parse_view_state(&dashboard.filter, default_state).filters,
    };
    let view = ViewStateSync::load(location, base, || {
      source.get_defaults().map(|defaults| defaults.filters)
    });

    let mut notice = None;
    let prefs = match store.load(&dashboard.id) {
      Ok(prefs) => prefs,
      Err(e) => {
        warn!(dashboard = %dashboard.id, error = %e, "failed to load preferences");
        notice = Some(e);
        Preferences::default()
      }
    };

    let paginator =
      Paginator::new(Arc::clone(&executor), limits.page_size).with_max_pages(limits.max_pages);

    let mut app = Self {
      dashboard,
      repositories,
      executor,
      paginator,
      view,
      store,
      prefs,
      labels: Vec::new(),
      notice,
    };

    info!(
      dashboard = %app.dashboard.id,
      repositories = app.repositories.len(),
      state = %app.state(),
      "opening dashboard"
    );
    // Every configured repository is fetched; the selection only filters
    let state = app.state();
    app.paginator.start(&app.repositories, state);
    Ok(app)
  }

  pub fn dashboard(&self) -> &Dashboard {
    &self.dashboard
  }

  pub fn repositories(&self) -> &[String] {
    &self.repositories
  }

  pub fn state(&self) -> StateFilter {
    self.view.view().state
  }

  pub fn filters(&self) -> &FilterOptions {
    &self.view.view().filters
  }

  pub fn location(&self) -> &L {
    self.view.location()
  }

  pub fn preferences(&self) -> &Preferences {
    &self.prefs
  }

  pub fn labels(&self) -> &[Label] {
    &self.labels
  }

  pub fn status(&self) -> &SessionStatus {
    self.paginator.status()
  }

  pub fn is_loading(&self) -> bool {
    self.paginator.is_busy()
  }

  /// Error that stopped the current session. Check
  /// [`DashError::is_blocking`] to tell a blocking failure from an inline one.
  pub fn error(&self) -> Option<&DashError> {
    self.paginator.error()
  }

  pub fn notice(&self) -> Option<&DashError> {
    self.notice.as_ref()
  }

  pub fn dismiss_notice(&mut self) {
    self.notice = None;
  }

  pub fn has_more(&self) -> bool {
    self.paginator.has_more()
  }

  /// Every record fetched so far, before any filtering.
  pub fn fetched(&self) -> &[PullRequest] {
    self.paginator.records()
  }

  /// Repositories currently shown.
  pub fn selected_repositories(&self) -> Vec<String> {
    selected_repositories(&self.filters().repositories, &self.repositories)
  }

  fn in_selected_repositories(&self) -> Vec<PullRequest> {
    let selected = self.selected_repositories();
    self
      .fetched()
      .iter()
      .filter(|pr| selected.contains(&pr.repository))
      .cloned()
      .collect()
  }

  /// Fetched records after the active filters.
  pub fn visible(&self) -> Vec<PullRequest> {
    let filters = FilterOptions {
      repositories: self.selected_repositories(),
      ..self.filters().clone()
    };
    apply_filters(self.fetched(), &filters)
  }

  /// Visible records grouped by the saved grouping preferences.
  pub fn groups(&self) -> Vec<GroupBucket> {
    group_records(
      &self.visible(),
      &self.prefs.group_by_labels,
      &self.prefs.group_by_authors,
      &self.labels,
    )
  }

  /// Authors available for filtering within the selected repositories.
  pub fn available_authors(&self) -> Vec<AuthorOption> {
    available_authors(&self.in_selected_repositories())
  }

  pub fn available_branches(&self) -> Vec<String> {
    available_branches(&self.in_selected_repositories())
  }

  pub fn active_filter_count(&self) -> usize {
    self.filters().active_count()
  }

  pub fn set_filters(&mut self, filters: FilterOptions) {
    self.view.set_filters(filters);
  }

  /// Switch the lifecycle state; starts a new fetch session when it changed.
  pub fn set_state(&mut self, state: StateFilter) {
    self.view.set_state(state);
    self.paginator.select(&self.repositories, state);
  }

  pub fn toggle_repository(&mut self, repository: &str) {
    let next = toggle_repository(&self.selected_repositories(), &self.repositories, repository);
    let filters = FilterOptions {
      repositories: next,
      ..self.filters().clone()
    };
    self.view.set_filters(filters);
  }

  /// Save new grouping keys for this dashboard.
  pub fn set_grouping(&mut self, group_by_labels: Vec<String>, group_by_authors: Vec<String>) {
    self.prefs.group_by_labels = group_by_labels;
    self.prefs.group_by_authors = group_by_authors;
    if let Err(e) = self.store.save(&self.dashboard.id, &self.prefs) {
      warn!(dashboard = %self.dashboard.id, error = %e, "failed to save preferences");
      self.notice = Some(e);
    }
  }

  /// Fetch the label catalog. Failures become a dismissible notice.
  pub async fn load_labels(&mut self) {
    let repositories = normalize_repositories(&self.repositories);
    match self.executor.fetch_labels(&repositories).await {
      Ok(result) => self.labels = result.data,
      Err(e) => {
        warn!(dashboard = %self.dashboard.id, error = %e, "failed to load labels");
        self.notice = Some(e);
      }
    }
  }

  pub fn refresh(&mut self) {
    self.paginator.refresh();
  }

  pub fn load_more(&mut self) -> bool {
    self.paginator.load_more()
  }

  pub fn refresh_if_stale(&mut self, now: DateTime<Utc>) -> bool {
    self.paginator.refresh_if_stale(now)
  }

  pub async fn next_update(&mut self) -> Option<SessionUpdate> {
    self.paginator.next_update().await
  }

  /// Wait until the current session stops fetching.
  pub async fn settle(&mut self) -> &SessionStatus {
    self.paginator.settle().await
  }
}
