//! Incremental multi-page fetch controller.
//!
//! A [`Paginator`] owns one fetch session at a time. Each page is fetched in a
//! spawned task and delivered back over a channel; the paginator merges it,
//! publishes the grown record list, and only then decides whether to issue the
//! next page. Events are tagged with their session id so responses that arrive
//! after the session was replaced are dropped instead of merged.
//!
//! # Example
//!
//! ```ignore
//! let mut paginator = Paginator::new(executor, 100);
//! paginator.start(&repos, StateFilter::Open);
//!
//! while let Some(update) = paginator.next_update().await {
//!     render(paginator.records());
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{normalize_repositories, CacheResult};
use crate::error::{DashError, Result};
use crate::executor::{PullsPage, PullsRequest, QueryExecutor};
use crate::github::types::{PullRequest, StateFilter};

/// Upper bound on auto-paginated pages per session
pub const MAX_PAGES: u32 = 10;

/// Default page size requested from the executor
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Age after which a foregrounded dashboard refreshes itself
pub fn stale_after() -> Duration {
  Duration::minutes(5)
}

pub type SessionId = u64;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
  /// No session has been started
  Idle,
  /// Waiting for `page`
  Fetching { page: u32 },
  /// Auto-pagination stopped; `has_more` tells whether load-more is possible
  Complete,
  /// A page failed; records fetched before the failure are kept
  Failed(DashError),
}

/// What changed after a page event was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
  /// A page was merged and the next one is already requested
  Progress { page: u32, fetched: usize },
  /// A page was merged and the session stopped fetching
  Complete {
    page: u32,
    fetched: usize,
    has_more: bool,
  },
  Failed { page: u32, error: DashError },
  /// A response for a replaced session arrived and was dropped
  Discarded { session: SessionId, page: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
  Auto,
  LoadMore,
}

#[derive(Debug)]
struct PageEvent {
  session: SessionId,
  page: u32,
  kind: FetchKind,
  result: Result<CacheResult<PullsPage>>,
}

/// One pagination run for a fixed (repository set, state) pair
#[derive(Debug, Clone)]
pub struct Session {
  pub id: SessionId,
  pub repositories: Vec<String>,
  pub state: StateFilter,
  /// Last merged page index
  pub page: u32,
  /// Records in arrival order, append-only
  pub records: Vec<PullRequest>,
  pub has_more: bool,
  /// Fetch time of the most recently merged page
  pub last_updated: Option<DateTime<Utc>>,
  pub status: SessionStatus,
  pub loading_more: bool,
}

impl Session {
  fn new(id: SessionId, repositories: Vec<String>, state: StateFilter) -> Self {
    Self {
      id,
      repositories,
      state,
      page: 0,
      records: Vec::new(),
      has_more: false,
      last_updated: None,
      status: SessionStatus::Idle,
      loading_more: false,
    }
  }
}

/// Drives the query executor across sequential pages.
pub struct Paginator {
  executor: Arc<QueryExecutor>,
  page_size: u32,
  max_pages: u32,
  session: Session,
  next_id: SessionId,
  tx: mpsc::UnboundedSender<PageEvent>,
  rx: mpsc::UnboundedReceiver<PageEvent>,
}

impl Paginator {
  pub fn new(executor: Arc<QueryExecutor>, page_size: u32) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      executor,
      page_size,
      max_pages: MAX_PAGES,
      session: Session::new(0, Vec::new(), StateFilter::Open),
      next_id: 1,
      tx,
      rx,
    }
  }

  pub fn with_max_pages(mut self, max_pages: u32) -> Self {
    self.max_pages = max_pages.max(1);
    self
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  /// Records accumulated so far in the current session.
  pub fn records(&self) -> &[PullRequest] {
    &self.session.records
  }

  pub fn status(&self) -> &SessionStatus {
    &self.session.status
  }

  pub fn error(&self) -> Option<&DashError> {
    match &self.session.status {
      SessionStatus::Failed(error) => Some(error),
      _ => None,
    }
  }

  pub fn has_more(&self) -> bool {
    self.session.has_more
  }

  pub fn last_updated(&self) -> Option<DateTime<Utc>> {
    self.session.last_updated
  }

  /// A page request is outstanding for the current session.
  pub fn is_busy(&self) -> bool {
    matches!(self.session.status, SessionStatus::Fetching { .. }) || self.session.loading_more
  }

  /// Start a new session, discarding the current one.
  pub fn start<S: AsRef<str>>(&mut self, repositories: &[S], state: StateFilter) -> SessionId {
    self.new_session(normalize_repositories(repositories), state, false)
  }

  /// Start a new session only when the repository set or state changed.
  ///
  /// Returns whether a new session was started.
  pub fn select<S: AsRef<str>>(&mut self, repositories: &[S], state: StateFilter) -> bool {
    let repositories = normalize_repositories(repositories);
    let unchanged = self.session.status != SessionStatus::Idle
      && self.session.repositories == repositories
      && self.session.state == state;
    if unchanged {
      return false;
    }
    self.new_session(repositories, state, false);
    true
  }

  /// Restart the current session, bypassing the cache for page 1 only.
  ///
  /// Later pages of the refreshed session still go through the cache and may
  /// be up to one TTL older than page 1.
  pub fn refresh(&mut self) -> SessionId {
    let repositories = self.session.repositories.clone();
    self.new_session(repositories, self.session.state, true)
  }

  /// Refresh when idle and the last successful page is older than five
  /// minutes. Meant to be called when the dashboard is foregrounded.
  pub fn refresh_if_stale(&mut self, now: DateTime<Utc>) -> bool {
    if self.is_busy() {
      return false;
    }
    match self.session.last_updated {
      Some(last) if now - last > stale_after() => {
        info!(age_secs = (now - last).num_seconds(), "data is stale, refreshing");
        self.refresh();
        true
      }
      _ => false,
    }
  }

  /// Fetch exactly one more page after auto-pagination stopped with more data
  /// available. Returns false when not applicable or a fetch is in flight.
  pub fn load_more(&mut self) -> bool {
    let complete = self.session.status == SessionStatus::Complete;
    if self.is_busy() || !self.session.has_more || !complete {
      return false;
    }

    self.session.loading_more = true;
    self.spawn_page(self.session.page + 1, FetchKind::LoadMore, false);
    true
  }

  /// Wait for the next page event and apply it.
  ///
  /// Returns `None` once nothing is in flight for the current session and no
  /// event is queued.
  pub async fn next_update(&mut self) -> Option<SessionUpdate> {
    if !self.is_busy() && self.rx.is_empty() {
      return None;
    }
    let event = self.rx.recv().await?;
    Some(self.apply(event))
  }

  /// Drive the current session until it stops fetching.
  pub async fn settle(&mut self) -> &SessionStatus {
    while self.next_update().await.is_some() {}
    &self.session.status
  }

  fn new_session(
    &mut self,
    repositories: Vec<String>,
    state: StateFilter,
    force_refresh: bool,
  ) -> SessionId {
    let id = self.next_id;
    self.next_id += 1;

    debug!(
      session = id,
      previous = self.session.id,
      repositories = repositories.len(),
      %state,
      force_refresh,
      "new fetch session"
    );

    self.session = Session::new(id, repositories, state);

    if self.session.repositories.is_empty() {
      self.session.status = SessionStatus::Complete;
      return id;
    }

    self.session.status = SessionStatus::Fetching { page: 1 };
    self.spawn_page(1, FetchKind::Auto, force_refresh);
    id
  }

  fn spawn_page(&self, page: u32, kind: FetchKind, force_refresh: bool) {
    let request = PullsRequest {
      repositories: self.session.repositories.clone(),
      state: self.session.state,
      page_size: self.page_size,
      page,
      force_refresh,
    };
    let executor = Arc::clone(&self.executor);
    let tx = self.tx.clone();
    let session = self.session.id;

    tokio::spawn(async move {
      let result = executor.fetch_pulls(&request).await;
      // Ignore send errors - the paginator may have been dropped
      let _ = tx.send(PageEvent {
        session,
        page,
        kind,
        result,
      });
    });
  }

  fn apply(&mut self, event: PageEvent) -> SessionUpdate {
    if event.session != self.session.id {
      debug!(
        session = event.session,
        current = self.session.id,
        page = event.page,
        "discarding page from replaced session"
      );
      return SessionUpdate::Discarded {
        session: event.session,
        page: event.page,
      };
    }

    if event.kind == FetchKind::LoadMore {
      self.session.loading_more = false;
    }

    let result = match event.result {
      Ok(result) => result,
      Err(error) => {
        warn!(
          session = event.session,
          page = event.page,
          blocking = error.is_blocking(),
          error = %error,
          "page fetch failed"
        );
        self.session.status = SessionStatus::Failed(error.clone());
        return SessionUpdate::Failed {
          page: event.page,
          error,
        };
      }
    };

    let page = result.data;
    self.session.records.extend(page.data);
    self.session.page = event.page;
    self.session.has_more = page.has_more;
    self.session.last_updated = Some(page.cached_at);
    let fetched = self.session.records.len();

    let continue_auto = event.kind == FetchKind::Auto
      && page.has_more
      && self.session.state.auto_paginates()
      && event.page < self.max_pages;

    if continue_auto {
      let next = event.page + 1;
      self.session.status = SessionStatus::Fetching { page: next };
      self.spawn_page(next, FetchKind::Auto, false);
      return SessionUpdate::Progress {
        page: event.page,
        fetched,
      };
    }

    self.session.status = SessionStatus::Complete;
    info!(
      session = self.session.id,
      page = event.page,
      fetched,
      has_more = page.has_more,
      "fetch session complete"
    );
    SessionUpdate::Complete {
      page: event.page,
      fetched,
      has_more: page.has_more,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::executor::CacheTtl;
  use crate::fetch::testing::{api_pr, ScriptedFetcher};

  fn paginator(fetcher: Arc<ScriptedFetcher>) -> Paginator {
    let executor = Arc::new(QueryExecutor::new(fetcher, CacheTtl::default()));
    Paginator::new(executor, DEFAULT_PAGE_SIZE)
  }

  #[tokio::test]
  async fn test_two_repositories_single_round() {
    let fetcher = Arc::new(
      ScriptedFetcher::new()
        .with_page(
          "a/x",
          1,
          vec![api_pr(1, "alice", &[], 10), api_pr(2, "bob", &[], 30)],
          false,
        )
        .with_page("a/y", 1, vec![api_pr(7, "carol", &[], 20)], false),
    );
    let mut p = paginator(fetcher);

    p.start(&["a/x", "a/y"], StateFilter::Open);
    assert_eq!(p.status(), &SessionStatus::Fetching { page: 1 });

    let update = p.next_update().await.unwrap();
    assert_eq!(
      update,
      SessionUpdate::Complete {
        page: 1,
        fetched: 3,
        has_more: false
      }
    );
    let numbers: Vec<u64> = p.records().iter().map(|pr| pr.number).collect();
    assert_eq!(numbers, vec![2, 7, 1]);
    assert!(!p.has_more());
    assert!(p.next_update().await.is_none());
  }

  #[tokio::test]
  async fn test_open_state_stops_at_page_cap() {
    let fetcher = Arc::new(ScriptedFetcher::endless());
    let mut p = paginator(fetcher.clone());

    p.start(&["a/x"], StateFilter::Open);

    let mut progress = 0;
    while let Some(update) = p.next_update().await {
      if let SessionUpdate::Progress { fetched, .. } = update {
        progress += 1;
        // Partial results are visible before the session completes
        assert_eq!(p.records().len(), fetched);
      }
    }

    assert_eq!(progress, 9);
    assert_eq!(p.status(), &SessionStatus::Complete);
    assert_eq!(p.session().page, MAX_PAGES);
    assert!(p.has_more());
    assert_eq!(p.records().len(), 10);
    assert_eq!(fetcher.record_calls(), 10);
  }

  #[tokio::test]
  async fn test_closed_state_fetches_single_page() {
    let fetcher = Arc::new(ScriptedFetcher::endless());
    let mut p = paginator(fetcher.clone());

    p.start(&["a/x"], StateFilter::Closed);
    p.settle().await;

    assert_eq!(p.session().page, 1);
    assert!(p.has_more());
    assert_eq!(fetcher.record_calls(), 1);
  }

  #[tokio::test]
  async fn test_load_more_appends_one_page() {
    let fetcher = Arc::new(ScriptedFetcher::endless());
    let mut p = paginator(fetcher.clone());

    p.start(&["a/x"], StateFilter::Merged);
    p.settle().await;
    assert_eq!(p.records().len(), 1);

    assert!(p.load_more());
    // A second request while the first is in flight is refused
    assert!(!p.load_more());

    let update = p.next_update().await.unwrap();
    assert_eq!(
      update,
      SessionUpdate::Complete {
        page: 2,
        fetched: 2,
        has_more: true
      }
    );
    assert_eq!(p.records()[1].number, 2);
    assert_eq!(fetcher.record_calls(), 2);
  }

  #[tokio::test]
  async fn test_load_more_unavailable_without_more_data() {
    let fetcher = Arc::new(ScriptedFetcher::new().with_page(
      "a/x",
      1,
      vec![api_pr(1, "alice", &[], 0)],
      false,
    ));
    let mut p = paginator(fetcher);

    p.start(&["a/x"], StateFilter::Open);
    assert!(!p.load_more());
    p.settle().await;
    assert!(!p.load_more());
  }

  #[tokio::test]
  async fn test_failure_keeps_accumulated_records() {
    let fetcher = Arc::new(
      ScriptedFetcher::new()
        .with_page("a/x", 1, vec![api_pr(1, "alice", &[], 0)], true)
        .with_page("a/x", 2, vec![api_pr(2, "alice", &[], 0)], true),
    );
    fetcher.fail_page("a/x", 3, "HTTP 500 Internal Server Error: boom");
    let mut p = paginator(fetcher.clone());

    p.start(&["a/x"], StateFilter::Open);
    p.settle().await;

    assert_eq!(
      p.error(),
      Some(&DashError::Transport("HTTP 500 Internal Server Error: boom".into()))
    );
    assert!(!p.error().unwrap().is_blocking());
    assert_eq!(p.records().len(), 2);
    // No automatic retry
    assert_eq!(fetcher.record_calls(), 3);
    assert!(!p.load_more());
  }

  #[tokio::test]
  async fn test_auth_failure_mid_session_is_blocking() {
    let fetcher = Arc::new(ScriptedFetcher::new().with_page(
      "a/x",
      1,
      vec![api_pr(1, "alice", &[], 0)],
      true,
    ));
    fetcher.fail_page_with(
      "a/x",
      2,
      DashError::Auth("Authentication failed: invalid or expired token".into()),
    );
    let mut p = paginator(fetcher);

    p.start(&["a/x"], StateFilter::Open);
    let first = p.next_update().await.unwrap();
    assert!(matches!(first, SessionUpdate::Progress { page: 1, .. }));
    let second = p.next_update().await.unwrap();
    assert!(matches!(
      second,
      SessionUpdate::Failed {
        page: 2,
        error: DashError::Auth(_)
      }
    ));

    let error = p.error().unwrap();
    assert!(error.is_blocking());
    assert_eq!(error.status(), 401);
    assert_eq!(p.records().len(), 1);
  }

  #[tokio::test]
  async fn test_replaced_session_responses_are_discarded() {
    let fetcher = Arc::new(
      ScriptedFetcher::new()
        .with_delay(20)
        .with_page("a/x", 1, vec![api_pr(1, "alice", &[], 0)], false)
        .with_page("a/y", 1, vec![api_pr(7, "carol", &[], 0)], false),
    );
    let mut p = paginator(fetcher);

    let first = p.start(&["a/x"], StateFilter::Open);
    let second = p.start(&["a/y"], StateFilter::Open);
    assert_ne!(first, second);

    let mut discarded = Vec::new();
    while let Some(update) = p.next_update().await {
      if let SessionUpdate::Discarded { session, .. } = update {
        discarded.push(session);
      }
    }

    assert!(discarded.iter().all(|id| *id == first));
    let numbers: Vec<u64> = p.records().iter().map(|pr| pr.number).collect();
    assert_eq!(numbers, vec![7]);
  }

  #[tokio::test]
  async fn test_select_only_restarts_on_change() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let mut p = paginator(fetcher.clone());

    assert!(p.select(&["a/x", "a/y"], StateFilter::Open));
    p.settle().await;
    assert!(!p.select(&["a/y", "a/x"], StateFilter::Open));
    assert!(p.select(&["a/y", "a/x"], StateFilter::Closed));
    p.settle().await;

    assert_eq!(fetcher.record_calls(), 4);
  }

  #[tokio::test]
  async fn test_refresh_bypasses_cache_for_first_page_only() {
    let fetcher = Arc::new(
      ScriptedFetcher::new()
        .with_page("a/x", 1, vec![api_pr(1, "alice", &[], 0)], true)
        .with_page("a/x", 2, vec![api_pr(2, "alice", &[], 0)], false),
    );
    let mut p = paginator(fetcher.clone());

    p.start(&["a/x"], StateFilter::Open);
    p.settle().await;
    assert_eq!(fetcher.record_calls(), 2);

    fetcher.set_page("a/x", 1, vec![api_pr(10, "alice", &[], 0)], true);
    fetcher.set_page("a/x", 2, vec![api_pr(20, "alice", &[], 0)], false);

    p.refresh();
    p.settle().await;

    // Page 1 is fresh, page 2 still comes from the cache
    let numbers: Vec<u64> = p.records().iter().map(|pr| pr.number).collect();
    assert_eq!(numbers, vec![10, 2]);
    assert_eq!(fetcher.record_calls(), 3);
  }

  #[tokio::test]
  async fn test_refresh_if_stale() {
    let fetcher = Arc::new(ScriptedFetcher::new().with_page(
      "a/x",
      1,
      vec![api_pr(1, "alice", &[], 0)],
      false,
    ));
    let mut p = paginator(fetcher.clone());

    // Nothing loaded yet, nothing to refresh
    assert!(!p.refresh_if_stale(Utc::now()));

    p.start(&["a/x"], StateFilter::Open);
    p.settle().await;
    let last = p.last_updated().unwrap();

    assert!(!p.refresh_if_stale(last + Duration::minutes(4)));
    assert!(p.refresh_if_stale(last + Duration::minutes(6)));
    p.settle().await;
    assert_eq!(fetcher.record_calls(), 2);
  }

  #[tokio::test]
  async fn test_empty_repository_set_completes_immediately() {
    let fetcher = Arc::new(ScriptedFetcher::endless());
    let mut p = paginator(fetcher.clone());

    let empty: [&str; 0] = [];
    p.start(&empty, StateFilter::Open);

    assert_eq!(p.status(), &SessionStatus::Complete);
    assert!(p.next_update().await.is_none());
    assert_eq!(fetcher.record_calls(), 0);
  }
}
