//! Client-side filtering of fetched pull requests.
//!
//! Filtering is a pure function of the record list and a [`FilterOptions`]
//! value. Empty lists and missing values never exclude anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::github::types::PullRequest;

/// Filter predicate set. Every populated field is ANDed with the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterOptions {
  /// Repository must be one of these
  pub repositories: Vec<String>,
  /// Record must carry every one of these labels
  pub labels: Vec<String>,
  /// Target branch must be one of these
  pub branches: Vec<String>,
  /// At least one assignee must be listed
  pub assignees: Vec<String>,
  /// Author must be one of these
  pub authors: Vec<String>,
  /// At least one requested reviewer must be listed
  pub reviewers: Vec<String>,
  /// Case-insensitive match on title, number or author
  pub search_query: Option<String>,
  /// Inclusive lower bound on creation time
  pub date_from: Option<DateTime<Utc>>,
  /// Inclusive upper bound on creation time
  pub date_to: Option<DateTime<Utc>>,
}

impl FilterOptions {
  /// Number of user-visible constraints (labels, branches, authors, search).
  pub fn active_count(&self) -> usize {
    self.labels.len()
      + self.branches.len()
      + self.authors.len()
      + usize::from(self.search().is_some())
  }

  /// The query as typed; a blank query is treated as absent.
  fn search(&self) -> Option<&str> {
    self
      .search_query
      .as_deref()
      .filter(|q| !q.trim().is_empty())
  }

  pub fn matches(&self, pr: &PullRequest) -> bool {
    if !self.repositories.is_empty() && !self.repositories.contains(&pr.repository) {
      return false;
    }

    if !self.labels.iter().all(|label| pr.has_label(label)) {
      return false;
    }

    if !self.branches.is_empty() && !self.branches.contains(&pr.base_branch) {
      return false;
    }

    if !self.assignees.is_empty() && !self.assignees.iter().any(|a| pr.assignees.contains(a)) {
      return false;
    }

    if !self.authors.is_empty() && !self.authors.contains(&pr.author.login) {
      return false;
    }

    if !self.reviewers.is_empty() && !self.reviewers.iter().any(|r| pr.reviewers.contains(r)) {
      return false;
    }

    if let Some(query) = self.search() {
      let query = query.to_lowercase();
      let matches_title = pr.title.to_lowercase().contains(&query);
      let matches_number = pr.number.to_string().contains(&query);
      let matches_author = pr.author.login.to_lowercase().contains(&query);
      if !matches_title && !matches_number && !matches_author {
        return false;
      }
    }

    if self.date_from.is_some_and(|from| pr.created_at < from) {
      return false;
    }
    if self.date_to.is_some_and(|to| pr.created_at > to) {
      return false;
    }

    true
  }
}

/// Filter records and sort them by number descending.
///
/// Output order never depends on input order: equal numbers from different
/// repositories are ordered by repository name.
pub fn apply_filters(records: &[PullRequest], filters: &FilterOptions) -> Vec<PullRequest> {
  let mut filtered: Vec<PullRequest> = records
    .iter()
    .filter(|pr| filters.matches(pr))
    .cloned()
    .collect();
  filtered.sort_by(|a, b| {
    b.number
      .cmp(&a.number)
      .then_with(|| a.repository.cmp(&b.repository))
  });
  filtered
}

/// An author that can be picked in a filter or grouping selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorOption {
  pub login: String,
  pub avatar_url: String,
}

/// Unique authors sorted case-insensitively by login; the first avatar seen wins.
pub fn available_authors(records: &[PullRequest]) -> Vec<AuthorOption> {
  let mut by_login: BTreeMap<(String, String), AuthorOption> = BTreeMap::new();
  for pr in records {
    by_login
      .entry((pr.author.login.to_lowercase(), pr.author.login.clone()))
      .or_insert_with(|| AuthorOption {
        login: pr.author.login.clone(),
        avatar_url: pr.author.avatar_url.clone(),
      });
  }
  by_login.into_values().collect()
}

/// Unique target branches, sorted.
pub fn available_branches(records: &[PullRequest]) -> Vec<String> {
  records
    .iter()
    .map(|pr| pr.base_branch.clone())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

/// Repositories to show given a requested subset and every configured
/// repository. Unknown repositories are ignored; an empty or fully unknown
/// request selects everything.
pub fn selected_repositories(requested: &[String], all: &[String]) -> Vec<String> {
  let selected: Vec<String> = requested
    .iter()
    .filter(|r| all.contains(r))
    .cloned()
    .collect();
  if selected.is_empty() {
    all.to_vec()
  } else {
    selected
  }
}

/// Toggle `repository` in the current selection and return the new
/// `repositories` filter value. Selecting every repository yields an empty
/// list so the filter stays unconstrained.
pub fn toggle_repository(selected: &[String], all: &[String], repository: &str) -> Vec<String> {
  let mut next: Vec<String> = if selected.iter().any(|r| r == repository) {
    selected
      .iter()
      .filter(|r| *r != repository)
      .cloned()
      .collect()
  } else {
    let mut next = selected.to_vec();
    next.push(repository.to_string());
    next
  };

  if next.len() == all.len() && all.iter().all(|r| next.contains(r)) {
    next.clear();
  }
  next
}
