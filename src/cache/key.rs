//! Query keys for cached GitHub requests.

use crate::github::types::StateFilter;

/// Query key types for cached API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryKey {
  /// One page of pull requests across a repository set
  Pulls {
    repositories: Vec<String>,
    state: StateFilter,
    page_size: u32,
    page: u32,
  },
  /// Labels across a repository set
  Labels { repositories: Vec<String> },
}

impl QueryKey {
  /// Cache key: the request inputs concatenated in a fixed order.
  ///
  /// Repository lists must already be normalized with
  /// [`normalize_repositories`], otherwise equal sets in different order map
  /// to different keys.
  pub fn cache_key(&self) -> String {
    match self {
      Self::Pulls {
        repositories,
        state,
        page_size,
        page,
      } => format!(
        "pulls:{}:{}:{}:{}",
        repositories.join(","),
        state,
        page_size,
        page
      ),
      Self::Labels { repositories } => format!("labels:{}", repositories.join(",")),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::Pulls {
        repositories,
        state,
        page,
        ..
      } => format!(
        "{} pull requests page {} for {} repositories",
        state,
        page,
        repositories.len()
      ),
      Self::Labels { repositories } => {
        format!("labels for {} repositories", repositories.len())
      }
    }
  }
}

/// Trim, drop empties, sort and dedupe a repository list.
pub fn normalize_repositories<I, S>(repositories: I) -> Vec<String>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut repos: Vec<String> = repositories
    .into_iter()
    .map(|r| r.as_ref().trim().to_string())
    .filter(|r| !r.is_empty())
    .collect();
  repos.sort();
  repos.dedup();
  repos
}
