//! The remote fetch service the query executor pulls pages from.

use async_trait::async_trait;

use crate::error::Result;
use crate::github::api_types::{ApiLabel, ApiPullRequest};
use crate::github::types::StateFilter;

/// One page of raw provider records for a single repository.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
  pub records: Vec<ApiPullRequest>,
  /// Provider indicates at least one more page exists
  pub has_more: bool,
}

/// Fetch-by-page access to the remote issue tracker.
///
/// Implementations only talk to the provider; caching, merging and
/// transformation live in [`crate::executor::QueryExecutor`].
#[async_trait]
pub trait FetchService: Send + Sync {
  /// List pull requests of `repository` (`owner/name`) for a 1-based page.
  async fn list_records(
    &self,
    repository: &str,
    state: StateFilter,
    page: u32,
    page_size: u32,
  ) -> Result<RecordPage>;

  /// List every label defined in `repository`.
  async fn list_labels(&self, repository: &str) -> Result<Vec<ApiLabel>>;
}
