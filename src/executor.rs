//! Query executor: cache-first access to the fetch service.

use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::cache::{CacheResult, QueryKey, TtlCache};
use crate::error::{DashError, Result};
use crate::fetch::FetchService;
use crate::github::types::{Label, PullRequest, StateFilter};

/// How long each kind of response stays cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
  pub pulls: Duration,
  pub labels: Duration,
}

impl Default for CacheTtl {
  fn default() -> Self {
    Self {
      pulls: Duration::minutes(5),
      labels: Duration::minutes(10),
    }
  }
}

/// One merged page of pull requests across a repository set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullsPage {
  pub data: Vec<PullRequest>,
  pub page: u32,
  pub per_page: u32,
  pub total: usize,
  /// Any repository reported another page
  pub has_more: bool,
  /// When the page was fetched from the provider
  pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum CachedPayload {
  Pulls(PullsPage),
  Labels(Vec<Label>),
}

/// Request shape for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullsRequest {
  /// Normalized repository list, see [`crate::cache::normalize_repositories`]
  pub repositories: Vec<String>,
  pub state: StateFilter,
  pub page_size: u32,
  pub page: u32,
  /// Skip the cache read; the fresh result is still written back
  pub force_refresh: bool,
}

impl PullsRequest {
  pub fn key(&self) -> QueryKey {
    QueryKey::Pulls {
      repositories: self.repositories.clone(),
      state: self.state,
      page_size: self.page_size,
      page: self.page,
    }
  }
}

/// Response cache handle. Clones share the same entries.
///
/// The mutex is the only synchronization and is never held across an await
/// point.
#[derive(Clone, Default)]
pub struct ResponseCache {
  inner: Arc<Mutex<TtlCache<CachedPayload>>>,
}

impl ResponseCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, TtlCache<CachedPayload>> {
    // Entries are written whole, so a poisoned cache is still consistent
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Cache-first executor over a [`FetchService`].
pub struct QueryExecutor {
  fetcher: Arc<dyn FetchService>,
  cache: ResponseCache,
  ttl: CacheTtl,
}

impl QueryExecutor {
  pub fn new(fetcher: Arc<dyn FetchService>, ttl: CacheTtl) -> Self {
    Self::with_cache(fetcher, ResponseCache::new(), ttl)
  }

  /// Executor over `fetcher` reading and writing an existing cache.
  pub fn with_cache(fetcher: Arc<dyn FetchService>, cache: ResponseCache, ttl: CacheTtl) -> Self {
    Self {
      fetcher,
      cache,
      ttl,
    }
  }

  fn cache(&self) -> MutexGuard<'_, TtlCache<CachedPayload>> {
    self.cache.lock()
  }

  /// Fetch one page of pull requests.
  ///
  /// 1. Unless `force_refresh`, return a live cache entry unchanged
  /// 2. Otherwise fetch the page from every repository, merge, and sort by
  ///    `updated_at` descending
  /// 3. Store the merged page under the request key
  ///
  /// A failure in any repository fails the whole page and nothing is cached.
  pub async fn fetch_pulls(&self, request: &PullsRequest) -> Result<CacheResult<PullsPage>> {
    let key = request.key();
    let cache_key = key.cache_key();

    if !request.force_refresh {
      let cached = self.cache().get(&cache_key);
      if let Some(CachedPayload::Pulls(page)) = cached {
        debug!(key = %cache_key, "cache hit: {}", key.description());
        let cached_at = page.cached_at;
        return Ok(CacheResult::from_cache(page, cached_at));
      }
    }

    debug!(key = %cache_key, force = request.force_refresh, "fetching {}", key.description());

    let fetches = request.repositories.iter().map(|repository| {
      let fetcher = Arc::clone(&self.fetcher);
      async move {
        let page = fetcher
          .list_records(repository, request.state, request.page, request.page_size)
          .await?;
        Ok::<_, DashError>((repository.as_str(), page))
      }
    });

    let results = try_join_all(fetches).await.map_err(|e| {
      warn!(key = %cache_key, error = %e, "failed to fetch pull requests");
      e
    })?;

    let has_more = results.iter().any(|(_, page)| page.has_more);
    let mut data: Vec<PullRequest> = results
      .into_iter()
      .flat_map(|(repository, page)| {
        page
          .records
          .into_iter()
          .map(move |record| record.into_record(repository))
      })
      .collect();
    data.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let page = PullsPage {
      total: data.len(),
      data,
      page: request.page,
      per_page: request.page_size,
      has_more,
      cached_at: Utc::now(),
    };

    self
      .cache()
      .set(cache_key, CachedPayload::Pulls(page.clone()), self.ttl.pulls);

    Ok(CacheResult::from_network(page))
  }

  /// Fetch the label catalog for a repository set, deduplicated by name with
  /// the first repository's definition winning.
  pub async fn fetch_labels(&self, repositories: &[String]) -> Result<CacheResult<Vec<Label>>> {
    let key = QueryKey::Labels {
      repositories: repositories.to_vec(),
    };
    let cache_key = key.cache_key();

    let cached = self.cache().get(&cache_key);
    if let Some(CachedPayload::Labels(labels)) = cached {
      debug!(key = %cache_key, "cache hit: {}", key.description());
      return Ok(CacheResult::from_cache(labels, Utc::now()));
    }

    let fetches = repositories.iter().map(|repository| {
      let fetcher = Arc::clone(&self.fetcher);
      async move {
        let labels = fetcher.list_labels(repository).await?;
        Ok::<_, DashError>((repository.as_str(), labels))
      }
    });

    let results = try_join_all(fetches).await.map_err(|e| {
      warn!(key = %cache_key, error = %e, "failed to fetch labels");
      e
    })?;

    let mut seen = HashSet::new();
    let mut labels = Vec::new();
    for (repository, repo_labels) in results {
      for label in repo_labels {
        if seen.insert(label.name.clone()) {
          labels.push(label.into_label(repository));
        }
      }
    }

    self
      .cache()
      .set(cache_key, CachedPayload::Labels(labels.clone()), self.ttl.labels);

    Ok(CacheResult::from_network(labels))
  }

  /// Evict expired entries; safe to call at any time.
  pub fn cleanup(&self) -> usize {
    self.cache().cleanup()
  }
}
