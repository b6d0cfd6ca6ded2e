//! HTTP-style boundary handlers returning JSON envelopes.
//!
//! Handlers never fail: every error is turned into a status code and an
//! `{"error": ...}` body.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::cache::normalize_repositories;
use crate::config::DashboardSource;
use crate::error::{DashError, Result};
use crate::executor::{CacheTtl, PullsRequest, QueryExecutor, ResponseCache};
use crate::fetch::FetchService;
use crate::github::types::StateFilter;
use crate::github::GitHubClient;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 30;

/// Builds a fetch service for a provider token.
pub trait Connector: Send + Sync {
  fn connect(&self, token: &str) -> Result<Arc<dyn FetchService>>;
}

/// [`Connector`] for the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubConnector {
  base_url: String,
}

impl GitHubConnector {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into(),
    }
  }
}

impl Connector for GitHubConnector {
  fn connect(&self, token: &str) -> Result<Arc<dyn FetchService>> {
    let client = GitHubClient::new(token, Some(&self.base_url))?;
    Ok(Arc::new(client))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
  pub status: u16,
  pub body: Value,
}

impl ApiResponse {
  fn ok(body: Value) -> Self {
    Self { status: 200, body }
  }

  fn error(err: &DashError) -> Self {
    Self {
      status: err.status(),
      body: json!({ "error": err.to_string() }),
    }
  }
}

/// Split a raw query string into parameters; later duplicates win.
pub fn parse_params(query: &str) -> HashMap<String, String> {
  form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
    .into_owned()
    .collect()
}

fn param_u32(params: &HashMap<String, String>, key: &str, default: u32) -> Result<u32> {
  match params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
    None => Ok(default),
    Some(raw) => match raw.parse::<u32>() {
      Ok(value) if value > 0 => Ok(value),
      _ => Err(DashError::Validation(format!("Invalid {}: {}", key, raw))),
    },
  }
}

fn repositories_param(params: &HashMap<String, String>) -> Result<Vec<String>> {
  let repositories = normalize_repositories(
    params
      .get("repositories")
      .map(|v| v.split(',').collect::<Vec<_>>())
      .unwrap_or_default(),
  );
  if repositories.is_empty() {
    return Err(DashError::Validation("No repositories specified".to_string()));
  }
  Ok(repositories)
}

/// Boundary over the query executor and the dashboard configuration
pub struct Api {
  cache: ResponseCache,
  ttl: CacheTtl,
  connector: Arc<dyn Connector>,
  source: Arc<dyn DashboardSource>,
  server_token: Option<String>,
}

impl Api {
  pub fn new(
    connector: Arc<dyn Connector>,
    source: Arc<dyn DashboardSource>,
    server_token: Option<String>,
    ttl: CacheTtl,
  ) -> Self {
    Self {
      cache: ResponseCache::new(),
      ttl,
      connector,
      source,
      server_token,
    }
  }

  /// Executor for this request. The caller's token wins over the server's.
  fn executor(&self, caller_token: Option<&str>) -> Result<QueryExecutor> {
    let token = caller_token
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .or(self.server_token.as_deref())
      .ok_or_else(|| DashError::Auth("GitHub token not configured".to_string()))?;

    let fetcher = self.connector.connect(token)?;
    Ok(QueryExecutor::with_cache(fetcher, self.cache.clone(), self.ttl))
  }

  /// Fetch one merged page of pull requests.
  ///
  /// Parameters: `repositories` (comma-separated, required), `state`
  /// (default `open`), `page` (default 1), `perPage` (default 30),
  /// `refresh=true` to bypass the cache.
  pub async fn pulls(
    &self,
    params: &HashMap<String, String>,
    caller_token: Option<&str>,
  ) -> ApiResponse {
    match self.try_pulls(params, caller_token).await {
      Ok(body) => ApiResponse::ok(body),
      Err(e) => {
        warn!(error = %e, "pulls request failed");
        ApiResponse::error(&e)
      }
    }
  }

  async fn try_pulls(
    &self,
    params: &HashMap<String, String>,
    caller_token: Option<&str>,
  ) -> Result<Value> {
    let executor = self.executor(caller_token)?;
    let repositories = repositories_param(params)?;
    let state = match params.get("state").filter(|s| !s.trim().is_empty()) {
      Some(raw) => raw.parse::<StateFilter>()?,
      None => StateFilter::default(),
    };

    let request = PullsRequest {
      repositories,
      state,
      page_size: param_u32(params, "perPage", DEFAULT_PER_PAGE)?,
      page: param_u32(params, "page", DEFAULT_PAGE)?,
      force_refresh: params.get("refresh").map(String::as_str) == Some("true"),
    };
    debug!(?request, "pulls");

    let result = executor.fetch_pulls(&request).await?;
    serde_json::to_value(&result.data)
      .map_err(|e| DashError::Transport(format!("Failed to encode response: {}", e)))
  }

  /// Fetch the label catalog for `repositories`.
  pub async fn labels(
    &self,
    params: &HashMap<String, String>,
    caller_token: Option<&str>,
  ) -> ApiResponse {
    match self.try_labels(params, caller_token).await {
      Ok(body) => ApiResponse::ok(body),
      Err(e) => {
        warn!(error = %e, "labels request failed");
        ApiResponse::error(&e)
      }
    }
  }

  async fn try_labels(
    &self,
    params: &HashMap<String, String>,
    caller_token: Option<&str>,
  ) -> Result<Value> {
    let executor = self.executor(caller_token)?;
    let repositories = repositories_param(params)?;

    let labels = executor.fetch_labels(&repositories).await?.data;
    Ok(json!({ "total": labels.len(), "data": labels }))
  }

  /// Configured dashboards.
  pub fn dashboards(&self) -> ApiResponse {
    match self.source.list_dashboards() {
      Ok(dashboards) => ApiResponse::ok(json!({ "dashboards": dashboards })),
      Err(e) => {
        warn!(error = %e, "failed to list dashboards");
        ApiResponse::error(&e)
      }
    }
  }

  /// Server default repositories and filter query string.
  pub fn defaults(&self) -> ApiResponse {
    match self.source.get_defaults() {
      Ok(defaults) => ApiResponse::ok(json!({
        "repositories": defaults.repositories,
        "filters": defaults.filters,
      })),
      Err(e) => {
        warn!(error = %e, "failed to load defaults");
        ApiResponse::error(&e)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{Config, ConfigDashboards, Dashboard};
  use crate::fetch::testing::{api_pr, ScriptedFetcher};
  use std::sync::Mutex;

  /// Hands out the same scripted fetcher and records the tokens it saw
  struct ScriptedConnector {
    fetcher: Arc<ScriptedFetcher>,
    tokens: Mutex<Vec<String>>,
  }

  impl Connector for ScriptedConnector {
    fn connect(&self, token: &str) -> Result<Arc<dyn FetchService>> {
      self.tokens.lock().unwrap().push(token.to_string());
      let fetcher: Arc<dyn FetchService> = self.fetcher.clone();
      Ok(fetcher)
    }
  }

  fn fetcher() -> Arc<ScriptedFetcher> {
    Arc::new(
      ScriptedFetcher::new()
        .with_page("a/x", 1, vec![api_pr(1, "alice", &[], 10)], true)
        .with_page("a/y", 1, vec![api_pr(7, "carol", &["docs"], 20)], false)
        .with_labels("a/x", &[("docs", "0075ca")])
        .with_labels("a/y", &[("docs", "ffffff"), ("type:bug", "d73a4a")]),
    )
  }

  fn build_api(
    fetcher: Arc<ScriptedFetcher>,
    server_token: Option<&str>,
  ) -> (Api, Arc<ScriptedConnector>) {
    let mut config = Config::default();
    config.dashboards = vec![Dashboard {
      id: "team".to_string(),
      name: "Team".to_string(),
      repos: "a/x,a/y".to_string(),
      filter: "state=open".to_string(),
    }];
    config.default_repos = vec!["a/x".to_string()];
    config.default_filter = "labels=docs".to_string();

    let connector = Arc::new(ScriptedConnector {
      fetcher,
      tokens: Mutex::new(Vec::new()),
    });
    let api = Api::new(
      connector.clone(),
      Arc::new(ConfigDashboards::new(&config)),
      server_token.map(String::from),
      CacheTtl::default(),
    );
    (api, connector)
  }

  #[tokio::test]
  async fn test_pulls_without_credential_is_401() {
    let (api, _) = build_api(fetcher(), None);
    let response = api.pulls(&parse_params("repositories=a/x"), None).await;
    assert_eq!(response.status, 401);
    assert_eq!(response.body["error"], "GitHub token not configured");
  }

  #[tokio::test]
  async fn test_pulls_without_repositories_is_400() {
    let (api, _) = build_api(fetcher(), Some("server"));
    let response = api.pulls(&parse_params("repositories=%20,"), None).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body["error"], "No repositories specified");
  }

  #[tokio::test]
  async fn test_pulls_invalid_state_is_400() {
    let (api, _) = build_api(fetcher(), Some("server"));
    let response = api
      .pulls(&parse_params("repositories=a/x&state=everything"), None)
      .await;
    assert_eq!(response.status, 400);
  }

  #[tokio::test]
  async fn test_pulls_envelope_and_cache() {
    let fetcher = fetcher();
    let (api, connector) = build_api(fetcher.clone(), Some("server"));
    let params = parse_params("repositories=a/y,a/x&page=1");

    let response = api.pulls(&params, Some("caller")).await;
    assert_eq!(response.status, 200);
    let body = &response.body;
    assert_eq!(body["total"], 2);
    assert_eq!(body["page"], 1);
    assert_eq!(body["perPage"], DEFAULT_PER_PAGE);
    assert_eq!(body["hasMore"], true);
    assert!(body["cachedAt"].is_string());
    assert_eq!(body["data"][0]["number"], 7);
    assert_eq!(body["data"][0]["repository"], "a/y");

    let again = api.pulls(&params, None).await;
    assert_eq!(again.body, response.body);
    assert_eq!(fetcher.record_calls(), 2);
    assert_eq!(
      *connector.tokens.lock().unwrap(),
      vec!["caller".to_string(), "server".to_string()]
    );

    api
      .pulls(&parse_params("repositories=a/x,a/y&refresh=true"), None)
      .await;
    assert_eq!(fetcher.record_calls(), 4);
  }

  #[tokio::test]
  async fn test_pulls_transport_failure_is_500() {
    let fetcher = fetcher();
    fetcher.fail_page("a/x", 1, "HTTP 502 Bad Gateway");
    let (api, _) = build_api(fetcher, Some("server"));

    let response = api.pulls(&parse_params("repositories=a/x"), None).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body["error"], "HTTP 502 Bad Gateway");
  }

  #[tokio::test]
  async fn test_labels_envelope() {
    let (api, _) = build_api(fetcher(), Some("server"));
    let response = api.labels(&parse_params("repositories=a/x,a/y"), None).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["total"], 2);
    assert_eq!(response.body["data"][0]["name"], "docs");
    assert_eq!(response.body["data"][0]["color"], "0075ca");

    let (api, _) = build_api(fetcher(), None);
    let response = api.labels(&parse_params("repositories=a/x"), None).await;
    assert_eq!(response.status, 401);
  }

  #[test]
  fn test_dashboards_and_defaults() {
    let (api, _) = build_api(fetcher(), None);

    let dashboards = api.dashboards();
    assert_eq!(dashboards.status, 200);
    assert_eq!(dashboards.body["dashboards"][0]["id"], "team");
    assert_eq!(dashboards.body["dashboards"][0]["repos"], "a/x,a/y");

    let defaults = api.defaults();
    assert_eq!(defaults.body["repositories"][0], "a/x");
    assert_eq!(defaults.body["filters"], "labels=docs");
  }

  #[test]
  fn test_param_u32() {
    let params = parse_params("page=3&perPage=0&bad=x");
    assert_eq!(param_u32(&params, "page", 1).unwrap(), 3);
    assert_eq!(param_u32(&params, "missing", 30).unwrap(), 30);
    assert!(param_u32(&params, "perPage", 30).is_err());
    assert!(param_u32(&params, "bad", 30).is_err());
  }
}
