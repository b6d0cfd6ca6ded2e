use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cache::normalize_repositories;
use crate::error::{DashError, Result};
use crate::executor::CacheTtl;
use crate::github::client::GITHUB_API_BASE;
use crate::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGES};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub github: GitHubConfig,
  pub cache: CacheConfig,
  pub pagination: PaginationConfig,
  /// Named dashboards; replaced wholesale by `GITHUB_DASHBOARDS`
  pub dashboards: Vec<Dashboard>,
  /// Repositories used when no dashboard is selected
  pub default_repos: Vec<String>,
  /// Default filter query string, e.g. `labels=type&authors=alice`
  pub default_filter: String,
  /// Server-side token, only ever read from the environment
  #[serde(skip)]
  pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
  /// REST API base URL (GitHub Enterprise installs use `https://host/api/v3`)
  pub api_url: String,
}

impl Default for GitHubConfig {
  fn default() -> Self {
    Self {
      api_url: GITHUB_API_BASE.to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub pulls_ttl_secs: u64,
  pub labels_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      pulls_ttl_secs: 300,
      labels_ttl_secs: 600,
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> CacheTtl {
    let secs = |s: u64| chrono::Duration::seconds(s.min(u64::from(u32::MAX)) as i64);
    CacheTtl {
      pulls: secs(self.pulls_ttl_secs),
      labels: secs(self.labels_ttl_secs),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
  pub page_size: u32,
  /// Upper bound on automatic pages for open pull requests
  pub max_pages: u32,
}

impl Default for PaginationConfig {
  fn default() -> Self {
    Self {
      page_size: DEFAULT_PAGE_SIZE,
      max_pages: MAX_PAGES,
    }
  }
}

/// A named view over a set of repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
  pub id: String,
  pub name: String,
  /// Comma-separated `owner/name` list
  #[serde(default)]
  pub repos: String,
  /// Default filter query string
  #[serde(default)]
  pub filter: String,
}

impl Dashboard {
  /// Configured repositories in order, trimmed and without duplicates.
  pub fn repositories(&self) -> Vec<String> {
    let mut repositories: Vec<String> = Vec::new();
    for repo in self.repos.split(',').map(str::trim) {
      if !repo.is_empty() && !repositories.iter().any(|r| r == repo) {
        repositories.push(repo.to_string());
      }
    }
    repositories
  }
}

/// Server-wide defaults used when no dashboard overrides them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Defaults {
  pub repositories: Vec<String>,
  /// Query string in the view-state grammar
  pub filters: String,
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./prdash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/prdash/config.yaml
  ///
  /// No file at all yields the defaults.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = match explicit_path {
      Some(p) if p.exists() => Some(p.to_path_buf()),
      Some(p) => {
        return Err(DashError::Configuration(format!(
          "Config file not found: {}",
          p.display()
        )))
      }
      None => Self::find_config_file(),
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        debug!("no configuration file found, using defaults");
        Self::default()
      }
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("prdash.yaml");
    if local.exists() {
      return Some(local);
    }

    dirs::config_dir()
      .map(|dir| dir.join("prdash").join("config.yaml"))
      .filter(|path| path.exists())
  }

  pub fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      DashError::Configuration(format!(
        "Failed to read config file {}: {}",
        path.display(),
        e
      ))
    })?;

    let config: Config = serde_yaml::from_str(&contents).map_err(|e| {
      DashError::Configuration(format!(
        "Failed to parse config file {}: {}",
        path.display(),
        e
      ))
    })?;

    debug!(path = %path.display(), "loaded configuration");
    Ok(config)
  }

  /// Apply `GITHUB_*` overrides read through `lookup`.
  ///
  /// Empty values are treated as unset.
  pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
  where
    F: Fn(&str) -> Option<String>,
  {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(json) = var("GITHUB_DASHBOARDS") {
      self.dashboards = serde_json::from_str(&json).map_err(|e| {
        DashError::Configuration(format!("Failed to parse GITHUB_DASHBOARDS: {}", e))
      })?;
    }
    if let Some(repos) = var("GITHUB_DEFAULT_REPOS") {
      self.default_repos = repos
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect();
    }
    if let Some(filter) = var("GITHUB_DEFAULT_FILTER") {
      self.default_filter = filter;
    }
    if let Some(token) = var("GITHUB_TOKEN") {
      self.token = Some(token.trim().to_string());
    }
    Ok(())
  }
}

/// Source of dashboards and server defaults.
pub trait DashboardSource: Send + Sync {
  fn list_dashboards(&self) -> Result<Vec<Dashboard>>;

  fn get_defaults(&self) -> Result<Defaults>;

  /// Whether the server holds its own provider credential.
  fn has_server_credential(&self) -> bool;

  fn find_dashboard(&self, id: &str) -> Result<Option<Dashboard>> {
    Ok(self.list_dashboards()?.into_iter().find(|d| d.id == id))
  }
}

/// [`DashboardSource`] backed by the loaded [`Config`]
#[derive(Debug, Clone)]
pub struct ConfigDashboards {
  dashboards: Vec<Dashboard>,
  defaults: Defaults,
  token: Option<String>,
}

impl ConfigDashboards {
  pub fn new(config: &Config) -> Self {
    Self {
      dashboards: config.dashboards.clone(),
      defaults: Defaults {
        repositories: normalize_repositories(&config.default_repos),
        filters: config.default_filter.clone(),
      },
      token: config.token.clone(),
    }
  }

  /// The server-side token, if one is configured.
  pub fn server_token(&self) -> Option<&str> {
    self.token.as_deref()
  }
}

impl DashboardSource for ConfigDashboards {
  fn list_dashboards(&self) -> Result<Vec<Dashboard>> {
    Ok(self.dashboards.clone())
  }

  fn get_defaults(&self) -> Result<Defaults> {
    Ok(self.defaults.clone())
  }

  fn has_server_credential(&self) -> bool {
    self.token.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |key: &str| map.get(key).cloned()
  }

  #[test]
  fn test_load_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
      &path,
      r#"
github:
  api_url: https://ghe.example.com/api/v3
cache:
  pulls_ttl_secs: 60
dashboards:
  - id: team
    name: Team
    repos: "a/x, a/y"
    filter: "state=closed&labels=type"
default_repos: [a/x]
"#,
    )
    .unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.github.api_url, "https://ghe.example.com/api/v3");
    assert_eq!(config.cache.pulls_ttl_secs, 60);
    assert_eq!(config.cache.labels_ttl_secs, 600);
    assert_eq!(config.pagination.page_size, DEFAULT_PAGE_SIZE);
    assert_eq!(config.dashboards[0].repositories(), vec!["a/x", "a/y"]);
    assert_eq!(config.default_repos, vec!["a/x"]);
  }

  #[test]
  fn test_explicit_missing_path_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("nope.yaml"))).unwrap_err();
    assert!(matches!(err, DashError::Configuration(_)));
    assert!(err.is_blocking());
  }

  #[test]
  fn test_invalid_yaml_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "dashboards: {not: [a list").unwrap();
    assert!(matches!(
      Config::load_from_path(&path),
      Err(DashError::Configuration(_))
    ));
  }

  #[test]
  fn test_env_overrides() {
    let mut config = Config::default();
    config
      .apply_env(env(&[
        (
          "GITHUB_DASHBOARDS",
          r#"[{"id":"core","name":"Core","repos":"a/x","filter":"labels=bug"}]"#,
        ),
        ("GITHUB_DEFAULT_REPOS", "a/y, ,a/x"),
        ("GITHUB_DEFAULT_FILTER", "authors=alice"),
        ("GITHUB_TOKEN", "ghp_example"),
      ]))
      .unwrap();

    assert_eq!(config.dashboards.len(), 1);
    assert_eq!(config.dashboards[0].filter, "labels=bug");

    let source = ConfigDashboards::new(&config);
    assert!(source.has_server_credential());
    assert_eq!(source.server_token(), Some("ghp_example"));
    let defaults = source.get_defaults().unwrap();
    assert_eq!(defaults.repositories, vec!["a/x", "a/y"]);
    assert_eq!(defaults.filters, "authors=alice");
    assert!(source.find_dashboard("core").unwrap().is_some());
    assert!(source.find_dashboard("missing").unwrap().is_none());
  }

  #[test]
  fn test_unparseable_dashboards_env_is_error() {
    let mut config = Config::default();
    let err = config
      .apply_env(env(&[("GITHUB_DASHBOARDS", "not json")]))
      .unwrap_err();
    assert!(matches!(err, DashError::Configuration(_)));
  }

  #[test]
  fn test_empty_env_is_ignored() {
    let mut config = Config::default();
    config.apply_env(env(&[("GITHUB_TOKEN", "  ")])).unwrap();
    assert!(!ConfigDashboards::new(&config).has_server_credential());
  }

  #[test]
  fn test_dashboard_repositories_dedup_in_order() {
    let dashboard = Dashboard {
      id: "d".to_string(),
      name: "D".to_string(),
      repos: "b/z, a/x,,b/z".to_string(),
      filter: String::new(),
    };
    assert_eq!(dashboard.repositories(), vec!["b/z", "a/x"]);
  }
}
