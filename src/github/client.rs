use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::error::{DashError, Result};
use crate::fetch::{FetchService, RecordPage};
use crate::github::api_types::{ApiLabel, ApiPullRequest};
use crate::github::types::StateFilter;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// GitHub REST client implementing [`FetchService`]
#[derive(Clone)]
pub struct GitHubClient {
  client: Client,
  base_url: String,
}

impl GitHubClient {
  pub fn new(token: &str, base_url: Option<&str>) -> Result<Self> {
    let mut headers = HeaderMap::new();

    headers.insert(
      AUTHORIZATION,
      HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| DashError::Auth(format!("Invalid GitHub token: {}", e)))?,
    );
    headers.insert(
      ACCEPT,
      HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert(
      "X-GitHub-Api-Version",
      HeaderValue::from_static(GITHUB_API_VERSION),
    );
    headers.insert(USER_AGENT, HeaderValue::from_static("prdash"));

    let client = Client::builder().default_headers(headers).build()?;

    Ok(Self {
      client,
      base_url: base_url
        .unwrap_or(GITHUB_API_BASE)
        .trim_end_matches('/')
        .to_string(),
    })
  }

  async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Response> {
    let url = format!("{}{}", self.base_url, endpoint);
    debug!(%url, "GET");
    let response = self.client.get(&url).query(params).send().await?;
    check_response(response).await
  }
}

/// Split `owner/name` into its parts.
fn split_repository(repository: &str) -> Result<(&str, &str)> {
  match repository.trim().split_once('/') {
    Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok((owner, name)),
    _ => Err(DashError::Validation(format!(
      "Repository must be in owner/name form (got '{}')",
      repository
    ))),
  }
}

/// Whether a `Link` header advertises a next page.
fn has_next_link(link: Option<&HeaderValue>) -> bool {
  link
    .and_then(|v| v.to_str().ok())
    .map(|v| v.split(',').any(|part| part.contains("rel=\"next\"")))
    .unwrap_or(false)
}

/// Check response status and convert errors.
async fn check_response(response: Response) -> Result<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let headers = response.headers().clone();
  let url = response.url().to_string();
  let body = response.text().await.unwrap_or_default();
  Err(classify(status, &headers, &url, &body))
}

/// Map a non-success response onto the error taxonomy.
///
/// 403 and 429 only count as rate limiting when the remaining quota is zero;
/// otherwise a 403 is a plain permission failure.
fn classify(status: StatusCode, headers: &HeaderMap, url: &str, body: &str) -> DashError {
  match status {
    StatusCode::UNAUTHORIZED => {
      DashError::Auth("Authentication failed: invalid or expired token".to_string())
    }
    StatusCode::NOT_FOUND => DashError::Transport(format!("Resource not found: {}", url)),
    StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
      if header_u64(headers, "x-ratelimit-remaining") == Some(0) =>
    {
      let reset_at = header_u64(headers, "x-ratelimit-reset")
        .and_then(|reset| chrono::DateTime::from_timestamp(reset as i64, 0))
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string());
      warn!(%reset_at, "GitHub rate limit exhausted");
      DashError::RateLimited { reset_at }
    }
    StatusCode::FORBIDDEN => DashError::Transport(format!("Forbidden: {}", body)),
    status => DashError::Transport(format!("HTTP {}: {}", status, body)),
  }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.parse().ok())
}

/// Keep only records whose derived lifecycle fits `state`.
///
/// `state=closed` on the wire returns merged and closed records together.
fn narrow_to_state(records: Vec<ApiPullRequest>, state: StateFilter) -> Vec<ApiPullRequest> {
  records
    .into_iter()
    .filter(|pr| state.matches(pr.lifecycle()))
    .collect()
}

#[async_trait]
impl FetchService for GitHubClient {
  async fn list_records(
    &self,
    repository: &str,
    state: StateFilter,
    page: u32,
    page_size: u32,
  ) -> Result<RecordPage> {
    let (owner, name) = split_repository(repository)?;
    // The REST API only knows open/closed; merged is narrowed afterwards
    let api_state = match state {
      StateFilter::Open => "open",
      StateFilter::Closed | StateFilter::Merged => "closed",
    };

    let response = self
      .get(
        &format!("/repos/{}/{}/pulls", owner, name),
        &[
          ("state", api_state.to_string()),
          ("sort", "updated".to_string()),
          ("direction", "desc".to_string()),
          ("per_page", page_size.to_string()),
          ("page", page.to_string()),
        ],
      )
      .await?;

    let has_more = has_next_link(response.headers().get(LINK));
    let records: Vec<ApiPullRequest> = response.json().await?;

    Ok(RecordPage {
      records: narrow_to_state(records, state),
      has_more,
    })
  }

  async fn list_labels(&self, repository: &str) -> Result<Vec<ApiLabel>> {
    let (owner, name) = split_repository(repository)?;
    let mut all_labels = Vec::new();
    let mut page = 1u32;

    loop {
      let response = self
        .get(
          &format!("/repos/{}/{}/labels", owner, name),
          &[("per_page", "100".to_string()), ("page", page.to_string())],
        )
        .await?;

      let has_more = has_next_link(response.headers().get(LINK));
      let labels: Vec<ApiLabel> = response.json().await?;
      all_labels.extend(labels);

      if !has_more {
        break;
      }
      page += 1;
    }

    Ok(all_labels)
  }
}
