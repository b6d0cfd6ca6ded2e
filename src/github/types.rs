use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DashError;

/// Lifecycle state of a single pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
  Open,
  Closed,
  Merged,
  Draft,
}

/// Lifecycle filter a dashboard fetches with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
  #[default]
  Open,
  Closed,
  Merged,
}

impl StateFilter {
  pub fn as_str(self) -> &'static str {
    match self {
      StateFilter::Open => "open",
      StateFilter::Closed => "closed",
      StateFilter::Merged => "merged",
    }
  }

  /// Only open pull requests are auto-paginated; historical states are
  /// fetched one page at a time.
  pub fn auto_paginates(self) -> bool {
    matches!(self, StateFilter::Open)
  }

  /// Whether a record belongs to the result set of this filter.
  pub fn matches(self, state: PrState) -> bool {
    match self {
      StateFilter::Open => matches!(state, PrState::Open | PrState::Draft),
      StateFilter::Closed => state == PrState::Closed,
      StateFilter::Merged => state == PrState::Merged,
    }
  }
}

impl fmt::Display for StateFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StateFilter {
  type Err = DashError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "open" => Ok(StateFilter::Open),
      "closed" => Ok(StateFilter::Closed),
      "merged" => Ok(StateFilter::Merged),
      other => Err(DashError::Validation(format!(
        "state must be one of open, closed, merged (got '{}')",
        other
      ))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
  pub login: String,
  pub avatar_url: String,
}

/// Repository label. Names may follow a `prefix:value` taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
  pub name: String,
  /// Hex color without the leading `#`
  pub color: String,
  /// Repository the label was read from (`owner/name`)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub repository: Option<String>,
}

/// A pull request as the dashboard sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
  pub id: u64,
  pub number: u64,
  pub title: String,
  pub state: PrState,
  /// `owner/name`
  pub repository: String,
  pub author: Author,
  pub labels: Vec<Label>,
  pub base_branch: String,
  pub head_branch: String,
  pub assignees: Vec<String>,
  pub reviewers: Vec<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub comments: u32,
  pub additions: u32,
  pub deletions: u32,
  pub changed_files: u32,
  pub url: String,
}

impl PullRequest {
  pub fn has_label(&self, name: &str) -> bool {
    self.labels.iter().any(|l| l.name == name)
  }

  pub fn has_label_prefix(&self, prefix: &str) -> bool {
    self.labels.iter().any(|l| l.name.starts_with(prefix))
  }
}
