//! Serde-deserializable types matching GitHub REST API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Author, Label, PrState, PullRequest};

// ============================================================================
// Common nested field types
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiUser {
  pub login: String,
  #[serde(default)]
  pub avatar_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiBranchRef {
  #[serde(rename = "ref")]
  pub branch: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLabel {
  pub name: String,
  #[serde(default)]
  pub color: String,
}

impl ApiLabel {
  pub fn into_label(self, repository: &str) -> Label {
    Label {
      name: self.name,
      color: self.color,
      repository: Some(repository.to_string()),
    }
  }
}

// ============================================================================
// Pull request list endpoint
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiPullRequest {
  pub id: u64,
  pub number: u64,
  #[serde(default)]
  pub title: String,
  /// `open` or `closed`; merged and draft are derived from other fields
  pub state: String,
  #[serde(default)]
  pub draft: bool,
  pub merged_at: Option<DateTime<Utc>>,
  /// Deleted accounts come back as `null`
  pub user: Option<ApiUser>,
  #[serde(default)]
  pub labels: Vec<ApiLabel>,
  pub base: ApiBranchRef,
  pub head: ApiBranchRef,
  #[serde(default)]
  pub assignees: Vec<ApiUser>,
  #[serde(default)]
  pub requested_reviewers: Vec<ApiUser>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  // Only present on the single-PR endpoint
  #[serde(default)]
  pub comments: u32,
  #[serde(default)]
  pub review_comments: u32,
  #[serde(default)]
  pub additions: u32,
  #[serde(default)]
  pub deletions: u32,
  #[serde(default)]
  pub changed_files: u32,
  #[serde(default)]
  pub html_url: String,
}

impl ApiPullRequest {
  pub fn lifecycle(&self) -> PrState {
    if self.merged_at.is_some() {
      PrState::Merged
    } else if self.state == "closed" {
      PrState::Closed
    } else if self.draft {
      PrState::Draft
    } else {
      PrState::Open
    }
  }

  /// Convert to the dashboard record shape, tagging it with its repository.
  pub fn into_record(self, repository: &str) -> PullRequest {
    let state = self.lifecycle();
    let author = self
      .user
      .map(|u| Author {
        login: u.login,
        avatar_url: u.avatar_url,
      })
      .unwrap_or_else(|| Author {
        login: "ghost".to_string(),
        avatar_url: String::new(),
      });

    PullRequest {
      id: self.id,
      number: self.number,
      title: self.title,
      state,
      repository: repository.to_string(),
      author,
      labels: self
        .labels
        .into_iter()
        .map(|l| l.into_label(repository))
        .collect(),
      base_branch: self.base.branch,
      head_branch: self.head.branch,
      assignees: self.assignees.into_iter().map(|u| u.login).collect(),
      reviewers: self
        .requested_reviewers
        .into_iter()
        .map(|u| u.login)
        .collect(),
      created_at: self.created_at,
      updated_at: self.updated_at,
      comments: self.comments + self.review_comments,
      additions: self.additions,
      deletions: self.deletions,
      changed_files: self.changed_files,
      url: self.html_url,
    }
  }
}
