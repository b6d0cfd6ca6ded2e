//! Error taxonomy shared by the fetch pipeline, the boundary handlers and the
//! preferences store.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DashError {
  /// Missing or unparseable dashboard/default configuration.
  #[error("Configuration error: {0}")]
  Configuration(String),

  /// No credential available for the fetch service.
  #[error("{0}")]
  Auth(String),

  /// The fetch service call failed or returned a non-success status.
  #[error("{0}")]
  Transport(String),

  #[error("Rate limit exceeded, resets at {reset_at}")]
  RateLimited { reset_at: String },

  /// A required boundary parameter is missing or malformed.
  #[error("{0}")]
  Validation(String),

  /// Preferences database failure.
  #[error("Storage error: {0}")]
  Storage(String),
}

impl DashError {
  /// Configuration and auth failures block the whole view; everything else is
  /// shown inline next to whatever data is already loaded.
  pub fn is_blocking(&self) -> bool {
    matches!(self, DashError::Configuration(_) | DashError::Auth(_))
  }

  /// HTTP-equivalent status used by the boundary handlers.
  pub fn status(&self) -> u16 {
    match self {
      DashError::Auth(_) => 401,
      DashError::Validation(_) => 400,
      _ => 500,
    }
  }
}

impl From<reqwest::Error> for DashError {
  fn from(err: reqwest::Error) -> Self {
    DashError::Transport(format!("GitHub API error: {}", err))
  }
}

impl From<rusqlite::Error> for DashError {
  fn from(err: rusqlite::Error) -> Self {
    DashError::Storage(err.to_string())
  }
}

pub type Result<T> = std::result::Result<T, DashError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_blocking_categories() {
    assert!(DashError::Configuration("x".into()).is_blocking());
    assert!(DashError::Auth("x".into()).is_blocking());
    assert!(!DashError::Transport("x".into()).is_blocking());
    assert!(!DashError::RateLimited {
      reset_at: "12:00:00".into()
    }
    .is_blocking());
  }

  #[test]
  fn test_status_codes() {
    assert_eq!(DashError::Auth("no token".into()).status(), 401);
    assert_eq!(DashError::Validation("missing".into()).status(), 400);
    assert_eq!(DashError::Transport("boom".into()).status(), 500);
  }
}
