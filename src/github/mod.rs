//! GitHub REST access: provider response types, the dashboard record model
//! and the HTTP client behind [`crate::fetch::FetchService`].

pub mod api_types;
pub mod client;
pub mod types;

pub use client::GitHubClient;
pub use types::{Author, Label, PrState, PullRequest, StateFilter};
