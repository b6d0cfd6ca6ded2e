//! Cached, paginated pull request dashboards across many GitHub repositories.
//!
//! The pipeline is: [`executor::QueryExecutor`] (TTL cache in front of a
//! [`fetch::FetchService`]) driven page by page by [`pagination::Paginator`],
//! then [`filter::apply_filters`] and [`grouping::group_records`] over the
//! accumulated records. [`app::DashboardApp`] wires one dashboard together and
//! [`api::Api`] exposes the JSON boundary.

pub mod api;
pub mod app;
pub mod cache;
pub mod colors;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod filter;
pub mod github;
pub mod grouping;
pub mod logging;
pub mod pagination;
pub mod prefs;
pub mod view_state;

pub use error::{DashError, Result};
