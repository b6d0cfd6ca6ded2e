use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use prdash::api::{parse_params, Api, ApiResponse, Connector, GitHubConnector};
use prdash::app::{DashboardApp, FetchLimits};
use prdash::config::{Config, ConfigDashboards, DashboardSource};
use prdash::executor::QueryExecutor;
use prdash::github::StateFilter;
use prdash::grouping::GroupBucket;
use prdash::logging;
use prdash::prefs::PreferencesStore;
use prdash::view_state::{Location, MemoryLocation};
use prdash::DashError;

#[derive(Parser, Debug)]
#[command(name = "prdash")]
#[command(about = "Pull request dashboards across many GitHub repositories")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/prdash/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// GitHub token; overrides GITHUB_TOKEN
  #[arg(long, global = true)]
  token: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List configured dashboards
  Dashboards,
  /// Show default repositories and filters
  Defaults,
  /// Fetch, filter and group one dashboard
  Show(ShowArgs),
  /// Fetch one page of pull requests as JSON
  Pulls {
    /// Query string, e.g. "repositories=a/x,a/y&state=open&page=1"
    query: String,
  },
  /// Fetch the label catalog as JSON
  Labels {
    /// Query string, e.g. "repositories=a/x,a/y"
    query: String,
  },
}

#[derive(clap::Args, Debug)]
struct ShowArgs {
  /// Dashboard id
  dashboard: String,
  /// View state query string, e.g. "state=closed&labels=type"
  #[arg(short, long, default_value = "")]
  query: String,
  /// Override the lifecycle state
  #[arg(short, long)]
  state: Option<StateFilter>,
  /// Extra pages to load after automatic pagination stops
  #[arg(long, default_value_t = 0)]
  more: u32,
  /// Bypass the cache for the first page
  #[arg(long)]
  refresh: bool,
  /// Save label grouping keys for this dashboard (comma-separated)
  #[arg(long)]
  group_labels: Option<String>,
  /// Save author grouping keys for this dashboard (comma-separated)
  #[arg(long)]
  group_authors: Option<String>,
}

fn split_keys(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}

fn print_response(response: ApiResponse) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(&response.body)?);
  if response.status == 200 {
    Ok(())
  } else {
    Err(eyre!("request failed with status {}", response.status))
  }
}

fn print_bucket(bucket: &GroupBucket, depth: usize) {
  let indent = "  ".repeat(depth);
  println!("{}{} ({})", indent, bucket.label, bucket.len());
  if bucket.children.is_empty() {
    for pr in &bucket.records {
      println!(
        "{}  {}#{} {} [{}]",
        indent, pr.repository, pr.number, pr.title, pr.author.login
      );
    }
  } else {
    for child in &bucket.children {
      print_bucket(child, depth + 1);
    }
  }
}

async fn show(
  config: &Config,
  source: &ConfigDashboards,
  connector: &GitHubConnector,
  token: Option<&str>,
  args: ShowArgs,
) -> Result<()> {
  let token = token.ok_or_else(|| DashError::Auth("GitHub token not configured".to_string()))?;
  let executor = Arc::new(QueryExecutor::new(
    connector.connect(token)?,
    config.cache.ttl(),
  ));
  let store = Arc::new(PreferencesStore::open()?);
  let limits = FetchLimits {
    page_size: config.pagination.page_size,
    max_pages: config.pagination.max_pages,
  };

  let mut app = DashboardApp::open(
    &args.dashboard,
    source,
    executor,
    store,
    MemoryLocation::new(args.query),
    limits,
  )?;

  if let Some(state) = args.state {
    app.set_state(state);
  }
  if args.refresh {
    app.refresh();
  }
  app.settle().await;
  for _ in 0..args.more {
    if !app.load_more() {
      break;
    }
    app.settle().await;
  }
  app.load_labels().await;

  if args.group_labels.is_some() || args.group_authors.is_some() {
    let prefs = app.preferences().clone();
    app.set_grouping(
      args
        .group_labels
        .as_deref()
        .map(split_keys)
        .unwrap_or(prefs.group_by_labels),
      args
        .group_authors
        .as_deref()
        .map(split_keys)
        .unwrap_or(prefs.group_by_authors),
    );
  }

  if let Some(error) = app.error().filter(|e| e.is_blocking()) {
    return Err(eyre!("{}", error));
  }

  let visible = app.visible();
  println!(
    "{} ({} {}, {} of {} shown{})",
    app.dashboard().name,
    app.selected_repositories().join(", "),
    app.state(),
    visible.len(),
    app.fetched().len(),
    if app.has_more() { ", more available" } else { "" }
  );
  if let Some(error) = app.error() {
    eprintln!("error: {} (showing data loaded so far)", error);
  }
  if let Some(notice) = app.notice() {
    eprintln!("warning: {}", notice);
  }

  for bucket in app.groups() {
    print_bucket(&bucket, 0);
  }
  println!("view: ?{}", app.location().search());
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(logging::log_dir().as_deref());

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let source = ConfigDashboards::new(&config);
  let connector = GitHubConnector::new(config.github.api_url.clone());
  let token = args.token.as_deref().or(source.server_token());

  match args.command {
    Command::Dashboards => {
      for dashboard in source.list_dashboards()? {
        println!("{}\t{}\t{}", dashboard.id, dashboard.name, dashboard.repos);
      }
    }
    Command::Defaults => {
      let api = Api::new(
        Arc::new(connector),
        Arc::new(source),
        None,
        config.cache.ttl(),
      );
      print_response(api.defaults())?;
    }
    Command::Show(show_args) => {
      show(&config, &source, &connector, token, show_args).await?;
    }
    Command::Pulls { query } => {
      let api = Api::new(
        Arc::new(connector),
        Arc::new(source.clone()),
        source.server_token().map(String::from),
        config.cache.ttl(),
      );
      print_response(api.pulls(&parse_params(&query), args.token.as_deref()).await)?;
    }
    Command::Labels { query } => {
      let api = Api::new(
        Arc::new(connector),
        Arc::new(source.clone()),
        source.server_token().map(String::from),
        config.cache.ttl(),
      );
      print_response(api.labels(&parse_params(&query), args.token.as_deref()).await)?;
    }
  }

  Ok(())
}
