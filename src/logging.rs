use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "PRDASH_LOG";
const LOG_FILE: &str = "prdash.log";

/// Directory the log file is written to.
pub fn log_dir() -> Option<PathBuf> {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|dir| dir.join("prdash"))
}

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Logs go to `prdash.log` in `dir` through a non-blocking writer; the
/// returned guard flushes it on drop. Falls back to stderr when the directory
/// cannot be created.
pub fn init(dir: Option<&Path>) -> Option<WorkerGuard> {
  let dir = dir.filter(|d| std::fs::create_dir_all(d).is_ok());

  match dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::never(dir, LOG_FILE);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
      None
    }
  }
}
