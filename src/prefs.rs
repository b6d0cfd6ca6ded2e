//! Per-dashboard grouping preferences persisted in SQLite.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::{DashError, Result};

pub const PREFERENCES_VERSION: u32 = 2;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS preferences (
    dashboard_id TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Keys that older versions stored and that are no longer read.
const DEPRECATED_KEYS: [&str; 2] = ["columns", "labels"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
  #[serde(default = "current_version")]
  pub version: u32,
  #[serde(default)]
  pub group_by_labels: Vec<String>,
  #[serde(default)]
  pub group_by_authors: Vec<String>,
}

fn current_version() -> u32 {
  PREFERENCES_VERSION
}

impl Default for Preferences {
  fn default() -> Self {
    Self {
      version: PREFERENCES_VERSION,
      group_by_labels: Vec::new(),
      group_by_authors: Vec::new(),
    }
  }
}

/// Bring a stored record up to the current version.
///
/// Version 1 kept label grouping under `labels` and carried a column layout
/// under `columns`; both are folded away here. The flag is set when the
/// stored record differs from what should be on disk.
fn migrate(version: u32, mut data: Value) -> Option<(Preferences, bool)> {
  let object = data.as_object_mut()?;
  let mut changed = version != PREFERENCES_VERSION;

  if version < 2 {
    if let Some(labels) = object.get("labels").cloned() {
      object.entry("groupByLabels").or_insert(labels);
    }
  }
  for key in DEPRECATED_KEYS {
    changed |= object.remove(key).is_some();
  }
  object.insert("version".to_string(), Value::from(PREFERENCES_VERSION));

  let prefs = serde_json::from_value(data).ok()?;
  Some((prefs, changed))
}

/// SQLite-backed preferences store
pub struct PreferencesStore {
  conn: Mutex<Connection>,
}

impl PreferencesStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        DashError::Storage(format!("Failed to create preferences directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      DashError::Storage(format!(
        "Failed to open preferences database at {}: {}",
        path.display(),
        e
      ))
    })?;
    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Default database path under the user data directory.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| DashError::Storage("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("prdash").join("prefs.db"))
  }

  fn conn(&self) -> MutexGuard<'_, Connection> {
    self.conn.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Load preferences for a dashboard.
  ///
  /// A missing or unreadable record yields the defaults. Records from older
  /// versions, or carrying deprecated keys, are migrated and written back.
  pub fn load(&self, dashboard_id: &str) -> Result<Preferences> {
    let row: Option<(u32, String)> = self
      .conn()
      .query_row(
        "SELECT version, data FROM preferences WHERE dashboard_id = ?",
        params![dashboard_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    let Some((version, data)) = row else {
      return Ok(Preferences::default());
    };

    let parsed = serde_json::from_str::<Value>(&data)
      .ok()
      .and_then(|value| migrate(version, value));

    match parsed {
      Some((prefs, changed)) => {
        if changed {
          debug!(dashboard = %dashboard_id, from = version, "migrated preferences");
          self.save(dashboard_id, &prefs)?;
        }
        Ok(prefs)
      }
      None => {
        debug!(dashboard = %dashboard_id, "ignoring unreadable preferences record");
        Ok(Preferences::default())
      }
    }
  }

  /// Store preferences for a dashboard, replacing any previous record.
  pub fn save(&self, dashboard_id: &str, prefs: &Preferences) -> Result<()> {
    let prefs = Preferences {
      version: PREFERENCES_VERSION,
      ..prefs.clone()
    };
    let data = serde_json::to_string(&prefs)
      .map_err(|e| DashError::Storage(format!("Failed to encode preferences: {}", e)))?;

    self.conn().execute(
      "INSERT OR REPLACE INTO preferences (dashboard_id, version, data, updated_at) \
       VALUES (?, ?, ?, datetime('now'))",
      params![dashboard_id, PREFERENCES_VERSION, data],
    )?;
    Ok(())
  }
}
