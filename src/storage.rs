//! Persisted client state: auth token, cached user and preferences.
//!
//! Values live under fixed keys in a small key/value store. The default
//! backend is a SQLite file in the user's data directory; [`MemoryStorage`]
//! backs tests and throwaway sessions.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const THEME_KEY: &str = "theme";
pub const LANGUAGE_KEY: &str = "language";

/// Key/value storage backend.
pub trait Storage: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;
}

/// In-process storage. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Storage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.values.lock().get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self.values.lock().insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.values.lock().remove(key);
    Ok(())
  }
}

/// SQLite-backed storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for the key/value table.
const STATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open (or create) the storage file at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create state directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open state database at {}: {}", path.display(), e))?;

    conn
      .execute_batch(STATE_SCHEMA)
      .map_err(|e| eyre!("Failed to run state migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = crate::config::data_dir()?;
    Ok(data_dir.join("state.db"))
  }
}

impl Storage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.conn.lock();
    conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to read '{}': {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.conn.lock();
    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, ?)",
        params![key, value, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to store '{}': {}", key, e))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.conn.lock();
    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove '{}': {}", key, e))?;
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Light,
  Dark,
}

impl Theme {
  fn as_str(self) -> &'static str {
    match self {
      Theme::Light => "light",
      Theme::Dark => "dark",
    }
  }

  fn parse(s: &str) -> Option<Self> {
    match s {
      "light" => Some(Theme::Light),
      "dark" => Some(Theme::Dark),
      _ => None,
    }
  }
}

/// Typed access to the persisted session keys.
///
/// The token is read from storage once and then served from memory; clones
/// share that copy, and `set_token`/`clear` keep it in step with storage.
#[derive(Clone)]
pub struct Session {
  storage: Arc<dyn Storage>,
  // `None` until the token has been read
  token: Arc<Mutex<Option<Option<String>>>>,
}

impl Session {
  pub fn new(storage: Arc<dyn Storage>) -> Self {
    Self {
      storage,
      token: Arc::new(Mutex::new(None)),
    }
  }

  /// Session kept in memory only.
  pub fn in_memory() -> Self {
    Self::new(Arc::new(MemoryStorage::new()))
  }

  pub fn token(&self) -> Result<Option<String>> {
    let mut cached = self.token.lock();
    if let Some(token) = cached.as_ref() {
      return Ok(token.clone());
    }
    let token = self.storage.get(TOKEN_KEY)?.filter(|t| !t.is_empty());
    *cached = Some(token.clone());
    Ok(token)
  }

  pub fn set_token(&self, token: &str) -> Result<()> {
    let mut cached = self.token.lock();
    self.storage.set(TOKEN_KEY, token)?;
    *cached = Some(Some(token.to_string()).filter(|t| !t.is_empty()));
    Ok(())
  }

  /// The cached user object. A corrupt entry reads as absent.
  pub fn user<T: DeserializeOwned>(&self) -> Result<Option<T>> {
    let Some(raw) = self.storage.get(USER_KEY)? else {
      return Ok(None);
    };
    match serde_json::from_str(&raw) {
      Ok(user) => Ok(Some(user)),
      Err(e) => {
        tracing::warn!("Discarding unreadable cached user: {}", e);
        self.storage.remove(USER_KEY)?;
        Ok(None)
      }
    }
  }

  pub fn set_user<T: Serialize>(&self, user: &T) -> Result<()> {
    let raw = serde_json::to_string(user).map_err(|e| eyre!("Failed to serialize user: {}", e))?;
    self.storage.set(USER_KEY, &raw)
  }

  pub fn theme(&self) -> Result<Theme> {
    Ok(
      self
        .storage
        .get(THEME_KEY)?
        .and_then(|t| Theme::parse(&t))
        .unwrap_or_default(),
    )
  }

  pub fn set_theme(&self, theme: Theme) -> Result<()> {
    self.storage.set(THEME_KEY, theme.as_str())
  }

  pub fn language(&self) -> Result<Option<String>> {
    self.storage.get(LANGUAGE_KEY)
  }

  pub fn set_language(&self, language: &str) -> Result<()> {
    self.storage.set(LANGUAGE_KEY, language)
  }

  /// Forget the token and cached user. Preferences are kept.
  pub fn clear(&self) -> Result<()> {
    {
      let mut cached = self.token.lock();
      // Unknown again until the next read if the removal fails
      *cached = None;
      self.storage.remove(TOKEN_KEY)?;
      *cached = Some(None);
    }
    self.storage.remove(USER_KEY)
  }
}
