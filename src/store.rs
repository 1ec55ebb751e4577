use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("state encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Key/value persistence seam. Every load/save path takes this instead of
/// reaching for storage ambiently, so domain logic tests run against
/// [`MemoryKv`].
pub trait KvBackend {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// SQLite-backed store: one `kv` table of JSON blobs, the closest local
/// analogue of the original's browser storage.
pub struct SqliteKv {
    conn: Connection,
}

impl SqliteKv {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }
}

impl KvBackend for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let row = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            });
        match row {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// In-memory backend for tests.
#[derive(Default)]
pub struct MemoryKv {
    map: RefCell<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.borrow_mut().remove(key);
        Ok(())
    }
}

/// One step in a store's migration chain: raw JSON at `from` becomes raw
/// JSON at `from + 1`. Chains are ordered lists applied iteratively until
/// the current version is reached.
pub struct MigrationStep {
    pub from: u32,
    pub migrate: fn(Value) -> Value,
}

/// How a versioned blob was obtained. Malformed state never surfaces as an
/// error; it degrades to the store's default.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<T> {
    /// Parsed straight from the current key.
    Current(T),
    /// Recovered from a legacy key and re-persisted under the current one.
    Migrated(T),
    /// Nothing usable was stored.
    Default { value: T, reason: &'static str },
}

impl<T> Loaded<T> {
    pub fn into_inner(self) -> T {
        match self {
            Loaded::Current(v) | Loaded::Migrated(v) => v,
            Loaded::Default { value, .. } => value,
        }
    }

    pub fn was_migrated(&self) -> bool {
        matches!(self, Loaded::Migrated(_))
    }
}

pub fn storage_key(name: &str, version: u32) -> String {
    format!("{}_v{}", name, version)
}

/// Load a versioned blob: current key first, then progressively older
/// legacy keys run forward through `steps`. Migrated state is persisted
/// under the current key and the legacy key deleted.
pub fn load_versioned<T: DeserializeOwned + Serialize>(
    kv: &dyn KvBackend,
    name: &str,
    current: u32,
    steps: &[MigrationStep],
    default: fn() -> T,
) -> Result<Loaded<T>> {
    if let Some(raw) = kv.get(&storage_key(name, current))? {
        return Ok(match serde_json::from_str::<T>(&raw) {
            Ok(value) => Loaded::Current(value),
            Err(_) => Loaded::Default {
                value: default(),
                reason: "malformed blob under current key",
            },
        });
    }

    for version in (1..current).rev() {
        let legacy_key = storage_key(name, version);
        let Some(raw) = kv.get(&legacy_key)? else {
            continue;
        };
        let Ok(mut value) = serde_json::from_str::<Value>(&raw) else {
            kv.remove(&legacy_key)?;
            return Ok(Loaded::Default {
                value: default(),
                reason: "malformed legacy blob",
            });
        };
        for step in steps.iter().filter(|s| s.from >= version) {
            value = (step.migrate)(value);
        }
        let migrated = match serde_json::from_value::<T>(value) {
            Ok(v) => v,
            Err(_) => {
                kv.remove(&legacy_key)?;
                return Ok(Loaded::Default {
                    value: default(),
                    reason: "legacy blob did not migrate cleanly",
                });
            }
        };
        save_versioned(kv, name, current, &migrated)?;
        kv.remove(&legacy_key)?;
        return Ok(Loaded::Migrated(migrated));
    }

    Ok(Loaded::Default {
        value: default(),
        reason: "no stored state",
    })
}

pub fn save_versioned<T: Serialize>(
    kv: &dyn KvBackend,
    name: &str,
    current: u32,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    kv.set(&storage_key(name, current), &raw)
}
