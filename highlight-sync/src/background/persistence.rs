// Persistent key-value storage for the background process
// The daemon keeps every key in one JSON object file with exclusive file locking

use crate::error::StoreError;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const KEY_API_URL: &str = "apiUrl";
pub const KEY_TOKEN: &str = "token";
pub const KEY_PROJECT_ID: &str = "projectId";
pub const KEY_EXTENSION_ENABLED: &str = "extensionEnabled";
pub const KEY_HIGHLIGHT_QUEUE: &str = "highlightQueue";

/// Storage primitive consumed by the config and queue layers.
///
/// Each call is a complete read or a complete write of one key; callers that
/// need read-modify-write serialize themselves.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// JSON object file store (`store.json`)
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Open (creating if needed) and exclusively lock the sidecar lock file.
    /// The lock is released when the returned handle is dropped.
    fn lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory: {}", parent.display())
            })?;
        }

        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        // TODO(windows): Use CreateFile locking on Windows
        file.lock_exclusive()
            .with_context(|| "Failed to acquire exclusive lock on store file")?;
        Ok(file)
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open store file: {}", self.path.display()))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .with_context(|| format!("Failed to read store file: {}", self.path.display()))?;

        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse store file: {}", self.path.display()))
    }

    fn update(&self, mutate: impl FnOnce(&mut Map<String, Value>)) -> Result<()> {
        let _lock = self.lock()?;
        let mut all = self.read_all()?;
        mutate(&mut all);

        let contents = serde_json::to_string_pretty(&all)
            .with_context(|| "Failed to serialize store contents")?;
        atomic_write(&self.path, &contents)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _lock = self.lock()?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.update(|all| {
            all.insert(key.to_string(), value);
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|all| {
            all.remove(key);
        })?;
        Ok(())
    }
}

/// In-process store used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>, StoreError> {
        self.values
            .lock()
            .map_err(|_| StoreError::from(anyhow::anyhow!("memory store lock poisoned")))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values()?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// Atomically save data to a file using write-to-temp + rename
/// A crash mid-write leaves the previous contents intact
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Invalid path: {}", path.display()))?;

    // Create temp file in same directory to ensure same filesystem for rename
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown"),
        std::process::id()
    ));

    fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}
