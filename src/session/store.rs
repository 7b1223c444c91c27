//! Durable holder of the bearer token.
//!
//! [`SessionStore`] keeps one live token per device on top of a key-value
//! backend. [`FileStorage`] persists a small JSON object; [`MemoryStorage`] is
//! process-local.

use crate::errors::StorageError;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Key the token is stored under.
pub const TOKEN_KEY: &str = "auth_token";

/// Local key-value medium. Calls are synchronous and never touch the network.
pub trait KeyValueStorage: Send {
    /// # Errors
    /// Returns an error if the storage medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    /// Returns an error if the storage medium cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// # Errors
    /// Returns an error if the storage medium cannot be written.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug)]
pub struct SessionStore<S> {
    storage: S,
    token: Option<SecretString>,
}

impl<S: KeyValueStorage> SessionStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            token: None,
        }
    }

    /// Loads the persisted token, returning whether one was found.
    /// Blank values count as absent.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    pub fn init(&mut self) -> Result<bool, StorageError> {
        self.token = self
            .storage
            .get(TOKEN_KEY)?
            .filter(|token| !token.trim().is_empty())
            .map(SecretString::from);

        debug!(found = self.token.is_some(), "session token loaded");
        Ok(self.token.is_some())
    }

    pub fn get(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    /// Persists `token`, replacing any previous value.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written; the in-memory token is
    /// left unchanged in that case.
    pub fn set(&mut self, token: SecretString) -> Result<(), StorageError> {
        self.storage.set(TOKEN_KEY, token.expose_secret())?;
        self.token = Some(token);
        Ok(())
    }

    /// Removes the token. The in-memory copy is dropped even if the backend fails.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.token = None;
        self.storage.remove(TOKEN_KEY)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

/// JSON-object file. A missing file reads as empty; writes go through a
/// temporary file and a rename.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_map(&self) -> Result<Map<String, Value>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(self.io_error(err)),
        };

        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }

        let contents = serde_json::to_string_pretty(map).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("tmp");
        let mut file = create_private(&tmp).map_err(|err| self.io_error(err))?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|err| self.io_error(err))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|err| self.io_error(err))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .read_map()?
            .get(key)
            .and_then(Value::as_str)
            .map(ToString::to_string))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.read_map()?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_map(&map)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let mut map = self.read_map()?;
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.write_map(&map)
    }
}

/// Opens `path` for writing, owner read/write only from the moment it exists.
#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; a leftover temp file keeps its old bits.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<File> {
    File::create(path)
}

/// Process-local backend. Clones share the same map, so a test can keep a
/// handle and inspect what the session persisted.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: std::sync::Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated backend, as if a previous run had persisted `token`.
    pub fn with_token(token: &str) -> Self {
        let storage = Self::default();
        if let Ok(mut entries) = storage.entries.lock() {
            entries.insert(TOKEN_KEY.to_string(), token.to_string());
        }
        storage
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}
