// Credential persistence
// Persisted key/value backends and the in-memory credential snapshot

use anyhow::{Context, Result};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::types::{CredentialPair, Token};
use crate::error::ClientError;

/// Storage key for the access token
pub const ACCESS_KEY: &str = "access";
/// Storage key for the refresh token
pub const REFRESH_KEY: &str = "refresh";

/// Persisted key/value store holding credential strings
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write all entries in one step
    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()>;

    /// Remove all keys in one step; missing keys are ignored
    fn remove_all(&self, keys: &[&str]) -> Result<()>;
}

/// JSON file store, written atomically (temp file + rename)
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) if data.trim().is_empty() => Ok(HashMap::new()),
            Ok(data) => serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory {}", parent.display())
                })?;
            }
        }

        let json = serde_json::to_string_pretty(map)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.read_map()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        self.write_map(&map)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut map = self.read_map()?;
        for key in keys {
            map.remove(*key);
        }
        self.write_map(&map)
    }
}

/// Process-local store, lost on exit
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.entries.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.entries.remove(*key);
        }
        Ok(())
    }
}

/// Credential pair plus a counter bumped on every replacement
#[derive(Debug, Clone, Default)]
struct Snapshot {
    pair: Option<CredentialPair>,
    generation: u64,
}

/// Holder of the access/refresh credential pair
///
/// Reads come from an in-memory snapshot so every outgoing request can be
/// authenticated without I/O. Writes replace the whole pair under one lock
/// and are then persisted through the backing [`KeyValueStore`]; the
/// snapshot lock is never held across I/O.
///
/// Each write bumps a generation counter so a long-running writer (the
/// refresh) can detect that the session changed underneath it.
pub struct CredentialStore {
    current: RwLock<Snapshot>,
    // Serializes swap + persist so the file follows the snapshot order
    persist: Mutex<()>,
    backend: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    /// Open a store, restoring any previously persisted pair
    pub fn open(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let access = backend.get(ACCESS_KEY)?.filter(|s| !s.is_empty());
        let refresh = backend.get(REFRESH_KEY)?.filter(|s| !s.is_empty());

        let pair = match (access, refresh) {
            (Some(access), Some(refresh)) => {
                tracing::debug!("Restored persisted credentials");
                Some(CredentialPair::new(access, refresh))
            }
            (None, None) => None,
            _ => {
                tracing::warn!("Ignoring incomplete persisted credentials");
                None
            }
        };

        Ok(Self::with_backend(pair, backend))
    }

    /// Store with no persistence beyond this process
    pub fn in_memory() -> Self {
        Self::with_backend(None, Arc::new(MemoryStore::new()))
    }

    fn with_backend(pair: Option<CredentialPair>, backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            current: RwLock::new(Snapshot {
                pair,
                generation: 0,
            }),
            persist: Mutex::new(()),
            backend,
        }
    }

    pub fn get(&self) -> Option<CredentialPair> {
        self.snapshot().0
    }

    /// Current pair together with its generation, read under one lock
    pub fn snapshot(&self) -> (Option<CredentialPair>, u64) {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        (current.pair.clone(), current.generation)
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().1
    }

    /// Current access token, if non-empty
    pub fn access_token(&self) -> Option<Token> {
        self.get()
            .map(|pair| pair.access)
            .filter(|token| !token.is_empty())
    }

    pub fn refresh_token(&self) -> Option<Token> {
        self.get()
            .map(|pair| pair.refresh)
            .filter(|token| !token.is_empty())
    }

    /// Replace the pair; the snapshot is swapped even if persisting fails
    pub fn set(&self, pair: CredentialPair) -> Result<(), ClientError> {
        let _persist = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        self.swap(Some(pair.clone()));
        self.persist_pair(&pair)
    }

    /// Replace the pair only if no other write happened since `generation`
    ///
    /// Returns `Ok(false)` without touching anything when the store moved on.
    /// A persistence failure after the swap is reported as an error.
    pub fn set_if_current(
        &self,
        pair: CredentialPair,
        generation: u64,
    ) -> Result<bool, ClientError> {
        let _persist = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if current.generation != generation {
                return Ok(false);
            }
            current.pair = Some(pair.clone());
            current.generation += 1;
        }
        self.persist_pair(&pair)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), ClientError> {
        let _persist = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        self.swap(None);
        self.backend
            .remove_all(&[ACCESS_KEY, REFRESH_KEY])
            .map_err(|e| ClientError::Storage(format!("{:#}", e)))
    }

    fn swap(&self, pair: Option<CredentialPair>) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.pair = pair;
        current.generation += 1;
    }

    fn persist_pair(&self, pair: &CredentialPair) -> Result<(), ClientError> {
        self.backend
            .set_all(&[
                (ACCESS_KEY, pair.access.as_str()),
                (REFRESH_KEY, pair.refresh.as_str()),
            ])
            .map_err(|e| ClientError::Storage(format!("{:#}", e)))
    }
}
