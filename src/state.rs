//! Persisted build-state store.
//!
//! An opaque key → value cache that survives between invocations, holding
//! resolved option values and the pinned toolchain. Writers take an
//! exclusive per-key lock so two concurrent resolutions of the same key
//! cannot pin divergent values.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{Error, Result};

/// File name of the state store inside the build directory.
pub const STATE_FILE: &str = "fwbuild-state.json";

/// Key → value access to build state.
pub trait BuildState: Send + Sync {
    /// Current value of `key`.
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`.
    fn set(&self, key: &str, value: &str);
    /// Acquire exclusive access to `key` until the guard is dropped.
    fn lock(&self, key: &str) -> KeyGuard<'_>;
}

/// Table of per-key exclusive locks.
#[derive(Debug, Default)]
pub struct KeyLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl KeyLocks {
    /// Block until `key` is free, then hold it.
    pub fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.to_string());
        KeyGuard {
            locks: self,
            key: key.to_string(),
        }
    }
}

/// Exclusive hold on one key. Released on drop.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
}

impl KeyGuard<'_> {
    /// The held key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.key);
        self.locks.released.notify_all();
    }
}

/// JSON-file backed state store. Without a path it is purely in-memory.
#[derive(Debug, Default)]
pub struct StateStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, String>>,
    locks: KeyLocks,
}

impl StateStore {
    /// Empty store that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store in `build_dir`, loading existing state if present.
    pub fn open(build_dir: &Path) -> Result<Self> {
        let path = build_dir.join(STATE_FILE);
        let entries = if path.exists() {
            let json = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            serde_json::from_str(&json).map_err(|source| Error::Json {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "opened build state");
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
            locks: KeyLocks::default(),
        })
    }

    /// Write the state back to disk. In-memory stores do nothing.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&*self.entries())
            .map_err(|source| Error::Json {
                path: path.clone(),
                source,
            })?;
        fs::write(path, json).map_err(|e| Error::io(path, e))
    }

    /// Location of the state file, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BuildState for StateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        debug!(key, value, "build state write");
        self.entries().insert(key.to_string(), value.to_string());
    }

    fn lock(&self, key: &str) -> KeyGuard<'_> {
        self.locks.acquire(key)
    }
}
