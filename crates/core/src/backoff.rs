//! Time-boxed "do not retry" memory keyed by borrower address.
//!
//! `put` mutes a borrower for a fixed window measured from the moment of the
//! call; `is_ignored` lazily evicts entries whose window has elapsed, and
//! every write drops all expired entries. With a persistence path every
//! mutation rewrites the JSON file:
//!
//! ```json
//! { "version": 1, "ignoreDurationMs": 180000, "memory": { "0xabc...": 1700000000000 } }
//! ```
//!
//! Loading a file written with a different duration is refused, so changing
//! the window always starts from an empty cache.

use crate::clock::Clock;
use alloy::primitives::Address;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Current persisted schema version.
pub const BACKOFF_FILE_VERSION: u32 = 1;

/// Backoff cache failure.
#[derive(Debug, Error)]
pub enum BackoffError {
    #[error("backoff file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backoff file {path}: invalid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("backoff file was written with ignoreDurationMs={persisted}, configured {configured}")]
    DurationMismatch { persisted: u64, configured: u64 },

    #[error("unsupported backoff file version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid borrower key {0:?} in backoff file")]
    InvalidKey(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackoffFile {
    #[serde(default = "default_version")]
    version: u32,
    ignore_duration_ms: u64,
    #[serde(default)]
    memory: HashMap<String, u64>,
}

fn default_version() -> u32 {
    BACKOFF_FILE_VERSION
}

/// TTL gate for borrowers.
#[derive(Debug)]
pub struct BackoffCache {
    ignore_duration_ms: u64,
    /// borrower -> expiry (epoch ms)
    memory: Mutex<HashMap<Address, u64>>,
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl BackoffCache {
    /// Memory-only cache.
    pub fn in_memory(ignore_duration: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ignore_duration_ms: duration_ms(ignore_duration),
            memory: Mutex::new(HashMap::new()),
            path: None,
            clock,
        }
    }

    /// Durable cache backed by `path`, loading existing entries if the file exists.
    pub fn open(
        path: impl Into<PathBuf>,
        ignore_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BackoffError> {
        let path = path.into();
        let ignore_duration_ms = duration_ms(ignore_duration);

        let memory = if path.exists() {
            load(&path, ignore_duration_ms)?
        } else {
            HashMap::new()
        };

        info!(
            path = %path.display(),
            entries = memory.len(),
            ignore_duration_ms = ignore_duration_ms,
            "Backoff cache opened"
        );

        Ok(Self {
            ignore_duration_ms,
            memory: Mutex::new(memory),
            path: Some(path),
            clock,
        })
    }

    /// Build from optional configuration: durable when a path is given.
    pub fn from_config(
        path: Option<&Path>,
        ignore_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BackoffError> {
        match path {
            Some(path) => Self::open(path, ignore_duration, clock),
            None => Ok(Self::in_memory(ignore_duration, clock)),
        }
    }

    pub fn ignore_duration(&self) -> Duration {
        Duration::from_millis(self.ignore_duration_ms)
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    /// Mute `key` for the configured window starting now.
    pub fn put(&self, key: Address) -> Result<(), BackoffError> {
        let expiry = self.clock.now_ms().saturating_add(self.ignore_duration_ms);
        let mut memory = self.memory.lock();
        memory.insert(key, expiry);
        debug!(user = %key, expiry_ms = expiry, "Borrower muted");
        self.persist(&mut memory)
    }

    /// Whether `key` is currently muted. Expired entries are evicted.
    pub fn is_ignored(&self, key: &Address) -> bool {
        let now = self.clock.now_ms();
        let mut memory = self.memory.lock();
        match memory.get(key) {
            None => false,
            Some(&expiry) if now < expiry => true,
            Some(_) => {
                memory.remove(key);
                if let Err(e) = self.persist(&mut memory) {
                    warn!(error = %e, "Failed to persist backoff eviction");
                }
                false
            }
        }
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.memory.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, then rewrite the file if the cache is durable.
    fn persist(&self, memory: &mut HashMap<Address, u64>) -> Result<(), BackoffError> {
        let now = self.clock.now_ms();
        memory.retain(|_, expiry| now < *expiry);

        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = BackoffFile {
            version: BACKOFF_FILE_VERSION,
            ignore_duration_ms: self.ignore_duration_ms,
            memory: memory
                .iter()
                .map(|(addr, expiry)| (format!("{addr:#x}"), *expiry))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| BackoffError::Json {
            path: path.clone(),
            source,
        })?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| BackoffError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| BackoffError::Io {
            path: path.clone(),
            source,
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn load(path: &Path, configured_ms: u64) -> Result<HashMap<Address, u64>, BackoffError> {
    let raw = fs::read_to_string(path).map_err(|source| BackoffError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: BackoffFile = serde_json::from_str(&raw).map_err(|source| BackoffError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if file.version != BACKOFF_FILE_VERSION {
        return Err(BackoffError::UnsupportedVersion(file.version));
    }
    if file.ignore_duration_ms != configured_ms {
        return Err(BackoffError::DurationMismatch {
            persisted: file.ignore_duration_ms,
            configured: configured_ms,
        });
    }

    file.memory
        .into_iter()
        .map(|(key, expiry)| {
            key.parse::<Address>()
                .map(|addr| (addr, expiry))
                .map_err(|_| BackoffError::InvalidKey(key))
        })
        .collect()
}
