//! Content-addressed response cache for vendor queries.
//!
//! Stores JSON payloads on disk under a SHA-256 digest of the logical
//! query, each wrapped with its write timestamp. An entry older than the
//! configured TTL is reported as a miss — staleness is never an error —
//! and cache I/O failures likewise degrade to a logged miss. Writes go
//! through a uniquely named temp file and a rename, so concurrent writers
//! race at worst to last-write-wins and a reader can never observe a
//! partial payload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::types::ScanError;

// ---------------------------------------------------------------------------
// Cache key
// ---------------------------------------------------------------------------

/// Deterministic key for one logical vendor query.
///
/// Identical queries collide regardless of call order; any change to the
/// vendor, destination, date window, or price filters produces a new key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a vendor offer search.
    pub fn for_search(
        vendor: &str,
        destination_id: &str,
        checkin: chrono::NaiveDate,
        checkout: chrono::NaiveDate,
        min_price: Option<f64>,
        max_price: Option<f64>,
    ) -> Self {
        let fmt_opt = |v: Option<f64>| v.map(|p| p.to_string()).unwrap_or_default();
        CacheKey(format!(
            "{vendor}|dest={destination_id}|in={checkin}|out={checkout}|min={}|max={}",
            fmt_opt(min_price),
            fmt_opt(max_price),
        ))
    }

    /// SHA-256 hex digest used as the on-disk filename.
    fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// On-disk entry
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    /// Unix seconds at write time; drives TTL checks.
    created_ts: i64,
    payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Response cache
// ---------------------------------------------------------------------------

/// File-backed response cache with TTL and per-key fetch locks.
pub struct ResponseCache {
    root: PathBuf,
    ttl_seconds: u64,
    /// Per-key in-flight locks so concurrent fetches of the same query can
    /// coalesce into one upstream call. Duplicate fetches are only wasted
    /// work, so callers may skip locking entirely.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ResponseCache {
    /// Open (or create) a cache rooted at `root`.
    ///
    /// `ttl_seconds = 0` disables expiry.
    pub fn new(root: impl Into<PathBuf>, ttl_seconds: u64) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache dir {}", root.display()))?;
        Ok(Self {
            root,
            ttl_seconds,
            locks: DashMap::new(),
        })
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.json", key.digest()))
    }

    /// Look up a payload. Missing, expired, and unreadable entries all
    /// come back as `None`; an expired entry is left on disk for the next
    /// write to replace.
    pub fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let path = self.path_for(key);
        match self.read_entry(&path) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    fn read_entry(&self, path: &Path) -> Result<Option<serde_json::Value>, ScanError> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Cache(format!("read {}: {e}", path.display())))?;
        let entry: StoredEntry = serde_json::from_str(&raw)
            .map_err(|e| ScanError::Cache(format!("parse {}: {e}", path.display())))?;

        if self.ttl_seconds > 0 {
            let age = Utc::now().timestamp().saturating_sub(entry.created_ts);
            if age > self.ttl_seconds as i64 {
                debug!(path = %path.display(), age_secs = age, "Cache entry expired");
                return Ok(None);
            }
        }

        Ok(Some(entry.payload))
    }

    /// Store a payload. Best-effort: write failures are logged and
    /// swallowed so a broken cache directory never fails a scan.
    pub fn set(&self, key: &CacheKey, payload: &serde_json::Value) {
        if let Err(e) = self.write_entry(key, payload) {
            warn!(key = key.as_str(), error = %e, "Cache write failed, skipping");
        }
    }

    fn write_entry(&self, key: &CacheKey, payload: &serde_json::Value) -> Result<(), ScanError> {
        let path = self.path_for(key);
        let entry = StoredEntry {
            created_ts: Utc::now().timestamp(),
            payload: payload.clone(),
        };
        let body = serde_json::to_string(&entry)
            .map_err(|e| ScanError::Cache(format!("serialise entry: {e}")))?;

        // Unique temp name per writer, then an atomic rename into place.
        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", key.digest(), uuid::Uuid::new_v4()));
        std::fs::write(&tmp, &body)
            .map_err(|e| ScanError::Cache(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| ScanError::Cache(format!("rename into {}: {e}", path.display())))?;

        debug!(key = key.as_str(), path = %path.display(), "Cache entry written");
        Ok(())
    }

    /// The in-flight lock for a key. Hold it across the miss-check +
    /// upstream fetch + store sequence to coalesce duplicate fetches.
    pub fn fetch_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.digest())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Whether an entry physically exists on disk, expired or not.
    /// Used by tests and diagnostics; normal callers only see `get`.
    pub fn entry_exists(&self, key: &CacheKey) -> bool {
        self.path_for(key).exists()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
