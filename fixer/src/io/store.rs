//! Durable key-value store backing attempt counters and the escalation queue.
//!
//! The [`KvStore`] trait is the seam between the engine and its backing
//! store: plain get/set with TTL, an append-only list, a sorted-set primitive
//! for the priority index, and an atomic counter. [`FileKvStore`] is the
//! default implementation: one JSON document per key under `.fixer/store/`,
//! atomic temp-file + rename writes, and lazy expiry on read. A process-wide
//! lock makes read-modify-write operations atomic for concurrent task ids;
//! cross-process callers are expected to serialize per task id.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Backing-store contract for durable engine state.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    /// Set `key` to `value`. A TTL of `None` never expires.
    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()>;
    /// Atomically increment a counter, starting at 1. The TTL is applied on
    /// first write only, so the expiry window is anchored to the first call.
    fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64>;
    /// Append to a list, creating it (with TTL) when absent.
    fn list_append(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()>;
    /// All list entries in insertion order; empty when absent or expired.
    fn list_range(&self, key: &str) -> Result<Vec<Value>>;
    /// Insert or update a member in a score-ordered set.
    fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;
    /// Members by descending score (ties broken by member, ascending).
    fn zrange_desc(&self, key: &str, limit: Option<usize>) -> Result<Vec<(String, f64)>>;
    /// Remove a member; returns whether it was present.
    fn zrem(&self, key: &str, member: &str) -> Result<bool>;
}

/// Stored envelope: payload plus optional expiry.
#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    expires_at: Option<DateTime<Utc>>,
    value: Value,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// File-backed [`KvStore`] rooted at a directory.
#[derive(Debug)]
pub struct FileKvStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        // Sanitized name plus a short content hash so distinct keys that
        // sanitize identically cannot collide.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hex::encode(hasher.finalize());
        self.dir.join(format!("{safe}.{}.json", &digest[..8]))
    }

    fn read_entry(&self, key: &str) -> Result<Option<Entry>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let entry: Entry = serde_json::from_str(&contents)
            .with_context(|| format!("parse {}", path.display()))?;
        if entry.expired() {
            debug!(key, "entry expired, dropping");
            let _ = fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn write_entry(&self, key: &str, entry: &Entry) -> Result<()> {
        let path = self.key_path(key);
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create store dir {}", self.dir.display()))?;
        let mut buf = serde_json::to_string_pretty(entry)?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &buf)
            .with_context(|| format!("write temp entry {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("replace entry {}", path.display()))?;
        Ok(())
    }

    fn expires_from(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        ttl.map(|ttl| Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(self.read_entry(key)?.map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        self.write_entry(
            key,
            &Entry {
                expires_at: Self::expires_from(ttl),
                value: value.clone(),
            },
        )
    }

    fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        let (count, expires_at) = match self.read_entry(key)? {
            Some(entry) => {
                let current = entry.value.as_u64().unwrap_or(0);
                (current + 1, entry.expires_at)
            }
            None => (1, Self::expires_from(ttl)),
        };
        self.write_entry(
            key,
            &Entry {
                expires_at,
                value: Value::from(count),
            },
        )?;
        Ok(count)
    }

    fn list_append(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        let (mut items, expires_at) = match self.read_entry(key)? {
            Some(entry) => {
                let items = entry.value.as_array().cloned().unwrap_or_default();
                (items, entry.expires_at)
            }
            None => (Vec::new(), Self::expires_from(ttl)),
        };
        items.push(value.clone());
        self.write_entry(
            key,
            &Entry {
                expires_at,
                value: Value::Array(items),
            },
        )
    }

    fn list_range(&self, key: &str) -> Result<Vec<Value>> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(self
            .read_entry(key)?
            .and_then(|entry| entry.value.as_array().cloned())
            .unwrap_or_default())
    }

    fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        let mut map = match self.read_entry(key)? {
            Some(entry) => entry.value.as_object().cloned().unwrap_or_default(),
            None => serde_json::Map::new(),
        };
        map.insert(member.to_string(), Value::from(score));
        self.write_entry(
            key,
            &Entry {
                expires_at: None,
                value: Value::Object(map),
            },
        )
    }

    fn zrange_desc(&self, key: &str, limit: Option<usize>) -> Result<Vec<(String, f64)>> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        let mut pairs: Vec<(String, f64)> = self
            .read_entry(key)?
            .and_then(|entry| entry.value.as_object().cloned())
            .map(|map| {
                map.into_iter()
                    .map(|(member, score)| (member, score.as_f64().unwrap_or(0.0)))
                    .collect()
            })
            .unwrap_or_default();
        pairs.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        if let Some(limit) = limit {
            pairs.truncate(limit);
        }
        Ok(pairs)
    }

    fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        let Some(entry) = self.read_entry(key)? else {
            return Ok(false);
        };
        let mut map = entry.value.as_object().cloned().unwrap_or_default();
        let removed = map.remove(member).is_some();
        if removed {
            self.write_entry(
                key,
                &Entry {
                    expires_at: entry.expires_at,
                    value: Value::Object(map),
                },
            )?;
        }
        Ok(removed)
    }
}
