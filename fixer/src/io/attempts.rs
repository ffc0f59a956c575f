//! Durable per-task attempt counters and attempt history.
//!
//! Counters survive process restarts and reset only when their TTL window
//! (default 24 hours, anchored to the first attempt) lapses. Each increment
//! also appends an [`AttemptRecord`] to a history list under the same TTL.

use anyhow::{Context, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

use crate::core::types::AttemptRecord;
use crate::io::store::KvStore;

pub const DEFAULT_ATTEMPT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct AttemptTracker<'a, S: KvStore> {
    store: &'a S,
    ttl: Duration,
}

impl<'a, S: KvStore> AttemptTracker<'a, S> {
    pub fn new(store: &'a S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Record one attempt and return the 1-indexed attempt count.
    pub fn increment(&self, task_id: &str, test_path: &str) -> Result<u32> {
        let attempts = self
            .store
            .incr(&counter_key(task_id), Some(self.ttl))
            .with_context(|| format!("increment attempts for {task_id}"))?;
        let record = AttemptRecord {
            attempt: attempts as u32,
            timestamp: Utc::now(),
            test_path: test_path.to_string(),
        };
        self.store
            .list_append(
                &history_key(task_id),
                &serde_json::to_value(&record)?,
                Some(self.ttl),
            )
            .with_context(|| format!("append attempt history for {task_id}"))?;
        debug!(task_id, attempts, "attempt recorded");
        Ok(attempts as u32)
    }

    /// Current attempt count; 0 when the task is unknown or expired.
    pub fn get(&self, task_id: &str) -> Result<u32> {
        let value = self
            .store
            .get(&counter_key(task_id))
            .with_context(|| format!("read attempts for {task_id}"))?;
        Ok(value.and_then(|v| v.as_u64()).unwrap_or(0) as u32)
    }

    /// Attempt history in insertion order.
    pub fn history(&self, task_id: &str) -> Result<Vec<AttemptRecord>> {
        let items = self
            .store
            .list_range(&history_key(task_id))
            .with_context(|| format!("read attempt history for {task_id}"))?;
        items
            .into_iter()
            .map(|value| serde_json::from_value(value).context("parse attempt record"))
            .collect()
    }
}

fn counter_key(task_id: &str) -> String {
    format!("attempts:{task_id}")
}

fn history_key(task_id: &str) -> String {
    format!("attempt_history:{task_id}")
}
