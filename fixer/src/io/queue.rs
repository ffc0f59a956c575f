//! Durable, priority-ordered queue of items requiring human review.
//!
//! Items are stored keyed by task id with a TTL; an active priority index
//! (sorted set) orders unresolved items for the review dashboard. `resolve`
//! removes an item from the active index but keeps the record retrievable,
//! and forwards the annotation to the learning store.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::priority::compute_priority;
use crate::core::types::{Annotation, EscalationItem};
use crate::io::learning::LearningStore;
use crate::io::store::KvStore;

pub const DEFAULT_QUEUE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Priority above which an item counts as high-priority in [`QueueStats`].
const HIGH_PRIORITY_CUTOFF: f64 = 0.7;

const ACTIVE_INDEX_KEY: &str = "hitl:index";
const ALL_INDEX_KEY: &str = "hitl:all";

/// Aggregate queue counters for the review dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    pub total_count: usize,
    pub active_count: usize,
    pub resolved_count: usize,
    /// Mean priority across active items; 0 when none are active.
    pub avg_priority: f64,
    pub high_priority_count: usize,
}

pub struct EscalationQueue<'a, S: KvStore, L: LearningStore> {
    store: &'a S,
    learning: &'a L,
    ttl: Duration,
}

impl<'a, S: KvStore, L: LearningStore> EscalationQueue<'a, S, L> {
    pub fn new(store: &'a S, learning: &'a L, ttl: Duration) -> Self {
        Self { store, learning, ttl }
    }

    /// Insert an item, assigning `created_at` and a default priority when the
    /// caller did not supply them.
    pub fn add(&self, mut item: EscalationItem) -> Result<bool> {
        if item.created_at.is_none() {
            item.created_at = Some(Utc::now());
        }
        let priority = match item.priority {
            Some(priority) => priority.clamp(0.0, 1.0),
            None => compute_priority(None, item.attempts, &item.feature, item.created_at),
        };
        item.priority = Some(priority);

        self.store
            .set(
                &item_key(&item.task_id),
                &serde_json::to_value(&item)?,
                Some(self.ttl),
            )
            .with_context(|| format!("store escalation item {}", item.task_id))?;
        self.store
            .zadd(ACTIVE_INDEX_KEY, &item.task_id, priority)
            .context("index escalation item")?;
        let created_epoch = item
            .created_at
            .map(|at| at.timestamp() as f64)
            .unwrap_or(0.0);
        self.store
            .zadd(ALL_INDEX_KEY, &item.task_id, created_epoch)
            .context("track escalation item")?;
        debug!(task_id = %item.task_id, priority, "escalation item queued");
        Ok(true)
    }

    pub fn get(&self, task_id: &str) -> Result<Option<EscalationItem>> {
        let value = self
            .store
            .get(&item_key(task_id))
            .with_context(|| format!("read escalation item {task_id}"))?;
        value
            .map(|v| serde_json::from_value(v).context("parse escalation item"))
            .transpose()
    }

    /// Items in descending priority order. Resolved items are excluded unless
    /// requested; expired records are skipped.
    pub fn list(&self, include_resolved: bool, limit: Option<usize>) -> Result<Vec<EscalationItem>> {
        let index_key = if include_resolved { ALL_INDEX_KEY } else { ACTIVE_INDEX_KEY };
        let members = self.store.zrange_desc(index_key, None)?;

        let mut items = Vec::new();
        for (task_id, _) in members {
            if let Some(item) = self.get(&task_id)? {
                if !include_resolved && item.resolved {
                    continue;
                }
                items.push(item);
            }
        }
        items.sort_by(|a, b| {
            b.priority
                .unwrap_or(0.0)
                .partial_cmp(&a.priority.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    /// Attach a human annotation and retire the item from the active index.
    ///
    /// Returns `false` when the task id is unknown (or expired). The
    /// annotation is additionally forwarded to the learning store; learning
    /// failures are logged, never propagated.
    pub fn resolve(&self, task_id: &str, annotation: &Annotation) -> Result<bool> {
        let Some(mut item) = self.get(task_id)? else {
            return Ok(false);
        };

        item.annotation = Some(annotation.clone());
        item.severity = annotation.severity;
        item.resolved = true;
        item.resolved_at = Some(Utc::now());

        self.store
            .set(
                &item_key(task_id),
                &serde_json::to_value(&item)?,
                Some(self.ttl),
            )
            .with_context(|| format!("update escalation item {task_id}"))?;
        self.store
            .zrem(ACTIVE_INDEX_KEY, task_id)
            .context("remove from active index")?;

        let annotation_id = format!("ann-{}-{task_id}", Utc::now().format("%Y%m%dT%H%M%S%3f"));
        if let Err(err) = self
            .learning
            .store_annotation(&annotation_id, &item.feature, annotation)
        {
            warn!(task_id, err = %err, "learning store rejected annotation");
        }

        debug!(task_id, "escalation item resolved");
        Ok(true)
    }

    pub fn stats(&self) -> Result<QueueStats> {
        let items = self.list(true, None)?;
        let active: Vec<&EscalationItem> = items.iter().filter(|item| !item.resolved).collect();
        let resolved_count = items.len() - active.len();
        let avg_priority = if active.is_empty() {
            0.0
        } else {
            active
                .iter()
                .map(|item| item.priority.unwrap_or(0.0))
                .sum::<f64>()
                / active.len() as f64
        };
        let high_priority_count = active
            .iter()
            .filter(|item| item.priority.unwrap_or(0.0) > HIGH_PRIORITY_CUTOFF)
            .count();
        Ok(QueueStats {
            total_count: items.len(),
            active_count: active.len(),
            resolved_count,
            avg_priority,
            high_priority_count,
        })
    }
}

fn item_key(task_id: &str) -> String {
    format!("hitl:item:{task_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{EscalationReason, Severity};
    use crate::io::store::FileKvStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLearningStore {
        stored: Mutex<Vec<(String, String, Annotation)>>,
    }

    impl LearningStore for RecordingLearningStore {
        fn store_annotation(
            &self,
            id: &str,
            description: &str,
            annotation: &Annotation,
        ) -> Result<bool> {
            self.stored.lock().expect("lock").push((
                id.to_string(),
                description.to_string(),
                annotation.clone(),
            ));
            Ok(true)
        }
    }

    struct FailingLearningStore;

    impl LearningStore for FailingLearningStore {
        fn store_annotation(&self, _: &str, _: &str, _: &Annotation) -> Result<bool> {
            Err(anyhow::anyhow!("learning store down"))
        }
    }

    fn item(task_id: &str, priority: Option<f64>) -> EscalationItem {
        let mut item = EscalationItem::new(task_id, "checkout flow", "tests/checkout.spec.ts");
        item.priority = priority;
        item.attempts = 2;
        item.severity = Severity::High;
        item.escalation_reason = EscalationReason::RegressionDetected;
        item
    }

    fn annotation() -> Annotation {
        Annotation {
            root_cause_category: "selector_drift".to_string(),
            fix_strategy: "update_selector".to_string(),
            severity: Severity::Medium,
            human_notes: "renamed button id".to_string(),
            patch_diff: None,
        }
    }

    #[test]
    fn add_assigns_created_at_and_default_priority() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileKvStore::new(temp.path());
        let learning = RecordingLearningStore::default();
        let queue = EscalationQueue::new(&store, &learning, DEFAULT_QUEUE_TTL);

        queue.add(item("t1", None)).expect("add");
        let stored = queue.get("t1").expect("get").expect("present");
        assert!(stored.created_at.is_some());
        let priority = stored.priority.expect("priority assigned");
        assert!((0.0..=1.0).contains(&priority));
        // 2 attempts (0.2) + critical-path keyword "checkout" (0.3), fresh item.
        assert!((priority - 0.5).abs() < 0.02);
    }

    #[test]
    fn add_keeps_caller_priority() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileKvStore::new(temp.path());
        let learning = RecordingLearningStore::default();
        let queue = EscalationQueue::new(&store, &learning, DEFAULT_QUEUE_TTL);

        queue.add(item("t1", Some(0.85))).expect("add");
        let stored = queue.get("t1").expect("get").expect("present");
        assert_eq!(stored.priority, Some(0.85));
    }

    #[test]
    fn list_orders_by_priority_descending() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileKvStore::new(temp.path());
        let learning = RecordingLearningStore::default();
        let queue = EscalationQueue::new(&store, &learning, DEFAULT_QUEUE_TTL);

        queue.add(item("low", Some(0.2))).expect("add");
        queue.add(item("high", Some(0.9))).expect("add");
        queue.add(item("mid", Some(0.5))).expect("add");

        let listed = queue.list(false, None).expect("list");
        let ids: Vec<&str> = listed.iter().map(|i| i.task_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);

        let capped = queue.list(false, Some(2)).expect("list");
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn resolve_retires_item_but_keeps_it_retrievable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileKvStore::new(temp.path());
        let learning = RecordingLearningStore::default();
        let queue = EscalationQueue::new(&store, &learning, DEFAULT_QUEUE_TTL);

        queue.add(item("t1", Some(0.8))).expect("add");
        assert!(queue.resolve("t1", &annotation()).expect("resolve"));

        let resolved = queue.get("t1").expect("get").expect("still retrievable");
        assert!(resolved.resolved);
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.annotation, Some(annotation()));

        assert!(queue.list(false, None).expect("list").is_empty());
        let all = queue.list(true, None).expect("list all");
        assert_eq!(all.len(), 1);
        assert!(all[0].resolved);
    }

    #[test]
    fn resolve_forwards_annotation_to_learning_store_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileKvStore::new(temp.path());
        let learning = RecordingLearningStore::default();
        let queue = EscalationQueue::new(&store, &learning, DEFAULT_QUEUE_TTL);

        queue.add(item("t1", Some(0.8))).expect("add");
        queue.resolve("t1", &annotation()).expect("resolve");

        let stored = learning.stored.lock().expect("lock");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1, "checkout flow");
        assert_eq!(stored[0].2, annotation());
    }

    #[test]
    fn resolve_unknown_task_returns_false() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileKvStore::new(temp.path());
        let learning = RecordingLearningStore::default();
        let queue = EscalationQueue::new(&store, &learning, DEFAULT_QUEUE_TTL);
        assert!(!queue.resolve("ghost", &annotation()).expect("resolve"));
    }

    #[test]
    fn learning_store_failure_does_not_fail_resolve() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileKvStore::new(temp.path());
        let learning = FailingLearningStore;
        let queue = EscalationQueue::new(&store, &learning, DEFAULT_QUEUE_TTL);

        queue.add(item("t1", Some(0.8))).expect("add");
        assert!(queue.resolve("t1", &annotation()).expect("resolve"));
        assert!(queue.get("t1").expect("get").expect("present").resolved);
    }

    #[test]
    fn stats_reflect_active_and_resolved_items() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileKvStore::new(temp.path());
        let learning = RecordingLearningStore::default();
        let queue = EscalationQueue::new(&store, &learning, DEFAULT_QUEUE_TTL);

        queue.add(item("a", Some(0.9))).expect("add");
        queue.add(item("b", Some(0.3))).expect("add");
        queue.add(item("c", Some(0.8))).expect("add");
        queue.resolve("c", &annotation()).expect("resolve");

        let stats = queue.stats().expect("stats");
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.active_count, 2);
        assert_eq!(stats.resolved_count, 1);
        assert!((stats.avg_priority - 0.6).abs() < 1e-9);
        assert_eq!(stats.high_priority_count, 1);
    }
}
