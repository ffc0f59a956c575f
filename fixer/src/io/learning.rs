//! Learning-store seam for resolved-escalation annotations.
//!
//! The queue forwards each human annotation here keyed by a fresh id and the
//! item's feature description, so future fix attempts can retrieve similar
//! past resolutions. Fire-and-forget from the queue's perspective.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::Annotation;

pub trait LearningStore {
    /// Persist one annotation. Returns whether the record was stored.
    fn store_annotation(&self, id: &str, description: &str, annotation: &Annotation)
    -> Result<bool>;
}

/// Persisted learning record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRecord {
    pub id: String,
    /// Feature description of the originating escalation, used as the
    /// similarity-retrieval key.
    pub description: String,
    pub annotation: Annotation,
    pub stored_at: DateTime<Utc>,
}

/// File-backed learning store: one JSON record per annotation.
#[derive(Debug)]
pub struct FileLearningStore {
    dir: PathBuf,
}

impl FileLearningStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LearningStore for FileLearningStore {
    fn store_annotation(
        &self,
        id: &str,
        description: &str,
        annotation: &Annotation,
    ) -> Result<bool> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create learning dir {}", self.dir.display()))?;
        let record = LearningRecord {
            id: id.to_string(),
            description: description.to_string(),
            annotation: annotation.clone(),
            stored_at: Utc::now(),
        };
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = self.dir.join(format!("{safe}.json"));
        let mut buf = serde_json::to_string_pretty(&record)?;
        buf.push('\n');
        fs::write(&path, buf).with_context(|| format!("write {}", path.display()))?;
        Ok(true)
    }
}
