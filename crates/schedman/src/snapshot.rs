use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::document::TemplateRecord;
use crate::error::SchedmanError;

/// Well-known snapshot file name under the work directory.
pub const SNAPSHOT_FILE_NAME: &str = "deployed-templates.json";

/// The template set from the last successful deployment, the diff baseline.
/// Serialized as a flat JSON array of records.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub records: Vec<TemplateRecord>,
}

impl Snapshot {
    pub fn find(&self, name: &str) -> Option<&TemplateRecord> {
        self.records.iter().find(|record| record.name() == name)
    }
}

/// Local snapshot cache at a fixed path under the work directory. Absence of
/// the file means "first run".
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: work_dir.into().join(SNAPSHOT_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Snapshot>, SchedmanError> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str(&content).map_err(|err| {
            SchedmanError::Snapshot(format!("invalid snapshot {}: {err}", self.path.display()))
        })?;
        Ok(Some(snapshot))
    }

    /// Replaces the snapshot with the full current record set, written via a
    /// temp file and rename so readers never observe a partial document.
    pub fn save(&self, records: &[TemplateRecord]) -> Result<(), SchedmanError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|err| {
                SchedmanError::Snapshot(format!(
                    "failed to prepare snapshot directory {}: {err}",
                    dir.display()
                ))
            })?;
        }
        write_atomic_json(&self.path, &records)
    }
}

fn write_atomic_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SchedmanError> {
    let payload = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        SchedmanError::Snapshot(format!(
            "failed to write temporary snapshot {}: {err}",
            tmp_path.display()
        ))
    })?;
    fs::rename(&tmp_path, path).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        SchedmanError::Snapshot(format!(
            "failed to publish snapshot {}: {err}",
            path.display()
        ))
    })
}

/// Write-only remote copy of the deployed-template manifest, for external
/// consumers. Never read back for diffing.
pub trait SnapshotPublisher: Send + Sync {
    fn publish(&self, records: &[TemplateRecord]) -> Result<(), SchedmanError>;
}

impl<T: SnapshotPublisher + ?Sized> SnapshotPublisher for std::sync::Arc<T> {
    fn publish(&self, records: &[TemplateRecord]) -> Result<(), SchedmanError> {
        (**self).publish(records)
    }
}

/// Captures published payloads in memory; stands in for the object-storage
/// copy in tests.
#[derive(Default)]
pub struct InMemoryPublisher {
    published: Mutex<Vec<String>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl SnapshotPublisher for InMemoryPublisher {
    fn publish(&self, records: &[TemplateRecord]) -> Result<(), SchedmanError> {
        let payload = serde_json::to_string(&records)?;
        if let Ok(mut published) = self.published.lock() {
            published.push(payload);
        }
        Ok(())
    }
}
