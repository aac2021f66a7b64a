use std::collections::HashMap;

use crate::diff::compute_change_set;
use crate::document::TemplateRecord;
use crate::error::SchedmanError;
use crate::index::TemplateIndex;
use crate::snapshot::{SnapshotPublisher, SnapshotStore};

/// Applies one kind's desired state to the external resource. Implementations
/// receive the validated record for a single template and either succeed or
/// raise a fatal error for that record.
pub trait Reconciler: Send + Sync {
    fn apply(&self, record: &TemplateRecord) -> Result<(), SchedmanError>;
}

impl<T: Reconciler + ?Sized> Reconciler for std::sync::Arc<T> {
    fn apply(&self, record: &TemplateRecord) -> Result<(), SchedmanError> {
        (**self).apply(record)
    }
}

/// Outcome of one record's reconciliation.
#[derive(Debug)]
pub struct DeployOutcome {
    pub name: String,
    pub kind: String,
    pub result: Result<(), SchedmanError>,
}

impl DeployOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregated result of one deployment pass.
#[derive(Debug)]
pub struct DeployReport {
    pub outcomes: Vec<DeployOutcome>,
    /// Whether the snapshot baseline was rewritten; false when any record
    /// failed, so the next run re-selects everything content-changed.
    pub snapshot_written: bool,
}

impl DeployReport {
    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(DeployOutcome::is_ok)
    }

    /// Collapses the report for callers that only need pass/fail, listing
    /// every failed record in the error message.
    pub fn into_result(self) -> Result<(), SchedmanError> {
        let failures: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|outcome| {
                outcome
                    .result
                    .as_ref()
                    .err()
                    .map(|err| format!("{} ({}): {err}", outcome.name, outcome.kind))
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SchedmanError::Deploy(failures.join("; ")))
        }
    }
}

/// Drives one synchronous load -> diff -> apply -> snapshot pass.
///
/// Records are independent: one record's fatal failure never aborts the rest
/// of the batch. Credential handling lives inside the reconcilers' clients;
/// the driver only sequences them.
pub struct Deployer {
    reconcilers: HashMap<String, Box<dyn Reconciler>>,
    store: SnapshotStore,
    publisher: Option<Box<dyn SnapshotPublisher>>,
}

impl Deployer {
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            reconcilers: HashMap::new(),
            store,
            publisher: None,
        }
    }

    pub fn with_reconciler(
        mut self,
        kind: impl Into<String>,
        reconciler: impl Reconciler + 'static,
    ) -> Self {
        self.reconcilers.insert(kind.into(), Box::new(reconciler));
        self
    }

    pub fn with_publisher(mut self, publisher: impl SnapshotPublisher + 'static) -> Self {
        self.publisher = Some(Box::new(publisher));
        self
    }

    /// Deploys the change set derived from `index` against the last snapshot.
    /// `force_all` overrides the diff and deploys the full index. On overall
    /// success the snapshot is rewritten from the full current index (not
    /// just the change set) and published remotely.
    pub fn deploy_all(
        &self,
        index: &TemplateIndex,
        force_all: bool,
    ) -> Result<DeployReport, SchedmanError> {
        let previous = self.store.load()?;
        let change_set: Vec<&TemplateRecord> = if force_all {
            index.records().collect()
        } else {
            compute_change_set(index, previous.as_ref())
        };
        tracing::info!(
            total = index.len(),
            changed = change_set.len(),
            force_all,
            "computed change set"
        );

        let mut outcomes = Vec::with_capacity(change_set.len());
        for record in change_set {
            let result = self.apply_one(record);
            if let Err(err) = &result {
                tracing::warn!(
                    name = record.name(),
                    kind = record.kind(),
                    error = %err,
                    "record deployment failed"
                );
            }
            outcomes.push(DeployOutcome {
                name: record.name().to_string(),
                kind: record.kind().to_string(),
                result,
            });
        }

        let snapshot_written = outcomes.iter().all(DeployOutcome::is_ok);
        if snapshot_written {
            let records: Vec<TemplateRecord> = index.records().cloned().collect();
            self.store.save(&records)?;
            if let Some(publisher) = &self.publisher {
                publisher.publish(&records)?;
            }
        }

        Ok(DeployReport {
            outcomes,
            snapshot_written,
        })
    }

    fn apply_one(&self, record: &TemplateRecord) -> Result<(), SchedmanError> {
        let reconciler = self.reconcilers.get(record.kind()).ok_or_else(|| {
            SchedmanError::NotFound(format!("no reconciler for kind '{}'", record.kind()))
        })?;
        tracing::info!(name = record.name(), kind = record.kind(), "deploying template");
        reconciler.apply(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TemplateDocument;
    use serde_json::{Map, json};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn record(kind: &str, name: &str, spec: serde_json::Value) -> TemplateRecord {
        TemplateRecord {
            document: TemplateDocument {
                kind: kind.to_string(),
                name: name.to_string(),
                category: "c".to_string(),
                tags: Vec::new(),
                meta: Map::new(),
                spec,
            },
            source: "mem.yaml".into(),
            derived_name: false,
        }
    }

    #[derive(Default)]
    struct RecordingReconciler {
        applied: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl RecordingReconciler {
        fn failing(name: &str) -> Self {
            Self {
                applied: Mutex::new(Vec::new()),
                fail_on: Some(name.to_string()),
            }
        }

        fn applied(&self) -> Vec<String> {
            self.applied.lock().map(|a| a.clone()).unwrap_or_default()
        }
    }

    impl Reconciler for RecordingReconciler {
        fn apply(&self, record: &TemplateRecord) -> Result<(), SchedmanError> {
            if let Ok(mut applied) = self.applied.lock() {
                applied.push(record.name().to_string());
            }
            if self.fail_on.as_deref() == Some(record.name()) {
                return Err(SchedmanError::Deploy("boom".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn failure_does_not_abort_the_batch_or_write_the_snapshot() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path());
        let reconciler = Arc::new(RecordingReconciler::failing("bad"));
        let deployer = Deployer::new(store.clone()).with_reconciler("rule", reconciler.clone());

        let index = TemplateIndex::from_records([
            record("rule", "bad", json!({ "v": 1 })),
            record("rule", "good", json!({ "v": 1 })),
        ])
        .unwrap();

        let report = deployer.deploy_all(&index, false).unwrap();
        assert!(!report.all_ok());
        assert!(!report.snapshot_written);
        assert_eq!(reconciler.applied(), vec!["bad", "good"]);
        assert!(store.load().unwrap().is_none());
        assert!(report.into_result().is_err());
    }

    #[test]
    fn unknown_kind_is_a_per_record_failure() {
        let temp = tempdir().unwrap();
        let deployer = Deployer::new(SnapshotStore::new(temp.path()));
        let index =
            TemplateIndex::from_records([record("mystery", "m1", json!({ "v": 1 }))]).unwrap();

        let report = deployer.deploy_all(&index, false).unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(
            report.outcomes[0].result,
            Err(SchedmanError::NotFound(_))
        ));
    }

    #[test]
    fn success_writes_the_full_index_snapshot() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path());
        let reconciler = Arc::new(RecordingReconciler::default());
        let deployer = Deployer::new(store.clone()).with_reconciler("rule", reconciler.clone());

        // Baseline with "old" unchanged, so only "new" is applied; the
        // snapshot must still cover the whole index afterwards.
        store
            .save(&[record("rule", "old", json!({ "v": 1 }))])
            .unwrap();
        let index = TemplateIndex::from_records([
            record("rule", "old", json!({ "v": 1 })),
            record("rule", "new", json!({ "v": 1 })),
        ])
        .unwrap();

        let report = deployer.deploy_all(&index, false).unwrap();
        assert!(report.snapshot_written);
        assert_eq!(reconciler.applied(), vec!["new"]);
        assert_eq!(store.load().unwrap().unwrap().records.len(), 2);
    }

    #[test]
    fn force_all_overrides_the_diff() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path());
        let reconciler = Arc::new(RecordingReconciler::default());
        let deployer = Deployer::new(store.clone()).with_reconciler("rule", reconciler.clone());

        store
            .save(&[record("rule", "same", json!({ "v": 1 }))])
            .unwrap();
        let index =
            TemplateIndex::from_records([record("rule", "same", json!({ "v": 1 }))]).unwrap();

        let report = deployer.deploy_all(&index, true).unwrap();
        assert!(report.all_ok());
        assert_eq!(reconciler.applied(), vec!["same"]);
    }
}
