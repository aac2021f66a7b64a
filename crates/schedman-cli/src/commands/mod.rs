use std::path::{Path, PathBuf};

use serde::Serialize;

use schedman::{SchemaCatalog, crawler_spec_schema, event_rule_spec_schema};

use crate::error::{CliError, ExitStatus};

pub mod plan;
pub mod snapshot;
pub mod validate;

/// Work directory holding the deployment snapshot, resolved relative to the
/// template root unless overridden.
pub const DEFAULT_WORK_DIR: &str = ".schedman";

#[derive(Clone, Debug, Serialize)]
pub struct TemplateSummary {
    pub name: String,
    pub kind: String,
    pub category: String,
    pub source: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResult {
    Validated {
        root: String,
        templates: Vec<TemplateSummary>,
    },
    Plan {
        total: usize,
        changed: Vec<TemplateSummary>,
        first_run: bool,
        force: bool,
    },
    Snapshot {
        path: String,
        records: Option<Vec<TemplateSummary>>,
        written: bool,
    },
}

impl CommandResult {
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::Ok
    }
}

/// Schema catalog covering the kinds this binary ships with.
pub fn default_catalog() -> Result<SchemaCatalog, CliError> {
    let mut catalog = SchemaCatalog::new()?;
    catalog.set_spec_schema("event-rule", event_rule_spec_schema())?;
    catalog.set_spec_schema("crawler", crawler_spec_schema())?;
    Ok(catalog)
}

pub fn work_dir(root: &Path, override_path: Option<&String>) -> PathBuf {
    match override_path {
        Some(path) => PathBuf::from(path),
        None => root.join(DEFAULT_WORK_DIR),
    }
}

pub fn summarize(record: &schedman::TemplateRecord) -> TemplateSummary {
    TemplateSummary {
        name: record.name().to_string(),
        kind: record.kind().to_string(),
        category: record.document.category.clone(),
        source: record.source.display().to_string(),
    }
}
