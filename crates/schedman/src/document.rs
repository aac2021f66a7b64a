use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// On-disk sentinel selecting an auto-generated, deterministic name.
pub const RANDOM_NAME_SENTINEL: &str = "random";

/// How a template's identifier was chosen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameStrategy {
    Explicit(String),
    /// Derived from the source path and the document's position within its
    /// file, so identical content at a fixed path and position always yields
    /// the same generated name.
    Derived { path: PathBuf, index: usize },
}

impl NameStrategy {
    pub fn from_document(raw_name: &str, path: &Path, index: usize) -> Self {
        if raw_name == RANDOM_NAME_SENTINEL {
            NameStrategy::Derived {
                path: path.to_path_buf(),
                index,
            }
        } else {
            NameStrategy::Explicit(raw_name.to_string())
        }
    }

    /// Resolves the concrete identifier. Derived names hash `path#index` into
    /// a fixed-width hex token, keeping length and charset stable regardless
    /// of how deep the source path is.
    pub fn resolve(&self) -> String {
        match self {
            NameStrategy::Explicit(name) => name.clone(),
            NameStrategy::Derived { path, index } => {
                let mut hasher = Sha256::new();
                hasher.update(path.to_string_lossy().as_bytes());
                hasher.update(b"#");
                hasher.update(index.to_string().as_bytes());
                let digest = hasher.finalize();
                format!("t-{}", &hex::encode(digest)[..16])
            }
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, NameStrategy::Derived { .. })
    }
}

/// One validated template document, the on-disk unit of desired state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub kind: String,
    pub name: String,
    pub category: String,
    pub tags: Vec<String>,
    /// Open key/value mapping, matched as a subset by `TemplateIndex::find`.
    pub meta: Map<String, Value>,
    /// Kind-specific payload, validated against that kind's spec schema.
    pub spec: Value,
}

/// A document plus its provenance. Records are owned by the template index
/// and are what snapshots persist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub document: TemplateDocument,
    pub source: PathBuf,
    pub derived_name: bool,
}

impl TemplateRecord {
    pub fn name(&self) -> &str {
        &self.document.name
    }

    pub fn kind(&self) -> &str {
        &self.document.kind
    }

    pub fn spec(&self) -> &Value {
        &self.document.spec
    }
}
