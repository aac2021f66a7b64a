use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::document::{NameStrategy, TemplateDocument, TemplateRecord};
use crate::error::SchedmanError;
use crate::schema::SchemaCatalog;

/// Default file pattern for template files.
pub const DEFAULT_PATTERN: &str = r".+\.ya?ml$";

/// Filter criteria for [`TemplateIndex::find`], AND-combined across all
/// supplied fields.
#[derive(Clone, Debug, Default)]
pub struct TemplateFilter {
    pub kind: Option<String>,
    pub category: Option<String>,
    /// Every listed tag must be present on the record.
    pub tags: Vec<String>,
    /// Every listed entry must match the record's meta mapping exactly.
    pub meta: Map<String, Value>,
}

impl TemplateFilter {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    fn matches(&self, record: &TemplateRecord) -> bool {
        if let Some(kind) = &self.kind {
            if kind != record.kind() {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if category != &record.document.category {
                return false;
            }
        }
        if !self
            .tags
            .iter()
            .all(|tag| record.document.tags.iter().any(|have| have == tag))
        {
            return false;
        }
        self.meta
            .iter()
            .all(|(key, value)| record.document.meta.get(key) == Some(value))
    }
}

/// In-memory index of all loaded template records.
///
/// Rebuilt wholesale by [`TemplateIndex::load`], or mutated in place by
/// [`TemplateIndex::update`]. Iteration follows insertion order, which the
/// loader makes deterministic by sorting discovered file paths.
#[derive(Debug, Default)]
pub struct TemplateIndex {
    records: HashMap<String, TemplateRecord>,
    order: Vec<String>,
}

impl TemplateIndex {
    /// Loads every template document under `root` matching the default
    /// pattern, validating each against `schemas`. The first schema failure
    /// or duplicate name aborts the whole load.
    pub fn load(root: &Path, schemas: &SchemaCatalog) -> Result<Self, SchedmanError> {
        let pattern = Regex::new(DEFAULT_PATTERN)
            .map_err(|err| SchedmanError::Serialization(format!("invalid file pattern: {err}")))?;
        Self::load_matching(root, &pattern, schemas)
    }

    /// As [`TemplateIndex::load`], with a caller-supplied path pattern.
    pub fn load_matching(
        root: &Path,
        pattern: &Regex,
        schemas: &SchemaCatalog,
    ) -> Result<Self, SchedmanError> {
        let mut index = Self::default();
        for path in discover_files(root, pattern)? {
            index
                .load_file(&path, schemas, false)
                .map_err(|err| err.context(path.display().to_string()))?;
        }
        Ok(index)
    }

    /// Builds an index from pre-made records, enforcing name uniqueness.
    pub fn from_records(
        records: impl IntoIterator<Item = TemplateRecord>,
    ) -> Result<Self, SchedmanError> {
        let mut index = Self::default();
        for record in records {
            let name = record.name().to_string();
            if index.records.contains_key(&name) {
                return Err(SchedmanError::DuplicateName(name));
            }
            index.order.push(name.clone());
            index.records.insert(name, record);
        }
        Ok(index)
    }

    /// Re-reads the file backing `name` and overwrites records for every
    /// document in it. Sibling names in the same file are re-indexed as a
    /// side effect, without re-checking collisions against records that came
    /// from other files.
    pub fn update(
        &mut self,
        name: &str,
        schemas: &SchemaCatalog,
    ) -> Result<&TemplateRecord, SchedmanError> {
        let path = self.get(name)?.source.clone();
        self.load_file(&path, schemas, true)
            .map_err(|err| err.context(path.display().to_string()))?;
        self.get(name)
    }

    pub fn get(&self, name: &str) -> Result<&TemplateRecord, SchedmanError> {
        self.records
            .get(name)
            .ok_or_else(|| SchedmanError::NotFound(format!("template '{name}'")))
    }

    pub fn spec(&self, name: &str) -> Result<&Value, SchedmanError> {
        Ok(self.get(name)?.spec())
    }

    pub fn kind_of(&self, name: &str) -> Result<&str, SchedmanError> {
        Ok(self.get(name)?.kind())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &TemplateRecord> {
        self.order.iter().filter_map(|name| self.records.get(name))
    }

    /// Filter over the index with AND semantics across all supplied criteria.
    pub fn find(&self, filter: &TemplateFilter) -> Vec<&TemplateRecord> {
        self.records()
            .filter(|record| filter.matches(record))
            .collect()
    }

    /// Resolves `relative` against the directory of the file `name` was
    /// loaded from. Absolute paths pass through untouched.
    pub fn abspath_in_template(
        &self,
        name: &str,
        relative: &str,
    ) -> Result<PathBuf, SchedmanError> {
        let record = self.get(name)?;
        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            return Ok(candidate.to_path_buf());
        }
        let trimmed = relative.strip_prefix("./").unwrap_or(relative);
        let dir = record.source.parent().ok_or_else(|| {
            SchedmanError::NotFound(format!(
                "source {} has no parent directory",
                record.source.display()
            ))
        })?;
        Ok(dir.join(trimmed))
    }

    fn load_file(
        &mut self,
        path: &Path,
        schemas: &SchemaCatalog,
        update: bool,
    ) -> Result<(), SchedmanError> {
        let text = fs::read_to_string(path)?;
        for (index, document) in serde_yaml::Deserializer::from_str(&text).enumerate() {
            let yaml = serde_yaml::Value::deserialize(document)
                .map_err(|err| SchedmanError::Serialization(format!("document {index}: {err}")))?;
            if yaml.is_null() {
                continue;
            }
            let raw: Value = serde_json::to_value(&yaml)?;
            self.index_document(raw, path, index, schemas, update)?;
        }
        Ok(())
    }

    fn index_document(
        &mut self,
        mut raw: Value,
        path: &Path,
        position: usize,
        schemas: &SchemaCatalog,
        update: bool,
    ) -> Result<(), SchedmanError> {
        schemas.validate_document(&raw)?;

        let raw_name = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let strategy = NameStrategy::from_document(&raw_name, path, position);
        let name = strategy.resolve();
        if let Some(slot) = raw.get_mut("name") {
            *slot = Value::String(name.clone());
        }

        if !update && self.records.contains_key(&name) {
            return Err(SchedmanError::DuplicateName(name));
        }

        let document: TemplateDocument = serde_json::from_value(raw)?;
        let record = TemplateRecord {
            document,
            source: path.to_path_buf(),
            derived_name: strategy.is_derived(),
        };
        if !self.records.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.records.insert(name, record);
        Ok(())
    }
}

fn discover_files(root: &Path, pattern: &Regex) -> Result<Vec<PathBuf>, SchedmanError> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(root).standard_filters(false).build() {
        let entry = entry.map_err(std::io::Error::other)?;
        let is_file = entry.file_type().is_some_and(|kind| kind.is_file());
        if !is_file {
            continue;
        }
        let path = entry.into_path();
        if pattern.is_match(&path.to_string_lossy()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn test_catalog() -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new().unwrap();
        catalog
            .set_spec_schema("rule", json!({ "type": "object", "required": ["name"] }))
            .unwrap();
        catalog
            .set_spec_schema("crawler", json!({ "type": "object", "required": ["name"] }))
            .unwrap();
        catalog
    }

    fn write_template(dir: &Path, file: &str, body: &str) {
        fs::write(dir.join(file), body).unwrap();
    }

    #[test]
    fn loads_multi_document_files_in_order() {
        let temp = tempdir().unwrap();
        write_template(
            temp.path(),
            "a.yaml",
            concat!(
                "kind: rule\nname: first\ncategory: schedule\ntags: [x]\nmeta: {}\n",
                "spec:\n  name: first\n",
                "---\n",
                "kind: crawler\nname: second\ncategory: catalog\ntags: []\nmeta: {}\n",
                "spec:\n  name: second\n",
            ),
        );

        let index = TemplateIndex::load(temp.path(), &test_catalog()).unwrap();
        let names: Vec<_> = index.records().map(TemplateRecord::name).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(index.kind_of("second").unwrap(), "crawler");
    }

    #[test]
    fn duplicate_explicit_names_abort_the_load() {
        let temp = tempdir().unwrap();
        let body = "kind: rule\nname: dup\ncategory: c\ntags: []\nmeta: {}\nspec:\n  name: dup\n";
        write_template(temp.path(), "a.yaml", body);
        write_template(temp.path(), "b.yaml", body);

        let err = TemplateIndex::load(temp.path(), &test_catalog()).unwrap_err();
        assert!(matches!(err, SchedmanError::DuplicateName(_)));
    }

    #[test]
    fn random_names_are_stable_across_reloads() {
        let temp = tempdir().unwrap();
        write_template(
            temp.path(),
            "a.yaml",
            "kind: rule\nname: random\ncategory: c\ntags: []\nmeta: {}\nspec:\n  name: r\n",
        );

        let catalog = test_catalog();
        let first = TemplateIndex::load(temp.path(), &catalog).unwrap();
        let second = TemplateIndex::load(temp.path(), &catalog).unwrap();

        let first_name = first.records().next().unwrap().name().to_string();
        let second_name = second.records().next().unwrap().name().to_string();
        assert_eq!(first_name, second_name);
        assert!(first.records().next().unwrap().derived_name);
        assert!(first_name.starts_with("t-"));
    }

    #[test]
    fn invalid_document_aborts_with_schema_violation() {
        let temp = tempdir().unwrap();
        write_template(
            temp.path(),
            "bad.yaml",
            "kind: rule\nname: ok\ncategory: ''\ntags: []\nmeta: {}\nspec:\n  name: ok\n",
        );

        let err = TemplateIndex::load(temp.path(), &test_catalog()).unwrap_err();
        assert!(matches!(err, SchedmanError::SchemaViolation(_)));
    }

    #[test]
    fn find_applies_all_criteria() {
        let temp = tempdir().unwrap();
        write_template(
            temp.path(),
            "a.yaml",
            concat!(
                "kind: rule\nname: one\ncategory: schedule\ntags: [nightly, prod]\n",
                "meta:\n  team: data\nspec:\n  name: one\n",
                "---\n",
                "kind: rule\nname: two\ncategory: schedule\ntags: [hourly]\nmeta: {}\n",
                "spec:\n  name: two\n",
            ),
        );
        let index = TemplateIndex::load(temp.path(), &test_catalog()).unwrap();

        let filter = TemplateFilter::kind("rule")
            .with_category("schedule")
            .with_tag("nightly")
            .with_meta("team", json!("data"));
        let found = index.find(&filter);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "one");

        assert_eq!(index.find(&TemplateFilter::kind("rule")).len(), 2);
        assert!(index.find(&TemplateFilter::kind("crawler")).is_empty());
    }

    #[test]
    fn update_rereads_the_backing_file() {
        let temp = tempdir().unwrap();
        write_template(
            temp.path(),
            "a.yaml",
            "kind: rule\nname: one\ncategory: c\ntags: []\nmeta: {}\nspec:\n  name: v1\n",
        );
        let catalog = test_catalog();
        let mut index = TemplateIndex::load(temp.path(), &catalog).unwrap();
        assert_eq!(index.spec("one").unwrap()["name"], json!("v1"));

        write_template(
            temp.path(),
            "a.yaml",
            "kind: rule\nname: one\ncategory: c\ntags: []\nmeta: {}\nspec:\n  name: v2\n",
        );
        index.update("one", &catalog).unwrap();
        assert_eq!(index.spec("one").unwrap()["name"], json!("v2"));
    }

    #[test]
    fn unknown_names_are_not_found() {
        let index = TemplateIndex::default();
        assert!(matches!(
            index.spec("missing"),
            Err(SchedmanError::NotFound(_))
        ));
        assert!(matches!(
            index.kind_of("missing"),
            Err(SchedmanError::NotFound(_))
        ));
    }

    #[test]
    fn abspath_resolves_relative_to_the_source_file() {
        let temp = tempdir().unwrap();
        let nested = temp.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        write_template(
            &nested,
            "a.yaml",
            "kind: rule\nname: one\ncategory: c\ntags: []\nmeta: {}\nspec:\n  name: one\n",
        );
        let index = TemplateIndex::load(temp.path(), &test_catalog()).unwrap();

        let resolved = index.abspath_in_template("one", "./data/input.csv").unwrap();
        assert_eq!(resolved, nested.join("data/input.csv"));

        let absolute = index.abspath_in_template("one", "/etc/passwd").unwrap();
        assert_eq!(absolute, PathBuf::from("/etc/passwd"));
    }
}
