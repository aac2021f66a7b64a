use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde_json::{Map, Value};

use crate::document::TemplateRecord;
use crate::error::SchedmanError;
use crate::index::TemplateIndex;
use crate::schema::SchemaCatalog;

/// Resolves a kind-specific item from an indexed template record.
pub trait ItemParser: Send + Sync {
    fn parse(&self, record: &TemplateRecord) -> Result<Value, SchedmanError>;
}

impl<F> ItemParser for F
where
    F: Fn(&TemplateRecord) -> Result<Value, SchedmanError> + Send + Sync,
{
    fn parse(&self, record: &TemplateRecord) -> Result<Value, SchedmanError> {
        self(record)
    }
}

/// Handles `process` dispatches for a kind.
pub trait Worker: Send + Sync {
    fn run(&self, args: Value) -> Result<Value, SchedmanError>;
}

impl<F> Worker for F
where
    F: Fn(Value) -> Result<Value, SchedmanError> + Send + Sync,
{
    fn run(&self, args: Value) -> Result<Value, SchedmanError> {
        self(args)
    }
}

/// Behavior switches recognized per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KindOptions {
    /// Cache the parsed item forever once produced.
    pub load_once: bool,
    /// Exclude the kind from the eager bulk-load pass; items must be loaded
    /// explicitly on demand.
    pub load_separately: bool,
}

/// Extension point for one resource kind. Parser-less kinds are registry
/// entries used only for dispatch, not caching.
pub struct KindDescriptor {
    pub kind: String,
    pub parser: Option<Box<dyn ItemParser>>,
    pub worker: Option<Box<dyn Worker>>,
    pub options: KindOptions,
}

impl KindDescriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            parser: None,
            worker: None,
            options: KindOptions::default(),
        }
    }

    pub fn with_parser(mut self, parser: impl ItemParser + 'static) -> Self {
        self.parser = Some(Box::new(parser));
        self
    }

    pub fn with_worker(mut self, worker: impl Worker + 'static) -> Self {
        self.worker = Some(Box::new(worker));
        self
    }

    pub fn with_options(mut self, options: KindOptions) -> Self {
        self.options = options;
        self
    }
}

/// Explicit kind table, constructed once at startup and passed by reference
/// into the template registry and the deployment driver. No process-global
/// state; tests build fresh registries.
#[derive(Default)]
pub struct KindRegistry {
    kinds: HashMap<String, KindDescriptor>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering the same kind twice replaces the earlier entry wholesale.
    pub fn register(&mut self, descriptor: KindDescriptor) {
        self.kinds.insert(descriptor.kind.clone(), descriptor);
    }

    pub fn get(&self, kind: &str) -> Option<&KindDescriptor> {
        self.kinds.get(kind)
    }

    fn require(&self, kind: &str) -> Result<&KindDescriptor, SchedmanError> {
        self.kinds
            .get(kind)
            .ok_or_else(|| SchedmanError::NotFound(format!("kind '{kind}'")))
    }
}

/// Process-lifetime memo of parser results, keyed by kind then name. Entries
/// are refreshed on access unless the kind is `load_once`; nothing is ever
/// implicitly evicted.
#[derive(Debug, Default)]
pub struct ItemCache {
    items: HashMap<String, HashMap<String, Value>>,
}

impl ItemCache {
    pub fn get(&self, kind: &str, name: &str) -> Option<&Value> {
        self.items.get(kind)?.get(name)
    }

    pub fn insert(&mut self, kind: &str, name: &str, value: Value) {
        self.items
            .entry(kind.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.get(kind, name).is_some()
    }

    pub fn of_kind(&self, kind: &str) -> BTreeMap<&str, &Value> {
        self.items
            .get(kind)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(name, value)| (name.as_str(), value))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The template registry: index, kind table, and item cache behind one
/// load/process surface.
pub struct TemplateRegistry<'k> {
    index: TemplateIndex,
    schemas: SchemaCatalog,
    kinds: &'k KindRegistry,
    cache: ItemCache,
}

impl<'k> TemplateRegistry<'k> {
    /// Loads all templates under `root` and eagerly resolves items for every
    /// kind not marked `load_separately`.
    pub fn load(
        root: &Path,
        kinds: &'k KindRegistry,
        schemas: SchemaCatalog,
    ) -> Result<Self, SchedmanError> {
        let index = TemplateIndex::load(root, &schemas)?;
        let mut registry = Self::from_parts(index, kinds, schemas);
        registry.load_all_items()?;
        Ok(registry)
    }

    /// Assembles a registry from a pre-built index without the eager pass.
    pub fn from_parts(index: TemplateIndex, kinds: &'k KindRegistry, schemas: SchemaCatalog) -> Self {
        Self {
            index,
            schemas,
            kinds,
            cache: ItemCache::default(),
        }
    }

    pub fn index(&self) -> &TemplateIndex {
        &self.index
    }

    pub fn schemas(&self) -> &SchemaCatalog {
        &self.schemas
    }

    /// Re-reads the file backing `name`; see [`TemplateIndex::update`].
    pub fn update(&mut self, name: &str) -> Result<&TemplateRecord, SchedmanError> {
        self.index.update(name, &self.schemas)
    }

    /// Eager bulk-load pass over every indexed record whose kind is not
    /// `load_separately`. Kinds with no parser are skipped.
    pub fn load_all_items(&mut self) -> Result<(), SchedmanError> {
        let names: Vec<String> = self
            .index
            .records()
            .map(|record| record.name().to_string())
            .collect();
        for name in names {
            let kind = self.index.kind_of(&name)?.to_string();
            if self.kinds.require(&kind)?.options.load_separately {
                continue;
            }
            self.load_item_for_kind(&kind, &name)?;
        }
        Ok(())
    }

    /// Explicit on-demand resolution for `load_separately` kinds or ad hoc
    /// access. A no-op when the kind is `load_once` and a non-null value is
    /// already cached.
    pub fn load_item(&mut self, name: &str) -> Result<(), SchedmanError> {
        let kind = self.index.kind_of(name)?.to_string();
        self.load_item_for_kind(&kind, name)
    }

    fn load_item_for_kind(&mut self, kind: &str, name: &str) -> Result<(), SchedmanError> {
        let kinds = self.kinds;
        let descriptor = kinds.require(kind)?;
        if descriptor.options.load_once {
            if let Some(existing) = self.cache.get(kind, name) {
                if !existing.is_null() {
                    return Ok(());
                }
            }
        }
        let Some(parser) = &descriptor.parser else {
            return Ok(());
        };
        let record = self.index.get(name)?;
        let value = parser.parse(record)?;
        self.cache.insert(kind, name, value);
        Ok(())
    }

    pub fn is_loaded(&self, kind: &str, name: &str) -> bool {
        self.cache.contains(kind, name)
    }

    pub fn item(&self, kind: &str, name: &str) -> Result<&Value, SchedmanError> {
        self.cache
            .get(kind, name)
            .ok_or_else(|| SchedmanError::NotFound(format!("item '{name}' of kind '{kind}'")))
    }

    /// All cached items of one kind, by name.
    pub fn items(&self, kind: &str) -> BTreeMap<&str, &Value> {
        self.cache.of_kind(kind)
    }

    /// Generic dispatch: resolve the item, inject `template_name` into the
    /// argument payload, validate it against the kind's process schema, and
    /// invoke the kind's worker.
    pub fn process(
        &mut self,
        kind: &str,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<Value, SchedmanError> {
        self.load_item_for_kind(kind, name)?;

        let mut merged = args;
        merged.insert("template_name".to_string(), Value::String(name.to_string()));
        let payload = Value::Object(merged);
        self.schemas.validate_process_args(kind, &payload)?;

        let descriptor = self.kinds.require(kind)?;
        let Some(worker) = &descriptor.worker else {
            return Err(SchedmanError::NoWorker(kind.to_string()));
        };
        worker.run(payload)
    }
}
