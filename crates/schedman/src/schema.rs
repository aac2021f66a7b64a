use std::collections::HashMap;

use jsonschema::JSONSchema;
use serde_json::{Value, json};

use crate::error::SchedmanError;

/// A compiled JSON Schema retaining the raw document it was built from.
pub struct Schema {
    compiled: JSONSchema,
    raw: Value,
}

impl Schema {
    pub fn new(raw: Value) -> Result<Self, SchedmanError> {
        let compiled = match JSONSchema::compile(&raw) {
            Ok(compiled) => compiled,
            Err(err) => {
                return Err(SchedmanError::SchemaViolation(format!(
                    "schema does not compile: {err}"
                )));
            }
        };
        Ok(Self { compiled, raw })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Validates `instance`, reporting the first violation together with the
    /// offending instance path.
    pub fn validate(&self, instance: &Value) -> Result<(), SchedmanError> {
        if let Err(mut errors) = self.compiled.validate(instance) {
            if let Some(first) = errors.next() {
                let path = first.instance_path.to_string();
                let location = if path.is_empty() {
                    "document root".to_string()
                } else {
                    path
                };
                return Err(SchedmanError::SchemaViolation(format!(
                    "{location}: {first}"
                )));
            }
        }
        Ok(())
    }
}

/// Default top-level shape every template document must satisfy before its
/// kind-selected spec schema is consulted.
pub fn document_schema() -> Value {
    json!({
        "type": "object",
        "required": ["kind", "name", "category", "tags", "meta", "spec"],
        "properties": {
            "kind": { "type": "string", "minLength": 1 },
            "name": { "type": "string", "minLength": 1 },
            "category": { "type": "string", "minLength": 1 },
            "tags": { "type": "array", "items": { "type": "string" } },
            "meta": { "type": "object" },
            "spec": { "type": "object" }
        }
    })
}

/// The declared schema set: one document-level schema plus per-kind spec and
/// process-argument schemas.
pub struct SchemaCatalog {
    document: Schema,
    specs: HashMap<String, Schema>,
    process: HashMap<String, Schema>,
}

impl SchemaCatalog {
    /// Catalog with the embedded default document schema and no kinds.
    pub fn new() -> Result<Self, SchedmanError> {
        Self::with_document_schema(document_schema())
    }

    pub fn with_document_schema(raw: Value) -> Result<Self, SchedmanError> {
        Ok(Self {
            document: Schema::new(raw)?,
            specs: HashMap::new(),
            process: HashMap::new(),
        })
    }

    pub fn set_spec_schema(
        &mut self,
        kind: impl Into<String>,
        raw: Value,
    ) -> Result<(), SchedmanError> {
        self.specs.insert(kind.into(), Schema::new(raw)?);
        Ok(())
    }

    pub fn set_process_schema(
        &mut self,
        kind: impl Into<String>,
        raw: Value,
    ) -> Result<(), SchedmanError> {
        self.process.insert(kind.into(), Schema::new(raw)?);
        Ok(())
    }

    pub fn document(&self) -> &Schema {
        &self.document
    }

    pub fn spec_schema(&self, kind: &str) -> Option<&Schema> {
        self.specs.get(kind)
    }

    pub fn process_schema(&self, kind: &str) -> Option<&Schema> {
        self.process.get(kind)
    }

    /// Validates one raw template document: top-level shape first, then the
    /// `spec` payload against the kind-selected schema. A kind with no
    /// registered spec schema fails the document.
    pub fn validate_document(&self, raw: &Value) -> Result<(), SchedmanError> {
        self.document.validate(raw)?;

        let kind = raw.get("kind").and_then(Value::as_str).unwrap_or_default();
        let schema = self.specs.get(kind).ok_or_else(|| {
            SchedmanError::SchemaViolation(format!("no spec schema registered for kind '{kind}'"))
        })?;
        let spec = raw.get("spec").cloned().unwrap_or(Value::Null);
        schema
            .validate(&spec)
            .map_err(|err| err.context("spec payload"))
    }

    /// Validates a process-argument payload for `kind`. Every worker-bearing
    /// kind is expected to declare its argument schema.
    pub fn validate_process_args(&self, kind: &str, args: &Value) -> Result<(), SchedmanError> {
        let schema = self.process.get(kind).ok_or_else(|| {
            SchedmanError::SchemaViolation(format!(
                "no process schema registered for kind '{kind}'"
            ))
        })?;
        schema.validate(args)
    }
}
