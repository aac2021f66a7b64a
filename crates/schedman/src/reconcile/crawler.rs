use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::{Value, json};

use super::{ClientError, to_snake_case};
use crate::deploy::Reconciler;
use crate::document::TemplateRecord;
use crate::error::SchedmanError;

/// Validated payload for the catalog-crawler kind.
#[derive(Clone, Debug, Deserialize)]
pub struct CrawlerSpec {
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "S3TargetPath")]
    pub target_path: String,
    #[serde(rename = "Schedule")]
    pub schedule: String,
}

/// Spec schema for the crawler kind, for registration in a
/// [`crate::schema::SchemaCatalog`].
pub fn crawler_spec_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name", "S3TargetPath", "Schedule"],
        "properties": {
            "name": { "type": "string", "minLength": 1 },
            "Description": { "type": "string" },
            "S3TargetPath": { "type": "string", "minLength": 1 },
            "Schedule": { "type": "string", "minLength": 1 }
        }
    })
}

/// Fully resolved crawler to create remotely.
#[derive(Clone, Debug, PartialEq)]
pub struct CrawlerDefinition {
    pub name: String,
    pub description: String,
    pub role: String,
    pub database: String,
    pub target_path: String,
    pub schedule: String,
}

/// Remote-call surface for the data-catalog collaborator.
pub trait CatalogClient: Send + Sync {
    fn create_database(&self, name: &str, description: &str) -> Result<(), ClientError>;
    fn delete_crawler(&self, name: &str) -> Result<(), ClientError>;
    fn create_crawler(&self, definition: &CrawlerDefinition) -> Result<(), ClientError>;
}

impl<T: CatalogClient + ?Sized> CatalogClient for std::sync::Arc<T> {
    fn create_database(&self, name: &str, description: &str) -> Result<(), ClientError> {
        (**self).create_database(name, description)
    }

    fn delete_crawler(&self, name: &str) -> Result<(), ClientError> {
        (**self).delete_crawler(name)
    }

    fn create_crawler(&self, definition: &CrawlerDefinition) -> Result<(), ClientError> {
        (**self).create_crawler(definition)
    }
}

/// Reconciles one catalog crawler: ensure its database exists, then replace
/// the crawler by delete-and-recreate so configuration drift cannot survive
/// an update.
pub struct CrawlerReconciler<C> {
    client: C,
    prefix: String,
    role: String,
}

impl<C: CatalogClient> CrawlerReconciler<C> {
    pub fn new(client: C, prefix: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            role: role.into(),
        }
    }

    fn apply_spec(&self, spec: &CrawlerSpec) -> Result<(), SchedmanError> {
        let database = format!(
            "{}_{}",
            to_snake_case(&self.prefix),
            to_snake_case(&spec.name)
        );
        let crawler = format!("{}{}Crawler", self.prefix, spec.name);

        tracing::info!(database, "ensuring catalog database");
        match self.client.create_database(&database, "Database") {
            Ok(()) => {}
            Err(ClientError::AlreadyExists(_)) => {
                tracing::info!(database, "database already exists");
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(crawler, "deleting previous crawler");
        match self.client.delete_crawler(&crawler) {
            Ok(()) => {}
            Err(ClientError::NotFound(_)) => tracing::info!(crawler, "no previous crawler"),
            Err(err) => return Err(err.into()),
        }

        let definition = CrawlerDefinition {
            name: crawler.clone(),
            description: spec.description.clone(),
            role: self.role.clone(),
            database,
            target_path: spec.target_path.clone(),
            schedule: spec.schedule.clone(),
        };
        tracing::info!(crawler, "creating crawler");
        self.client.create_crawler(&definition)?;
        Ok(())
    }
}

impl<C: CatalogClient> Reconciler for CrawlerReconciler<C> {
    fn apply(&self, record: &TemplateRecord) -> Result<(), SchedmanError> {
        let spec: CrawlerSpec = serde_json::from_value(record.spec().clone()).map_err(|err| {
            SchedmanError::SchemaViolation(format!("crawler spec for '{}': {err}", record.name()))
        })?;
        self.apply_spec(&spec)
    }
}

/// In-memory catalog collaborator recording every call; stands in for the
/// remote client in tests.
#[derive(Default)]
pub struct InMemoryCatalogClient {
    state: Mutex<CatalogState>,
}

#[derive(Default)]
struct CatalogState {
    databases: BTreeSet<String>,
    crawlers: BTreeMap<String, CrawlerDefinition>,
    calls: Vec<String>,
}

impl InMemoryCatalogClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn crawler(&self, name: &str) -> Option<CrawlerDefinition> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.crawlers.get(name).cloned())
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.databases.contains(name))
            .unwrap_or(false)
    }

    fn log(&self, call: String) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.push(call);
        }
    }
}

impl CatalogClient for InMemoryCatalogClient {
    fn create_database(&self, name: &str, _description: &str) -> Result<(), ClientError> {
        self.log(format!("create_database({name})"));
        let inserted = self
            .state
            .lock()
            .map(|mut s| s.databases.insert(name.to_string()))
            .unwrap_or(true);
        if inserted {
            Ok(())
        } else {
            Err(ClientError::AlreadyExists(name.to_string()))
        }
    }

    fn delete_crawler(&self, name: &str) -> Result<(), ClientError> {
        self.log(format!("delete_crawler({name})"));
        let removed = self
            .state
            .lock()
            .map(|mut s| s.crawlers.remove(name).is_some())
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(ClientError::NotFound(name.to_string()))
        }
    }

    fn create_crawler(&self, definition: &CrawlerDefinition) -> Result<(), ClientError> {
        self.log(format!("create_crawler({})", definition.name));
        if let Ok(mut state) = self.state.lock() {
            state
                .crawlers
                .insert(definition.name.clone(), definition.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use std::sync::Arc;

    fn record(spec: Value) -> TemplateRecord {
        TemplateRecord {
            document: crate::document::TemplateDocument {
                kind: "crawler".to_string(),
                name: "Sales".to_string(),
                category: "catalog".to_string(),
                tags: Vec::new(),
                meta: Map::new(),
                spec,
            },
            source: "mem.yaml".into(),
            derived_name: false,
        }
    }

    fn sales_spec() -> Value {
        json!({
            "name": "Sales",
            "S3TargetPath": "s3://bucket/sales/",
            "Schedule": "cron(0 3 * * ? *)"
        })
    }

    #[test]
    fn first_run_creates_database_and_crawler() {
        let client = Arc::new(InMemoryCatalogClient::new());
        let reconciler = CrawlerReconciler::new(client.clone(), "Team", "arn:role/crawl");

        reconciler.apply(&record(sales_spec())).unwrap();

        assert!(client.has_database("team_sales"));
        let crawler = client.crawler("TeamSalesCrawler").unwrap();
        assert_eq!(crawler.database, "team_sales");
        assert_eq!(crawler.role, "arn:role/crawl");
        assert_eq!(crawler.target_path, "s3://bucket/sales/");
        // No pre-existing crawler, so the delete comes back NotFound and is
        // swallowed.
        assert!(client.calls().contains(&"delete_crawler(TeamSalesCrawler)".to_string()));
    }

    #[test]
    fn rerun_replaces_the_crawler() {
        let client = Arc::new(InMemoryCatalogClient::new());
        let reconciler = CrawlerReconciler::new(client.clone(), "Team", "arn:role/crawl");

        reconciler.apply(&record(sales_spec())).unwrap();
        let mut updated = sales_spec();
        updated["S3TargetPath"] = json!("s3://bucket/sales-v2/");
        reconciler.apply(&record(updated)).unwrap();

        let crawler = client.crawler("TeamSalesCrawler").unwrap();
        assert_eq!(crawler.target_path, "s3://bucket/sales-v2/");
        assert_eq!(
            client
                .calls()
                .iter()
                .filter(|c| *c == "create_crawler(TeamSalesCrawler)")
                .count(),
            2
        );
    }

    #[test]
    fn missing_required_field_is_a_schema_violation() {
        let client = Arc::new(InMemoryCatalogClient::new());
        let reconciler = CrawlerReconciler::new(client, "Team", "arn:role/crawl");

        let err = reconciler
            .apply(&record(json!({ "name": "Sales" })))
            .unwrap_err();
        assert!(matches!(err, SchedmanError::SchemaViolation(_)));
    }
}
