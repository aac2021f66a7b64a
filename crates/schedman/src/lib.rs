pub mod deploy;
pub mod diff;
pub mod document;
pub mod error;
pub mod index;
pub mod reconcile;
pub mod registry;
pub mod schema;
pub mod snapshot;

pub use deploy::{DeployOutcome, DeployReport, Deployer, Reconciler};
pub use diff::compute_change_set;
pub use document::{NameStrategy, RANDOM_NAME_SENTINEL, TemplateDocument, TemplateRecord};
pub use error::SchedmanError;
pub use index::{DEFAULT_PATTERN, TemplateFilter, TemplateIndex};
pub use reconcile::{
    CatalogClient, ClientError, CrawlerDefinition, CrawlerReconciler, CrawlerSpec,
    EventRuleClient, EventRuleReconciler, EventRuleSpec, InMemoryCatalogClient,
    InMemoryEventRuleClient, crawler_spec_schema, event_rule_spec_schema,
};
pub use registry::{
    ItemCache, ItemParser, KindDescriptor, KindOptions, KindRegistry, TemplateRegistry, Worker,
};
pub use schema::{Schema, SchemaCatalog, document_schema};
pub use snapshot::{
    InMemoryPublisher, SNAPSHOT_FILE_NAME, Snapshot, SnapshotPublisher, SnapshotStore,
};
