use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::ClientError;
use crate::deploy::Reconciler;
use crate::document::TemplateRecord;
use crate::error::SchedmanError;

/// Validated payload for the scheduled-event-rule kind. Field names follow
/// the wire format of the template files.
#[derive(Clone, Debug, Deserialize)]
pub struct EventRuleSpec {
    pub name: String,
    #[serde(rename = "FunctionName", default)]
    pub function_name: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Schedule", default)]
    pub schedule: String,
    #[serde(rename = "EventPattern", default)]
    pub event_pattern: Option<Value>,
    #[serde(rename = "Input", default = "empty_object")]
    pub input: Value,
    /// Deletion marker: the rule and its target binding are removed instead
    /// of upserted.
    #[serde(default)]
    pub deleted: bool,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl EventRuleSpec {
    /// Logical name of the invocation target, defaulting to the rule name.
    pub fn function(&self) -> &str {
        self.function_name.as_deref().unwrap_or(&self.name)
    }
}

/// Spec schema for the event-rule kind, for registration in a
/// [`crate::schema::SchemaCatalog`].
pub fn event_rule_spec_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": { "type": "string", "minLength": 1 },
            "FunctionName": { "type": "string" },
            "Description": { "type": "string" },
            "Schedule": { "type": "string" },
            "EventPattern": { "type": "object" },
            "Input": { "type": "object" },
            "deleted": { "type": "boolean" }
        }
    })
}

/// Remote-call surface for the event-rule collaborator.
pub trait EventRuleClient: Send + Sync {
    fn grant_invoke_permission(&self, function: &str, statement_id: &str)
    -> Result<(), ClientError>;
    fn put_rule(
        &self,
        rule: &str,
        schedule: &str,
        pattern: Option<&str>,
        description: &str,
    ) -> Result<(), ClientError>;
    /// Resolves a logical function name to its live target identifier.
    fn resolve_target(&self, function: &str) -> Result<String, ClientError>;
    fn put_target(
        &self,
        rule: &str,
        target_id: &str,
        target: &str,
        input: &str,
    ) -> Result<(), ClientError>;
    fn remove_target(&self, rule: &str, target_id: &str) -> Result<(), ClientError>;
    fn delete_rule(&self, rule: &str) -> Result<(), ClientError>;
}

impl<T: EventRuleClient + ?Sized> EventRuleClient for std::sync::Arc<T> {
    fn grant_invoke_permission(
        &self,
        function: &str,
        statement_id: &str,
    ) -> Result<(), ClientError> {
        (**self).grant_invoke_permission(function, statement_id)
    }

    fn put_rule(
        &self,
        rule: &str,
        schedule: &str,
        pattern: Option<&str>,
        description: &str,
    ) -> Result<(), ClientError> {
        (**self).put_rule(rule, schedule, pattern, description)
    }

    fn resolve_target(&self, function: &str) -> Result<String, ClientError> {
        (**self).resolve_target(function)
    }

    fn put_target(
        &self,
        rule: &str,
        target_id: &str,
        target: &str,
        input: &str,
    ) -> Result<(), ClientError> {
        (**self).put_target(rule, target_id, target, input)
    }

    fn remove_target(&self, rule: &str, target_id: &str) -> Result<(), ClientError> {
        (**self).remove_target(rule, target_id)
    }

    fn delete_rule(&self, rule: &str) -> Result<(), ClientError> {
        (**self).delete_rule(rule)
    }
}

/// Reconciles one scheduled-event rule: grant the invocation permission, then
/// either remove (deletion marker) or upsert the rule and its single target.
/// Rule name and target id are both derived from the template name, so the
/// binding is deterministic across runs.
pub struct EventRuleReconciler<C> {
    client: C,
    prefix: String,
}

impl<C: EventRuleClient> EventRuleReconciler<C> {
    pub fn new(client: C, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn apply_spec(&self, spec: &EventRuleSpec) -> Result<(), SchedmanError> {
        let rule = format!("{}{}", self.prefix, spec.name);
        let target_id = format!("{rule}-target");
        let statement_id = format!("{}{}_Statement", self.prefix, spec.function());

        tracing::info!(rule, function = spec.function(), "granting invocation permission");
        match self
            .client
            .grant_invoke_permission(spec.function(), &statement_id)
        {
            Ok(()) => {}
            Err(ClientError::AlreadyExists(_)) => {
                tracing::info!(rule, "permission already granted");
            }
            Err(err) => return Err(err.into()),
        }

        if spec.deleted {
            tracing::info!(rule, "removing rule target");
            match self.client.remove_target(&rule, &target_id) {
                Ok(()) => {}
                Err(ClientError::NotFound(_)) => tracing::info!(rule, "target already absent"),
                Err(err) => return Err(err.into()),
            }
            tracing::info!(rule, "deleting rule");
            match self.client.delete_rule(&rule) {
                Ok(()) => {}
                Err(ClientError::NotFound(_)) => tracing::info!(rule, "rule already absent"),
                Err(err) => return Err(err.into()),
            }
            return Ok(());
        }

        let pattern = spec
            .event_pattern
            .as_ref()
            .filter(|value| !value.is_null())
            .map(Value::to_string);
        tracing::info!(rule, "writing rule");
        self.client
            .put_rule(&rule, &spec.schedule, pattern.as_deref(), &spec.description)?;

        let target = self
            .client
            .resolve_target(spec.function())
            .map_err(|err| match err {
                ClientError::NotFound(_) => SchedmanError::InvalidTarget(format!(
                    "function '{}' cannot be resolved",
                    spec.function()
                )),
                other => other.into(),
            })?;
        let input = spec.input.to_string();
        tracing::info!(rule, target, "writing rule target");
        self.client.put_target(&rule, &target_id, &target, &input)?;
        Ok(())
    }
}

impl<C: EventRuleClient> Reconciler for EventRuleReconciler<C> {
    fn apply(&self, record: &TemplateRecord) -> Result<(), SchedmanError> {
        let spec: EventRuleSpec = serde_json::from_value(record.spec().clone()).map_err(|err| {
            SchedmanError::SchemaViolation(format!(
                "event-rule spec for '{}': {err}",
                record.name()
            ))
        })?;
        self.apply_spec(&spec)
    }
}

/// In-memory event-rule collaborator recording every call; stands in for the
/// remote client in tests.
#[derive(Default)]
pub struct InMemoryEventRuleClient {
    functions: BTreeMap<String, String>,
    state: Mutex<EventRuleState>,
}

#[derive(Default)]
struct EventRuleState {
    rules: BTreeSet<String>,
    targets: BTreeMap<String, String>,
    permissions: BTreeSet<String>,
    calls: Vec<String>,
}

impl InMemoryEventRuleClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resolvable logical function name.
    pub fn with_function(mut self, logical: impl Into<String>, target: impl Into<String>) -> Self {
        self.functions.insert(logical.into(), target.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn has_rule(&self, rule: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.rules.contains(rule))
            .unwrap_or(false)
    }

    fn log(&self, call: String) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.push(call);
        }
    }
}

impl EventRuleClient for InMemoryEventRuleClient {
    fn grant_invoke_permission(
        &self,
        function: &str,
        statement_id: &str,
    ) -> Result<(), ClientError> {
        self.log(format!("grant_invoke_permission({function})"));
        let inserted = self
            .state
            .lock()
            .map(|mut s| s.permissions.insert(statement_id.to_string()))
            .unwrap_or(true);
        if inserted {
            Ok(())
        } else {
            Err(ClientError::AlreadyExists(statement_id.to_string()))
        }
    }

    fn put_rule(
        &self,
        rule: &str,
        _schedule: &str,
        _pattern: Option<&str>,
        _description: &str,
    ) -> Result<(), ClientError> {
        self.log(format!("put_rule({rule})"));
        if let Ok(mut state) = self.state.lock() {
            state.rules.insert(rule.to_string());
        }
        Ok(())
    }

    fn resolve_target(&self, function: &str) -> Result<String, ClientError> {
        self.log(format!("resolve_target({function})"));
        self.functions
            .get(function)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(function.to_string()))
    }

    fn put_target(
        &self,
        rule: &str,
        target_id: &str,
        _target: &str,
        _input: &str,
    ) -> Result<(), ClientError> {
        self.log(format!("put_target({rule})"));
        if let Ok(mut state) = self.state.lock() {
            state.targets.insert(rule.to_string(), target_id.to_string());
        }
        Ok(())
    }

    fn remove_target(&self, rule: &str, _target_id: &str) -> Result<(), ClientError> {
        self.log(format!("remove_target({rule})"));
        let removed = self
            .state
            .lock()
            .map(|mut s| s.targets.remove(rule).is_some())
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(ClientError::NotFound(rule.to_string()))
        }
    }

    fn delete_rule(&self, rule: &str) -> Result<(), ClientError> {
        self.log(format!("delete_rule({rule})"));
        let removed = self
            .state
            .lock()
            .map(|mut s| s.rules.remove(rule))
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(ClientError::NotFound(rule.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn record(spec: Value) -> TemplateRecord {
        TemplateRecord {
            document: crate::document::TemplateDocument {
                kind: "event-rule".to_string(),
                name: "R1".to_string(),
                category: "schedule".to_string(),
                tags: Vec::new(),
                meta: Map::new(),
                spec,
            },
            source: "mem.yaml".into(),
            derived_name: false,
        }
    }

    #[test]
    fn upsert_writes_rule_and_target() {
        let client = Arc::new(
            InMemoryEventRuleClient::new().with_function("R1", "arn:fn:r1"),
        );
        let reconciler = EventRuleReconciler::new(client.clone(), "Team");

        reconciler
            .apply(&record(json!({
                "name": "R1",
                "Schedule": "rate(1 day)",
                "Input": { "mode": "full" }
            })))
            .unwrap();

        assert!(client.has_rule("TeamR1"));
        let calls = client.calls();
        assert!(calls.contains(&"put_rule(TeamR1)".to_string()));
        assert!(calls.contains(&"put_target(TeamR1)".to_string()));
    }

    #[test]
    fn unresolvable_function_is_invalid_target() {
        let client = Arc::new(InMemoryEventRuleClient::new());
        let reconciler = EventRuleReconciler::new(client, "Team");

        let err = reconciler
            .apply(&record(json!({ "name": "R1", "Schedule": "rate(1 day)" })))
            .unwrap_err();
        assert!(matches!(err, SchedmanError::InvalidTarget(_)));
    }

    #[test]
    fn deletion_marker_tolerates_missing_remote_rule() {
        let client = Arc::new(InMemoryEventRuleClient::new().with_function("R1", "arn:fn:r1"));
        let reconciler = EventRuleReconciler::new(client.clone(), "Team");

        // Nothing exists remotely; both delete calls come back NotFound.
        reconciler
            .apply(&record(json!({ "name": "R1", "deleted": true })))
            .unwrap();

        let calls = client.calls();
        assert!(calls.contains(&"remove_target(TeamR1)".to_string()));
        assert!(calls.contains(&"delete_rule(TeamR1)".to_string()));
    }

    #[test]
    fn repeated_grant_is_not_fatal() {
        let client = Arc::new(InMemoryEventRuleClient::new().with_function("R1", "arn:fn:r1"));
        let reconciler = EventRuleReconciler::new(client.clone(), "Team");
        let spec = json!({ "name": "R1", "Schedule": "rate(1 day)" });

        reconciler.apply(&record(spec.clone())).unwrap();
        // Second run hits the already-granted permission path.
        reconciler.apply(&record(spec)).unwrap();
    }

    #[test]
    fn function_name_overrides_the_invocation_target() {
        let client = Arc::new(
            InMemoryEventRuleClient::new().with_function("handler", "arn:fn:handler"),
        );
        let reconciler = EventRuleReconciler::new(client.clone(), "Team");

        reconciler
            .apply(&record(json!({
                "name": "R1",
                "FunctionName": "handler",
                "Schedule": "rate(5 minutes)"
            })))
            .unwrap();

        assert!(client.calls().contains(&"resolve_target(handler)".to_string()));
        assert!(client.has_rule("TeamR1"));
    }
}
