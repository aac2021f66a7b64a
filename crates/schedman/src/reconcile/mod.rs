//! Shipped reconcilers for the two built-in resource kinds, expressed over
//! collaborator client traits. The traits are the dispatch contract: each
//! implementation wraps a concrete cloud SDK and applies its own retry and
//! timeout policy; the reconcilers only sequence the calls.

mod crawler;
mod event_rule;

pub use crawler::{
    CatalogClient, CrawlerDefinition, CrawlerReconciler, CrawlerSpec, InMemoryCatalogClient,
    crawler_spec_schema,
};
pub use event_rule::{
    EventRuleClient, EventRuleReconciler, EventRuleSpec, InMemoryEventRuleClient,
    event_rule_spec_schema,
};

use thiserror::Error;

use crate::error::SchedmanError;

/// Collaborator-raised remote failure, classified so reconcilers can treat
/// "already exists" and "not found" as expected on idempotent paths.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("resource already exists: {0}")]
    AlreadyExists(String),
    #[error("remote error: {0}")]
    Remote(String),
}

impl From<ClientError> for SchedmanError {
    fn from(err: ClientError) -> Self {
        SchedmanError::Deploy(err.to_string())
    }
}

/// `MyCrawler` -> `my_crawler`, `HTTPServer` -> `http_server`.
pub(crate) fn to_snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);
    for (i, ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            if i > 0 && (prev_lower || next_lower) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(*ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_handles_acronym_runs() {
        assert_eq!(to_snake_case("MyCrawler"), "my_crawler");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("Db2Sync"), "db2_sync");
    }
}
