//! Typed builder for nested namespace selections.
//!
//! A query maps namespace names to sub-selections. An empty sub-selection
//! (`{}`) includes the namespace; a non-empty one also expands the related
//! namespaces it names. `AdminClient::query` accepts any `Serialize` value,
//! so `serde_json::json!` works just as well as this builder.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Query(BTreeMap<String, Query>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include every record of `namespace`.
    pub fn include(mut self, namespace: impl Into<String>) -> Self {
        self.0.insert(namespace.into(), Query::new());
        self
    }

    /// Include `namespace` and expand the relations selected by `related`.
    pub fn expand(mut self, namespace: impl Into<String>, related: Query) -> Self {
        self.0.insert(namespace.into(), related);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn include_serializes_empty_marker() {
        let query = Query::new().include("todos");
        assert_eq!(serde_json::to_value(&query).unwrap(), json!({"todos": {}}));
    }

    #[test]
    fn expand_nests_selection() {
        let query = Query::new()
            .expand("lists", Query::new().include("todos"))
            .include("todos");
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"lists": {"todos": {}}, "todos": {}})
        );
        assert_eq!(query.namespaces().collect::<Vec<_>>(), ["lists", "todos"]);
    }

    #[test]
    fn later_selection_replaces_earlier() {
        let query = Query::new()
            .include("lists")
            .expand("lists", Query::new().include("todos"));
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"lists": {"todos": {}}})
        );
    }
}
