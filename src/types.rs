//! Plain data types exchanged between the engine and the provider.

use serde::{Deserialize, Serialize};

/// A single attribute change within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The attribute path.
    pub path: String,
    /// The value before the change, absent when the attribute is added.
    pub before: Option<serde_json::Value>,
    /// The value after the change, absent when the attribute is removed.
    pub after: Option<serde_json::Value>,
}

impl AttributeChange {
    /// An attribute that did not exist before.
    pub fn added(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            before: None,
            after: Some(value),
        }
    }

    /// An attribute that goes away.
    pub fn removed(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            before: Some(value),
            after: None,
        }
    }

    /// An attribute whose value changes.
    pub fn modified(
        path: impl Into<String>,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self {
            path: path.into(),
            before: Some(before),
            after: Some(after),
        }
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: serde_json::Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: serde_json::Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: serde_json::Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }
}

/// A resource adopted through import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: serde_json::Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata, derived from the schema by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("service", json!("HTTP"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("HTTP")));

        let removed = AttributeChange::removed("host", json!("old.example.com"));
        assert_eq!(removed.before, Some(json!("old.example.com")));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("force", json!(false), json!(true));
        assert_eq!(modified.before, Some(json!(false)));
        assert_eq!(modified.after, Some(json!(true)));
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"id": "HTTP/a"}));
        assert!(no_change.changes.is_empty());
        assert!(!no_change.requires_replace);

        let replace = PlanResult::with_changes(
            json!({"id": "HTTP/b"}),
            vec![AttributeChange::modified("host", json!("a"), json!("b"))],
            true,
        );
        assert_eq!(replace.changes.len(), 1);
        assert!(replace.requires_replace);
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("freeipa_service", json!({"id": "HTTP/a"}));
        assert_eq!(imported.resource_type, "freeipa_service");
        assert_eq!(imported.state["id"], "HTTP/a");
    }
}
