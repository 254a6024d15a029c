//! Wire representation of instances as returned by the read endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::identity::{InstanceId, PropertyPath, ViewReference};

/// Whether an instance is a node or an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    #[default]
    Node,
    Edge,
}

/// Properties grouped by `space -> "externalId/version" -> property -> value`.
pub type SourceProperties = BTreeMap<String, BTreeMap<String, Map<String, Value>>>;

/// A node or edge as returned by list, search and retrieve calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(default)]
    pub instance_type: InstanceType,
    pub space: String,
    pub external_id: String,
    #[serde(default)]
    pub version: i64,
    /// Node type, or the edge type for edges.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_node: Option<InstanceId>,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub last_updated_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_time: Option<i64>,
    #[serde(default)]
    pub properties: SourceProperties,
}

impl Instance {
    pub fn id(&self) -> InstanceId {
        InstanceId::new(self.space.as_str(), self.external_id.as_str())
    }

    /// Properties written for `view`, if any.
    pub fn properties_for(&self, view: &ViewReference) -> Option<&Map<String, Value>> {
        self.properties
            .get(&view.space)
            .and_then(|by_view| by_view.get(&view.identifier()))
    }

    pub fn property(&self, view: &ViewReference, name: &str) -> Option<&Value> {
        self.properties_for(view)
            .and_then(|props| props.get(name))
            .filter(|v| !v.is_null())
    }

    /// Identities a direct relation property points at. Handles both single
    /// and list-valued relations; unparseable entries are skipped.
    pub fn relation_targets(&self, view: &ViewReference, name: &str) -> Vec<InstanceId> {
        match self.property(view, name) {
            Some(Value::Array(items)) => items.iter().filter_map(InstanceId::from_json).collect(),
            Some(value) => InstanceId::from_json(value).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

/// Sort direction for list requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending (A-Z, 0-9, oldest-newest)
    #[default]
    Ascending,
    /// Descending (Z-A, 9-0, newest-oldest)
    Descending,
}

/// One sort clause of a list request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSort {
    pub property: PropertyPath,
    pub direction: SortDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nulls_first: Option<bool>,
}

impl InstanceSort {
    pub fn ascending(property: PropertyPath) -> Self {
        Self {
            property,
            direction: SortDirection::Ascending,
            nulls_first: None,
        }
    }

    pub fn descending(property: PropertyPath) -> Self {
        Self {
            property,
            direction: SortDirection::Descending,
            nulls_first: None,
        }
    }

    pub fn nulls_first(mut self, nulls_first: bool) -> Self {
        self.nulls_first = Some(nulls_first);
        self
    }
}
