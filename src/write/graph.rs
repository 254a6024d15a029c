//! Write-side object graph.
//!
//! Nodes live in an arena keyed by [`InstanceId`]. A relation either names an
//! identity outright or points at another arena entry, so parent/child
//! back-references and bidirectional edges need no shared ownership.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;

use super::TimeSeriesWrite;
use crate::models::{InstanceId, ViewDescriptor};

/// A scalar property value on a node write.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Value(Value),
    /// Explicit null; only sent when the apply asks for it.
    Null,
    /// A time series created alongside the node; the property stores its
    /// external id.
    TimeSeries(TimeSeriesWrite),
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        if value.is_null() {
            PropertyValue::Null
        } else {
            PropertyValue::Value(value)
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Value(Value::from(value))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Value(Value::from(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Value(Value::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Value(Value::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Value(Value::from(value))
    }
}

impl From<TimeSeriesWrite> for PropertyValue {
    fn from(value: TimeSeriesWrite) -> Self {
        PropertyValue::TimeSeries(value)
    }
}

/// Target of a relation or an edge end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationValue {
    /// A bare identity; nothing is written for the target.
    Id(InstanceId),
    /// Another node in the same [`WriteGraph`]; it is serialized too.
    Node(InstanceId),
}

impl RelationValue {
    pub fn id(&self) -> &InstanceId {
        match self {
            RelationValue::Id(id) | RelationValue::Node(id) => id,
        }
    }
}

impl From<InstanceId> for RelationValue {
    fn from(id: InstanceId) -> Self {
        RelationValue::Id(id)
    }
}

impl From<(&str, &str)> for RelationValue {
    fn from((space, external_id): (&str, &str)) -> Self {
        RelationValue::Id(InstanceId::new(space, external_id))
    }
}

/// Value of a direct relation property.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectRelation {
    One(RelationValue),
    Many(Vec<RelationValue>),
}

impl DirectRelation {
    pub fn targets(&self) -> impl Iterator<Item = &RelationValue> {
        let slice = match self {
            DirectRelation::One(target) => std::slice::from_ref(target),
            DirectRelation::Many(targets) => targets.as_slice(),
        };
        slice.iter()
    }

    pub(crate) fn to_json(&self) -> Value {
        match self {
            DirectRelation::One(target) => target.id().to_json(),
            DirectRelation::Many(targets) => {
                Value::Array(targets.iter().map(|t| t.id().to_json()).collect())
            }
        }
    }
}

/// One edge hanging off a node through a declared connection field.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeWrite {
    /// Connection field on the owning node's view.
    pub field: String,
    /// The far end; which side it lands on follows the connection direction.
    pub end: RelationValue,
    pub external_id: Option<String>,
    /// Defaults to the owning node's space.
    pub space: Option<String>,
    pub existing_version: Option<i64>,
    /// Edge properties by wire name, written to the connection's edge view.
    pub properties: BTreeMap<String, Value>,
}

impl EdgeWrite {
    pub fn new(field: &str, end: impl Into<RelationValue>) -> Self {
        Self {
            field: field.to_string(),
            end: end.into(),
            external_id: None,
            space: None,
            existing_version: None,
            properties: BTreeMap::new(),
        }
    }

    /// Edge to another node in the same graph.
    pub fn to_node(field: &str, end: InstanceId) -> Self {
        Self::new(field, RelationValue::Node(end))
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn in_space(mut self, space: impl Into<String>) -> Self {
        self.space = Some(space.into());
        self
    }

    pub fn existing_version(mut self, version: i64) -> Self {
        self.existing_version = Some(version);
        self
    }

    pub fn property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }
}

/// A node to be written, with properties keyed by field name.
#[derive(Debug, Clone)]
pub struct NodeWrite {
    pub id: InstanceId,
    pub descriptor: Arc<ViewDescriptor>,
    pub node_type: Option<InstanceId>,
    pub existing_version: Option<i64>,
    pub properties: BTreeMap<String, PropertyValue>,
    /// `None` is an explicit null relation.
    pub relations: BTreeMap<String, Option<DirectRelation>>,
    pub edges: Vec<EdgeWrite>,
}

impl NodeWrite {
    pub fn new(id: InstanceId, descriptor: Arc<ViewDescriptor>) -> Self {
        Self {
            id,
            descriptor,
            node_type: None,
            existing_version: None,
            properties: BTreeMap::new(),
            relations: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn node_type(mut self, node_type: InstanceId) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn existing_version(mut self, version: i64) -> Self {
        self.existing_version = Some(version);
        self
    }

    pub fn set(mut self, field: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(field.to_string(), value.into());
        self
    }

    pub fn null(self, field: &str) -> Self {
        self.set(field, PropertyValue::Null)
    }

    pub fn relation(mut self, field: &str, target: impl Into<RelationValue>) -> Self {
        self.relations
            .insert(field.to_string(), Some(DirectRelation::One(target.into())));
        self
    }

    /// Direct relation to another node in the same graph.
    pub fn relation_to_node(self, field: &str, target: InstanceId) -> Self {
        self.relation(field, RelationValue::Node(target))
    }

    pub fn relations(mut self, field: &str, targets: Vec<RelationValue>) -> Self {
        self.relations
            .insert(field.to_string(), Some(DirectRelation::Many(targets)));
        self
    }

    pub fn clear_relation(mut self, field: &str) -> Self {
        self.relations.insert(field.to_string(), None);
        self
    }

    pub fn edge(mut self, edge: EdgeWrite) -> Self {
        self.edges.push(edge);
        self
    }
}

/// Arena of node writes addressed by identity.
#[derive(Debug, Clone, Default)]
pub struct WriteGraph {
    nodes: Vec<NodeWrite>,
    index: HashMap<InstanceId, usize>,
}

impl WriteGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, replacing any node with the same identity.
    pub fn insert(&mut self, node: NodeWrite) -> InstanceId {
        let id = node.id.clone();
        match self.index.get(&id) {
            Some(&slot) => self.nodes[slot] = node,
            None => {
                self.index.insert(id.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
        id
    }

    pub fn get(&self, id: &InstanceId) -> Option<&NodeWrite> {
        self.index.get(id).map(|&slot| &self.nodes[slot])
    }

    pub fn get_mut(&mut self, id: &InstanceId) -> Option<&mut NodeWrite> {
        self.index.get(id).map(|&slot| &mut self.nodes[slot])
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.index.contains_key(id)
    }

    /// Identities in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &InstanceId> {
        self.nodes.iter().map(|node| &node.id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ViewReference;
    use serde_json::json;

    fn descriptor() -> Arc<ViewDescriptor> {
        Arc::new(ViewDescriptor::new(ViewReference::new("shop", "Product", "v1")).property("name"))
    }

    #[test]
    fn test_insert_replaces_same_identity() {
        let mut graph = WriteGraph::new();
        let id = InstanceId::new("shop", "p1");
        graph.insert(NodeWrite::new(id.clone(), descriptor()).set("name", "old"));
        graph.insert(NodeWrite::new(id.clone(), descriptor()).set("name", "new"));

        assert_eq!(graph.len(), 1);
        assert_eq!(
            graph.get(&id).unwrap().properties["name"],
            PropertyValue::Value(json!("new"))
        );
    }

    #[test]
    fn test_null_value_conversion() {
        assert_eq!(PropertyValue::from(Value::Null), PropertyValue::Null);
        assert_eq!(PropertyValue::from(3_i64), PropertyValue::Value(json!(3)));
    }

    #[test]
    fn test_direct_relation_wire_form() {
        let many = DirectRelation::Many(vec![
            ("shop", "a").into(),
            RelationValue::Node(InstanceId::new("shop", "b")),
        ]);
        assert_eq!(
            many.to_json(),
            json!([{"space": "shop", "externalId": "a"}, {"space": "shop", "externalId": "b"}])
        );
        assert_eq!(many.targets().count(), 2);
    }
}
