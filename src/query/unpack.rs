//! Assembles step rows into nested result trees.
//!
//! Rows are matched on identity: direct relations by the identities stored
//! in the upstream row, reverse relations by the back-reference property, and
//! edges by the identity on their near side. Recursion follows the step DAG,
//! which has no cycles, so a node reached twice is simply resolved twice.

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::builder::{JoinKind, QueryBuilder, QueryStep, RetrieveDepth};
use super::executor::StepResults;
use crate::error::Result;
use crate::models::{EdgeDirection, Instance, InstanceId, ViewReference};

/// A node with its properties and resolved relations.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNode {
    pub id: InstanceId,
    pub version: i64,
    pub node_type: Option<InstanceId>,
    pub properties: Map<String, Value>,
    pub relations: BTreeMap<String, Relation>,
}

impl ResolvedNode {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).filter(|value| !value.is_null())
    }

    pub fn relation(&self, field: &str) -> Option<&Relation> {
        self.relations.get(field)
    }

    /// Deserialize the scalar properties into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.properties.clone()))?)
    }
}

/// An edge with its far end. For edges read by an edge root, the far end is
/// the end node.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEdge {
    pub id: InstanceId,
    pub edge_type: Option<InstanceId>,
    pub start_node: Option<InstanceId>,
    pub end_node: Option<InstanceId>,
    pub properties: Map<String, Value>,
    /// The node at the other end from the node holding the edge.
    pub target: Related,
}

/// One resolved relation target.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    Id(InstanceId),
    Node(Box<ResolvedNode>),
    Edge(Box<ResolvedEdge>),
}

impl Related {
    /// Identity of the target; for edges, the far-end node.
    pub fn id(&self) -> &InstanceId {
        match self {
            Related::Id(id) => id,
            Related::Node(node) => &node.id,
            Related::Edge(edge) => edge.target.id(),
        }
    }

    pub fn as_node(&self) -> Option<&ResolvedNode> {
        match self {
            Related::Node(node) => Some(node),
            Related::Edge(edge) => edge.target.as_node(),
            Related::Id(_) => None,
        }
    }
}

/// Value of a relation field.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    One(Option<Related>),
    Many(Vec<Related>),
}

impl Relation {
    pub fn targets(&self) -> Vec<&Related> {
        match self {
            Relation::One(target) => target.iter().collect(),
            Relation::Many(targets) => targets.iter().collect(),
        }
    }
}

/// Domain types built from resolved nodes.
pub trait FromResolved: Sized {
    fn from_resolved(node: ResolvedNode) -> Result<Self>;
}

impl FromResolved for ResolvedNode {
    fn from_resolved(node: ResolvedNode) -> Result<Self> {
        Ok(node)
    }
}

/// Rows of one step indexed for lookups.
struct StepIndex<'r> {
    by_id: HashMap<InstanceId, &'r Instance>,
    /// Rows grouped by the upstream identity they join on (reverse relations
    /// and edges).
    by_upstream: HashMap<InstanceId, Vec<&'r Instance>>,
}

pub(crate) struct Unpacker<'q, 'r> {
    builder: &'q QueryBuilder,
    results: &'r StepResults,
    indexes: HashMap<&'q str, StepIndex<'r>>,
}

impl<'q, 'r> Unpacker<'q, 'r> {
    pub(crate) fn new(builder: &'q QueryBuilder, results: &'r StepResults) -> Self {
        let mut indexes = HashMap::new();
        for step in builder.steps() {
            if results.contains(&step.name) {
                indexes.insert(step.name.as_str(), index_rows(step, results.rows(&step.name)));
            }
        }
        Self {
            builder,
            results,
            indexes,
        }
    }

    /// Resolve every root row.
    pub(crate) fn unpack(&self) -> Vec<ResolvedNode> {
        let root = self.builder.root();
        self.results
            .rows(&root.name)
            .iter()
            .map(|row| self.resolve(root, row))
            .collect()
    }

    /// Resolve every row of an edge root; targets are the end nodes.
    pub(crate) fn unpack_edges(&self) -> Vec<ResolvedEdge> {
        let root = self.builder.root();
        let end_step = self.end_step(root);
        self.results
            .rows(&root.name)
            .iter()
            .filter_map(|edge| self.resolve_edge(root, edge, EdgeDirection::Outwards, end_step))
            .collect()
    }

    fn children(&self, step: &QueryStep) -> Vec<&'q QueryStep> {
        self.builder
            .steps()
            .iter()
            .filter(|child| child.upstream() == Some(step.name.as_str()))
            .collect()
    }

    fn resolve(&self, step: &QueryStep, row: &Instance) -> ResolvedNode {
        let view = step.view.as_ref();
        let mut node = ResolvedNode {
            id: row.id(),
            version: row.version,
            node_type: row.type_ref.clone(),
            properties: view.map(|v| properties_of(row, v)).unwrap_or_default(),
            relations: BTreeMap::new(),
        };

        if self.builder.retrieve_depth() == RetrieveDepth::Skip {
            return node;
        }

        for child in self.children(step) {
            let Some(field) = child.field.as_deref() else {
                continue;
            };
            let relation = match child.join() {
                Some(JoinKind::DirectRelation { property }) => {
                    let Some(view) = view else { continue };
                    let relation = self.direct(child, row, view, property);
                    // The raw identity is replaced by the resolved relation.
                    node.properties.remove(property);
                    relation
                }
                Some(JoinKind::ReverseRelation { .. }) => self.reverse(child, &node.id),
                Some(JoinKind::Edge { direction, .. }) => self.edges(child, &node.id, *direction),
                _ => continue,
            };
            node.relations.insert(field.to_string(), relation);
        }
        node
    }

    fn direct(&self, child: &QueryStep, row: &Instance, view: &ViewReference, property: &str) -> Relation {
        let targets = row.relation_targets(view, property);
        let resolved: Vec<Related> = targets.into_iter().map(|id| self.node_or_id(child, id)).collect();
        match row.property(view, property) {
            Some(Value::Array(_)) => Relation::Many(resolved),
            _ => Relation::One(resolved.into_iter().next()),
        }
    }

    fn reverse(&self, child: &QueryStep, parent: &InstanceId) -> Relation {
        let rows = self.grouped(child, parent);
        Relation::Many(
            rows.into_iter()
                .map(|row| match self.builder.retrieve_depth() {
                    RetrieveDepth::Full => Related::Node(Box::new(self.resolve(child, row))),
                    _ => Related::Id(row.id()),
                })
                .collect(),
        )
    }

    fn edges(&self, child: &QueryStep, near: &InstanceId, direction: EdgeDirection) -> Relation {
        let end_step = self.end_step(child);
        Relation::Many(
            self.grouped(child, near)
                .into_iter()
                .filter_map(|edge| self.resolve_edge(child, edge, direction, end_step))
                .map(|edge| Related::Edge(Box::new(edge)))
                .collect(),
        )
    }

    fn end_step(&self, edge_step: &QueryStep) -> Option<&'q QueryStep> {
        self.children(edge_step)
            .into_iter()
            .find(|step| matches!(step.join(), Some(JoinKind::EdgeTarget)))
    }

    /// The edge with its far end, or `None` if the far end is unset.
    fn resolve_edge(
        &self,
        step: &QueryStep,
        edge: &Instance,
        direction: EdgeDirection,
        end_step: Option<&QueryStep>,
    ) -> Option<ResolvedEdge> {
        let far = match direction {
            EdgeDirection::Outwards => edge.end_node.clone()?,
            EdgeDirection::Inwards => edge.start_node.clone()?,
        };
        let target = match end_step {
            Some(end_step) => self.node_or_id(end_step, far),
            None => Related::Id(far),
        };
        Some(ResolvedEdge {
            id: edge.id(),
            edge_type: edge.type_ref.clone(),
            start_node: edge.start_node.clone(),
            end_node: edge.end_node.clone(),
            properties: step
                .view
                .as_ref()
                .map(|v| properties_of(edge, v))
                .unwrap_or_default(),
            target,
        })
    }

    /// The fully resolved node if `step` fetched it, else its identity.
    fn node_or_id(&self, step: &QueryStep, id: InstanceId) -> Related {
        if self.builder.retrieve_depth() != RetrieveDepth::Full {
            return Related::Id(id);
        }
        match self.indexes.get(step.name.as_str()).and_then(|index| index.by_id.get(&id)) {
            Some(row) => Related::Node(Box::new(self.resolve(step, row))),
            None => Related::Id(id),
        }
    }

    fn grouped(&self, step: &QueryStep, key: &InstanceId) -> Vec<&'r Instance> {
        self.indexes
            .get(step.name.as_str())
            .and_then(|index| index.by_upstream.get(key))
            .cloned()
            .unwrap_or_default()
    }
}

fn properties_of(row: &Instance, view: &ViewReference) -> Map<String, Value> {
    row.properties_for(view).cloned().unwrap_or_default()
}

fn index_rows<'r>(step: &QueryStep, rows: &'r [Instance]) -> StepIndex<'r> {
    let mut by_id = HashMap::new();
    let mut by_upstream: HashMap<InstanceId, Vec<&'r Instance>> = HashMap::new();

    for row in rows {
        by_id.insert(row.id(), row);
        let keys: Vec<InstanceId> = match step.join() {
            Some(JoinKind::ReverseRelation { property }) => step
                .view
                .as_ref()
                .map(|view| row.relation_targets(view, property))
                .unwrap_or_default(),
            Some(JoinKind::Edge { direction, .. }) => match direction {
                EdgeDirection::Outwards => row.start_node.clone().into_iter().collect(),
                EdgeDirection::Inwards => row.end_node.clone().into_iter().collect(),
            },
            _ => Vec::new(),
        };
        for key in keys {
            by_upstream.entry(key).or_default().push(row);
        }
    }

    StepIndex { by_id, by_upstream }
}
