//! Flattens a [`WriteGraph`] into a [`MutationBatch`].
//!
//! The walk is a depth-first traversal with an explicit stack. An identity is
//! marked visited when it is taken off the stack and before its children are
//! pushed, so reference cycles terminate and every node is emitted at most
//! once. The visited sets live in a context created per call.

use std::collections::HashSet;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::graph::{NodeWrite, PropertyValue, RelationValue, WriteGraph};
use super::{EdgeApply, MutationBatch, NodeApply, NodeOrEdgeData, TimeSeriesWrite};
use crate::error::{ClientError, Result};
use crate::models::{EdgeDirection, InstanceId};

/// Longest external id the service accepts.
const MAX_EXTERNAL_ID_LEN: usize = 255;

/// Serialize everything reachable from `roots`.
///
/// Nulls are only written when `write_none` is set. Fails before anything is
/// sent if a field is unknown to its view, if an edge points at a node of an
/// unexpected view, or if a root or nested reference is missing from the
/// graph.
pub fn serialize(graph: &WriteGraph, roots: &[InstanceId], write_none: bool) -> Result<MutationBatch> {
    let mut context = SerializeContext::new(graph, write_none);
    context.walk(roots)?;
    debug!(
        nodes = context.batch.nodes.len(),
        edges = context.batch.edges.len(),
        time_series = context.batch.time_series.len(),
        "Serialized write graph"
    );
    Ok(context.batch)
}

/// Deterministic external id for an edge in `space` without an explicit one.
///
/// Identities in `space` contribute their external id alone; identities in
/// any other space are written as `space/externalId`, so ends that differ
/// only by space get distinct ids. Over-long ids are replaced by the sha256
/// hex digest of the same key.
pub fn edge_external_id(
    space: &str,
    edge_type: &InstanceId,
    start: &InstanceId,
    end: &InstanceId,
) -> String {
    let key = format!(
        "{}:{}:{}",
        qualified(space, edge_type),
        qualified(space, start),
        qualified(space, end)
    );
    if key.len() <= MAX_EXTERNAL_ID_LEN {
        return key;
    }
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

fn qualified(space: &str, id: &InstanceId) -> String {
    if id.space == space {
        id.external_id.clone()
    } else {
        format!("{}/{}", id.space, id.external_id)
    }
}

struct SerializeContext<'g> {
    graph: &'g WriteGraph,
    write_none: bool,
    visited: HashSet<InstanceId>,
    edges_seen: HashSet<InstanceId>,
    time_series_seen: HashSet<String>,
    batch: MutationBatch,
}

impl<'g> SerializeContext<'g> {
    fn new(graph: &'g WriteGraph, write_none: bool) -> Self {
        Self {
            graph,
            write_none,
            visited: HashSet::new(),
            edges_seen: HashSet::new(),
            time_series_seen: HashSet::new(),
            batch: MutationBatch::default(),
        }
    }

    fn walk(&mut self, roots: &[InstanceId]) -> Result<()> {
        let mut stack: Vec<InstanceId> = roots.iter().rev().cloned().collect();

        while let Some(id) = stack.pop() {
            if !self.visited.insert(id.clone()) {
                continue;
            }
            let node = self.lookup(&id)?;
            let children = self.visit(node)?;
            stack.extend(children.into_iter().rev());
        }
        Ok(())
    }

    fn lookup(&self, id: &InstanceId) -> Result<&'g NodeWrite> {
        self.graph
            .get(id)
            .ok_or_else(|| ClientError::Validation(format!("{id} is not part of the write graph")))
    }

    /// Emit the node and its edges; returns nested nodes in field order.
    fn visit(&mut self, node: &'g NodeWrite) -> Result<Vec<InstanceId>> {
        let descriptor = &node.descriptor;
        let mut properties = Map::new();
        let mut children = Vec::new();

        for (field, value) in &node.properties {
            let wire = descriptor.wire_name(field)?.to_string();
            match value {
                PropertyValue::Value(value) => {
                    properties.insert(wire, value.clone());
                }
                PropertyValue::Null if self.write_none => {
                    properties.insert(wire, Value::Null);
                }
                PropertyValue::Null => {}
                PropertyValue::TimeSeries(ts) => {
                    properties.insert(wire, Value::String(ts.external_id.clone()));
                    self.collect_time_series(ts);
                }
            }
        }

        for (field, relation) in &node.relations {
            let wire = descriptor.wire_name(field)?.to_string();
            match relation {
                Some(relation) => {
                    properties.insert(wire, relation.to_json());
                    for target in relation.targets() {
                        if let RelationValue::Node(id) = target {
                            self.lookup(id)?;
                            children.push(id.clone());
                        }
                    }
                }
                None if self.write_none => {
                    properties.insert(wire, Value::Null);
                }
                None => {}
            }
        }

        if !properties.is_empty() {
            self.batch.nodes.push(NodeApply {
                space: node.id.space.clone(),
                external_id: node.id.external_id.clone(),
                existing_version: node.existing_version,
                node_type: node.node_type.clone(),
                sources: vec![NodeOrEdgeData {
                    source: descriptor.view().clone(),
                    properties,
                }],
            });
        }

        for edge in &node.edges {
            let connection = descriptor.edge_connection(&edge.field)?;

            if let RelationValue::Node(far) = &edge.end {
                let far_view = self.lookup(far)?.descriptor.view();
                if !connection.accepts(far_view) {
                    return Err(ClientError::IncompatibleEdge {
                        edge_type: connection.edge_type.to_string(),
                        expected: connection
                            .end_views
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                        found: far_view.to_string(),
                    });
                }
                children.push(far.clone());
            }

            let (start, end) = match connection.direction {
                EdgeDirection::Outwards => (node.id.clone(), edge.end.id().clone()),
                EdgeDirection::Inwards => (edge.end.id().clone(), node.id.clone()),
            };
            let space = edge.space.clone().unwrap_or_else(|| node.id.space.clone());
            let external_id = match &edge.external_id {
                Some(external_id) => external_id.clone(),
                None => edge_external_id(&space, &connection.edge_type, &start, &end),
            };
            if !self
                .edges_seen
                .insert(InstanceId::new(space.as_str(), external_id.as_str()))
            {
                continue;
            }

            let sources = if edge.properties.is_empty() {
                Vec::new()
            } else {
                let view = connection.edge_view.as_ref().ok_or_else(|| {
                    ClientError::Validation(format!(
                        "edge '{}' on {} has properties but no edge view",
                        edge.field,
                        descriptor.view()
                    ))
                })?;
                vec![NodeOrEdgeData {
                    source: view.clone(),
                    properties: edge
                        .properties
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect(),
                }]
            };

            self.batch.edges.push(EdgeApply {
                space,
                external_id,
                existing_version: edge.existing_version,
                edge_type: connection.edge_type.clone(),
                start_node: start,
                end_node: end,
                sources,
            });
        }

        Ok(children)
    }

    fn collect_time_series(&mut self, ts: &TimeSeriesWrite) {
        if self.time_series_seen.insert(ts.external_id.clone()) {
            self.batch.time_series.push(ts.clone());
        }
    }
}
