//! Write side: object graphs to batched node/edge applies.
//!
//! Callers build a [`WriteGraph`], pick the roots to write and hand both to
//! [`WriteApi::apply`]. The serializer flattens everything reachable from the
//! roots into one deduplicated [`MutationBatch`], which is then sent in
//! chunks the service accepts.

mod graph;
mod serializer;

pub use graph::{DirectRelation, EdgeWrite, NodeWrite, PropertyValue, RelationValue, WriteGraph};
pub use serializer::{edge_external_id, serialize};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{InstanceId, InstanceType, ViewReference};
use crate::transport::{
    ApplyRequest, InstanceRef, MAX_APPLY_ITEMS, MAX_IDS_PER_REQUEST, Transport,
};

/// Properties written to one view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeOrEdgeData {
    pub source: ViewReference,
    pub properties: Map<String, Value>,
}

/// Node create/update payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeApply {
    pub space: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_version: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<InstanceId>,
    pub sources: Vec<NodeOrEdgeData>,
}

impl NodeApply {
    pub fn id(&self) -> InstanceId {
        InstanceId::new(self.space.as_str(), self.external_id.as_str())
    }
}

/// Edge create/update payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeApply {
    pub space: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_version: Option<i64>,
    #[serde(rename = "type")]
    pub edge_type: InstanceId,
    pub start_node: InstanceId,
    pub end_node: InstanceId,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<NodeOrEdgeData>,
}

impl EdgeApply {
    pub fn id(&self) -> InstanceId {
        InstanceId::new(self.space.as_str(), self.external_id.as_str())
    }
}

/// One item of an apply request, tagged by `instanceType`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "instanceType", rename_all = "lowercase")]
pub enum InstanceApply {
    Node(NodeApply),
    Edge(EdgeApply),
}

/// A time series referenced from a node property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesWrite {
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_string: bool,
    pub is_step: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TimeSeriesWrite {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            name: None,
            unit: None,
            description: None,
            is_string: false,
            is_step: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Flattened output of the serializer.
///
/// Each node identity and each edge identity appears at most once, in
/// visitation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    pub nodes: Vec<NodeApply>,
    pub edges: Vec<EdgeApply>,
    pub time_series: Vec<TimeSeriesWrite>,
}

impl MutationBatch {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.time_series.is_empty()
    }

    /// Nodes followed by edges.
    pub fn items(self) -> Vec<InstanceApply> {
        self.nodes
            .into_iter()
            .map(InstanceApply::Node)
            .chain(self.edges.into_iter().map(InstanceApply::Edge))
            .collect()
    }
}

/// Options for [`WriteApi::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Replace all properties instead of merging; applies to nodes and edges.
    pub replace: bool,
    /// Send explicit nulls for properties set to null.
    pub write_none: bool,
}

impl ApplyOptions {
    pub fn replace() -> Self {
        Self {
            replace: true,
            ..Self::default()
        }
    }

    pub fn write_none(mut self, write_none: bool) -> Self {
        self.write_none = write_none;
        self
    }
}

/// Per-instance outcome of an apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResult {
    pub instance_type: InstanceType,
    pub space: String,
    pub external_id: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub was_modified: bool,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub last_updated_time: i64,
}

/// Combined outcome of all requests an apply needed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyResult {
    pub nodes: Vec<InstanceResult>,
    pub edges: Vec<InstanceResult>,
    /// External ids of the time series that were ensured.
    pub time_series: Vec<String>,
}

impl ApplyResult {
    fn extend(&mut self, other: ApplyResult) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self.time_series.extend(other.time_series);
    }
}

/// Writes object graphs through a [`Transport`].
pub struct WriteApi<'a> {
    transport: &'a dyn Transport,
}

impl<'a> WriteApi<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Serialize the graph reachable from `roots` and send it.
    pub async fn apply(
        &self,
        graph: &WriteGraph,
        roots: &[InstanceId],
        options: ApplyOptions,
    ) -> Result<ApplyResult> {
        let batch = serialize(graph, roots, options.write_none)?;
        self.apply_batch(batch, options.replace).await
    }

    /// Apply with merge semantics.
    pub async fn upsert(&self, graph: &WriteGraph, roots: &[InstanceId]) -> Result<ApplyResult> {
        self.apply(graph, roots, ApplyOptions::default()).await
    }

    /// Send an already serialized batch, split into requests of at most
    /// [`MAX_APPLY_ITEMS`] items. Time series travel with the first request.
    pub async fn apply_batch(&self, batch: MutationBatch, replace: bool) -> Result<ApplyResult> {
        if batch.is_empty() {
            debug!("Nothing to apply");
            return Ok(ApplyResult::default());
        }

        let node_count = batch.nodes.len();
        let edge_count = batch.edges.len();
        let mut time_series = batch.time_series.clone();
        let items = batch.items();

        let mut result = ApplyResult::default();
        let mut chunks: Vec<Vec<InstanceApply>> = items
            .chunks(MAX_APPLY_ITEMS)
            .map(<[InstanceApply]>::to_vec)
            .collect();
        if chunks.is_empty() {
            chunks.push(Vec::new());
        }

        for (index, chunk) in chunks.into_iter().enumerate() {
            debug!(chunk = index, items = chunk.len(), "Applying chunk");
            let request = ApplyRequest {
                items: chunk,
                replace,
                time_series: std::mem::take(&mut time_series),
            };
            result.extend(self.transport.apply(&request).await?);
        }

        info!(
            nodes = node_count,
            edges = edge_count,
            time_series = result.time_series.len(),
            replace = replace,
            "Applied instances"
        );
        Ok(result)
    }

    /// Delete nodes or edges by identity, returning what the service deleted.
    pub async fn delete(
        &self,
        ids: &[InstanceId],
        instance_type: InstanceType,
    ) -> Result<Vec<InstanceId>> {
        let mut deleted = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let refs: Vec<InstanceRef> = chunk
                .iter()
                .map(|id| match instance_type {
                    InstanceType::Node => InstanceRef::node(id),
                    InstanceType::Edge => InstanceRef::edge(id),
                })
                .collect();
            let response = self.transport.delete(&refs).await?;
            deleted.extend(response.iter().map(InstanceRef::id));
        }
        info!(requested = ids.len(), deleted = deleted.len(), "Deleted instances");
        Ok(deleted)
    }
}
