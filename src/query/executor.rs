//! Runs query steps in order, one request sequence per step.
//!
//! Each step reads the identities of its upstream step's rows as its join
//! key, so steps run strictly one after another. The first failing request
//! fails the whole query.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use super::builder::{JoinKind, QueryBuilder, QueryStep, RetrieveDepth};
use crate::api::{collect_pages, source_selector};
use crate::error::{ClientError, Result};
use crate::filters::FilterNode;
use crate::models::{
    EdgeDirection, Instance, InstanceId, InstanceType, PropertyPath, ViewReference,
};
use crate::transport::{
    InstanceRef, ListRequest, MAX_IDS_PER_REQUEST, RetrieveRequest, Transport,
};

/// Rows fetched per step name.
#[derive(Debug, Clone, Default)]
pub struct StepResults {
    rows: HashMap<String, Vec<Instance>>,
}

impl StepResults {
    pub fn rows(&self, step: &str) -> &[Instance] {
        self.rows.get(step).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, step: &str) -> bool {
        self.rows.contains_key(step)
    }
}

/// Run every step the requested depth needs.
pub async fn run(builder: &QueryBuilder, transport: &dyn Transport) -> Result<StepResults> {
    let mut results = StepResults::default();
    let depth = builder.retrieve_depth();
    let root_name = builder.root().name.as_str();

    for step in builder.steps() {
        if !needed(step, depth, root_name) {
            continue;
        }
        let rows = match &step.link {
            None => run_root(step, transport).await?,
            Some(link) => {
                let upstream = builder
                    .step(&link.from)
                    .ok_or_else(|| ClientError::UnknownStep(link.from.clone()))?;
                let upstream_rows = results.rows(&link.from);
                run_linked(step, &link.join, upstream, upstream_rows, transport).await?
            }
        };
        debug!(step = %step.name, rows = rows.len(), "Query step complete");
        results.rows.insert(step.name.clone(), rows);
    }

    Ok(results)
}

fn needed(step: &QueryStep, depth: RetrieveDepth, root: &str) -> bool {
    match (depth, step.join()) {
        (_, None) => true,
        (RetrieveDepth::Skip, Some(_)) => false,
        (RetrieveDepth::Identifier, Some(JoinKind::ReverseRelation { .. } | JoinKind::Edge { .. })) => {
            step.upstream() == Some(root)
        }
        (RetrieveDepth::Identifier, Some(_)) => false,
        (RetrieveDepth::Full, Some(_)) => true,
    }
}

fn node_view(step: &QueryStep) -> Result<&ViewReference> {
    step.view
        .as_ref()
        .ok_or_else(|| ClientError::Validation(format!("step '{}' has no view", step.name)))
}

async fn run_root(step: &QueryStep, transport: &dyn Transport) -> Result<Vec<Instance>> {
    let scope = match step.instance_type {
        // Instances with no data in the view are excluded.
        InstanceType::Node => Some(FilterNode::has_data(vec![node_view(step)?.clone()])),
        // Edges are scoped by type alone; they may carry no properties.
        InstanceType::Edge => step
            .edge_type
            .as_ref()
            .map(|edge_type| FilterNode::equals(PropertyPath::edge("type"), edge_type.to_json())),
    };
    let request = ListRequest {
        instance_type: step.instance_type,
        filter: FilterNode::all([step.filter.clone(), scope]),
        sort: step.sort.clone(),
        cursor: None,
        limit: 0,
        sources: step
            .view
            .iter()
            .map(|view| source_selector(view, &step.select))
            .collect(),
    };
    collect_pages(transport, request, step.limit).await
}

async fn run_linked(
    step: &QueryStep,
    join: &JoinKind,
    upstream: &QueryStep,
    upstream_rows: &[Instance],
    transport: &dyn Transport,
) -> Result<Vec<Instance>> {
    if upstream_rows.is_empty() {
        return Ok(Vec::new());
    }

    match join {
        JoinKind::DirectRelation { property } => {
            let upstream_view = node_view(upstream)?;
            let ids = unique(
                upstream_rows
                    .iter()
                    .flat_map(|row| row.relation_targets(upstream_view, property)),
            );
            retrieve(step, &ids, transport).await
        }
        JoinKind::ReverseRelation { property } => {
            let view = node_view(step)?;
            let ids = unique(upstream_rows.iter().map(Instance::id));
            let path = view.property_path(property);
            let rows = list_chunked(step, &ids, transport, |chunk| {
                FilterNode::all([
                    step.filter.clone(),
                    Some(FilterNode::in_values(path.clone(), chunk)),
                    Some(FilterNode::has_data(vec![view.clone()])),
                ])
            })
            .await?;
            Ok(dedup_rows(rows))
        }
        JoinKind::Edge {
            edge_type,
            direction,
        } => {
            let ids = unique(upstream_rows.iter().map(Instance::id));
            let side = match direction {
                EdgeDirection::Outwards => "startNode",
                EdgeDirection::Inwards => "endNode",
            };
            let rows = list_chunked(step, &ids, transport, |chunk| {
                FilterNode::all([
                    Some(FilterNode::equals(PropertyPath::edge("type"), edge_type.to_json())),
                    Some(FilterNode::in_values(PropertyPath::edge(side), chunk)),
                    step.filter.clone(),
                ])
            })
            .await?;
            Ok(dedup_rows(rows))
        }
        JoinKind::EdgeTarget => {
            let direction = match upstream.join() {
                Some(JoinKind::Edge { direction, .. }) => *direction,
                None if upstream.instance_type == InstanceType::Edge => EdgeDirection::Outwards,
                _ => {
                    return Err(ClientError::Validation(format!(
                        "step '{}' must follow an edge step",
                        step.name
                    )));
                }
            };
            let ids = unique(upstream_rows.iter().filter_map(|edge| match direction {
                EdgeDirection::Outwards => edge.end_node.clone(),
                EdgeDirection::Inwards => edge.start_node.clone(),
            }));
            retrieve(step, &ids, transport).await
        }
    }
}

/// Fetch nodes by identity, keeping only those with data in the step's view.
async fn retrieve(step: &QueryStep, ids: &[InstanceId], transport: &dyn Transport) -> Result<Vec<Instance>> {
    let view = node_view(step)?;
    let mut rows = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
        let request = RetrieveRequest {
            items: chunk.iter().map(InstanceRef::node).collect(),
            sources: vec![source_selector(view, &step.select)],
        };
        let items = transport.retrieve(&request).await?;
        rows.extend(items.into_iter().filter(|row| row.properties_for(view).is_some()));
    }
    Ok(rows)
}

/// List rows whose join property matches `ids`, at most
/// [`MAX_IDS_PER_REQUEST`] identities per `in` filter.
async fn list_chunked<F>(
    step: &QueryStep,
    ids: &[InstanceId],
    transport: &dyn Transport,
    filter_for: F,
) -> Result<Vec<Instance>>
where
    F: Fn(Vec<Value>) -> Option<FilterNode>,
{
    let mut rows: Vec<Instance> = Vec::new();
    for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
        let remaining = match step.limit {
            Some(limit) if rows.len() >= limit => break,
            Some(limit) => Some(limit - rows.len()),
            None => None,
        };
        let filter = filter_for(chunk.iter().map(InstanceId::to_json).collect());
        let mut request = match step.instance_type {
            InstanceType::Node => ListRequest::nodes(filter),
            InstanceType::Edge => ListRequest::edges(filter),
        };
        request.sort = step.sort.clone();
        if let Some(view) = &step.view {
            request = request.with_source(source_selector(view, &step.select));
        }
        rows.extend(collect_pages(transport, request, remaining).await?);
    }
    Ok(rows)
}

fn unique<I: IntoIterator<Item = InstanceId>>(ids: I) -> Vec<InstanceId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn dedup_rows(rows: Vec<Instance>) -> Vec<Instance> {
    let mut seen = HashSet::new();
    rows.into_iter().filter(|row| seen.insert(row.id())).collect()
}
