//! In-memory transport for integration tests.
//!
//! Evaluates wire filters against stored instances, hands out offset cursors
//! and records every request so tests can assert on what was sent.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use viewgraph::api::{AggregateItem, AggregatedValue, AggregationKind};
use viewgraph::error::{ClientError, Result};
use viewgraph::filters::FilterNode;
use viewgraph::models::{Instance, InstanceId, InstanceType, PropertyPath, ViewReference};
use viewgraph::transport::{
    AggregateRequest, ApplyRequest, InstanceRef, ListRequest, ListResponse, RetrieveRequest,
    SearchRequest, Transport,
};
use viewgraph::write::{ApplyResult, InstanceApply, InstanceResult};

#[derive(Default)]
pub struct FakeTransport {
    instances: Mutex<Vec<Instance>>,
    /// Server-side page cap, below whatever the client asks for.
    page_cap: Option<usize>,
    /// Return `page_cap` items even when the client asked for fewer.
    overshoot: bool,
    /// Fail every list call after this many succeeded.
    fail_list_after: Option<usize>,
    pub list_requests: Mutex<Vec<ListRequest>>,
    pub retrieve_requests: Mutex<Vec<RetrieveRequest>>,
    pub search_requests: Mutex<Vec<SearchRequest>>,
    pub aggregate_requests: Mutex<Vec<AggregateRequest>>,
    pub apply_requests: Mutex<Vec<ApplyRequest>>,
    pub delete_requests: Mutex<Vec<Vec<InstanceRef>>>,
}

impl FakeTransport {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self {
            instances: Mutex::new(instances),
            ..Self::default()
        }
    }

    pub fn with_page_cap(mut self, cap: usize) -> Self {
        self.page_cap = Some(cap);
        self
    }

    pub fn overshooting(mut self) -> Self {
        self.overshoot = true;
        self
    }

    pub fn failing_list_after(mut self, calls: usize) -> Self {
        self.fail_list_after = Some(calls);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_requests.lock().unwrap().len()
    }

    fn matching(&self, instance_type: InstanceType, filter: Option<&FilterNode>) -> Vec<Instance> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.instance_type == instance_type)
            .filter(|i| filter.is_none_or(|f| evaluate(f, i)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn list(&self, request: &ListRequest) -> Result<ListResponse> {
        let calls = {
            let mut requests = self.list_requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if let Some(limit) = self.fail_list_after {
            if calls > limit {
                return Err(ClientError::Remote {
                    status: 500,
                    body: "list failed".into(),
                });
            }
        }

        let items = self.matching(request.instance_type, request.filter.as_ref());
        let offset: usize = request
            .cursor
            .as_deref()
            .and_then(|c| c.strip_prefix("offset:"))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        let page_size = match (self.page_cap, self.overshoot) {
            (Some(cap), true) => cap,
            (Some(cap), false) => cap.min(request.limit),
            (None, _) => request.limit,
        };
        let end = (offset + page_size).min(items.len());
        let page = items[offset.min(end)..end].to_vec();
        let next_cursor = (end < items.len()).then(|| format!("offset:{end}"));
        Ok(ListResponse {
            items: page,
            next_cursor,
        })
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Instance>> {
        self.search_requests.lock().unwrap().push(request.clone());
        let query = request.query.clone().unwrap_or_default().to_lowercase();
        let items = self
            .matching(request.instance_type, request.filter.as_ref())
            .into_iter()
            .filter(|i| {
                let Some(props) = i.properties_for(&request.view) else {
                    return false;
                };
                query.is_empty()
                    || props.iter().any(|(name, value)| {
                        let selected = request
                            .properties
                            .as_ref()
                            .is_none_or(|only| only.contains(name));
                        selected
                            && value
                                .as_str()
                                .is_some_and(|s| s.to_lowercase().contains(&query))
                    })
            })
            .take(request.limit)
            .collect();
        Ok(items)
    }

    async fn aggregate(&self, request: &AggregateRequest) -> Result<Vec<AggregateItem>> {
        self.aggregate_requests.lock().unwrap().push(request.clone());
        let items: Vec<Instance> = self
            .matching(request.instance_type, request.filter.as_ref())
            .into_iter()
            .filter(|i| i.properties_for(&request.view).is_some())
            .collect();

        let compute = |rows: &[&Instance]| -> Vec<AggregatedValue> {
            request
                .aggregates
                .iter()
                .map(|aggregation| {
                    let numbers: Vec<f64> = rows
                        .iter()
                        .filter_map(|i| i.property(&request.view, &aggregation.property))
                        .filter_map(Value::as_f64)
                        .collect();
                    let value = match aggregation.kind {
                        AggregationKind::Count => Some(rows.len() as f64),
                        AggregationKind::Sum => Some(numbers.iter().sum()),
                        AggregationKind::Avg if numbers.is_empty() => None,
                        AggregationKind::Avg => {
                            Some(numbers.iter().sum::<f64>() / numbers.len() as f64)
                        }
                        AggregationKind::Min => numbers.iter().copied().reduce(f64::min),
                        AggregationKind::Max => numbers.iter().copied().reduce(f64::max),
                    };
                    AggregatedValue {
                        kind: aggregation.kind,
                        property: aggregation.property.clone(),
                        value,
                    }
                })
                .collect()
        };

        if request.group_by.is_empty() {
            let rows: Vec<&Instance> = items.iter().collect();
            return Ok(vec![AggregateItem {
                group: None,
                aggregates: compute(&rows),
            }]);
        }

        let mut groups: Vec<(serde_json::Map<String, Value>, Vec<&Instance>)> = Vec::new();
        for item in &items {
            let key: serde_json::Map<String, Value> = request
                .group_by
                .iter()
                .map(|p| {
                    (
                        p.clone(),
                        item.property(&request.view, p).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, rows)) => rows.push(item),
                None => groups.push((key, vec![item])),
            }
        }
        Ok(groups
            .into_iter()
            .map(|(group, rows)| AggregateItem {
                group: Some(group),
                aggregates: compute(&rows),
            })
            .collect())
    }

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<Vec<Instance>> {
        self.retrieve_requests.lock().unwrap().push(request.clone());
        let instances = self.instances.lock().unwrap();
        Ok(request
            .items
            .iter()
            .filter_map(|r| {
                instances
                    .iter()
                    .find(|i| i.instance_type == r.instance_type && i.id() == r.id())
                    .cloned()
            })
            .collect())
    }

    async fn apply(&self, request: &ApplyRequest) -> Result<ApplyResult> {
        self.apply_requests.lock().unwrap().push(request.clone());
        let mut result = ApplyResult {
            time_series: request
                .time_series
                .iter()
                .map(|ts| ts.external_id.clone())
                .collect(),
            ..ApplyResult::default()
        };
        for item in &request.items {
            let (instance_type, id) = match item {
                InstanceApply::Node(node) => (InstanceType::Node, node.id()),
                InstanceApply::Edge(edge) => (InstanceType::Edge, edge.id()),
            };
            let outcome = InstanceResult {
                instance_type,
                space: id.space,
                external_id: id.external_id,
                version: 1,
                was_modified: true,
                created_time: 0,
                last_updated_time: 0,
            };
            match instance_type {
                InstanceType::Node => result.nodes.push(outcome),
                InstanceType::Edge => result.edges.push(outcome),
            }
        }
        Ok(result)
    }

    async fn delete(&self, items: &[InstanceRef]) -> Result<Vec<InstanceRef>> {
        self.delete_requests.lock().unwrap().push(items.to_vec());
        let mut instances = self.instances.lock().unwrap();
        let mut deleted = Vec::new();
        for item in items {
            let before = instances.len();
            instances.retain(|i| !(i.instance_type == item.instance_type && i.id() == item.id()));
            if instances.len() < before {
                deleted.push(item.clone());
            }
        }
        Ok(deleted)
    }
}

/// Value addressed by a property path, in wire form.
fn lookup(path: &PropertyPath, instance: &Instance) -> Option<Value> {
    match path.segments() {
        [scope, property] if scope == "node" || scope == "edge" => match property.as_str() {
            "space" => Some(json!(instance.space)),
            "externalId" => Some(json!(instance.external_id)),
            "type" => instance.type_ref.as_ref().map(InstanceId::to_json),
            "startNode" => instance.start_node.as_ref().map(InstanceId::to_json),
            "endNode" => instance.end_node.as_ref().map(InstanceId::to_json),
            _ => None,
        },
        [space, view, property] => instance
            .properties
            .get(space)
            .and_then(|views| views.get(view))
            .and_then(|props| props.get(property))
            .filter(|v| !v.is_null())
            .cloned(),
        _ => None,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Equality, where a list-valued property matches if any element does.
fn matches_value(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| item == expected),
        other => other == expected,
    }
}

pub fn evaluate(filter: &FilterNode, instance: &Instance) -> bool {
    match filter {
        FilterNode::Equals(f) => {
            lookup(&f.property, instance).is_some_and(|v| matches_value(&v, &f.value))
        }
        FilterNode::In(f) => lookup(&f.property, instance)
            .is_some_and(|v| f.values.iter().any(|expected| matches_value(&v, expected))),
        FilterNode::Prefix(f) => lookup(&f.property, instance).is_some_and(|v| {
            matches!((v.as_str(), f.value.as_str()), (Some(s), Some(p)) if s.starts_with(p))
        }),
        FilterNode::Range(f) => lookup(&f.property, instance).is_some_and(|v| {
            let check = |bound: &Option<Value>, ok: fn(Ordering) -> bool| {
                bound
                    .as_ref()
                    .is_none_or(|b| compare(&v, b).is_some_and(ok))
            };
            check(&f.gt, Ordering::is_gt)
                && check(&f.gte, Ordering::is_ge)
                && check(&f.lt, Ordering::is_lt)
                && check(&f.lte, Ordering::is_le)
        }),
        FilterNode::And(children) => children.iter().all(|c| evaluate(c, instance)),
        FilterNode::Or(children) => children.iter().any(|c| evaluate(c, instance)),
        FilterNode::HasData(views) => views
            .iter()
            .any(|view| instance.properties_for(view).is_some()),
    }
}

pub fn node(view: &ViewReference, external_id: &str, properties: Value) -> Instance {
    serde_json::from_value(json!({
        "instanceType": "node",
        "space": view.space,
        "externalId": external_id,
        "version": 1,
        "properties": {
            view.space.clone(): {
                view.identifier(): properties
            }
        }
    }))
    .unwrap()
}

pub fn edge(space: &str, external_id: &str, edge_type: &InstanceId, start: &InstanceId, end: &InstanceId) -> Instance {
    serde_json::from_value(json!({
        "instanceType": "edge",
        "space": space,
        "externalId": external_id,
        "version": 1,
        "type": edge_type.to_json(),
        "startNode": start.to_json(),
        "endNode": end.to_json(),
    }))
    .unwrap()
}
