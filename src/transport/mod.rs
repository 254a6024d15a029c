//! Transport boundary
//!
//! The core never talks HTTP itself. Every read and write goes through the
//! [`Transport`] trait, one call per request/response cycle, and the request
//! and response types here are the wire contract of the instances endpoints.
//! [`HttpTransport`] is the reqwest-backed implementation; tests substitute
//! an in-memory fake.

mod http;
mod rate_limiter;

pub use http::HttpTransport;
pub use rate_limiter::{RateLimitConfig, RateLimitedClient, RetryConfig, retry_async};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::{AggregateItem, Aggregation};
use crate::error::Result;
use crate::filters::FilterNode;
use crate::models::{Instance, InstanceId, InstanceSort, InstanceType, ViewReference};
use crate::write::{ApplyResult, InstanceApply, TimeSeriesWrite};

/// Largest page the list endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Largest number of identities per retrieve/delete call and per `in` filter.
pub const MAX_IDS_PER_REQUEST: usize = 1000;

/// Largest number of node/edge applies per apply call.
pub const MAX_APPLY_ITEMS: usize = 1000;

/// A view whose properties should be returned, optionally narrowed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSelector {
    pub source: ViewReference,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
}

impl SourceSelector {
    /// All properties of `view`.
    pub fn all(view: &ViewReference) -> Self {
        Self {
            source: view.clone(),
            properties: vec!["*".to_string()],
        }
    }

    pub fn only(view: &ViewReference, properties: Vec<String>) -> Self {
        Self {
            source: view.clone(),
            properties,
        }
    }
}

/// Body of `POST /models/instances/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub instance_type: InstanceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<InstanceSort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub limit: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceSelector>,
}

impl ListRequest {
    pub fn nodes(filter: Option<FilterNode>) -> Self {
        Self {
            instance_type: InstanceType::Node,
            filter,
            sort: Vec::new(),
            cursor: None,
            limit: MAX_PAGE_SIZE,
            sources: Vec::new(),
        }
    }

    pub fn edges(filter: Option<FilterNode>) -> Self {
        Self {
            instance_type: InstanceType::Edge,
            ..Self::nodes(filter)
        }
    }

    pub fn with_source(mut self, source: SourceSelector) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sort(mut self, sort: Vec<InstanceSort>) -> Self {
        self.sort = sort;
        self
    }
}

/// One page of list results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub items: Vec<Instance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Body of `POST /models/instances/search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub view: ViewReference,
    pub instance_type: InstanceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Text properties to match; omitted means all text properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterNode>,
    pub limit: usize,
}

/// Body of `POST /models/instances/aggregate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    pub view: ViewReference,
    pub instance_type: InstanceType,
    pub aggregates: Vec<Aggregation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    pub limit: usize,
}

/// Identity of an instance together with its kind, as used by retrieve and
/// delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRef {
    pub instance_type: InstanceType,
    pub space: String,
    pub external_id: String,
}

impl InstanceRef {
    pub fn node(id: &InstanceId) -> Self {
        Self {
            instance_type: InstanceType::Node,
            space: id.space.clone(),
            external_id: id.external_id.clone(),
        }
    }

    pub fn edge(id: &InstanceId) -> Self {
        Self {
            instance_type: InstanceType::Edge,
            ..Self::node(id)
        }
    }

    pub fn id(&self) -> InstanceId {
        InstanceId::new(self.space.as_str(), self.external_id.as_str())
    }
}

/// Body of `POST /models/instances/byids`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveRequest {
    pub items: Vec<InstanceRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceSelector>,
}

/// Body of `POST /models/instances`.
///
/// Time series referenced by the instances travel alongside and are created
/// by the transport before the instances are applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub items: Vec<InstanceApply>,
    pub replace: bool,
    #[serde(skip)]
    pub time_series: Vec<TimeSeriesWrite>,
}

/// The remote data modeling service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// One page of nodes or edges.
    async fn list(&self, request: &ListRequest) -> Result<ListResponse>;

    /// Free-text search; a single bounded result set.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Instance>>;

    async fn aggregate(&self, request: &AggregateRequest) -> Result<Vec<AggregateItem>>;

    /// Instances by identity. Identities without a match are omitted.
    async fn retrieve(&self, request: &RetrieveRequest) -> Result<Vec<Instance>>;

    async fn apply(&self, request: &ApplyRequest) -> Result<ApplyResult>;

    /// Delete instances, returning the identities the service deleted.
    async fn delete(&self, items: &[InstanceRef]) -> Result<Vec<InstanceRef>>;
}
