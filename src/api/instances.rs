//! List, search, aggregate and retrieve over one view
//!
//! Each entry point returns a small query builder in the same consuming style:
//!
//! ```rust,ignore
//! let api = InstancesApi::new(&transport);
//! let products = api
//!     .list(&product_view)
//!     .filter(&filters)
//!     .sort(vec![InstanceSort::ascending(product_view.property_path("name"))])
//!     .limit(250)
//!     .fetch_all()
//!     .await?;
//! ```
//!
//! `list` follows server cursors page by page until the limit is reached or
//! the server stops issuing cursors. Any failing page fails the whole call.

use tracing::debug;

use super::aggregate::{AggregateItem, AggregateResult, AggregatedValue, Aggregation, GroupedAggregate};
use crate::error::{ClientError, Result};
use crate::filters::{Dump, FilterNode};
use crate::models::{Instance, InstanceId, InstanceSort, InstanceType, ViewReference};
use crate::transport::{
    AggregateRequest, InstanceRef, ListRequest, MAX_IDS_PER_REQUEST, MAX_PAGE_SIZE,
    RetrieveRequest, SearchRequest, SourceSelector, Transport,
};

/// Items returned when the caller does not set a limit.
pub const DEFAULT_LIMIT: usize = 25;

/// One page of a list, with the cursor for the next one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Instance>,
    pub next_cursor: Option<String>,
}

/// Read entry points over a [`Transport`].
#[derive(Clone, Copy)]
pub struct InstancesApi<'a> {
    transport: &'a dyn Transport,
}

impl<'a> InstancesApi<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    pub fn list(&self, view: &ViewReference) -> ListQuery<'a> {
        ListQuery::new(self.transport, view.clone())
    }

    pub fn search(&self, view: &ViewReference, query: impl Into<String>) -> SearchQuery<'a> {
        SearchQuery::new(self.transport, view.clone(), query.into())
    }

    pub fn aggregate(&self, view: &ViewReference, aggregations: Vec<Aggregation>) -> AggregateQuery<'a> {
        AggregateQuery::new(self.transport, view.clone(), aggregations)
    }

    /// Nodes by identity, with their properties in `view`.
    ///
    /// Identities the service does not know are left out of the result.
    pub async fn retrieve(&self, view: &ViewReference, ids: &[InstanceId]) -> Result<Vec<Instance>> {
        let mut found = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let request = RetrieveRequest {
                items: chunk.iter().map(InstanceRef::node).collect(),
                sources: vec![SourceSelector::all(view)],
            };
            let items = self.transport.retrieve(&request).await?;
            debug!(view = %view, requested = chunk.len(), found = items.len(), "Retrieved instances");
            found.extend(items);
        }
        Ok(found)
    }

    /// A single node by identity, or `None` if it does not exist.
    pub async fn retrieve_one(&self, view: &ViewReference, id: &InstanceId) -> Result<Option<Instance>> {
        let items = self.retrieve(view, std::slice::from_ref(id)).await?;
        Ok(items.into_iter().find(|item| item.id() == *id))
    }
}

/// Builder for a cursor-paginated list call.
pub struct ListQuery<'a> {
    transport: &'a dyn Transport,
    view: ViewReference,
    instance_type: InstanceType,
    filter: Option<FilterNode>,
    sort: Vec<InstanceSort>,
    properties: Vec<String>,
    limit: Option<usize>,
}

impl<'a> ListQuery<'a> {
    fn new(transport: &'a dyn Transport, view: ViewReference) -> Self {
        Self {
            transport,
            view,
            instance_type: InstanceType::Node,
            filter: None,
            sort: Vec::new(),
            properties: Vec::new(),
            limit: Some(DEFAULT_LIMIT),
        }
    }

    /// Set the filter
    pub fn filter(mut self, filter: &dyn Dump) -> Self {
        self.filter = filter.dump();
        self
    }

    pub fn sort(mut self, sort: Vec<InstanceSort>) -> Self {
        self.sort = sort;
        self
    }

    /// Only return these properties (wire names) instead of all of them.
    pub fn select(mut self, properties: Vec<String>) -> Self {
        self.properties = properties;
        self
    }

    /// Cap on the total number of items across pages.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Follow cursors until the server has no more pages.
    pub fn unbounded(mut self) -> Self {
        self.limit = None;
        self
    }

    /// List edges instead of nodes.
    pub fn edges(mut self) -> Self {
        self.instance_type = InstanceType::Edge;
        self
    }

    fn request(&self, cursor: Option<String>, page_size: usize) -> ListRequest {
        // Instances with no data in the view are excluded.
        let filter = FilterNode::all([
            self.filter.clone(),
            Some(FilterNode::has_data(vec![self.view.clone()])),
        ]);
        ListRequest {
            instance_type: self.instance_type,
            filter,
            sort: self.sort.clone(),
            cursor,
            limit: page_size,
            sources: vec![source_selector(&self.view, &self.properties)],
        }
    }

    /// Fetch a single page starting at `cursor`.
    ///
    /// The page holds at most `min(limit, 1000)` items; the caller drives the
    /// loop with the returned cursor.
    pub async fn iterate(&self, cursor: Option<String>) -> Result<Page> {
        let page_size = self.limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let response = self.transport.list(&self.request(cursor, page_size)).await?;
        Ok(Page {
            items: response.items,
            next_cursor: response.next_cursor,
        })
    }

    /// Fetch pages until the limit is reached or the cursor runs out.
    pub async fn fetch_all(self) -> Result<Vec<Instance>> {
        let request = self.request(None, MAX_PAGE_SIZE);
        collect_pages(self.transport, request, self.limit).await
    }

    /// Fetch at most one item.
    pub async fn fetch_optional(self) -> Result<Option<Instance>> {
        let items = self.limit(1).fetch_all().await?;
        Ok(items.into_iter().next())
    }
}

pub(crate) fn source_selector(view: &ViewReference, properties: &[String]) -> SourceSelector {
    if properties.is_empty() {
        SourceSelector::all(view)
    } else {
        SourceSelector::only(view, properties.to_vec())
    }
}

/// Drive `request` through server cursors, keeping at most `limit` items.
///
/// Each page asks for no more than what is still missing, and the final page
/// is trimmed if the server returns more.
pub(crate) async fn collect_pages(
    transport: &dyn Transport,
    mut request: ListRequest,
    limit: Option<usize>,
) -> Result<Vec<Instance>> {
    if limit == Some(0) {
        return Ok(Vec::new());
    }

    let mut items: Vec<Instance> = Vec::new();
    let mut pages = 0usize;

    loop {
        let remaining = limit.map(|limit| limit - items.len());
        request.limit = remaining.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let response = transport.list(&request).await?;
        pages += 1;
        debug!(
            instance_type = ?request.instance_type,
            page = pages,
            items = response.items.len(),
            has_more = response.next_cursor.is_some(),
            "Fetched list page"
        );

        items.extend(response.items);
        if let Some(limit) = limit {
            if items.len() >= limit {
                items.truncate(limit);
                break;
            }
        }
        match response.next_cursor {
            Some(next) => request.cursor = Some(next),
            None => break,
        }
    }

    Ok(items)
}

/// Builder for a free-text search call.
pub struct SearchQuery<'a> {
    transport: &'a dyn Transport,
    view: ViewReference,
    query: String,
    properties: Option<Vec<String>>,
    filter: Option<FilterNode>,
    limit: Option<usize>,
}

impl<'a> SearchQuery<'a> {
    fn new(transport: &'a dyn Transport, view: ViewReference, query: String) -> Self {
        Self {
            transport,
            view,
            query,
            properties: None,
            filter: None,
            limit: Some(DEFAULT_LIMIT),
        }
    }

    /// Restrict matching to these text properties (wire names).
    pub fn properties(mut self, properties: Vec<String>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn filter(mut self, filter: &dyn Dump) -> Self {
        self.filter = filter.dump();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Ask for the largest result set the service returns.
    pub fn unbounded(mut self) -> Self {
        self.limit = None;
        self
    }

    pub async fn fetch_all(self) -> Result<Vec<Instance>> {
        let limit = self.limit.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let request = SearchRequest {
            view: self.view,
            instance_type: InstanceType::Node,
            query: (!self.query.is_empty()).then_some(self.query),
            properties: self.properties,
            filter: self.filter,
            limit,
        };
        let mut items = self.transport.search(&request).await?;
        items.truncate(limit);
        debug!(view = %request.view, items = items.len(), "Search complete");
        Ok(items)
    }
}

/// Builder for an aggregate call.
pub struct AggregateQuery<'a> {
    transport: &'a dyn Transport,
    view: ViewReference,
    aggregations: Vec<Aggregation>,
    group_by: Vec<String>,
    filter: Option<FilterNode>,
    query: Option<String>,
    properties: Option<Vec<String>>,
    limit: usize,
}

impl<'a> AggregateQuery<'a> {
    fn new(transport: &'a dyn Transport, view: ViewReference, aggregations: Vec<Aggregation>) -> Self {
        Self {
            transport,
            view,
            aggregations,
            group_by: Vec::new(),
            filter: None,
            query: None,
            properties: None,
            limit: MAX_PAGE_SIZE,
        }
    }

    /// Group results by these properties (wire names).
    pub fn group_by(mut self, properties: Vec<String>) -> Self {
        self.group_by = properties;
        self
    }

    pub fn filter(mut self, filter: &dyn Dump) -> Self {
        self.filter = filter.dump();
        self
    }

    /// Only aggregate instances matching a free-text query.
    pub fn query(mut self, query: impl Into<String>, properties: Option<Vec<String>>) -> Self {
        self.query = Some(query.into());
        self.properties = properties;
        self
    }

    /// Maximum number of groups.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_PAGE_SIZE);
        self
    }

    pub async fn fetch(self) -> Result<AggregateResult> {
        if self.aggregations.is_empty() {
            return Err(ClientError::Validation(
                "aggregate needs at least one aggregation".to_string(),
            ));
        }

        let request = AggregateRequest {
            view: self.view,
            instance_type: InstanceType::Node,
            aggregates: self.aggregations,
            group_by: self.group_by,
            filter: self.filter,
            query: self.query,
            properties: self.properties,
            limit: self.limit,
        };
        let items = self.transport.aggregate(&request).await?;
        debug!(view = %request.view, rows = items.len(), "Aggregate complete");
        Ok(shape_result(&request, items))
    }
}

/// Shape the response by the request: grouped, one value, or several.
fn shape_result(request: &AggregateRequest, items: Vec<AggregateItem>) -> AggregateResult {
    if !request.group_by.is_empty() {
        return AggregateResult::Grouped(
            items
                .into_iter()
                .map(|item| GroupedAggregate {
                    group: item.group.unwrap_or_default(),
                    values: item.aggregates,
                })
                .collect(),
        );
    }

    let mut values = items
        .into_iter()
        .next()
        .map(|item| item.aggregates)
        .unwrap_or_default();

    if request.aggregates.len() == 1 {
        let aggregation = &request.aggregates[0];
        let value = if values.is_empty() {
            AggregatedValue {
                kind: aggregation.kind,
                property: aggregation.property.clone(),
                value: None,
            }
        } else {
            values.swap_remove(0)
        };
        AggregateResult::Single(value)
    } else {
        AggregateResult::Many(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AggregationKind;
    use serde_json::json;

    fn request(aggregates: Vec<Aggregation>, group_by: Vec<String>) -> AggregateRequest {
        AggregateRequest {
            view: ViewReference::new("shop", "Product", "v1"),
            instance_type: InstanceType::Node,
            aggregates,
            group_by,
            filter: None,
            query: None,
            properties: None,
            limit: MAX_PAGE_SIZE,
        }
    }

    fn item(group: Option<serde_json::Value>, values: &[(AggregationKind, f64)]) -> AggregateItem {
        AggregateItem {
            group: group.and_then(|g| g.as_object().cloned()),
            aggregates: values
                .iter()
                .map(|(kind, value)| AggregatedValue {
                    kind: *kind,
                    property: "price".into(),
                    value: Some(*value),
                })
                .collect(),
        }
    }

    #[test]
    fn test_single_aggregate_shape() {
        let result = shape_result(
            &request(vec![Aggregation::avg("price")], vec![]),
            vec![item(None, &[(AggregationKind::Avg, 12.5)])],
        );
        assert_eq!(result.value(), Some(12.5));
    }

    #[test]
    fn test_single_aggregate_without_rows() {
        let result = shape_result(&request(vec![Aggregation::count()], vec![]), vec![]);
        assert!(matches!(result, AggregateResult::Single(AggregatedValue { value: None, .. })));
    }

    #[test]
    fn test_many_and_grouped_shapes() {
        let result = shape_result(
            &request(vec![Aggregation::min("price"), Aggregation::max("price")], vec![]),
            vec![item(None, &[(AggregationKind::Min, 1.0), (AggregationKind::Max, 9.0)])],
        );
        assert!(matches!(result, AggregateResult::Many(ref v) if v.len() == 2));

        let result = shape_result(
            &request(vec![Aggregation::count()], vec!["category".into()]),
            vec![
                item(Some(json!({"category": "tools"})), &[(AggregationKind::Count, 3.0)]),
                item(Some(json!({"category": "toys"})), &[(AggregationKind::Count, 5.0)]),
            ],
        );
        match result {
            AggregateResult::Grouped(groups) => {
                assert_eq!(groups.len(), 2);
                assert_eq!(groups[1].group["category"], json!("toys"));
                assert_eq!(groups[1].values[0].value, Some(5.0));
            }
            other => panic!("expected grouped result, got {other:?}"),
        }
    }
}
