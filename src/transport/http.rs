//! HTTP transport for the data modeling service
//!
//! Endpoints live under `{base_url}/api/v1/projects/{project}`:
//! - `models/instances/list`, `/search`, `/aggregate`, `/byids`, `/delete`
//! - `models/instances` for apply
//! - `timeseries` and `timeseries/byids` for embedded time series
//!
//! Requests are rate limited and transient failures (429, 408, 5xx, network)
//! are retried with exponential backoff. Token acquisition is out of scope: a
//! static bearer token from [`ClientConfig`] is attached when present.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::rate_limiter::{
    RateLimitConfig, RateLimitedClient, RetryConfig, error_for_status, retry_async,
};
use super::{
    AggregateRequest, ApplyRequest, InstanceRef, ListRequest, ListResponse, RetrieveRequest,
    SearchRequest, Transport,
};
use crate::api::AggregateItem;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::models::{Instance, InstanceType};
use crate::write::{ApplyResult, InstanceResult, TimeSeriesWrite};

#[derive(Debug, Deserialize)]
struct Items<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeSeriesId {
    external_id: Option<String>,
}

/// Data modeling client over HTTPS with rate limiting and retry
pub struct HttpTransport {
    client: Arc<RateLimitedClient>,
    base_url: String,
    project: String,
    token: Option<String>,
    retry_config: RetryConfig,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = RateLimitedClient::new(
            "data-modeling",
            RateLimitConfig {
                requests_per_second: config.requests_per_second,
                burst_size: config.burst_size,
            },
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self {
            client: Arc::new(client),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project: config.project.clone(),
            token: config.token.clone(),
            retry_config: RetryConfig {
                max_retries: config.max_retries,
                ..RetryConfig::default()
            },
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/projects/{}/{}", self.base_url, self.project, path)
    }

    async fn post<B, R>(&self, path: &str, body: &B, operation: &str) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        let url = url.as_str();
        let token = self.token.as_deref();
        let client = &self.client;

        retry_async(
            move || async move {
                let response = client.post_json(url, token, body).await?;
                let response = error_for_status(response).await?;
                Ok(response.json::<R>().await?)
            },
            &self.retry_config,
            operation,
        )
        .await
    }

    /// Create the time series that do not exist yet.
    async fn ensure_time_series(&self, time_series: &[TimeSeriesWrite]) -> Result<Vec<String>> {
        if time_series.is_empty() {
            return Ok(Vec::new());
        }

        let lookup = json!({
            "items": time_series
                .iter()
                .map(|ts| json!({ "externalId": ts.external_id }))
                .collect::<Vec<_>>(),
            "ignoreUnknownIds": true,
        });
        let existing: Items<TimeSeriesId> = self
            .post("timeseries/byids", &lookup, "timeseries_byids")
            .await?;
        let existing: HashSet<String> = existing
            .items
            .into_iter()
            .filter_map(|ts| ts.external_id)
            .collect();

        let missing: Vec<&TimeSeriesWrite> = time_series
            .iter()
            .filter(|ts| !existing.contains(&ts.external_id))
            .collect();
        if !missing.is_empty() {
            let _: Items<TimeSeriesId> = self
                .post("timeseries", &json!({ "items": missing }), "timeseries_create")
                .await?;
            info!(count = missing.len(), "Created time series");
        }

        Ok(time_series.iter().map(|ts| ts.external_id.clone()).collect())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn list(&self, request: &ListRequest) -> Result<ListResponse> {
        debug!(limit = request.limit, has_cursor = request.cursor.is_some(), "Listing instances");
        self.post("models/instances/list", request, "instances_list").await
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Instance>> {
        let response: Items<Instance> = self
            .post("models/instances/search", request, "instances_search")
            .await?;
        Ok(response.items)
    }

    async fn aggregate(&self, request: &AggregateRequest) -> Result<Vec<AggregateItem>> {
        let response: Items<AggregateItem> = self
            .post("models/instances/aggregate", request, "instances_aggregate")
            .await?;
        Ok(response.items)
    }

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<Vec<Instance>> {
        let response: Items<Instance> = self
            .post("models/instances/byids", request, "instances_byids")
            .await?;
        Ok(response.items)
    }

    async fn apply(&self, request: &ApplyRequest) -> Result<ApplyResult> {
        let time_series = self.ensure_time_series(&request.time_series).await?;
        if request.items.is_empty() {
            return Ok(ApplyResult {
                time_series,
                ..ApplyResult::default()
            });
        }
        let response: Items<InstanceResult> = self
            .post("models/instances", request, "instances_apply")
            .await?;

        let (nodes, edges) = response
            .items
            .into_iter()
            .partition(|item| item.instance_type == InstanceType::Node);
        Ok(ApplyResult {
            nodes,
            edges,
            time_series,
        })
    }

    async fn delete(&self, items: &[InstanceRef]) -> Result<Vec<InstanceRef>> {
        let response: Items<InstanceRef> = self
            .post(
                "models/instances/delete",
                &json!({ "items": items }),
                "instances_delete",
            )
            .await?;
        Ok(response.items)
    }
}
