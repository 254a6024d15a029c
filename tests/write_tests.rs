//! Writing object graphs through the in-memory transport.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{FakeTransport, node};
use viewgraph::models::{EdgeConnection, InstanceId, InstanceType, ViewDescriptor, ViewReference};
use viewgraph::write::{
    ApplyOptions, EdgeWrite, InstanceApply, NodeWrite, TimeSeriesWrite, WriteApi, WriteGraph,
};

fn product_view() -> ViewReference {
    ViewReference::new("shop", "Product", "v1")
}

fn product() -> Arc<ViewDescriptor> {
    Arc::new(
        ViewDescriptor::new(product_view())
            .property("name")
            .property("pressure")
            .connection(
                "parts",
                EdgeConnection::outwards(InstanceId::new("shop", "Product.parts"))
                    .with_end_view(product_view()),
            ),
    )
}

fn id(external_id: &str) -> InstanceId {
    InstanceId::new("shop", external_id)
}

/// A hub product with `parts` edges to `count` part products.
fn assembly(count: usize) -> WriteGraph {
    let desc = product();
    let mut graph = WriteGraph::new();
    let mut hub = NodeWrite::new(id("hub"), desc.clone())
        .set("name", "hub")
        .set("pressure", TimeSeriesWrite::new("hub:pressure").unit("bar"));
    for i in 0..count {
        let part = id(&format!("part{i:04}"));
        graph.insert(NodeWrite::new(part.clone(), desc.clone()).set("name", format!("part {i}")));
        hub = hub.edge(EdgeWrite::to_node("parts", part));
    }
    graph.insert(hub);
    graph
}

mod apply {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_large_graph_is_chunked_with_time_series_first() {
        let transport = FakeTransport::new(Vec::new());
        let api = WriteApi::new(&transport);

        let result = api.upsert(&assembly(1100), &[id("hub")]).await.unwrap();

        assert_eq!(result.nodes.len(), 1101);
        assert_eq!(result.edges.len(), 1100);
        assert_eq!(result.time_series, vec!["hub:pressure".to_string()]);

        let requests = transport.apply_requests.lock().unwrap();
        let sizes: Vec<usize> = requests.iter().map(|r| r.items.len()).collect();
        assert_eq!(sizes, vec![1000, 1000, 201]);
        let time_series: Vec<usize> = requests.iter().map(|r| r.time_series.len()).collect();
        assert_eq!(time_series, vec![1, 0, 0]);

        // Nodes go out before edges.
        assert!(matches!(requests[0].items[0], InstanceApply::Node(_)));
        assert!(matches!(requests[2].items[200], InstanceApply::Edge(_)));
    }

    #[tokio::test]
    async fn test_upsert_merges_and_apply_can_replace() {
        let transport = FakeTransport::new(Vec::new());
        let api = WriteApi::new(&transport);
        let graph = assembly(1);

        api.upsert(&graph, &[id("hub")]).await.unwrap();
        api.apply(&graph, &[id("hub")], ApplyOptions::replace()).await.unwrap();

        let requests = transport.apply_requests.lock().unwrap();
        let flags: Vec<bool> = requests.iter().map(|r| r.replace).collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let transport = FakeTransport::new(Vec::new());
        let api = WriteApi::new(&transport);
        let mut graph = WriteGraph::new();
        graph.insert(NodeWrite::new(id("shell"), product()).null("name"));

        let result = api.upsert(&graph, &[id("shell")]).await.unwrap();

        assert!(result.nodes.is_empty());
        assert!(transport.apply_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_none_sends_explicit_null() {
        let transport = FakeTransport::new(Vec::new());
        let api = WriteApi::new(&transport);
        let mut graph = WriteGraph::new();
        graph.insert(NodeWrite::new(id("shell"), product()).null("name"));

        api.apply(&graph, &[id("shell")], ApplyOptions::default().write_none(true))
            .await
            .unwrap();

        let requests = transport.apply_requests.lock().unwrap();
        let body = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(body["items"][0]["sources"][0]["properties"], json!({"name": null}));
        assert_eq!(body["replace"], json!(false));
    }

    #[tokio::test]
    async fn test_only_reachable_nodes_are_written() {
        let transport = FakeTransport::new(Vec::new());
        let api = WriteApi::new(&transport);
        let mut graph = assembly(2);
        graph.insert(NodeWrite::new(id("stray"), product()).set("name", "stray"));

        let result = api.upsert(&graph, &[id("part0000")]).await.unwrap();

        let written: Vec<String> = result.nodes.iter().map(|n| n.external_id.clone()).collect();
        assert_eq!(written, vec!["part0000".to_string()]);
        assert!(result.edges.is_empty());
    }
}

mod delete {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_delete_is_chunked_and_reports_deleted() {
        let view = product_view();
        let transport = FakeTransport::new(vec![
            node(&view, "a", json!({"name": "a"})),
            node(&view, "b", json!({"name": "b"})),
        ]);
        let api = WriteApi::new(&transport);
        let mut ids: Vec<InstanceId> = (0..1200).map(|i| id(&format!("x{i}"))).collect();
        ids.push(id("a"));
        ids.push(id("b"));

        let deleted = api.delete(&ids, InstanceType::Node).await.unwrap();

        assert_eq!(deleted, vec![id("a"), id("b")]);
        let sizes: Vec<usize> = transport
            .delete_requests
            .lock()
            .unwrap()
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![1000, 202]);
    }
}
