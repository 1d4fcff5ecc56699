//! Pagination tests: exhaustiveness, laziness, both cursor shapes

use super::*;
use crate::client::{ApiResponse, ApiTransport};
use crate::types::StringMap;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Scripted provider: serves page bodies in order, one per fetch
struct PagedTransport {
    pages: Vec<Value>,
    calls: AtomicU64,
}

impl PagedTransport {
    fn new(pages: Vec<Value>) -> Self {
        Self {
            pages,
            calls: AtomicU64::new(0),
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiTransport for PagedTransport {
    async fn call(&self, _method: Method, _path: &str, params: &JsonObject) -> Result<ApiResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        // a follow-up fetch must always carry the page token
        if n > 0 {
            assert!(
                params.contains_key("after") || params.contains_key("cursor"),
                "page {n} requested without a cursor token"
            );
        }
        let body = self
            .pages
            .get(n)
            .unwrap_or_else(|| panic!("fetched past the last page ({n})"))
            .clone();
        Ok(ApiResponse {
            body,
            headers: StringMap::new(),
        })
    }
}

fn graph_page(ids: &[&str], after: Option<&str>) -> Value {
    let data: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
    match after {
        Some(token) => json!({
            "data": data,
            "paging": { "cursors": { "after": token }, "next": "https://example.test/next" },
        }),
        None => json!({ "data": data, "paging": { "cursors": {} } }),
    }
}

async fn collect_ids(transport: Arc<PagedTransport>, request: PageRequest) -> Vec<String> {
    let client = Arc::new(GovernedClient::new(transport));
    paginate(client, request)
        .map_ok(|item| item["id"].as_str().unwrap_or_default().to_string())
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_paginate_graph_pages_in_order() {
    let transport = Arc::new(PagedTransport::new(vec![
        graph_page(&["a", "b"], Some("p2")),
        graph_page(&["c"], Some("p3")),
        graph_page(&[], None),
    ]));

    let ids = collect_ids(transport.clone(), PageRequest::get("media")).await;
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_paginate_stops_on_completion_flag() {
    // the second page omits `next`: nothing past it may be requested,
    // even though more scripted pages exist
    let transport = Arc::new(PagedTransport::new(vec![
        graph_page(&["a"], Some("p2")),
        graph_page(&["b"], None),
        graph_page(&["never"], None),
    ]));

    let ids = collect_ids(transport.clone(), PageRequest::get("media")).await;
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_paginate_is_pull_driven() {
    let transport = Arc::new(PagedTransport::new(vec![
        graph_page(&["a", "b"], Some("p2")),
        graph_page(&["c"], None),
    ]));
    let client = Arc::new(GovernedClient::new(transport.clone()));

    let mut stream = paginate(client, PageRequest::get("media"));
    assert_eq!(stream.try_next().await.unwrap().unwrap()["id"], "a");
    assert_eq!(stream.try_next().await.unwrap().unwrap()["id"], "b");
    // both items came out of the first page; nothing more was fetched
    assert_eq!(transport.calls(), 1);

    assert_eq!(stream.try_next().await.unwrap().unwrap()["id"], "c");
    assert_eq!(stream.try_next().await.unwrap(), None);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_paginate_flat_cursor_shape() {
    let transport = Arc::new(PagedTransport::new(vec![
        json!({ "payments": [{ "id": "pay_1" }, { "id": "pay_2" }], "cursor": "tok" }),
        json!({ "payments": [{ "id": "pay_3" }] }),
    ]));

    let request = PageRequest::get("v2/payments")
        .with_records_field("payments")
        .with_cursor_param("cursor");
    let ids = collect_ids(transport.clone(), request).await;
    assert_eq!(ids, vec!["pay_1", "pay_2", "pay_3"]);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_paginate_empty_first_page() {
    let transport = Arc::new(PagedTransport::new(vec![json!({ "data": [] })]));
    let ids = collect_ids(transport.clone(), PageRequest::get("media")).await;
    assert_eq!(ids, Vec::<String>::new());
    assert_eq!(transport.calls(), 1);
}

#[test]
fn test_page_cursor_parse_graph_with_next() {
    let body = graph_page(&["a"], Some("tok"));
    let cursor = PageCursor::parse(&body, None);
    assert_eq!(cursor.items.len(), 1);
    assert_eq!(cursor.after.as_deref(), Some("tok"));
    assert!(!cursor.finished);
}

#[test]
fn test_page_cursor_parse_graph_token_without_next_is_final() {
    // some providers echo a cursor on the last page but omit `next`
    let body = json!({
        "data": [{ "id": "a" }],
        "paging": { "cursors": { "after": "tok" } },
    });
    let cursor = PageCursor::parse(&body, None);
    assert!(cursor.finished);
    assert_eq!(cursor.after, None);
}

#[test]
fn test_page_cursor_parse_flat_empty_token_is_final() {
    let body = json!({ "orders": [], "cursor": "" });
    let cursor = PageCursor::parse(&body, Some("orders"));
    assert!(cursor.finished);
}

#[test]
fn test_page_params_merge() {
    let mut base = JsonObject::new();
    base.insert("since".into(), json!("2021-01-01"));
    let request = PageRequest::get("media")
        .with_params(base)
        .with_fields(["id", "caption"])
        .with_page_size(25);

    let params = request.page_params(Some("tok"));
    assert_eq!(params["since"], "2021-01-01");
    assert_eq!(params["fields"], "id,caption");
    assert_eq!(params["limit"], 25);
    assert_eq!(params["after"], "tok");
}
