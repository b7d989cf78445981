//! HTTP surface of a single node, driven in-process through the router.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use ring_cache::cache::handlers::router;
use ring_cache::cache::manager::CacheRingManager;
use ring_cache::membership::service::MembershipTracker;
use ring_cache::membership::store::MemoryHeartbeatStore;
use ring_cache::replication::HttpReplicationClient;
use ring_cache::storage::backing::{MemoryObjectStore, ObjectStore};
use ring_cache::storage::persistence::PersistenceGateway;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const NODE: &str = "127.0.0.1:5000";

struct TestNode {
    app: Router,
    manager: Arc<CacheRingManager>,
    objects: Arc<MemoryObjectStore>,
}

async fn test_node() -> TestNode {
    let objects = Arc::new(MemoryObjectStore::new());
    let membership = MembershipTracker::new(
        NODE,
        Arc::new(MemoryHeartbeatStore::new()),
        "node_",
        Duration::from_secs(100),
    );
    let manager = CacheRingManager::start(
        membership,
        PersistenceGateway::new(objects.clone()),
        Arc::new(HttpReplicationClient::new(Some(Duration::from_millis(200))).unwrap()),
    )
    .await
    .unwrap();

    TestNode {
        app: router(manager.clone()),
        manager,
        objects,
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn send_raw(app: &Router, uri: &str, body: &str) -> StatusCode {
    let request = Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_health_renews_heartbeat() {
    let node = test_node().await;

    let (status, body) = send(&node.app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_put_then_get() {
    let node = test_node().await;

    let (status, body) = send(
        &node.app,
        Method::PUT,
        "/keys/book_1",
        Some(json!({"data": {"title": "Dune"}, "expiration_date": "2099-01-01T00:00:00"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"message": "key data for book_1 stored successfully."})
    );

    let (status, body) = send(&node.app, Method::GET, "/keys/book_1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"title": "Dune"}));
    assert!(node.objects.get_object("book_1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_get_missing_key_is_null() {
    let node = test_node().await;

    let (status, body) = send(&node.app, Method::GET, "/keys/nothing", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_expired_write_reads_as_null() {
    let node = test_node().await;

    send(
        &node.app,
        Method::PUT,
        "/keys/old",
        Some(json!({"data": 1, "expiration_date": "2001-01-01T00:00:00Z"})),
    )
    .await;
    let (_, body) = send(&node.app, Method::GET, "/keys/old", None).await;

    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let node = test_node().await;

    assert_eq!(
        send_raw(&node.app, "/keys/k", "{not json").await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        send_raw(&node.app, "/keys/k", r#"{"data": 1}"#).await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(node.objects.len().await, 0);
}

#[tokio::test]
async fn test_bad_expiration_is_rejected() {
    let node = test_node().await;

    let (status, body) = send(
        &node.app,
        Method::PUT,
        "/keys/k",
        Some(json!({"data": 1, "expiration_date": "next tuesday"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("expiration_date"));
    assert!(node.manager.get("k", true).await.is_none());
}

#[tokio::test]
async fn test_internal_put_stays_local() {
    let node = test_node().await;

    let (status, body) = send(
        &node.app,
        Method::PUT,
        "/internal/keys/replica",
        Some(json!({"data": [1, 2, 3], "expiration_date": "2099-01-01T00:00:00+00:00"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
    assert_eq!(node.objects.len().await, 0);

    let (status, body) = send(&node.app, Method::GET, "/internal/keys/replica", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([1, 2, 3]));
}

#[tokio::test]
async fn test_internal_get_misses_locally() {
    let node = test_node().await;

    let (status, body) = send(&node.app, Method::GET, "/internal/keys/absent", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_refresh_reloads_from_backing_store() {
    let node = test_node().await;
    send(
        &node.app,
        Method::PUT,
        "/keys/k",
        Some(json!({"data": "v", "expiration_date": "2099-01-01T00:00:00Z"})),
    )
    .await;
    node.manager.local_store().clear().await;

    let (status, body) = send(&node.app, Method::POST, "/internal/refresh", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
    assert_eq!(node.manager.get("k", true).await, Some(json!("v")));
}

#[tokio::test]
async fn test_nodes_lists_self() {
    let node = test_node().await;

    let (status, body) = send(&node.app, Method::GET, "/internal/nodes", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([NODE]));
}

#[tokio::test]
async fn test_encoded_key_path() {
    let node = test_node().await;

    send(
        &node.app,
        Method::PUT,
        "/keys/a%20b",
        Some(json!({"data": true, "expiration_date": "2099-01-01 00:00:00"})),
    )
    .await;

    assert_eq!(node.manager.get("a b", true).await, Some(json!(true)));
}
