use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode as AxumStatus};
use axum::routing::{get, post};
use axum::{Json, Router};
use harbor_agent::HarborConfig;
use harbor_api::app::{AppServices, build_app};
use harbor_core::{RequestSnapshot, ResponseSnapshot, RouteTable};
use harbor_events::{NotificationBus, NotificationKind};
use harbor_infra::{
    InMemoryCacheStore, InMemoryMutationQueue, ReqwestUpstream, Upstream, UpstreamError,
};
use reqwest::StatusCode;
use serde_json::json;

// ─────────────────────────────────────────────────────────────────────────────
// Fake origin
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Origin {
    asset_hits: AtomicUsize,
    order_status: AtomicU16,
    /// (idempotency key, body) per order received.
    orders: Mutex<Vec<(Option<String>, String)>>,
}

async fn app_js(State(origin): State<Arc<Origin>>) -> (HeaderMap, &'static str) {
    origin.asset_hits.fetch_add(1, Ordering::SeqCst);
    let mut headers = HeaderMap::new();
    headers.insert("content-type", "application/javascript".parse().unwrap());
    (headers, "console.log('harbor')")
}

async fn products() -> Json<serde_json::Value> {
    Json(json!([{ "sku": "A1", "name": "Anchor" }]))
}

async fn unlisted() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn create_order(
    State(origin): State<Arc<Origin>>,
    headers: HeaderMap,
    body: String,
) -> AxumStatus {
    let key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    origin.orders.lock().unwrap().push((key, body));
    AxumStatus::from_u16(origin.order_status.load(Ordering::SeqCst)).unwrap()
}

async fn spawn_origin() -> (String, Arc<Origin>, tokio::task::JoinHandle<()>) {
    let origin = Arc::new(Origin::default());
    origin.order_status.store(201, Ordering::SeqCst);

    let app = Router::new()
        .route("/app.js", get(app_js))
        .route("/api/products", get(products))
        .route("/api/unlisted", get(unlisted))
        .route("/api/orders", post(create_order))
        .route("/health", get(|| async { "ok" }))
        .with_state(origin.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port");
    let url = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (url, origin, handle)
}

/// Real HTTP transport with a switch that simulates losing the network.
struct SwitchableUpstream {
    inner: ReqwestUpstream,
    online: AtomicBool,
}

#[async_trait::async_trait]
impl Upstream for SwitchableUpstream {
    async fn send(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, UpstreamError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(UpstreamError::transport("network is unreachable"));
        }
        self.inner.send(request).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harbor under test
// ─────────────────────────────────────────────────────────────────────────────

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    network: Arc<SwitchableUpstream>,
    origin: Arc<Origin>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    async fn spawn() -> Self {
        let (origin_url, origin, origin_handle) = spawn_origin().await;

        let config = HarborConfig {
            upstream_url: origin_url.parse().unwrap(),
            routes: RouteTable::default()
                .with_cacheable_read("/api/products")
                .with_syncable_mutation("/api/orders"),
            manifest: Vec::new(),
            ..HarborConfig::default()
        };
        let network = Arc::new(SwitchableUpstream {
            inner: ReqwestUpstream::new().unwrap(),
            online: AtomicBool::new(true),
        });
        let services = Arc::new(AppServices::wire(
            config.clone(),
            Arc::new(InMemoryCacheStore::new(config.generation.clone())),
            Arc::new(InMemoryMutationQueue::new()),
            network.clone(),
        ));

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            network,
            origin,
            handles: vec![origin_handle, handle],
        }
    }

    fn set_online(&self, online: bool) {
        self.network.online.store(online, Ordering::SeqCst);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn static_asset_served_from_cache_when_offline() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let online = client.get(srv.url("/app.js")).send().await.unwrap();
    assert_eq!(online.status(), StatusCode::OK);
    assert_eq!(online.headers()["x-harbor-source"], "network");
    let online_bytes = online.bytes().await.unwrap();

    srv.set_online(false);
    let offline = client.get(srv.url("/app.js")).send().await.unwrap();

    assert_eq!(offline.status(), StatusCode::OK);
    assert_eq!(offline.headers()["x-harbor-source"], "cache");
    assert_eq!(offline.headers()["content-type"], "application/javascript");
    assert_eq!(offline.bytes().await.unwrap(), online_bytes);
    assert_eq!(srv.origin.asset_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scheme_relative_target_stays_on_configured_origin() {
    let srv = TestServer::spawn().await;
    let (other_url, other, other_handle) = spawn_origin().await;
    let other_authority = other_url.trim_start_matches("http://");

    let res = reqwest::Client::new()
        .get(format!("{}//{}/app.js", srv.base_url, other_authority))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(other.asset_hits.load(Ordering::SeqCst), 0);
    assert_eq!(srv.origin.asset_hits.load(Ordering::SeqCst), 0);
    other_handle.abort();
}

#[tokio::test]
async fn offline_order_is_queued_then_delivered_once() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let subscription = srv.services.bus.subscribe();

    srv.set_online(false);
    let res = client
        .post(srv.url("/api/orders"))
        .json(&json!({ "sku": "A1", "qty": 2 }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["queued"], true);
    let item_id = body["itemId"].as_str().unwrap().to_string();

    srv.set_online(true);
    let report: serde_json::Value = client
        .post(srv.url("/__harbor/sync"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["delivered"], json!([item_id]));

    let event = subscription.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(event.kind, NotificationKind::SyncSuccess);
    assert_eq!(event.to_json()["itemId"], item_id);

    // A second drain has nothing left to deliver.
    let again: serde_json::Value = client
        .post(srv.url("/__harbor/sync"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["delivered"], json!([]));

    let orders = srv.origin.orders.lock().unwrap().clone();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].0.as_deref(), Some(item_id.as_str()));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&orders[0].1).unwrap(),
        json!({ "sku": "A1", "qty": 2 })
    );
}

#[tokio::test]
async fn cacheable_api_read_survives_going_offline() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let online: serde_json::Value = client
        .get(srv.url("/api/products"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    srv.set_online(false);
    let res = client.get(srv.url("/api/products")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-harbor-source"], "cache-fallback");
    assert_eq!(res.json::<serde_json::Value>().await.unwrap(), online);
}

#[tokio::test]
async fn unlisted_api_read_offline_is_structured_error() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    client.get(srv.url("/api/unlisted")).send().await.unwrap();
    srv.set_online(false);
    let res = client.get(srv.url("/api/unlisted")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "OFFLINE");
}

#[tokio::test]
async fn rejected_replay_awaits_operator_action() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    srv.set_online(false);
    let body: serde_json::Value = client
        .post(srv.url("/api/orders"))
        .json(&json!({ "sku": "??" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let item_id = body["itemId"].as_str().unwrap().to_string();

    srv.set_online(true);
    srv.origin.order_status.store(422, Ordering::SeqCst);
    let report: serde_json::Value = client
        .post(srv.url("/__harbor/sync"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["failed"], json!([item_id]));

    let queue: serde_json::Value = client
        .get(srv.url("/__harbor/queue"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(queue["stats"]["failedTerminal"], 1);
    assert_eq!(queue["failed"][0]["id"], item_id);
    assert_eq!(queue["failed"][0]["lastError"], "HTTP 422");

    // Requeue, then acknowledging a pending item is a state conflict.
    let res = client
        .post(srv.url(&format!("/__harbor/queue/{item_id}/requeue")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(srv.url(&format!("/__harbor/queue/{item_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    srv.origin.order_status.store(200, Ordering::SeqCst);
    let report: serde_json::Value = client
        .post(srv.url("/__harbor/sync"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["delivered"], json!([item_id]));
}

#[tokio::test]
async fn push_alert_reaches_attached_sse_surface() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut stream = client.get(srv.url("/__harbor/events")).send().await.unwrap();
    assert_eq!(stream.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/__harbor/push"))
        .json(&json!({ "title": "Stock low", "body": "A1 below threshold", "target": "/stock/A1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let ack: serde_json::Value = res.json().await.unwrap();
    assert_eq!(ack["subscribers"], 1);

    let mut received = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while !received.contains("\n\n") {
            match stream.chunk().await.unwrap() {
                Some(chunk) => received.push_str(&String::from_utf8_lossy(&chunk)),
                None => break,
            }
        }
    })
    .await;
    assert!(read.is_ok(), "no SSE event within timeout");

    assert!(received.contains("event: PUSH"));
    assert!(received.contains("\"title\":\"Stock low\""));
    assert!(received.contains("\"target\":\"/stock/A1\""));
}

#[tokio::test]
async fn health_reflects_connectivity() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    srv.set_online(false);
    client.get(srv.url("/api/unlisted")).send().await.unwrap();

    let health: serde_json::Value = client
        .get(srv.url("/__harbor/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connectivity"], "offline");
    assert_eq!(srv.services.bus.subscriber_count(), 0);
}
