// End-to-end tests of the HTTP surface against an in-memory broker

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use ingest_core::BalancerStrategy;
use ingest_gateway::api::{create_metrics_api, create_rest_api};
use ingest_gateway::{AppContext, GatewayConfig, ShutdownCoordinator};
use ingest_producer::{Backend, MemoryBroker, ProducerHandle, ProducerSettings};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn context(broker: Arc<MemoryBroker>, balancer: BalancerStrategy) -> Arc<AppContext> {
    let mut config = GatewayConfig::default();
    config.pool.size = 2;
    context_with(broker, balancer, config)
}

fn context_with(
    broker: Arc<MemoryBroker>,
    balancer: BalancerStrategy,
    mut config: GatewayConfig,
) -> Arc<AppContext> {
    config.producer.backend = Backend::DryRun;
    config.producer.balancer = balancer;
    let producer = Arc::new(ProducerHandle::new(
        ProducerSettings::from_config(&config.producer),
        broker,
    ));
    Arc::new(AppContext::with_producer(config, producer).unwrap())
}

fn push(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_push_routes_by_key_suffix() {
    let broker = Arc::new(MemoryBroker::recording(4, false));
    broker.create_topic("orders", 4);
    let ctx = context(broker.clone(), BalancerStrategy::KeySuffix);
    let app = create_rest_api(ctx.clone());

    let (status, body) = send(&app, push("/push?topic=orders&key=cust-42,7", "hello")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "accepted");

    ctx.pool.drain(Duration::from_secs(2)).await;

    let stored = broker.messages_for("orders", 3);
    assert_eq!(stored.len(), 1);
    assert_eq!(&stored[0].payload[..], b"hello");
    assert_eq!(ctx.metrics.queued("orders"), 1);
    assert_eq!(ctx.metrics.delivered("orders"), 1);
}

#[tokio::test]
async fn test_empty_body_is_rejected() {
    let broker = Arc::new(MemoryBroker::new(4, true));
    let ctx = context(broker.clone(), BalancerStrategy::Hash);
    let app = create_rest_api(ctx.clone());

    let (status, body) = send(&app, push("/push?topic=orders&key=k", "")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "body is empty");

    ctx.pool.drain(Duration::from_secs(1)).await;
    assert_eq!(broker.written(), 0);
    assert_eq!(ctx.metrics.queued("orders"), 0);
}

#[tokio::test]
async fn test_missing_topic_or_key_is_rejected() {
    let ctx = context(Arc::new(MemoryBroker::new(4, true)), BalancerStrategy::Hash);
    let app = create_rest_api(ctx);

    let (status, _) = send(&app, push("/push?key=k", "payload")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, push("/push?topic=orders&key=", "payload")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_closed_pool_returns_unavailable() {
    let ctx = context(Arc::new(MemoryBroker::new(4, true)), BalancerStrategy::Hash);
    let app = create_rest_api(ctx.clone());
    ctx.pool.drain(Duration::from_secs(1)).await;

    let (status, body) = send(&app, push("/push?topic=orders&key=k", "payload")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("closed"), "{}", body);
}

#[tokio::test]
async fn test_broker_failure_still_accepts() {
    let broker = Arc::new(MemoryBroker::new(4, true));
    broker.fail_writes(true);
    let ctx = context(broker, BalancerStrategy::Hash);
    let app = create_rest_api(ctx.clone());

    let (status, _) = send(&app, push("/push?topic=orders&key=k", "payload")).await;
    assert_eq!(status, StatusCode::OK);

    ctx.pool.drain(Duration::from_secs(1)).await;
    assert_eq!(ctx.metrics.errored("orders"), 1);
    assert_eq!(ctx.metrics.delivered("orders"), 0);
}

#[tokio::test]
async fn test_metrics_and_health() {
    let ctx = context(Arc::new(MemoryBroker::new(4, true)), BalancerStrategy::Hash);
    let api = create_rest_api(ctx.clone());
    let metrics = create_metrics_api(ctx.clone());

    let (status, _) = send(&api, push("/push?topic=clicks&key=u1", "x")).await;
    assert_eq!(status, StatusCode::OK);
    ctx.pool.drain(Duration::from_secs(1)).await;

    let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();

    let (status, body) = send(&metrics, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("ingest_messages_queued_total{topic=\"clicks\"} 1"));
    assert!(body.contains("ingest_messages_delivered_total{topic=\"clicks\"} 1"));
    assert!(body.contains("ingest_pool_workers 2"));

    let (status, body) = send(&metrics, get("/health")).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));

    let (status, body) = send(&api, get("/health")).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_releases_push_blocked_on_full_queue() {
    let broker = Arc::new(MemoryBroker::new(1, true));
    broker.set_latency(Some(Duration::from_secs(30)));
    let mut config = GatewayConfig::default();
    config.pool.size = 1;
    config.pool.capacity = 1;
    config.pool.drain_grace_secs = 1;
    let ctx = context_with(broker, BalancerStrategy::Hash, config);
    let app = create_rest_api(ctx.clone());

    // The first push occupies the only worker, the second fills the queue.
    let (status, _) = send(&app, push("/push?topic=orders&key=k1", "one")).await;
    assert_eq!(status, StatusCode::OK);
    while ctx.pool.active() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let (status, _) = send(&app, push("/push?topic=orders&key=k2", "two")).await;
    assert_eq!(status, StatusCode::OK);

    let blocked = {
        let app = app.clone();
        tokio::spawn(async move { send(&app, push("/push?topic=orders&key=k3", "three")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!blocked.is_finished(), "third push should wait for queue space");

    let coordinator = ShutdownCoordinator::new();
    coordinator.stop_intake(&ctx);
    let (status, body) = tokio::time::timeout(Duration::from_millis(500), blocked)
        .await
        .expect("blocked push must be answered once intake stops")
        .unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("closed"), "{}", body);

    let started = std::time::Instant::now();
    let report = coordinator.shutdown(&ctx).await;
    assert!(started.elapsed() < Duration::from_millis(1800));
    assert_eq!(report.interrupted, 1);
    assert_eq!(report.abandoned, 1);
}
